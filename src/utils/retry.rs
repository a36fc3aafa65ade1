//! 外部工具调用（渲染 / OCR）的有限次重试。
//!
//! 只用于可能出现瞬时 I/O 故障的子进程调用；正则匹配是确定性的，不重试。

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::{LabError, LabResult};

/// 按指数退避重试 `op`，最多额外重试 `max_retries` 次。
///
/// 第 n 次重试前等待 `base_delay * 2^(n-1)`。
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
) -> LabResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LabResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries && is_transient(&e) => {
                attempt += 1;
                let delay = base_delay * (1u32 << (attempt - 1).min(16));
                warn!("{} 失败 (重试 {}/{}，{:?} 后再试): {}", label, attempt, max_retries, delay, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 配置错误、正则错误等不会因为重试而改变
fn is_transient(e: &LabError) -> bool {
    matches!(
        e,
        LabError::OcrError(_) | LabError::IoError(_) | LabError::ImageError(_) | LabError::PageError { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = with_backoff("test", 3, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(LabError::OcrError("tesseract crashed".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Cell::new(0);
        let result: LabResult<()> = with_backoff("test", 2, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async { Err(LabError::OcrError("still broken".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_config_errors() {
        let calls = Cell::new(0);
        let result: LabResult<()> = with_backoff("test", 5, Duration::ZERO, || {
            calls.set(calls.get() + 1);
            async { Err(LabError::ConfigError("bad pattern".into())) }
        })
        .await;

        assert!(matches!(result, Err(LabError::ConfigError(_))));
        assert_eq!(calls.get(), 1);
    }
}
