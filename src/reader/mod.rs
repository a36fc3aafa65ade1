pub mod ocr;
pub mod scratch;
pub mod text_layer;

pub use ocr::OcrReader;
pub use text_layer::TextLayerReader;

use std::path::Path;
use tracing::{info, warn};

use crate::config::{PageErrorPolicy, ReaderConfig, Strategy};
use crate::utils::{LabError, LabResult};

/// 单页文本，index 从 0 开始
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub index: usize,
    pub text: String,
    /// 页面读取失败的原因；失败页的 text 为空
    pub error: Option<String>,
}

impl PageText {
    pub fn ok(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            error: None,
        }
    }

    pub fn failed(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            text: String::new(),
            error: Some(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// 两种可互换的页面文本来源，由配置选择
pub enum PageTextProducer {
    Ocr(OcrReader),
    TextLayer(TextLayerReader),
}

impl PageTextProducer {
    pub fn from_config(config: &ReaderConfig) -> Self {
        match config.strategy {
            Strategy::Ocr => Self::Ocr(OcrReader::new(config.clone())),
            Strategy::TextLayer => Self::TextLayer(TextLayerReader::new(config.on_page_error)),
        }
    }

    /// 按页码升序返回每页文本
    pub async fn produce(&self, pdf_path: &Path) -> LabResult<Vec<PageText>> {
        let pages = match self {
            Self::Ocr(reader) => reader.read_pages(pdf_path).await?,
            Self::TextLayer(reader) => reader.read_pages(pdf_path)?,
        };

        let failed = pages.iter().filter(|p| !p.is_ok()).count();
        if failed > 0 {
            warn!("{} 页读取失败，按空文本处理", failed);
        }
        info!("共读取 {} 页", pages.len());
        Ok(pages)
    }
}

/// 按策略处理单页失败：Skip 返回空文本页，Abort 返回错误
pub(crate) fn handle_page_error(policy: PageErrorPolicy, index: usize, error: LabError) -> LabResult<PageText> {
    match policy {
        PageErrorPolicy::Skip => {
            warn!(page = index + 1, "页面读取失败，跳过: {}", error);
            Ok(PageText::failed(index, error.to_string()))
        }
        PageErrorPolicy::Abort => Err(LabError::PageError {
            page: index + 1,
            reason: error.to_string(),
        }),
    }
}

/// 打开PDF；打不开就是整份文档的错误
pub(crate) fn load_document(pdf_path: &Path) -> LabResult<lopdf::Document> {
    if !pdf_path.exists() {
        return Err(LabError::DocumentError {
            path: pdf_path.display().to_string(),
            reason: "文件不存在".to_string(),
        });
    }
    lopdf::Document::load(pdf_path).map_err(|e| LabError::DocumentError {
        path: pdf_path.display().to_string(),
        reason: e.to_string(),
    })
}
