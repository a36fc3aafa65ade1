use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::scratch::ScratchDir;
use super::{handle_page_error, load_document, PageText};
use crate::config::ReaderConfig;
use crate::utils::{retry, LabError, LabResult};

/// 扫描件：逐页渲染为固定尺寸的JPEG，再用 tesseract 识别
pub struct OcrReader {
    config: ReaderConfig,
}

impl OcrReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    pub async fn read_pages(&self, pdf_path: &Path) -> LabResult<Vec<PageText>> {
        info!("OCR读取PDF: {}", pdf_path.display());

        let page_count = load_document(pdf_path)?.get_pages().len();
        info!("PDF共 {} 页", page_count);

        // Dropped on every return path below, which removes all rendered images
        let scratch = ScratchDir::create(self.config.scratch_root.as_deref())?;
        debug!("页面图片目录: {}", scratch.path().display());
        let mut failed: BTreeMap<usize, PageText> = BTreeMap::new();

        for page_number in 1..=page_count {
            let target = scratch.page_image(page_number);
            let target = target.as_path();
            let rendered = retry::with_backoff("页面渲染", self.config.ocr_retries, self.backoff(), move || async move {
                // 超时只作用于子进程；缩放编码在阻塞线程上无法取消，放在超时之外
                let png = self.guarded(page_number, self.render_png(pdf_path, page_number, target)).await?;
                self.normalize(png, target, page_number).await
            })
            .await;

            if let Err(e) = rendered {
                let page = handle_page_error(self.config.on_page_error, page_number - 1, e)?;
                failed.insert(page_number, page);
            }
        }

        let mut texts: BTreeMap<usize, String> = BTreeMap::new();
        for (page_number, image) in scratch.sorted_page_images()? {
            if page_number == 0 || page_number > page_count || failed.contains_key(&page_number) {
                continue;
            }
            let image = image.as_path();
            let recognized = retry::with_backoff("OCR识别", self.config.ocr_retries, self.backoff(), move || {
                self.guarded(page_number, self.recognize(image))
            })
            .await;

            match recognized {
                Ok(text) => {
                    debug!(page = page_number, chars = text.len(), "OCR完成");
                    texts.insert(page_number, text);
                }
                Err(e) => {
                    let page = handle_page_error(self.config.on_page_error, page_number - 1, e)?;
                    failed.insert(page_number, page);
                }
            }
        }

        let mut pages = Vec::with_capacity(page_count);
        for page_number in 1..=page_count {
            let page = match (texts.remove(&page_number), failed.remove(&page_number)) {
                (Some(text), _) => PageText::ok(page_number - 1, text),
                (None, Some(page)) => page,
                (None, None) => handle_page_error(
                    self.config.on_page_error,
                    page_number - 1,
                    LabError::OcrError("未生成页面图片".to_string()),
                )?,
            };
            pages.push(page);
        }

        drop(scratch);
        Ok(pages)
    }

    fn backoff(&self) -> Duration {
        Duration::from_millis(self.config.retry_backoff_ms)
    }

    /// 单页超时视为该页失败
    async fn guarded<T>(&self, page_number: usize, fut: impl Future<Output = LabResult<T>>) -> LabResult<T> {
        let limit = Duration::from_secs(self.config.page_timeout_secs);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(LabError::PageError {
                page: page_number,
                reason: format!("超过 {:?} 未完成", limit),
            }),
        }
    }

    /// pdftoppm 渲染单页PNG，返回PNG路径
    async fn render_png(&self, pdf_path: &Path, page_number: usize, target: &Path) -> LabResult<PathBuf> {
        let prefix = target.with_extension("");
        let output = Command::new(&self.config.pdftoppm_bin)
            .arg("-r")
            .arg(self.config.dpi.to_string())
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-singlefile")
            .arg("-png")
            .arg(pdf_path)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LabError::OcrError(format!("无法运行 {}: {}", self.config.pdftoppm_bin, e)))?;

        if !output.status.success() {
            return Err(LabError::OcrError(format!(
                "pdftoppm 渲染第 {} 页失败: {}",
                page_number,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(prefix.with_extension("png"))
    }

    /// 缩放为固定尺寸并另存为JPEG
    async fn normalize(&self, source: PathBuf, target: &Path, page_number: usize) -> LabResult<()> {
        let target = target.to_path_buf();
        let (width, height, quality) = (
            self.config.page_width,
            self.config.page_height,
            self.config.jpeg_quality,
        );
        tokio::task::spawn_blocking(move || normalize_page_image(&source, &target, width, height, quality))
            .await
            .map_err(|e| LabError::OcrError(format!("图片处理任务异常: {}", e)))??;

        debug!(page = page_number, "页面渲染完成");
        Ok(())
    }

    async fn recognize(&self, image: &Path) -> LabResult<String> {
        let output = Command::new(&self.config.tesseract_bin)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.ocr_language)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LabError::OcrError(format!("无法运行 {}: {}", self.config.tesseract_bin, e)))?;

        if !output.status.success() {
            return Err(LabError::OcrError(format!(
                "tesseract 识别 {} 失败: {}",
                image.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// 缩放到固定像素尺寸（Lanczos），按指定质量编码为JPEG，删除原PNG
fn normalize_page_image(source: &Path, target: &Path, width: u32, height: u32, quality: u8) -> LabResult<()> {
    let img = image::open(source)?;
    let resized = img.resize_exact(width, height, FilterType::Lanczos3);

    let mut writer = std::io::BufWriter::new(std::fs::File::create(target)?);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    DynamicImage::ImageRgb8(resized.to_rgb8()).write_with_encoder(encoder)?;
    writer.flush()?;

    std::fs::remove_file(source)?;
    Ok(())
}
