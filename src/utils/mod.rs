pub mod logger;
pub mod retry;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("检验项目目录错误: {0}")]
    CatalogError(String),

    #[error("PDF文档无法读取 ({path}): {reason}")]
    DocumentError { path: String, reason: String },

    #[error("第 {page} 页处理失败: {reason}")]
    PageError { page: usize, reason: String },

    #[error("OCR错误: {0}")]
    OcrError(String),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("正则表达式错误: {0}")]
    RegexError(#[from] regex::Error),

    #[error("CSV错误: {0}")]
    CsvError(#[from] csv::Error),

    #[error("图像处理错误: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("PDF解析错误: {0}")]
    PdfError(#[from] lopdf::Error),
}

pub type LabResult<T> = Result<T, LabError>;
