pub mod units;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::{LabError, LabResult};

pub use units::DefaultUnitTable;

pub const DEFAULT_CONFIG_PATH: &str = "config/labscan.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub reader: ReaderConfig,
    pub sanitizer: SanitizerConfig,
    pub demographics: DemographicsConfig,
    pub matcher: MatcherConfig,
}

/// 页面文本的获取方式，由配置决定，不做内容探测
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// 渲染为图片后OCR（扫描件）
    Ocr,
    /// 直接读取PDF文本层（电子版报告）
    TextLayer,
}

/// 单页失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorPolicy {
    /// 记录日志，该页按空文本处理
    Skip,
    /// 终止整个文档
    Abort,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub strategy: Strategy,
    pub dpi: u32,
    pub page_width: u32,
    pub page_height: u32,
    pub jpeg_quality: u8,
    pub page_timeout_secs: u64,
    pub ocr_retries: u32,
    pub retry_backoff_ms: u64,
    pub ocr_language: String,
    pub pdftoppm_bin: String,
    pub tesseract_bin: String,
    /// 临时图片目录的父目录，None 时使用系统临时目录
    pub scratch_root: Option<PathBuf>,
    pub on_page_error: PageErrorPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SanitizerConfig {
    /// 按列表顺序依次删除，顺序有意义
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DemographicsConfig {
    pub titles: Vec<String>,
    /// 姓名后面经常被一起匹配进来的表头字段，按顺序截断
    pub trailing_labels: Vec<String>,
    pub unknown_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// 可识别的单位（正则片段），靠前的优先
    pub unit_patterns: Vec<String>,
    /// 无法对应到目录中任何项目的匹配是否丢弃
    pub drop_unresolved: bool,
}

impl AppConfig {
    /// 读取配置文件（可选），再叠加 `LABSCAN__SECTION__KEY` 环境变量
    pub fn load(path: Option<&Path>) -> LabResult<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path.as_path())
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix("LABSCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| LabError::ConfigError(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| LabError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> LabResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| LabError::ConfigError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Ocr,
            dpi: 300,
            page_width: 1080,
            page_height: 1920,
            jpeg_quality: 90,
            page_timeout_secs: 120,
            ocr_retries: 1,
            retry_backoff_ms: 500,
            ocr_language: "eng".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            tesseract_bin: "tesseract".to_string(),
            scratch_root: None,
            on_page_error: PageErrorPolicy::Skip,
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            patterns: vec![
                // 样本说明行要先于方法说明行删除
                r"Sample[ \t]*:[^\n]*(?:\n|$)".to_string(),
                r"Method[ \t]*:[^\n]*(?:\n|$)".to_string(),
                r"Ref\. Cust : PHLB_\d+ ?".to_string(),
            ],
        }
    }
}

impl Default for DemographicsConfig {
    fn default() -> Self {
        Self {
            titles: ["Mrs.", "Mr.", "Ms.", "Dr.", "Col."].iter().map(|s| s.to_string()).collect(),
            trailing_labels: [
                "Billing Date",
                "OP Reg No",
                "Age",
                "Lab No",
                "UHID No",
                "Visit ID",
                "Gender",
                "Sex",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            unknown_name: "Unknown".to_string(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            unit_patterns: [
                r"ng/mL",
                r"pg/mL",
                r"ng/dL",
                r"mg/dL",
                r"gm/dL",
                r"g/dL",
                r"μg/dL",
                r"µg/dL",
                r"μIU/mL",
                r"µIU/mL",
                r"mIU/L",
                r"mmol/L",
                r"mEq/L",
                r"IU/L",
                r"U/L",
                r"Millions\s*/\s*cumm",
                r"mill\s*/\s*cumm",
                r"Cells\s*/\s*cumm",
                r"Lakh?s\s*/?\s*cumm",
                r"cumm",
                r"fL",
                r"pg",
                r"Ratio",
                r"gm%",
                r"%",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            drop_unresolved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.reader.dpi, 300);
        assert_eq!(config.reader.on_page_error, PageErrorPolicy::Skip);
        assert_eq!(config.sanitizer.patterns.len(), 3);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labscan.toml");
        std::fs::write(
            &path,
            "[reader]\nstrategy = \"text_layer\"\npage_timeout_secs = 5\n\n[matcher]\ndrop_unresolved = true\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.reader.strategy, Strategy::TextLayer);
        assert_eq!(config.reader.page_timeout_secs, 5);
        assert_eq!(config.reader.page_width, 1080);
        assert!(config.matcher.drop_unresolved);
        assert_eq!(config.demographics.unknown_name, "Unknown");
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("labscan.toml");
        let mut config = AppConfig::default();
        config.reader.ocr_language = "eng+hin".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.reader.ocr_language, "eng+hin");
        assert_eq!(loaded.matcher.unit_patterns, config.matcher.unit_patterns);
    }
}
