pub mod assembler;
pub mod demographics;
pub mod result_matcher;
pub mod sanitizer;

pub use assembler::assemble;
pub use demographics::DemographicsExtractor;
pub use result_matcher::ResultMatcher;
pub use sanitizer::TextSanitizer;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::TestCatalog;
use crate::config::{AppConfig, DefaultUnitTable};
use crate::reader::PageText;
use crate::utils::LabResult;

/// 一条检验结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    #[serde(rename = "Test Name")]
    pub test_name: String,
    /// 数值原文：整数或一位小数点的小数，无符号
    #[serde(rename = "Result")]
    pub result: String,
    /// 识别到的单位、默认单位或 "N/A"
    #[serde(rename = "Unit")]
    pub unit: String,
}

/// 患者信息，每份文档只从第一页提取一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDetails {
    #[serde(rename = "Patient Name")]
    pub patient_name: String,
    #[serde(rename = "Age", default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(rename = "Gender", default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl PatientDetails {
    pub fn named(name: &str) -> Self {
        Self {
            patient_name: name.to_string(),
            age: None,
            gender: None,
        }
    }
}

/// 最终输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    #[serde(rename = "Patient Details")]
    pub patient_details: Vec<PatientDetails>,
    #[serde(rename = "Test Results")]
    pub test_results: Vec<ResultEntry>,
}

impl ExtractionRecord {
    /// pretty 模式使用4空格缩进
    pub fn to_json(&self, pretty: bool) -> LabResult<String> {
        if !pretty {
            return Ok(serde_json::to_string(self)?);
        }
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// 统一提取管道：清洗 → 结果匹配，首个成功页额外提取患者信息
pub struct ExtractionPipeline {
    sanitizer: TextSanitizer,
    demographics: DemographicsExtractor,
    matcher: ResultMatcher,
    unknown_name: String,
}

impl ExtractionPipeline {
    pub fn new(config: &AppConfig, catalog: &TestCatalog, default_units: DefaultUnitTable) -> LabResult<Self> {
        Ok(Self {
            sanitizer: TextSanitizer::new(&config.sanitizer)?,
            demographics: DemographicsExtractor::new(&config.demographics)?,
            matcher: ResultMatcher::new(catalog, default_units, &config.matcher)?,
            unknown_name: config.demographics.unknown_name.clone(),
        })
    }

    /// 按页序处理；页面必须已按页码升序排列
    pub fn process_pages(&self, pages: &[PageText]) -> ExtractionRecord {
        let mut patient: Option<PatientDetails> = None;
        let mut per_page_results = Vec::with_capacity(pages.len());

        for page in pages {
            if patient.is_none() && page.is_ok() {
                patient = Some(self.demographics.extract(&page.text));
            }

            let cleaned = self.sanitizer.sanitize(&page.text);
            let results = self.matcher.find_results(&cleaned);
            info!(page = page.index + 1, results = results.len(), "页面解析完成");
            per_page_results.push(results);
        }

        let patient = patient.unwrap_or_else(|| {
            warn!("没有成功读取的页面，患者信息使用占位值");
            PatientDetails::named(&self.unknown_name)
        });

        assemble(patient, per_page_results)
    }
}
