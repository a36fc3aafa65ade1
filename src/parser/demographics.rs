use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use super::PatientDetails;
use crate::config::DemographicsConfig;
use crate::utils::LabResult;

/// 从首页文本中提取患者姓名、年龄和性别
pub struct DemographicsExtractor {
    name_re: Regex,
    trailing_labels: Vec<Regex>,
    age_gender_re: Regex,
    age_re: Regex,
    gender_re: Regex,
    unknown_name: String,
}

impl DemographicsExtractor {
    pub fn new(config: &DemographicsConfig) -> LabResult<Self> {
        let titles = config
            .titles
            .iter()
            .map(|t| regex::escape(t.trim()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("|");
        let title_group = if titles.is_empty() {
            String::new()
        } else {
            format!(r"(?:(?:{})\s*)?", titles)
        };

        // NAME 后可跟 "." ":" 或制表符；姓名只取字母和空白
        let name_re = RegexBuilder::new(&format!(
            r"\bNAME\b\.?\s*[:\t]*\s*{}(?P<name>[A-Za-z][A-Za-z\s]*)",
            title_group
        ))
        .case_insensitive(true)
        .build()?;

        let trailing_labels = config
            .trailing_labels
            .iter()
            .map(|label| {
                let words = label.split_whitespace().map(regex::escape).collect::<Vec<_>>();
                RegexBuilder::new(&format!(r"\b{}\b", words.join(r"\s*")))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let age_gender_re = RegexBuilder::new(
            r"\bAge\s*/\s*(?:Gender|Sex)\s*[:\-]?\s*(?P<age>\d{1,3})\s*(?:Yrs|Yr|Years|Year|Y)\.?\s*/\s*(?P<gender>Male|Female|Other|M|F)\b",
        )
        .case_insensitive(true)
        .build()?;
        let age_re = RegexBuilder::new(r"\bAge\s*[:\-]\s*(?P<age>\d{1,3})\b")
            .case_insensitive(true)
            .build()?;
        let gender_re = RegexBuilder::new(r"\b(?:Gender|Sex)\s*[:\-]\s*(?P<gender>Male|Female|Other|M|F)\b")
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            name_re,
            trailing_labels,
            age_gender_re,
            age_re,
            gender_re,
            unknown_name: config.unknown_name.clone(),
        })
    }

    /// 找不到姓名时使用占位名，不中断流程；年龄/性别缺失则保持为空
    pub fn extract(&self, text: &str) -> PatientDetails {
        let patient_name = match self.extract_name(text) {
            Some(name) => name,
            None => {
                warn!("未找到患者姓名，使用占位值 '{}'", self.unknown_name);
                self.unknown_name.clone()
            }
        };

        let (age, gender) = self.extract_age_gender(text);
        debug!("患者信息: name={}, age={:?}, gender={:?}", patient_name, age, gender);

        PatientDetails {
            patient_name,
            age,
            gender,
        }
    }

    fn extract_name(&self, text: &str) -> Option<String> {
        let captured = self.name_re.captures(text)?.name("name")?.as_str();

        // 只保留第一行，文本层和OCR两种输入都一样
        let mut name = captured.lines().map(str::trim).find(|l| !l.is_empty())?.to_string();

        for label in &self.trailing_labels {
            if let Some(m) = label.find(&name) {
                name.truncate(m.start());
            }
        }

        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    fn extract_age_gender(&self, text: &str) -> (Option<String>, Option<String>) {
        if let Some(caps) = self.age_gender_re.captures(text) {
            return (
                caps.name("age").map(|m| m.as_str().to_string()),
                caps.name("gender").map(|m| normalize_gender(m.as_str())),
            );
        }

        let age = self
            .age_re
            .captures(text)
            .and_then(|c| c.name("age"))
            .map(|m| m.as_str().to_string());
        let gender = self
            .gender_re
            .captures(text)
            .and_then(|c| c.name("gender"))
            .map(|m| normalize_gender(m.as_str()));
        (age, gender)
    }
}

fn normalize_gender(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "m" | "male" => "Male".to_string(),
        "f" | "female" => "Female".to_string(),
        _ => "Other".to_string(),
    }
}
