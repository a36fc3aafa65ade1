use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use super::ResultEntry;
use crate::catalog::TestCatalog;
use crate::config::{DefaultUnitTable, MatcherConfig};
use crate::utils::LabResult;

pub const NO_UNIT: &str = "N/A";

/// 目录中的一个项目，及其容忍OCR空白漂移的正则
struct CatalogEntry {
    name: String,
    pattern: Regex,
}

/// 根据检验项目目录，在文本中查找 "项目名 [填充] [:-] 数值 [单位]" 形式的结果
pub struct ResultMatcher {
    result_re: Option<Regex>,
    /// 按名称长度降序（同长度保持目录顺序），用于还原规范名
    entries: Vec<CatalogEntry>,
    default_units: DefaultUnitTable,
    drop_unresolved: bool,
}

impl ResultMatcher {
    pub fn new(catalog: &TestCatalog, default_units: DefaultUnitTable, config: &MatcherConfig) -> LabResult<Self> {
        let mut names: Vec<&String> = catalog
            .names()
            .iter()
            .filter(|n| !n.trim().is_empty())
            .collect();
        // Longest first so "Fasting Plasma Glucose" wins over "Plasma Glucose"
        names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));

        let entries = names
            .iter()
            .map(|name| {
                Ok(CatalogEntry {
                    name: name.to_string(),
                    pattern: RegexBuilder::new(&name_pattern(name))
                        .case_insensitive(true)
                        .build()?,
                })
            })
            .collect::<LabResult<Vec<_>>>()?;

        let result_re = if entries.is_empty() {
            None
        } else {
            let alternation = names.iter().map(|n| name_pattern(n)).collect::<Vec<_>>().join("|");
            let units = config
                .unit_patterns
                .iter()
                .map(|u| unit_pattern(u))
                .collect::<Vec<_>>()
                .join("|");
            let unit_group = if units.is_empty() {
                String::new()
            } else {
                format!(r"(?:[ \t]*(?P<unit>{}))?", units)
            };

            // 项目名后面允许夹杂参考范围等噪声（不含冒号、逗号、换行、横杠）
            let pattern = format!(
                r"(?P<fragment>\b(?:{})[^\n:,\-]*?)[:\-]?\s*(?P<value>\d+(?:\.\d+)?){}",
                alternation, unit_group
            );
            debug!("结果匹配正则长度: {}", pattern.len());
            Some(
                RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .size_limit(1 << 24)
                    .build()?,
            )
        };

        Ok(Self {
            result_re,
            entries,
            default_units,
            drop_unresolved: config.drop_unresolved,
        })
    }

    /// 按文本出现顺序返回全部匹配，不去重
    pub fn find_results(&self, text: &str) -> Vec<ResultEntry> {
        let Some(result_re) = &self.result_re else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for caps in result_re.captures_iter(text) {
            let (Some(fragment), Some(value)) = (caps.name("fragment"), caps.name("value")) else {
                continue;
            };
            let fragment = fragment.as_str().trim();

            let test_name = match self.canonical_name(fragment) {
                Some(name) => name.to_string(),
                None if self.drop_unresolved => {
                    warn!("无法对应到目录项目，已丢弃: '{}'", fragment);
                    continue;
                }
                None => {
                    warn!("无法对应到目录项目，保留原文: '{}'", fragment);
                    fragment.to_string()
                }
            };

            let unit = match caps.name("unit").map(|m| m.as_str().trim()).filter(|u| !u.is_empty()) {
                Some(unit) => unit.to_string(),
                None => self.default_units.lookup(&test_name).unwrap_or(NO_UNIT).to_string(),
            };

            debug!("匹配结果: {} = {} {}", test_name, value.as_str(), unit);
            results.push(ResultEntry {
                test_name,
                result: value.as_str().to_string(),
                unit,
            });
        }
        results
    }

    /// 匹配片段中出现的第一个目录项目（长名优先）
    fn canonical_name(&self, fragment: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.pattern.is_match(fragment))
            .map(|entry| entry.name.as_str())
    }
}

/// 目录名内部的空白视为任意数量的空白
fn name_pattern(name: &str) -> String {
    name.split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s*")
}

/// 以字母数字结尾的单位需要单词边界，避免 "pg" 吃掉 "pgx" 这类噪声
fn unit_pattern(unit: &str) -> String {
    if unit.ends_with(|c: char| c.is_alphanumeric()) {
        format!(r"(?:{})\b", unit)
    } else {
        format!("(?:{})", unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(names: &[&str]) -> ResultMatcher {
        ResultMatcher::new(
            &TestCatalog::new(names.iter().copied()),
            DefaultUnitTable::builtin(),
            &MatcherConfig::default(),
        )
        .unwrap()
    }

    fn triples(results: &[ResultEntry]) -> Vec<(&str, &str, &str)> {
        results
            .iter()
            .map(|r| (r.test_name.as_str(), r.result.as_str(), r.unit.as_str()))
            .collect()
    }

    #[test]
    fn every_catalog_name_with_colon_value_and_unit() {
        let names = [
            "Hemoglobin",
            "Total Cholesterol",
            "Cholesterol / HDL Ratio",
            "Vitamin D 25 - Hydroxy",
            "Plasma Glucose",
            "Fasting Plasma Glucose",
        ];
        let m = matcher(&names);
        for name in names {
            let results = m.find_results(&format!("{}: 12.3 mg/dL", name));
            assert_eq!(triples(&results), vec![(name, "12.3", "mg/dL")], "catalog entry {}", name);
        }
    }

    #[test]
    fn missing_unit_uses_default_table() {
        let m = matcher(&["Hemoglobin", "Serum Ferritin", "Cholesterol / HDL Ratio"]);
        let results = m.find_results("Hemoglobin - 12.5\nSerum Ferritin 80\nCholesterol / HDL Ratio 3.4\n");
        assert_eq!(
            triples(&results),
            vec![
                ("Hemoglobin", "12.5", "gm%"),
                ("Serum Ferritin", "80", "N/A"),
                ("Cholesterol / HDL Ratio", "3.4", "N/A"),
            ]
        );
    }

    #[test]
    fn canonical_spelling_replaces_noisy_match() {
        let m = matcher(&["RBC Count", "Total WBC Count"]);
        let results = m.find_results("rbc   count: 4.8 Millions/cumm\nTOTAL WBCCount 7600");
        assert_eq!(
            triples(&results),
            vec![("RBC Count", "4.8", "Millions/cumm"), ("Total WBC Count", "7600", "Cells/cumm")]
        );
    }

    #[test]
    fn filler_absorbs_noise_between_name_and_value() {
        let m = matcher(&["Platelet Count"]);
        let results = m.find_results("Platelet Count (Impedance) 2.5 Laks/cumm");
        assert_eq!(triples(&results), vec![("Platelet Count", "2.5", "Laks/cumm")]);
    }

    #[test]
    fn percent_unit_is_recognized() {
        let m = matcher(&["Neutrophils", "Lymphocytes"]);
        let results = m.find_results("Neutrophils: 62 %\nLymphocytes 30%");
        assert_eq!(triples(&results), vec![("Neutrophils", "62", "%"), ("Lymphocytes", "30", "%")]);
    }

    #[test]
    fn unit_on_next_line_is_not_taken() {
        let m = matcher(&["MCV"]);
        let results = m.find_results("MCV 88\nfL reference");
        assert_eq!(triples(&results), vec![("MCV", "88", "fL")]);
        assert_eq!(m.find_results("MCV 88\npg")[0].unit, "fL");
    }

    #[test]
    fn duplicates_are_retained_in_text_order() {
        let m = matcher(&["HCT"]);
        let results = m.find_results("HCT 40 %\nrepeat HCT: 41.5 %");
        assert_eq!(triples(&results), vec![("HCT", "40", "%"), ("HCT", "41.5", "%")]);
    }

    #[test]
    fn longer_catalog_entry_wins() {
        let m = matcher(&["Plasma Glucose", "Fasting Plasma Glucose"]);
        let results = m.find_results("Fasting Plasma Glucose : 96 mg/dL");
        assert_eq!(triples(&results), vec![("Fasting Plasma Glucose", "96", "mg/dL")]);
    }

    #[test]
    fn value_has_no_sign_or_trailing_dot() {
        let m = matcher(&["MCH"]);
        let results = m.find_results("MCH: 29. pg");
        assert_eq!(results[0].result, "29");
    }

    #[test]
    fn name_without_value_yields_nothing() {
        let m = matcher(&["Vitamin B12"]);
        assert!(m.find_results("Vitamin B12\nnot done").is_empty());
    }

    #[test]
    fn empty_catalog_matches_nothing() {
        let m = matcher(&[]);
        assert!(m.find_results("Hemoglobin 12.5").is_empty());
    }

    #[test]
    fn unresolved_fragment_falls_back_or_is_dropped() {
        let catalog = TestCatalog::new(["Hemoglobin"]);
        let retain = ResultMatcher::new(&catalog, DefaultUnitTable::builtin(), &MatcherConfig::default()).unwrap();
        assert_eq!(retain.canonical_name("Haemoglobin"), None);

        let strict = ResultMatcher::new(
            &catalog,
            DefaultUnitTable::builtin(),
            &MatcherConfig {
                drop_unresolved: true,
                ..MatcherConfig::default()
            },
        )
        .unwrap();
        assert_eq!(strict.find_results("Hemoglobin 13.1").len(), 1);
    }

    #[test]
    fn custom_unit_table_is_used() {
        let mut units = std::collections::BTreeMap::new();
        units.insert("Hemoglobin".to_string(), Some("g/dL".to_string()));
        let m = ResultMatcher::new(
            &TestCatalog::new(["Hemoglobin"]),
            DefaultUnitTable::new(units),
            &MatcherConfig::default(),
        )
        .unwrap();
        assert_eq!(m.find_results("Hemoglobin 13")[0].unit, "g/dL");
    }
}
