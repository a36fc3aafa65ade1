use regex::Regex;
use tracing::debug;

use crate::config::SanitizerConfig;
use crate::utils::LabResult;

/// 删除检验报告中的样本/方法说明和机构编号等干扰文本
pub struct TextSanitizer {
    patterns: Vec<Regex>,
}

impl TextSanitizer {
    /// 按配置顺序编译；删除顺序就是列表顺序
    pub fn new(config: &SanitizerConfig) -> LabResult<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// 依次应用每个删除规则，后一个规则作用于前一个的输出；没有匹配时原样返回
    pub fn sanitize(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for pattern in &self.patterns {
            let replaced = pattern.replace_all(&cleaned, "");
            if replaced.len() != cleaned.len() {
                debug!("清洗规则 {} 删除 {} 字节", pattern.as_str(), cleaned.len() - replaced.len());
                cleaned = replaced.into_owned();
            }
        }
        cleaned
    }
}
