use std::path::Path;
use tracing::info;

use crate::utils::{LabError, LabResult};

pub const DEFAULT_COLUMN: &str = "Test_Name";

/// 调用方提供的检验项目名称列表，顺序保持CSV中的顺序，运行期间只读
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCatalog {
    names: Vec<String>,
}

impl TestCatalog {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// 从CSV读取指定列；文件不存在、格式错误或缺少该列都是 CatalogError
    pub fn load_csv(path: &Path, column: &str) -> LabResult<Self> {
        info!("读取检验项目目录: {}", path.display());

        if !path.exists() {
            return Err(LabError::CatalogError(format!("文件不存在: {}", path.display())));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| LabError::CatalogError(format!("{}: {}", path.display(), e)))?;

        let column_index = reader
            .headers()
            .map_err(|e| LabError::CatalogError(format!("{}: {}", path.display(), e)))?
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| {
                LabError::CatalogError(format!("{} 缺少列 '{}'", path.display(), column))
            })?;

        let mut names = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                LabError::CatalogError(format!("{} 第 {} 行: {}", path.display(), row + 2, e))
            })?;
            match record.get(column_index).map(str::trim) {
                Some(name) if !name.is_empty() => names.push(name.to_string()),
                _ => continue,
            }
        }

        info!("读取到 {} 个检验项目", names.len());
        Ok(Self::new(names))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}
