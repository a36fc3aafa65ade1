//! 渲染页面图片的临时目录。
//!
//! 目录随 `ScratchDir` 一起释放，无论流程成功、失败还是中途返回。

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::utils::LabResult;

pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn create(root: Option<&Path>) -> LabResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("labscan-pages-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!("创建临时目录: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// 第 n 页（从1开始）的图片路径
    pub fn page_image(&self, page_number: usize) -> PathBuf {
        self.dir.path().join(format!("page_{}.jpg", page_number))
    }

    /// 列出目录里的页面图片，按文件名中的页码数值排序（目录列举顺序不可靠）
    pub fn sorted_page_images(&self) -> LabResult<Vec<(usize, PathBuf)>> {
        let mut images = Vec::new();
        for entry in std::fs::read_dir(self.dir.path())? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "jpg") {
                continue;
            }
            let number = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(page_number_from_filename);
            if let Some(number) = number {
                images.push((number, path));
            }
        }
        images.sort_by_key(|(number, _)| *number);
        Ok(images)
    }
}

/// 取文件名中的第一段数字作为页码，如 "page_10.jpg" -> 10
pub fn page_number_from_filename(name: &str) -> Option<usize> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_parsing() {
        assert_eq!(page_number_from_filename("page_1.jpg"), Some(1));
        assert_eq!(page_number_from_filename("page_10.jpg"), Some(10));
        assert_eq!(page_number_from_filename("cover.jpg"), None);
    }

    #[test]
    fn images_sorted_numerically_not_lexically() {
        let scratch = ScratchDir::create(None).unwrap();
        for n in [10, 2, 1] {
            std::fs::write(scratch.page_image(n), b"jpg").unwrap();
        }
        std::fs::write(scratch.path().join("page_3.png"), b"png").unwrap();

        let order: Vec<usize> = scratch.sorted_page_images().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec![1, 2, 10]);
    }

    #[test]
    fn directory_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::create(Some(root.path())).unwrap();
            std::fs::write(scratch.page_image(1), b"jpg").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
