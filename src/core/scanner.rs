//! 文件枚举器 - 递归列出待同步的本地文件

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 枚举时拍下的文件快照，之后不再变化
/// （传输期间文件被外部修改不会被察觉）
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// 绝对路径
    pub path: PathBuf,
    /// 文件大小（字节）
    pub size: u64,
    /// 创建时间
    pub created: DateTime<Utc>,
    /// 修改时间
    pub modified: DateTime<Utc>,
}

impl LocalFile {
    /// 文件名部分
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// 文件扫描器
pub struct FileScanner {
    /// 忽略规则：绝对路径包含任一子串即排除（仅对文件生效）
    ignore: Vec<String>,
}

impl FileScanner {
    pub fn new(ignore: Vec<String>) -> Self {
        Self { ignore }
    }

    /// 检查文件路径是否命中忽略规则
    fn is_ignored(&self, path: &str) -> bool {
        self.ignore.iter().any(|pattern| path.contains(pattern))
    }

    /// 递归枚举目录下的所有普通文件
    ///
    /// 单个条目 stat 失败（坏链接、权限、扫描中途被删除等）跳过该条目，
    /// 不中断整个扫描。符号链接目录会被跟随。
    pub async fn enumerate(&self, root: &Path) -> Result<Vec<LocalFile>> {
        info!("正在扫描 {}", root.display());
        if !self.ignore.is_empty() {
            info!("忽略规则: {:?}", self.ignore);
        }

        let root = root.to_path_buf();
        let ignore = self.ignore.clone();

        // 使用 spawn_blocking 避免阻塞 async runtime
        let files: Vec<LocalFile> = tokio::task::spawn_blocking(move || {
            let scanner = FileScanner::new(ignore);
            let mut files = Vec::new();
            let mut skipped = 0usize;

            for entry in WalkDir::new(&root).follow_links(true) {
                // 遍历错误（含符号链接成环）按单条目跳过
                let entry = match entry {
                    Ok(e) => e,
                    Err(_) => {
                        skipped += 1;
                        continue;
                    }
                };

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(_) => {
                        skipped += 1;
                        continue;
                    }
                };

                // 忽略规则只匹配文件，目录本身不参与匹配
                if metadata.is_dir() {
                    continue;
                }

                let path = entry.path().to_path_buf();
                if scanner.is_ignored(&path.to_string_lossy()) {
                    debug!("排除文件: {}", path.display());
                    continue;
                }

                let modified = match metadata.modified() {
                    Ok(t) => DateTime::<Utc>::from(t),
                    Err(_) => {
                        skipped += 1;
                        continue;
                    }
                };
                // 部分文件系统不提供创建时间，回退为修改时间
                let created = metadata
                    .created()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(modified);

                files.push(LocalFile {
                    path,
                    size: metadata.len(),
                    created,
                    modified,
                });
            }

            if skipped > 0 {
                debug!("{} 个条目无法读取，已跳过", skipped);
            }

            files
        })
        .await?;

        info!("扫描完成: {} 个文件", files.len());
        Ok(files)
    }
}
