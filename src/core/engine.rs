//! 同步引擎 - 有界并发地执行逐文件的「指纹 → 探测 → 上传」任务

use crate::core::hasher::hash_file;
use crate::core::scanner::{FileScanner, LocalFile};
use crate::error::SyncError;
use crate::remote::{format_bytes, ProbeOutcome, ProgressSender, Remote, TransferProgress};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{error, info, warn};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 最大并发传输数（1 表示严格串行）
    pub max_concurrent_transfers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: 4, // 默认并行数为4
        }
    }
}

/// 单个文件的同步结果，每个文件恰好产生一个
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    /// 远端已有完整副本，跳过上传
    Skipped { path: PathBuf },
    /// 上传完成（状态码 200 或 201）
    Uploaded { path: PathBuf, status: u16 },
    /// 指纹计算或上传失败
    Failed { path: PathBuf, cause: String },
}

impl TransferOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TransferOutcome::Failed { .. })
    }
}

/// 同步报告：逐文件结果列表 + 首个失败摘要，一并返回
#[derive(Debug)]
pub struct SyncReport {
    pub run_id: String,
    pub files_scanned: u32,
    pub files_uploaded: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
    pub bytes_transferred: u64,
    pub duration_secs: u64,
    /// 逐文件结果（完成顺序，不保证与枚举顺序一致）
    pub outcomes: Vec<TransferOutcome>,
    /// 首个失败的描述；仅在全部任务结束后填充
    pub first_error: Option<String>,
}

/// 传输统计
#[derive(Debug, Default)]
struct TransferStats {
    files_uploaded: AtomicU64,
    files_skipped: AtomicU64,
    files_failed: AtomicU64,
    bytes_transferred: AtomicU64,
}

/// 同步引擎
pub struct SyncEngine {
    remote: Arc<dyn Remote>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn Remote>) -> Self {
        Self {
            remote,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(remote: Arc<dyn Remote>, config: SyncConfig) -> Self {
        Self { remote, config }
    }

    /// 同步整个目录树
    ///
    /// 枚举 → 逐文件任务（有界并发）→ 汇总报告。单个任务失败不取消
    /// 其余任务，积压全部跑完后才在报告中给出首个失败。错误通过日志
    /// 上报，本方法不抛出。
    pub async fn sync_directory(
        &self,
        remote_root: &str,
        local_root: &Path,
        ignore: &[String],
    ) -> SyncReport {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        let scanner = FileScanner::new(ignore.to_vec());
        let files = match scanner.enumerate(local_root).await {
            Ok(files) => files,
            Err(e) => {
                error!("扫描本地目录失败: {}", e);
                return SyncReport {
                    run_id,
                    files_scanned: 0,
                    files_uploaded: 0,
                    files_skipped: 0,
                    files_failed: 0,
                    bytes_transferred: 0,
                    duration_secs: started.elapsed().as_secs(),
                    outcomes: Vec::new(),
                    first_error: Some(format!("扫描本地目录失败: {}", e)),
                };
            }
        };

        let files_scanned = files.len() as u32;
        info!("开始同步 {} 个文件 (并发 {})", files_scanned, self.config.max_concurrent_transfers);

        // 进度通道：所有在途任务写入，单独一个任务消费打印
        let (progress_tx, mut progress_rx) = mpsc::channel::<TransferProgress>(64);
        let progress_handle = tokio::spawn(async move {
            while let Some(p) = progress_rx.recv().await {
                info!(
                    "正在上传 {}: {} / {} ({}/分钟)",
                    p.path,
                    format_bytes(p.bytes_sent),
                    format_bytes(p.bytes_total),
                    format_bytes(p.bytes_per_minute),
                );
            }
        });

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_transfers));
        let stats = Arc::new(TransferStats::default());
        let outcomes = Arc::new(RwLock::new(Vec::<TransferOutcome>::new()));
        let first_error = Arc::new(RwLock::new(None::<String>));
        let local_root_str = local_root.to_string_lossy().to_string();

        let mut handles = Vec::new();

        for file in files {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let remote = self.remote.clone();
            let stats = stats.clone();
            let outcomes = outcomes.clone();
            let first_error = first_error.clone();
            let remote_root = remote_root.to_string();
            let local_root_str = local_root_str.clone();
            let progress_tx = progress_tx.clone();

            let handle = tokio::spawn(async move {
                let folder = remote_folder_for(&remote_root, &local_root_str, &file.path);
                let outcome =
                    sync_one(remote.as_ref(), &folder, &file, Some(progress_tx)).await;

                match &outcome {
                    TransferOutcome::Uploaded { .. } => {
                        stats.files_uploaded.fetch_add(1, Ordering::Relaxed);
                        stats
                            .bytes_transferred
                            .fetch_add(file.size, Ordering::Relaxed);
                    }
                    TransferOutcome::Skipped { .. } => {
                        stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    TransferOutcome::Failed { path, cause } => {
                        stats.files_failed.fetch_add(1, Ordering::Relaxed);
                        let mut first = first_error.write().await;
                        if first.is_none() {
                            *first = Some(format!("{}: {}", path.display(), cause));
                        }
                    }
                }

                let mut list = outcomes.write().await;
                list.push(outcome);
                drop(list);

                drop(permit);
            });

            handles.push(handle);
        }

        // 等待积压全部跑完，任何失败都不提前退出
        for handle in handles {
            let _ = handle.await;
        }

        drop(progress_tx);
        let _ = progress_handle.await;

        let files_uploaded = stats.files_uploaded.load(Ordering::Relaxed) as u32;
        let files_skipped = stats.files_skipped.load(Ordering::Relaxed) as u32;
        let files_failed = stats.files_failed.load(Ordering::Relaxed) as u32;
        let bytes_transferred = stats.bytes_transferred.load(Ordering::Relaxed);
        let first_error = first_error.read().await.clone();

        let outcomes = std::mem::take(&mut *outcomes.write().await);

        info!(
            "同步完成: 上传 {}, 跳过 {}, 失败 {}, 共传输 {}",
            files_uploaded,
            files_skipped,
            files_failed,
            format_bytes(bytes_transferred),
        );
        if let Some(err) = &first_error {
            error!("同步完成但有错误: {}", err);
        }

        SyncReport {
            run_id,
            files_scanned,
            files_uploaded,
            files_skipped,
            files_failed,
            bytes_transferred,
            duration_secs: started.elapsed().as_secs(),
            outcomes,
            first_error,
        }
    }

    /// 同步单个文件到指定远端目录
    pub async fn sync_file(&self, remote_folder: &str, path: &Path) -> TransferOutcome {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                warn!("无法读取文件元数据 {}: {}", path.display(), e);
                return TransferOutcome::Failed {
                    path: path.to_path_buf(),
                    cause: SyncError::Io(e).to_string(),
                };
            }
        };

        let modified = metadata
            .modified()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(|_| chrono::Utc::now());
        let created = metadata
            .created()
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or(modified);

        let file = LocalFile {
            path: path.to_path_buf(),
            size: metadata.len(),
            created,
            modified,
        };

        sync_one(self.remote.as_ref(), remote_folder, &file, None).await
    }
}

/// 单文件任务：指纹 → 探测 → 跳过或上传
///
/// 各步骤顺序执行，任一步失败即确定该文件的结果，不再进入后续步骤。
async fn sync_one(
    remote: &dyn Remote,
    remote_folder: &str,
    file: &LocalFile,
    progress: Option<ProgressSender>,
) -> TransferOutcome {
    let fingerprint = match hash_file(&file.path).await {
        Ok(f) => f,
        Err(e) => {
            warn!("计算指纹失败 {}: {}", file.path.display(), e);
            return TransferOutcome::Failed {
                path: file.path.clone(),
                cause: SyncError::Io(e).to_string(),
            };
        }
    };

    match remote.probe(remote_folder, file, &fingerprint).await {
        ProbeOutcome::Exists => {
            info!("文件 {} 已存在, 跳过", file.path.display());
            TransferOutcome::Skipped {
                path: file.path.clone(),
            }
        }
        ProbeOutcome::Absent => match remote.upload(remote_folder, file, &fingerprint, progress).await {
            Ok(status @ (200 | 201)) => TransferOutcome::Uploaded {
                path: file.path.clone(),
                status,
            },
            Ok(status) => {
                // 不重试，记录后继续其余文件
                error!("上传 {} 失败, 响应 {}", file.path.display(), status);
                TransferOutcome::Failed {
                    path: file.path.clone(),
                    cause: SyncError::Transfer { status }.to_string(),
                }
            }
            Err(e) => {
                error!("上传 {} 失败: {}", file.path.display(), e);
                TransferOutcome::Failed {
                    path: file.path.clone(),
                    cause: e.to_string(),
                }
            }
        },
    }
}

/// 推导文件的远端目录
///
/// 从父目录剥离扫描根目录的字面前缀，分隔符统一为 '/'，再拼到远端
/// 根路径之后。扫描根若经符号链接解析后不再是字面前缀，则无法剥离。
fn remote_folder_for(remote_root: &str, scan_root: &str, path: &Path) -> String {
    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    let relative = parent
        .strip_prefix(scan_root)
        .unwrap_or(parent.as_str())
        .replace('\\', "/");
    let relative = relative.trim_start_matches('/');

    if relative.is_empty() {
        remote_root.to_string()
    } else {
        format!("{}/{}", remote_root.trim_end_matches('/'), relative)
    }
}
