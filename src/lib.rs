pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod remote;

pub use config::{AppConfig, SyncTarget};
pub use crate::core::{SyncConfig, SyncEngine, SyncReport, TransferOutcome};
pub use error::SyncError;
pub use remote::{JfsOptions, JfsRemote, ProbeOutcome, Remote, TransferProgress};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// 按配置执行一次完整的目录同步
///
/// 顶层入口：构建远端客户端与引擎，同步 `local_root` 到
/// `remote_root`。逐文件的失败通过日志与报告体现，不会中断整个运行。
pub async fn sync_directory(
    config: &AppConfig,
    remote_root: &str,
    local_root: &Path,
    ignore: &[String],
) -> Result<SyncReport> {
    let target = config.target()?;
    let remote = JfsRemote::new(
        target,
        JfsOptions {
            lookup_base: config.lookup_base.clone(),
            upload_base: config.upload_base.clone(),
            skip_certificate_verification: config.skip_certificate_verification,
        },
    )?;

    let engine = SyncEngine::with_config(
        Arc::new(remote),
        SyncConfig {
            max_concurrent_transfers: config.max_concurrent_transfers,
        },
    );

    Ok(engine.sync_directory(remote_root, local_root, ignore).await)
}
