//! 远端存储抽象接口

pub mod jfs;

pub use jfs::{JfsOptions, JfsRemote};

use crate::core::scanner::LocalFile;
use crate::error::SyncError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// 存在性探测结果
///
/// 探测本身从不报错：传输失败、非 200 响应、响应无法解析
/// 一律折叠为 [`ProbeOutcome::Absent`]，宁可重复上传也不静默跳过。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 远端已有指纹和元数据都匹配且已提交完成的对象
    Exists,
    /// 远端没有（或无法确认有）匹配对象
    Absent,
}

/// 上传进度观测值，纯信息性，不影响控制流
#[derive(Debug, Clone)]
pub struct TransferProgress {
    /// 本地文件路径（用于展示）
    pub path: String,
    /// 已写出字节数
    pub bytes_sent: u64,
    /// 文件总字节数
    pub bytes_total: u64,
    /// 按分钟折算的吞吐量（字节/分钟）
    pub bytes_per_minute: u64,
}

/// 进度上报通道
pub type ProgressSender = mpsc::Sender<TransferProgress>;

/// 远端对象存储接口
#[async_trait]
pub trait Remote: Send + Sync {
    /// 询问远端是否已存在指纹与元数据匹配的对象
    async fn probe(&self, remote_folder: &str, file: &LocalFile, fingerprint: &str)
        -> ProbeOutcome;

    /// 流式上传文件内容，成功时返回远端 HTTP 状态码
    ///
    /// 仅 200/201 应被调用方视为成功；传输层错误返回 `Err`。
    async fn upload(
        &self,
        remote_folder: &str,
        file: &LocalFile,
        fingerprint: &str,
        progress: Option<ProgressSender>,
    ) -> Result<u16, SyncError>;
}

/// 人类可读的字节数格式化
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
