//! 同步错误类型定义

use thiserror::Error;

/// 同步过程中可能出现的错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 本地文件读取失败
    #[error("本地文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    /// 网络传输失败（探测或上传的底层连接错误）
    #[error("网络传输失败: {0}")]
    Network(#[from] reqwest::Error),

    /// 远端返回了无法理解的响应
    #[error("远端响应异常: {0}")]
    Protocol(String),

    /// 上传返回了非成功状态码（仅 200/201 视为成功）
    #[error("上传失败, 响应状态 {status}")]
    Transfer { status: u16 },
}
