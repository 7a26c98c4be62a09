//! 内容指纹 - 流式 MD5 计算

use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// 流式读取缓冲区大小
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// 计算文件全部内容的 MD5 指纹（小写十六进制）
///
/// 单次前向流式读取，边读边喂给增量摘要，不把整个文件读入内存。
/// 打开失败或读取中途出错时返回 IO 错误。
pub async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let mut file = File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}
