//! JFS 协议客户端 - 存在性探测与流式上传

use super::{ProbeOutcome, ProgressSender, Remote, TransferProgress};
use crate::config::SyncTarget;
use crate::core::scanner::LocalFile;
use crate::error::SyncError;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::StatusCode;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// 双端请求统一携带的 User-Agent
const USER_AGENT: &str = "jfsync/1.0";

/// 上传流的读取块大小
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// 远端文件的已提交状态值
const REVISION_COMPLETED: &str = "COMPLETED";

/// JFS 客户端构建选项
#[derive(Debug, Clone)]
pub struct JfsOptions {
    /// 查询端点基地址
    pub lookup_base: String,
    /// 上传端点基地址
    pub upload_base: String,
    /// 跳过 TLS 证书校验（仅作用于本实例，不改全局状态）
    pub skip_certificate_verification: bool,
}

impl Default for JfsOptions {
    fn default() -> Self {
        Self {
            lookup_base: crate::config::DEFAULT_LOOKUP_BASE.to_string(),
            upload_base: crate::config::DEFAULT_UPLOAD_BASE.to_string(),
            skip_certificate_verification: false,
        }
    }
}

/// JFS 远端客户端
pub struct JfsRemote {
    http: reqwest::Client,
    target: SyncTarget,
    lookup_base: String,
    upload_base: String,
}

impl JfsRemote {
    pub fn new(target: SyncTarget, options: JfsOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(options.skip_certificate_verification)
            .build()?;

        Ok(Self {
            http,
            target,
            lookup_base: options.lookup_base,
            upload_base: options.upload_base,
        })
    }

    /// 构造携带指纹与元数据头的请求
    fn request_with_metadata(
        &self,
        url: &str,
        file: &LocalFile,
        fingerprint: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .basic_auth(&self.target.account_id, Some(&self.target.password))
            .header("JMd5", fingerprint)
            .header("JCreated", file.created.to_rfc3339())
            .header("JModified", file.modified.to_rfc3339())
            .header("JSize", file.size)
    }
}

#[async_trait]
impl Remote for JfsRemote {
    async fn probe(
        &self,
        remote_folder: &str,
        file: &LocalFile,
        fingerprint: &str,
    ) -> ProbeOutcome {
        let url = object_url(
            &self.lookup_base,
            &self.target.account_id,
            remote_folder,
            &file.file_name(),
        );

        let response = self
            .request_with_metadata(&url, file, fingerprint)
            .query(&[("cphash", fingerprint)])
            .send()
            .await;

        // 任何失败都视为不存在：宁可重复上传，不冒丢数据的风险
        match response {
            Ok(resp) if resp.status() == StatusCode::OK => match resp.text().await {
                Ok(body) => match revision_state(&body) {
                    Some(state) if state == REVISION_COMPLETED => ProbeOutcome::Exists,
                    Some(_) => ProbeOutcome::Absent,
                    None => {
                        let err = SyncError::Protocol("响应中缺少修订状态".to_string());
                        debug!("{}, 按不存在处理", err);
                        ProbeOutcome::Absent
                    }
                },
                Err(e) => {
                    debug!("读取探测响应失败, 按不存在处理: {}", e);
                    ProbeOutcome::Absent
                }
            },
            Ok(resp) => {
                debug!("探测返回状态 {}, 按不存在处理", resp.status());
                ProbeOutcome::Absent
            }
            Err(e) => {
                debug!("探测请求失败, 按不存在处理: {}", e);
                ProbeOutcome::Absent
            }
        }
    }

    async fn upload(
        &self,
        remote_folder: &str,
        file: &LocalFile,
        fingerprint: &str,
        progress: Option<ProgressSender>,
    ) -> Result<u16, SyncError> {
        let url = object_url(
            &self.upload_base,
            &self.target.account_id,
            remote_folder,
            &file.file_name(),
        );

        let reader = File::open(&file.path).await?;
        let stream = ProgressStream {
            inner: ReaderStream::with_capacity(reader, UPLOAD_CHUNK_SIZE),
            path: file.path.to_string_lossy().to_string(),
            bytes_sent: 0,
            bytes_total: file.size,
            started: Instant::now(),
            progress,
        };

        let response = self
            .request_with_metadata(&url, file, fingerprint)
            .query(&[("umode", "nomultipart")])
            .header(reqwest::header::CONTENT_LENGTH, file.size)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;

        Ok(response.status().as_u16())
    }
}

/// 拼接对象地址：各路径段分别做百分号编码
fn object_url(base: &str, account_id: &str, remote_folder: &str, file_name: &str) -> String {
    let mut url = base.trim_end_matches('/').to_string();

    let segments = std::iter::once(account_id)
        .chain(remote_folder.split('/').filter(|s| !s.is_empty()))
        .chain(std::iter::once(file_name));

    for segment in segments {
        url.push('/');
        url.push_str(&urlencoding::encode(segment));
    }

    url
}

/// 从探测响应中取出修订状态
///
/// 优先读取最新修订，缺失时回退到当前修订；两者在存在性判断上等价。
fn revision_state(body: &str) -> Option<String> {
    find_element_text(body, &["latestRevision", "state"])
        .or_else(|| find_element_text(body, &["currentRevision", "state"]))
}

/// 在标签文档中按嵌套路径提取单个字段的文本
///
/// 响应文档的完整解析不在本模块职责内，这里只做同步判断
/// 所需的单字段定位；路径不存在时返回 None。
fn find_element_text(body: &str, path: &[&str]) -> Option<String> {
    let mut scope = body;

    for name in path {
        let open = format!("<{}", name);
        let mut content_start = None;

        // 标签名后必须是 '>' 或属性分隔符，避免前缀误匹配
        for (idx, _) in scope.match_indices(&open) {
            let rest = &scope[idx + open.len()..];
            match rest.chars().next() {
                Some('>') => {
                    content_start = Some(idx + open.len() + 1);
                    break;
                }
                Some(c) if c.is_whitespace() => {
                    let gt = rest.find('>')?;
                    content_start = Some(idx + open.len() + gt + 1);
                    break;
                }
                _ => continue,
            }
        }

        let start = content_start?;
        let close = format!("</{}>", name);
        let end = scope[start..].find(&close)? + start;
        scope = &scope[start..end];
    }

    Some(scope.trim().to_string())
}

/// 包装上传字节流，在每个缓冲块写出后上报进度
struct ProgressStream {
    inner: ReaderStream<File>,
    path: String,
    bytes_sent: u64,
    bytes_total: u64,
    started: Instant,
    progress: Option<ProgressSender>,
}

impl Stream for ProgressStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_next(cx);

        if let Poll::Ready(Some(Ok(chunk))) = &poll {
            this.bytes_sent += chunk.len() as u64;

            if let Some(tx) = &this.progress {
                let minutes = this.started.elapsed().as_secs_f64() / 60.0;
                let bytes_per_minute = if minutes > 0.0 {
                    (this.bytes_sent as f64 / minutes) as u64
                } else {
                    0
                };

                // 上报失败（通道满或已关闭）直接丢弃，进度不影响传输本身
                let _ = tx.try_send(TransferProgress {
                    path: this.path.clone(),
                    bytes_sent: this.bytes_sent,
                    bytes_total: this.bytes_total,
                    bytes_per_minute,
                });
            }
        }

        poll
    }
}
