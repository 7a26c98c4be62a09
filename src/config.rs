//! 应用配置模块

use crate::logging::LogConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 默认查询端点（检查文件是否已存在）
pub const DEFAULT_LOOKUP_BASE: &str = "https://jfs.jottacloud.com/jfs";
/// 默认上传端点
pub const DEFAULT_UPLOAD_BASE: &str = "https://up.jottacloud.com/jfs";

/// 同步目标：账户凭证，所有并发任务只读共享
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub account_id: String,
    pub password: String,
}

impl SyncTarget {
    /// 构造时校验必填字段，避免隐式缺字段的配置对象
    pub fn new(account_id: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let account_id = account_id.into();
        let password = password.into();

        if account_id.is_empty() {
            bail!("账户 ID 不能为空");
        }
        if password.is_empty() {
            bail!("账户密码不能为空");
        }

        Ok(Self {
            account_id,
            password,
        })
    }
}

/// 应用配置（从 config.json 加载）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// 账户 ID（用于 Basic Auth 和 URL 路径）
    pub account_id: String,
    /// 账户密码
    pub password: String,
    /// 远端根路径，例如 "Jotta/Archive/backup"
    pub remote_path: String,
    /// 本地待同步目录
    pub local_path: String,
    /// 忽略规则（绝对路径子串匹配，非 glob）
    #[serde(default)]
    pub ignore: Vec<String>,
    /// 最大并发传输数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,
    /// 是否跳过 TLS 证书校验（仅作用于本客户端实例）
    #[serde(default)]
    pub skip_certificate_verification: bool,
    /// 查询端点覆盖（默认为官方 JFS 端点）
    #[serde(default = "default_lookup_base")]
    pub lookup_base: String,
    /// 上传端点覆盖
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

fn default_max_concurrent() -> usize {
    4 // 默认并行数为4
}

fn default_lookup_base() -> String {
    DEFAULT_LOOKUP_BASE.to_string()
}

fn default_upload_base() -> String {
    DEFAULT_UPLOAD_BASE.to_string()
}

impl AppConfig {
    /// 从配置文件加载并校验
    pub fn load(config_file: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_file)
            .with_context(|| format!("无法读取配置文件 {:?}", config_file))?;
        let config: AppConfig =
            serde_json::from_str(&content).with_context(|| "配置文件格式错误")?;
        config.validate()?;
        Ok(config)
    }

    /// 校验必填字段
    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_empty() {
            bail!("配置缺少账户 ID");
        }
        if self.password.is_empty() {
            bail!("配置缺少账户密码");
        }
        if self.remote_path.is_empty() {
            bail!("配置缺少远端路径");
        }
        if self.local_path.is_empty() {
            bail!("配置缺少本地目录");
        }
        if self.max_concurrent_transfers == 0 {
            bail!("并发数必须大于 0");
        }
        Ok(())
    }

    /// 提取账户凭证
    pub fn target(&self) -> Result<SyncTarget> {
        SyncTarget::new(self.account_id.clone(), self.password.clone())
    }
}
