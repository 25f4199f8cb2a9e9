// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs;

use crate::retry::RetryPolicy;
use crate::uploader::{StoreIdentity, UploadOptions};

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 元数据存储
    #[serde(default)]
    pub store: StoreConfig,
    /// 默认上传参数
    #[serde(default)]
    pub upload: UploadConfig,
    /// 限流重试
    #[serde(default)]
    pub retry: RetryPolicy,
    /// 远程存储接口
    #[serde(default)]
    pub drive: DriveConfig,
    /// 服务账号列表
    #[serde(default)]
    pub accounts: Vec<ServiceAccountConfig>,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 元数据存储配置
///
/// SQLite 文件位于 `target/<database>.db`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_target")]
    pub target: PathBuf,
    #[serde(default = "default_store_database")]
    pub database: String,
}

fn default_store_target() -> PathBuf {
    PathBuf::from("data")
}

fn default_store_database() -> String {
    "chunks".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            target: default_store_target(),
            database: default_store_database(),
        }
    }
}

impl StoreConfig {
    pub fn identity(&self) -> StoreIdentity {
        StoreIdentity::new(self.target.clone(), self.database.clone())
    }
}

/// 上传配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 文件类型标签
    #[serde(default)]
    pub file_type: String,
    /// 分片大小（字节），0 表示整个文件作为一个分片
    #[serde(default)]
    pub chunk_size: u64,
}

impl UploadConfig {
    /// 转为上传参数
    pub fn to_options(&self) -> UploadOptions {
        UploadOptions {
            file_type: self.file_type.clone(),
            chunk_size: self.chunk_size,
        }
    }
}

/// 远程存储接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// 元数据接口地址
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// 上传接口地址
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
    /// 请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// 服务账号
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccountConfig {
    pub identifier: String,
    pub access_token: String,
}

impl ServiceAccountConfig {
    pub fn new(identifier: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            access_token: access_token.into(),
        }
    }
}

// 不在日志里输出 token
impl std::fmt::Debug for ServiceAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountConfig")
            .field("identifier", &self.identifier)
            .field("access_token", &"***")
            .finish()
    }
}

impl AppConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.store.database.trim().is_empty() {
            anyhow::bail!("store.database 不能为空");
        }
        if self.store.target.as_os_str().is_empty() {
            anyhow::bail!("store.target 不能为空");
        }

        if self.retry.initial_backoff_ms == 0 || self.retry.max_backoff_ms == 0 {
            anyhow::bail!("重试退避延迟必须大于 0");
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            anyhow::bail!(
                "initial_backoff_ms ({}) 不能大于 max_backoff_ms ({})",
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms
            );
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.identifier.trim().is_empty() {
                anyhow::bail!("服务账号标识不能为空");
            }
            if !seen.insert(account.identifier.as_str()) {
                anyhow::bail!("服务账号标识重复: {}", account.identifier);
            }
        }

        self.upload
            .to_options()
            .validate()
            .context("upload 配置无效")?;

        Ok(())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载配置，失败时使用默认配置并写回文件
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                // 文件不存在时写入默认配置
                if !std::path::Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {}", e);
                    }
                }

                default_config
            }
        }
    }
}
