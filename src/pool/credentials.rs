// 凭证协作方
//
// 账号池为空时由它生成初始账号列表

use crate::config::{DriveConfig, ServiceAccountConfig};
use crate::drive::{DriveClient, RemoteBackend};
use crate::error::UploadError;
use crate::pool::Account;
use crate::retry::{RetryExecutor, RetryPolicy};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 账号生成器
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// 生成可直接使用的账号列表
    async fn generate_accounts(&self) -> Result<Vec<Arc<Account>>, UploadError>;
}

/// 基于配置文件中服务账号的生成器
///
/// 每个服务账号对应一个 DriveClient；令牌由外部签发后写入配置
pub struct ServiceAccountProvider {
    accounts: Vec<ServiceAccountConfig>,
    drive: DriveConfig,
    retry: RetryPolicy,
}

impl ServiceAccountProvider {
    pub fn new(accounts: Vec<ServiceAccountConfig>, drive: DriveConfig, retry: RetryPolicy) -> Self {
        Self {
            accounts,
            drive,
            retry,
        }
    }
}

#[async_trait]
impl CredentialsProvider for ServiceAccountProvider {
    async fn generate_accounts(&self) -> Result<Vec<Arc<Account>>, UploadError> {
        let executor = RetryExecutor::new(self.retry);
        let mut accounts = Vec::with_capacity(self.accounts.len());

        for config in &self.accounts {
            match DriveClient::new(config.access_token.clone(), &self.drive) {
                Ok(client) => {
                    let backend: Arc<dyn RemoteBackend> = Arc::new(client);
                    accounts.push(Arc::new(Account::new(
                        config.identifier.clone(),
                        backend,
                        executor,
                    )));
                }
                Err(e) => {
                    warn!("创建服务账号客户端失败: {}, {}", config.identifier, e);
                }
            }
        }

        info!(
            "已生成 {}/{} 个服务账号",
            accounts.len(),
            self.accounts.len()
        );
        Ok(accounts)
    }
}
