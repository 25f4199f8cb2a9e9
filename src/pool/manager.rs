// 账号池
//
// 功能：
// - 首次使用时从凭证协作方加载账号（每个池同时只有一次加载）
// - 选号前并发刷新所有脏快照
// - 选出可用空间最大的账号，空间相同时按标识字典序

use crate::error::UploadError;
use crate::pool::{Account, CredentialsProvider};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 账号池
pub struct AccountPool {
    /// 标识 -> 账号
    accounts: DashMap<String, Arc<Account>>,
    /// 池为空时的账号来源
    credentials: Arc<dyn CredentialsProvider>,
    /// 保护加载过程，只属于当前池
    bootstrap_lock: Mutex<()>,
    /// 所有账号都已注册后才置位
    bootstrapped: AtomicBool,
}

impl AccountPool {
    /// 创建空池，首次使用时加载账号
    pub fn new(credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            accounts: DashMap::new(),
            credentials,
            bootstrap_lock: Mutex::new(()),
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// 创建预置账号的池（池不为空时不会触发加载）
    pub fn with_accounts(
        credentials: Arc<dyn CredentialsProvider>,
        accounts: Vec<Arc<Account>>,
    ) -> Self {
        let pool = Self::new(credentials);
        for account in accounts {
            pool.add_account(account);
        }
        pool
    }

    /// 注册账号，标识已存在时不做任何事
    ///
    /// # 返回
    /// 账号标识
    pub fn add_account(&self, account: Arc<Account>) -> String {
        let identifier = account.identifier().to_string();
        self.accounts
            .entry(identifier.clone())
            .or_insert_with(|| {
                debug!("注册账号: {}", identifier);
                account
            });
        identifier
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<Account>> {
        self.accounts.get(identifier).map(|entry| entry.value().clone())
    }

    /// 所有账号（按标识排序）
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        let mut accounts: Vec<Arc<Account>> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// 确保池中有账号
    ///
    /// 多个调用方同时进入时只有一个会调用凭证协作方，其余等待锁释放后看到完整的池。
    /// 协作方的任何错误都以 `UploadError::Bootstrap` 返回，失败后下次调用会重新加载。
    pub async fn ensure_bootstrapped(&self) -> Result<(), UploadError> {
        if self.bootstrapped.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self.bootstrap_lock.lock().await;
        if self.bootstrapped.load(Ordering::Acquire) {
            return Ok(());
        }
        // 预置或外部注册的账号
        if !self.accounts.is_empty() {
            self.bootstrapped.store(true, Ordering::Release);
            return Ok(());
        }

        info!("账号池为空，开始加载账号");
        let accounts = match self.credentials.generate_accounts().await {
            Ok(accounts) => accounts,
            Err(e @ UploadError::Bootstrap(_)) => return Err(e),
            Err(e) => {
                warn!("凭证协作方加载账号失败: {}", e);
                return Err(UploadError::Bootstrap(format!("凭证协作方失败: {}", e)));
            }
        };
        if accounts.is_empty() {
            return Err(UploadError::Bootstrap("凭证协作方没有返回任何账号".to_string()));
        }

        for account in accounts {
            self.add_account(account);
        }
        self.bootstrapped.store(true, Ordering::Release);
        info!("账号加载完成: {} 个账号", self.accounts.len());
        Ok(())
    }

    /// 并发刷新所有账号的配额
    ///
    /// 单个账号刷新失败只记录日志，该账号沿用旧快照
    pub async fn refresh_all(&self) {
        let accounts = self.accounts();
        let results = join_all(accounts.iter().map(|account| account.refresh_quota())).await;

        for (account, result) in accounts.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    "[{}] 刷新配额失败，沿用旧快照 (available={}): {}",
                    account.identifier(),
                    account.available(),
                    e
                );
            }
        }
    }

    /// 选出可用空间最大的账号
    ///
    /// # 返回
    /// - `Ok(Some(account))`: 可用空间 > 0 的账号中空间最大者
    /// - `Ok(None)`: 所有账号都已满
    /// - `Err(Bootstrap)`: 池为空且加载失败
    pub async fn get_most_available_account(&self) -> Result<Option<Arc<Account>>, UploadError> {
        self.ensure_bootstrapped().await?;
        self.refresh_all().await;

        // 每个账号只读一次快照，避免比较过程中数值变化
        let candidates: Vec<(u64, Arc<Account>)> = self
            .accounts()
            .into_iter()
            .map(|account| (account.available(), account))
            .filter(|(available, _)| *available > 0)
            .collect();

        let selected = candidates
            .into_iter()
            .max_by(|(a_avail, a), (b_avail, b)| {
                a_avail
                    .cmp(b_avail)
                    .then_with(|| b.identifier().cmp(a.identifier()))
            });

        match selected {
            Some((available, account)) => {
                debug!(
                    "选中账号: {} (available={} bytes)",
                    account.identifier(),
                    available
                );
                Ok(Some(account))
            }
            None => {
                warn!("所有 {} 个账号都没有可用空间", self.len());
                Ok(None)
            }
        }
    }
}
