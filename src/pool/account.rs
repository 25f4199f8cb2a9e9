// 单个存储账号
//
// 缓存配额快照，dirty 标记表示快照需要刷新后才可信。
// 上传后一律置脏，下次选号前重新拉取配额。
// epoch 在每次置脏时递增，刷新期间 epoch 变化说明拿到的快照已经过期。

use crate::drive::{
    DriveError, MediaPayload, Permission, QuotaSnapshot, RemoteBackend, RemoteObject,
};
use crate::retry::RetryExecutor;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 单次刷新内最多拉取配额的次数
const MAX_REFRESH_ATTEMPTS: usize = 3;

/// 配额状态
#[derive(Debug, Clone, Copy)]
struct QuotaState {
    snapshot: QuotaSnapshot,
    dirty: bool,
    epoch: u64,
}

/// 存储账号
pub struct Account {
    /// 账号标识（池内唯一）
    identifier: String,
    /// 远程能力
    backend: Arc<dyn RemoteBackend>,
    /// 重试执行器
    retry: RetryExecutor,
    /// 配额快照 + dirty 标记
    quota: Mutex<QuotaState>,
    /// 串行化配额刷新，同一账号同时只有一个 about 请求
    refresh_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.quota.lock();
        f.debug_struct("Account")
            .field("identifier", &self.identifier)
            .field("snapshot", &state.snapshot)
            .field("dirty", &state.dirty)
            .finish()
    }
}

impl Account {
    /// 创建新账号，初始快照为空且标记为脏
    pub fn new(
        identifier: impl Into<String>,
        backend: Arc<dyn RemoteBackend>,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            backend,
            retry,
            quota: Mutex::new(QuotaState {
                snapshot: QuotaSnapshot::default(),
                dirty: true,
                epoch: 0,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// 当前缓存的配额快照（可能已过期）
    pub fn snapshot(&self) -> QuotaSnapshot {
        self.quota.lock().snapshot
    }

    /// 快照是否需要刷新
    pub fn is_dirty(&self) -> bool {
        self.quota.lock().dirty
    }

    /// 标记快照需要刷新
    pub fn mark_dirty(&self) {
        let mut state = self.quota.lock();
        state.dirty = true;
        state.epoch = state.epoch.wrapping_add(1);
    }

    /// 按缓存快照计算的可用空间
    pub fn available(&self) -> u64 {
        self.snapshot().available()
    }

    /// 获取 bearer 凭证
    pub async fn authorize(&self) -> Result<String, DriveError> {
        let backend = &self.backend;
        self.retry
            .execute(
                "authorize",
                move || backend.authorize(),
                DriveError::is_rate_limited,
            )
            .await
    }

    /// 上传载荷，返回远程 ID
    ///
    /// 无论成败都会置脏
    pub async fn upload(&self, media: &MediaPayload) -> Result<String, DriveError> {
        let backend = &self.backend;
        let result = self
            .retry
            .execute(
                "create_object",
                move || backend.create_object(media),
                DriveError::is_rate_limited,
            )
            .await;
        self.mark_dirty();

        match &result {
            Ok(remote_id) => info!(
                "[{}] 上传成功: name={}, size={} bytes, id={}",
                self.identifier,
                media.name,
                media.len(),
                remote_id
            ),
            Err(e) => warn!("[{}] 上传失败: name={}, {}", self.identifier, media.name, e),
        }
        result
    }

    /// 获取远程对象元数据
    pub async fn fetch(&self, remote_id: &str) -> Result<RemoteObject, DriveError> {
        let backend = &self.backend;
        self.retry
            .execute(
                "get_object",
                move || backend.get_object(remote_id),
                DriveError::is_rate_limited,
            )
            .await
    }

    /// 将远程对象设为任何人可读
    pub async fn set_public_permission(&self, remote_id: &str) -> Result<(), DriveError> {
        let backend = &self.backend;
        let permission = &Permission::public_reader();
        self.retry
            .execute(
                "set_permission",
                move || backend.set_permission(remote_id, permission),
                DriveError::is_rate_limited,
            )
            .await
    }

    /// 刷新配额快照
    ///
    /// 快照干净时直接返回缓存；刷新失败时保持脏标记，下次选号会再试。
    /// 请求期间有上传置脏时重新拉取，连续 MAX_REFRESH_ATTEMPTS 次都被打断则保留脏标记返回最新快照。
    pub async fn refresh_quota(&self) -> Result<QuotaSnapshot, DriveError> {
        let _guard = self.refresh_lock.lock().await;

        let mut epoch = {
            let state = self.quota.lock();
            if !state.dirty {
                return Ok(state.snapshot);
            }
            state.epoch
        };

        let backend = &self.backend;
        let mut snapshot = QuotaSnapshot::default();
        for attempt in 1..=MAX_REFRESH_ATTEMPTS {
            snapshot = self
                .retry
                .execute(
                    "get_quota",
                    move || backend.get_quota(),
                    DriveError::is_rate_limited,
                )
                .await?;

            let mut state = self.quota.lock();
            state.snapshot = snapshot;
            if state.epoch == epoch {
                state.dirty = false;
                drop(state);

                debug!(
                    "[{}] 配额已刷新: limit={}, usage={}, available={}",
                    self.identifier,
                    snapshot.limit,
                    snapshot.usage,
                    snapshot.available()
                );
                return Ok(snapshot);
            }

            debug!(
                "[{}] 配额刷新期间发生上传，重新拉取 ({}/{})",
                self.identifier, attempt, MAX_REFRESH_ATTEMPTS
            );
            epoch = state.epoch;
        }

        warn!(
            "[{}] 配额连续 {} 次在刷新期间变化，保持脏标记",
            self.identifier, MAX_REFRESH_ATTEMPTS
        );
        Ok(snapshot)
    }
}
