// 测试用的远程存储和凭证桩

use crate::drive::{
    DriveError, DriveErrorKind, MediaPayload, Permission, QuotaSnapshot, RemoteBackend,
    RemoteObject,
};
use crate::error::UploadError;
use crate::pool::{Account, CredentialsProvider};
use crate::retry::{RetryExecutor, RetryPolicy};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 退避 1ms 的重试执行器
pub(crate) fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(RetryPolicy {
        max_retries: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
    })
}

#[derive(Default)]
struct MockState {
    limit: u64,
    usage: u64,
    objects: HashMap<String, RemoteObject>,
    /// 按上传顺序记录的载荷大小
    uploaded_sizes: Vec<usize>,
    quota_error: Option<DriveErrorKind>,
    rate_limited_uploads: usize,
    /// 剩余多少次上传成功后开始失败
    uploads_before_failure: Option<usize>,
    permission_error: Option<DriveErrorKind>,
    rate_limited_quota: usize,
    rate_limited_permissions: usize,
    rate_limited_fetches: usize,
    /// 配额查询的响应延迟（返回的是请求发出时的用量）
    quota_delay: Duration,
}

fn rate_limited() -> DriveError {
    DriveError::new(DriveErrorKind::RateLimited, Some(429), "rateLimitExceeded")
}

/// 内存中的远程存储：上传会按载荷大小增加用量
pub(crate) struct MockBackend {
    name: String,
    state: Mutex<MockState>,
    quota_calls: AtomicUsize,
    upload_attempts: AtomicUsize,
    permission_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockBackend {
    pub(crate) fn new(limit: u64, usage: u64) -> Arc<Self> {
        Self::named("mock", limit, usage)
    }

    pub(crate) fn named(name: &str, limit: u64, usage: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(MockState {
                limit,
                usage,
                ..Default::default()
            }),
            quota_calls: AtomicUsize::new(0),
            upload_attempts: AtomicUsize::new(0),
            permission_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn quota_calls(&self) -> usize {
        self.quota_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn upload_attempts(&self) -> usize {
        self.upload_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn permission_calls(&self) -> usize {
        self.permission_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn uploaded_sizes(&self) -> Vec<usize> {
        self.state.lock().uploaded_sizes.clone()
    }

    pub(crate) fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub(crate) fn fail_quota_with(&self, kind: DriveErrorKind) {
        self.state.lock().quota_error = Some(kind);
    }

    pub(crate) fn rate_limit_next_uploads(&self, count: usize) {
        self.state.lock().rate_limited_uploads = count;
    }

    /// 再成功 `successes` 次之后，上传一律返回 Forbidden
    pub(crate) fn fail_uploads_after(&self, successes: usize) {
        self.state.lock().uploads_before_failure = Some(successes);
    }

    pub(crate) fn fail_permissions_with(&self, kind: DriveErrorKind) {
        self.state.lock().permission_error = Some(kind);
    }

    pub(crate) fn rate_limit_next_quota(&self, count: usize) {
        self.state.lock().rate_limited_quota = count;
    }

    pub(crate) fn rate_limit_next_permissions(&self, count: usize) {
        self.state.lock().rate_limited_permissions = count;
    }

    pub(crate) fn rate_limit_next_fetches(&self, count: usize) {
        self.state.lock().rate_limited_fetches = count;
    }

    pub(crate) fn delay_quota(&self, delay: Duration) {
        self.state.lock().quota_delay = delay;
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn authorize(&self) -> Result<String, DriveError> {
        Ok(format!("token-{}", self.name))
    }

    async fn create_object(&self, media: &MediaPayload) -> Result<String, DriveError> {
        let attempt = self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();

        if state.rate_limited_uploads > 0 {
            state.rate_limited_uploads -= 1;
            return Err(DriveError::new(
                DriveErrorKind::RateLimited,
                Some(403),
                "userRateLimitExceeded",
            ));
        }

        if let Some(remaining) = state.uploads_before_failure {
            if remaining == 0 {
                return Err(DriveError::new(DriveErrorKind::Forbidden, Some(403), "upload rejected"));
            }
            state.uploads_before_failure = Some(remaining - 1);
        }

        let id = format!("{}-obj-{}", self.name, attempt);
        state.usage += media.len() as u64;
        state.uploaded_sizes.push(media.len());
        state.objects.insert(
            id.clone(),
            RemoteObject {
                id: id.clone(),
                name: media.name.clone(),
                mime_type: Some(media.mime_type.clone()),
                size: Some(media.len() as u64),
                web_content_link: None,
            },
        );
        Ok(id)
    }

    async fn get_object(&self, remote_id: &str) -> Result<RemoteObject, DriveError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.rate_limited_fetches > 0 {
            state.rate_limited_fetches -= 1;
            return Err(rate_limited());
        }
        state
            .objects
            .get(remote_id)
            .cloned()
            .ok_or_else(|| DriveError::new(DriveErrorKind::NotFound, Some(404), remote_id))
    }

    async fn set_permission(
        &self,
        _remote_id: &str,
        _permission: &Permission,
    ) -> Result<(), DriveError> {
        self.permission_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.rate_limited_permissions > 0 {
            state.rate_limited_permissions -= 1;
            return Err(rate_limited());
        }
        match state.permission_error {
            Some(kind) => Err(DriveError::new(kind, Some(403), "permission denied")),
            None => Ok(()),
        }
    }

    async fn get_quota(&self) -> Result<QuotaSnapshot, DriveError> {
        self.quota_calls.fetch_add(1, Ordering::SeqCst);
        let (result, delay) = {
            let mut state = self.state.lock();
            let result = if state.rate_limited_quota > 0 {
                state.rate_limited_quota -= 1;
                Err(rate_limited())
            } else {
                match state.quota_error {
                    Some(kind) => Err(DriveError::new(kind, Some(500), "quota unavailable")),
                    None => Ok(QuotaSnapshot::new(state.limit, state.usage)),
                }
            };
            (result, state.quota_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

/// 返回固定账号列表的凭证桩，记录调用次数
pub(crate) struct MockCredentials {
    backends: Vec<(String, Arc<MockBackend>)>,
    calls: AtomicUsize,
    delay: Duration,
    error: Option<String>,
}

impl MockCredentials {
    pub(crate) fn new(backends: Vec<(&str, Arc<MockBackend>)>) -> Arc<Self> {
        Self::with_delay(backends, Duration::ZERO)
    }

    /// 生成账号前先等待，用于制造并发竞争
    pub(crate) fn with_delay(backends: Vec<(&str, Arc<MockBackend>)>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            backends: backends
                .into_iter()
                .map(|(id, b)| (id.to_string(), b))
                .collect(),
            calls: AtomicUsize::new(0),
            delay,
            error: None,
        })
    }

    /// 生成账号时返回一个非 Bootstrap 的错误
    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            backends: Vec::new(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            error: Some(message.to_string()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialsProvider for MockCredentials {
    async fn generate_accounts(&self) -> Result<Vec<Arc<Account>>, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.error {
            return Err(UploadError::InvalidOptions(message.clone()));
        }

        Ok(self
            .backends
            .iter()
            .map(|(id, backend)| {
                let backend: Arc<dyn RemoteBackend> = backend.clone();
                Arc::new(Account::new(id.clone(), backend, fast_retry()))
            })
            .collect())
    }
}
