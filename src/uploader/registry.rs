// 上传编排器注册表
//
// 同一个逻辑存储（target + database）在进程内只有一个编排器实例。
// 注册表由应用持有并显式传递。

use crate::error::UploadError;
use crate::metadata::SqliteMetadataStore;
use crate::pool::{AccountPool, CredentialsProvider};
use crate::uploader::orchestrator::UploadOrchestrator;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 逻辑存储标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreIdentity {
    /// 数据目录
    pub target: PathBuf,
    /// 数据库名
    pub database: String,
}

impl StoreIdentity {
    pub fn new(target: impl Into<PathBuf>, database: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            database: database.into(),
        }
    }

    /// SQLite 文件路径: `target/<database>.db`
    pub fn db_path(&self) -> PathBuf {
        self.target.join(format!("{}.db", self.database))
    }
}

impl std::fmt::Display for StoreIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.target.display(), self.database)
    }
}

/// 编排器注册表
#[derive(Default)]
pub struct UploaderRegistry {
    instances: DashMap<StoreIdentity, Arc<UploadOrchestrator>>,
}

impl UploaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已有实例，不存在时用 `factory` 创建
    ///
    /// `factory` 只在实例不存在时调用；创建失败不会留下注册项
    pub fn get_or_create<F>(
        &self,
        identity: &StoreIdentity,
        factory: F,
    ) -> Result<Arc<UploadOrchestrator>, UploadError>
    where
        F: FnOnce() -> Result<UploadOrchestrator, UploadError>,
    {
        let entry = self
            .instances
            .entry(identity.clone())
            .or_try_insert_with(|| {
                let orchestrator = factory()?;
                info!("创建上传编排器: {}", identity);
                Ok::<_, UploadError>(Arc::new(orchestrator))
            })?;
        Ok(entry.value().clone())
    }

    /// 获取已有实例，不存在时打开 SQLite 存储并创建空账号池
    pub fn get_or_open(
        &self,
        identity: &StoreIdentity,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<Arc<UploadOrchestrator>, UploadError> {
        self.get_or_create(identity, || {
            let store = SqliteMetadataStore::open(&identity.db_path())?;
            let pool = AccountPool::new(credentials);
            Ok(UploadOrchestrator::new(Arc::new(store), Arc::new(pool)))
        })
    }

    pub fn get(&self, identity: &StoreIdentity) -> Option<Arc<UploadOrchestrator>> {
        self.instances
            .get(identity)
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// 注销并关闭实例，之后同一标识会创建新实例
    ///
    /// # 返回
    /// 实例是否存在
    pub async fn close(&self, identity: &StoreIdentity) -> Result<bool, UploadError> {
        let Some((_, orchestrator)) = self.instances.remove(identity) else {
            return Ok(false);
        };

        orchestrator.close().await?;
        info!("上传编排器已注销: {}", identity);
        Ok(true)
    }

    /// 关闭所有实例
    pub async fn close_all(&self) -> Result<(), UploadError> {
        let identities: Vec<StoreIdentity> = self
            .instances
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for identity in identities {
            self.close(&identity).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, MockCredentials};
    use crate::uploader::UploadOptions;
    use tempfile::TempDir;

    fn credentials() -> Arc<MockCredentials> {
        MockCredentials::new(vec![("a", MockBackend::new(1000, 0))])
    }

    #[test]
    fn test_db_path() {
        let identity = StoreIdentity::new("/data", "hls");
        assert_eq!(identity.db_path(), PathBuf::from("/data/hls.db"));
    }

    #[tokio::test]
    async fn test_same_identity_returns_same_instance() {
        let temp_dir = TempDir::new().unwrap();
        let registry = UploaderRegistry::new();
        let identity = StoreIdentity::new(temp_dir.path(), "hls");

        let first = registry.get_or_open(&identity, credentials()).unwrap();
        let second = registry.get_or_open(&identity, credentials()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        let other = registry
            .get_or_open(&StoreIdentity::new(temp_dir.path(), "other"), credentials())
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_factory_failure_leaves_no_entry() {
        let registry = UploaderRegistry::new();
        let identity = StoreIdentity::new("/nowhere", "x");

        let result = registry.get_or_create(&identity, || {
            Err(UploadError::InvalidOptions("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(registry.get(&identity).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_deregisters() {
        let temp_dir = TempDir::new().unwrap();
        let registry = UploaderRegistry::new();
        let identity = StoreIdentity::new(temp_dir.path(), "hls");

        let first = registry.get_or_open(&identity, credentials()).unwrap();
        first
            .upload_file(&b"abc"[..], &UploadOptions::new("x", 0))
            .await
            .unwrap();

        assert!(registry.close(&identity).await.unwrap());
        assert!(!registry.close(&identity).await.unwrap());
        assert!(registry.is_empty());

        // 重新打开得到新实例，数据仍在磁盘上
        let reopened = registry.get_or_open(&identity, credentials()).unwrap();
        assert!(!Arc::ptr_eq(&first, &reopened));
        assert!(identity.db_path().exists());

        registry.close_all().await.unwrap();
        assert!(registry.is_empty());
    }
}
