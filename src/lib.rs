// chunkdrive
// 把文件切分后分散上传到多个配额受限的云盘账号，并记录分片元数据

// 配置管理模块
pub mod config;

// 远程存储接口
pub mod drive;

// 错误类型
pub mod error;

// 日志
pub mod logging;

// 元数据存储
pub mod metadata;

// 账号池
pub mod pool;

// 限流重试
pub mod retry;

// 上传编排
pub mod uploader;

#[cfg(test)]
pub(crate) mod testing;

// 导出常用类型
pub use config::AppConfig;
pub use drive::{DriveClient, DriveError, DriveErrorKind, RemoteBackend};
pub use error::UploadError;
pub use metadata::{MetadataStore, SqliteMetadataStore, StoreError};
pub use pool::{Account, AccountPool, CredentialsProvider, ServiceAccountProvider};
pub use retry::{RetryExecutor, RetryPolicy};
pub use uploader::{
    ChunkSplitter, ChunkStream, StoreIdentity, UploadOptions, UploadOrchestrator,
    UploaderRegistry,
};
