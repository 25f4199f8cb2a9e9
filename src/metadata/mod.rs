// 元数据存储模块

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteMetadataStore;
pub use types::{ChunkRecord, FileRecord, NewChunk, NewFile, StoreError};

use async_trait::async_trait;

/// 文件 / 分片记录的持久化接口
///
/// 记录写入后不再修改
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// 写入文件记录，返回带生成 ID 的记录
    async fn add_file(&self, file: NewFile) -> Result<FileRecord, StoreError>;

    /// 写入分片记录，返回带生成 ID 的记录
    async fn add_chunk(&self, chunk: NewChunk) -> Result<ChunkRecord, StoreError>;

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StoreError>;

    async fn get_chunk(&self, id: &str) -> Result<Option<ChunkRecord>, StoreError>;

    /// 关闭存储，之后的读写返回 `StoreError::Closed`
    async fn close(&self) -> Result<(), StoreError>;
}
