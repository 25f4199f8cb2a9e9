// 元数据记录类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 待写入的分片记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChunk {
    pub file_type: String,
    /// 远程副本 ID（至少一个）
    pub replicas: Vec<String>,
}

/// 已持久化的分片记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub file_type: String,
    pub replicas: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的文件记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub file_type: String,
    /// 分片 ID，顺序即切分顺序
    pub chunks: Vec<String>,
}

/// 已持久化的文件记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub file_type: String,
    pub chunks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// 元数据存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("数据库错误: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("获取数据库锁失败: {0}")]
    Lock(String),

    #[error("存储已关闭")]
    Closed,

    #[error("记录无效: {0}")]
    InvalidRecord(String),
}
