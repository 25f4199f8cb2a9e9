//! SQLite 元数据存储
//!
//! - files: 文件记录，chunks 列为分片 ID 的 JSON 数组（保持切分顺序）
//! - chunks: 分片记录，replicas 列为远程副本 ID 的 JSON 数组

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{ChunkRecord, FileRecord, NewChunk, NewFile, StoreError};
use super::MetadataStore;

/// SQLite 元数据存储
pub struct SqliteMetadataStore {
    /// SQLite 连接，close 之后为 None
    conn: Mutex<Option<Connection>>,
}

impl SqliteMetadataStore {
    /// 打开（或创建）数据库文件
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        // 确保父目录存在
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("打开元数据库: {:?}", db_path);
        Self::from_connection(conn)
    }

    /// 内存数据库
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Some(conn)),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// 在连接上执行操作
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        f(conn)
    }

    /// 初始化数据库表
    fn init_tables(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                CREATE TABLE IF NOT EXISTS files (
                    id TEXT PRIMARY KEY,
                    file_type TEXT NOT NULL,
                    chunks TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                )
                "#,
                [],
            )?;

            conn.execute(
                r#"
                CREATE TABLE IF NOT EXISTS chunks (
                    id TEXT PRIMARY KEY,
                    file_type TEXT NOT NULL,
                    replicas TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                )
                "#,
                [],
            )?;

            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_files_type ON files(file_type, created_at)",
                [],
            )?;

            debug!("元数据表初始化完成");
            Ok(())
        })
    }

    /// 文件记录数
    pub fn file_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// 分片记录数
    pub fn chunk_count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    fn decode_ids(json: &str) -> Result<Vec<String>, StoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn add_file(&self, file: NewFile) -> Result<FileRecord, StoreError> {
        if file.chunks.is_empty() {
            return Err(StoreError::InvalidRecord("文件记录至少需要一个分片".to_string()));
        }

        let record = FileRecord {
            id: Uuid::new_v4().to_string(),
            file_type: file.file_type,
            chunks: file.chunks,
            created_at: Utc::now(),
        };
        let chunks_json = serde_json::to_string(&record.chunks)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, file_type, chunks, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.file_type,
                    chunks_json,
                    record.created_at.timestamp_millis()
                ],
            )?;
            Ok(())
        })?;

        debug!(
            "已写入文件记录: id={}, type={}, chunks={}",
            record.id,
            record.file_type,
            record.chunks.len()
        );
        Ok(record)
    }

    async fn add_chunk(&self, chunk: NewChunk) -> Result<ChunkRecord, StoreError> {
        if chunk.replicas.is_empty() {
            return Err(StoreError::InvalidRecord("分片记录至少需要一个副本".to_string()));
        }

        let record = ChunkRecord {
            id: Uuid::new_v4().to_string(),
            file_type: chunk.file_type,
            replicas: chunk.replicas,
            created_at: Utc::now(),
        };
        let replicas_json = serde_json::to_string(&record.replicas)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chunks (id, file_type, replicas, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.file_type,
                    replicas_json,
                    record.created_at.timestamp_millis()
                ],
            )?;
            Ok(())
        })?;

        debug!("已写入分片记录: id={}, replicas={:?}", record.id, record.replicas);
        Ok(record)
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StoreError> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, file_type, chunks, created_at FROM files WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        match row {
            Some((id, file_type, chunks, created_at)) => Ok(Some(FileRecord {
                id,
                file_type,
                chunks: Self::decode_ids(&chunks)?,
                created_at: Utc
                    .timestamp_millis_opt(created_at)
                    .single()
                    .unwrap_or_else(Utc::now),
            })),
            None => Ok(None),
        }
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, file_type, replicas, created_at FROM chunks WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        match row {
            Some((id, file_type, replicas, created_at)) => Ok(Some(ChunkRecord {
                id,
                file_type,
                replicas: Self::decode_ids(&replicas)?,
                created_at: Utc
                    .timestamp_millis_opt(created_at)
                    .single()
                    .unwrap_or_else(Utc::now),
            })),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))?
            .take();

        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            info!("元数据库已关闭");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_round_trip_preserves_chunk_order() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        let chunks = vec!["c3".to_string(), "c1".to_string(), "c2".to_string()];

        let written = store
            .add_file(NewFile {
                file_type: "chunkified-video".to_string(),
                chunks: chunks.clone(),
            })
            .await
            .unwrap();

        let loaded = store.get_file(&written.id).await.unwrap().unwrap();
        assert_eq!(loaded.chunks, chunks);
        assert_eq!(loaded.file_type, "chunkified-video");
        assert_eq!(
            loaded.created_at.timestamp_millis(),
            written.created_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_chunk_ids_are_unique() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        let mut ids = std::collections::HashSet::new();
        for i in 0..10 {
            let record = store
                .add_chunk(NewChunk {
                    file_type: "x".to_string(),
                    replicas: vec![format!("remote-{}", i)],
                })
                .await
                .unwrap();
            ids.insert(record.id);
        }
        assert_eq!(ids.len(), 10);
        assert_eq!(store.chunk_count().unwrap(), 10);
        assert_eq!(store.file_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_empty_records() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        let err = store
            .add_chunk(NewChunk {
                file_type: "x".to_string(),
                replicas: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));

        let err = store
            .add_file(NewFile {
                file_type: "x".to_string(),
                chunks: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
        assert_eq!(store.chunk_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        assert!(store.get_file("nope").await.unwrap().is_none());
        assert!(store.get_chunk("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("store.db");

        let chunk_id = {
            let store = SqliteMetadataStore::open(&db_path).unwrap();
            let record = store
                .add_chunk(NewChunk {
                    file_type: "x".to_string(),
                    replicas: vec!["remote-1".to_string(), "remote-2".to_string()],
                })
                .await
                .unwrap();
            store.close().await.unwrap();
            record.id
        };

        let store = SqliteMetadataStore::open(&db_path).unwrap();
        let loaded = store.get_chunk(&chunk_id).await.unwrap().unwrap();
        assert_eq!(loaded.replicas, vec!["remote-1", "remote-2"]);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_writes() {
        let store = SqliteMetadataStore::open_in_memory().unwrap();
        store.close().await.unwrap();
        // 重复关闭无害
        store.close().await.unwrap();

        let err = store
            .add_chunk(NewChunk {
                file_type: "x".to_string(),
                replicas: vec!["r".to_string()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }
}
