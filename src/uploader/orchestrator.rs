// 上传编排
//
// 一个文件的上传流程：
// 1. 按参数切分（或不切分）输入
// 2. 逐个分片：选号 -> 上传 -> 设置公开读权限 -> 写分片记录
// 3. 全部成功后写文件记录（分片 ID 保持切分顺序）
//
// 任一分片失败立即中止，不写文件记录；已经写入的分片记录保留，ID 随错误返回

use crate::drive::{MediaPayload, RemoteObject};
use crate::error::UploadError;
use crate::metadata::{ChunkRecord, FileRecord, MetadataStore, NewChunk, NewFile};
use crate::pool::AccountPool;
use crate::uploader::chunk::{read_single, ChunkSplitter, ChunkStream};
use crate::uploader::options::UploadOptions;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 分片上传使用的 MIME 类型
pub const CHUNK_MIME_TYPE: &str = "text/plain";

/// 上传编排器
///
/// 每个逻辑存储一个实例，由 `UploaderRegistry` 管理
pub struct UploadOrchestrator {
    store: Arc<dyn MetadataStore>,
    pool: Arc<AccountPool>,
}

impl UploadOrchestrator {
    pub fn new(store: Arc<dyn MetadataStore>, pool: Arc<AccountPool>) -> Self {
        Self { store, pool }
    }

    pub fn pool(&self) -> &Arc<AccountPool> {
        &self.pool
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// 上传一个输入流
    ///
    /// - `chunk_size == 0`: 整个输入作为一个分片，文件类型保持不变
    /// - 否则切分后上传，文件类型为 `chunkified-<file_type>`
    pub async fn upload_file<R>(
        &self,
        reader: R,
        options: &UploadOptions,
    ) -> Result<FileRecord, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        options.validate()?;

        if !options.is_chunkified() {
            let chunk = read_single(reader).await?;
            info!(
                "开始上传文件（不切分）: type={}, size={} bytes",
                options.file_type,
                chunk.len()
            );
            return self
                .upload_chunkified_file(vec![chunk], &options.file_type)
                .await;
        }

        let chunks = ChunkSplitter::new(reader, options.chunk_size)?
            .collect_all()
            .await?;
        info!(
            "开始上传文件: type={}, chunk_size={}, 分片数={}",
            options.file_type,
            options.chunk_size,
            chunks.len()
        );

        self.upload_chunkified_file(chunks, &options.chunkified_file_type())
            .await
    }

    /// 按顺序上传已切好的分片并写文件记录
    pub async fn upload_chunkified_file(
        &self,
        chunks: Vec<ChunkStream>,
        file_type: &str,
    ) -> Result<FileRecord, UploadError> {
        if chunks.is_empty() {
            warn!("没有可上传的分片: type={}", file_type);
            return Err(UploadError::EmptyInput);
        }

        // 加载失败直接返回 Bootstrap，不包装成分片错误
        self.pool.ensure_bootstrapped().await?;

        let total = chunks.len();
        let mut chunk_ids = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            match self.upload_chunk(chunk, file_type).await {
                Ok(record) => {
                    debug!("分片 {}/{} 完成: {}", index + 1, total, record.id);
                    chunk_ids.push(record.id);
                }
                Err(e) => {
                    error!(
                        "分片 {}/{} 上传失败，中止文件上传 (已写入 {} 个分片记录): {}",
                        index + 1,
                        total,
                        chunk_ids.len(),
                        e
                    );
                    return Err(UploadError::ChunkSequence {
                        index,
                        total,
                        orphaned_chunk_ids: chunk_ids,
                        source: Box::new(e),
                    });
                }
            }
        }

        let file = self
            .store
            .add_file(NewFile {
                file_type: file_type.to_string(),
                chunks: chunk_ids,
            })
            .await?;

        info!(
            "✓ 文件上传完成: id={}, type={}, 分片数={}",
            file.id,
            file.file_type,
            file.chunks.len()
        );
        Ok(file)
    }

    /// 上传单个分片并写分片记录
    pub async fn upload_chunk(
        &self,
        chunk: &ChunkStream,
        file_type: &str,
    ) -> Result<ChunkRecord, UploadError> {
        let account = self
            .pool
            .get_most_available_account()
            .await?
            .ok_or(UploadError::PoolExhausted)?;

        let media = MediaPayload::new(
            Uuid::new_v4().to_string(),
            CHUNK_MIME_TYPE,
            chunk.data.clone(),
        );
        let remote_id = account.upload(&media).await?;

        if let Err(e) = account.set_public_permission(&remote_id).await {
            error!(
                "[{}] 设置公开权限失败，远程对象 {} 未清理: {}",
                account.identifier(),
                remote_id,
                e
            );
            return Err(UploadError::Permission {
                remote_id,
                source: e,
            });
        }

        let record = self
            .store
            .add_chunk(NewChunk {
                file_type: file_type.to_string(),
                replicas: vec![remote_id],
            })
            .await?;

        debug!(
            "分片 #{} 已记录: chunk_id={}, account={}, size={} bytes",
            chunk.index,
            record.id,
            account.identifier(),
            chunk.len()
        );
        Ok(record)
    }

    /// 通过当前可用空间最大的账号获取远程对象
    pub async fn get_remote_file(&self, remote_id: &str) -> Result<RemoteObject, UploadError> {
        let account = self
            .pool
            .get_most_available_account()
            .await?
            .ok_or(UploadError::PoolExhausted)?;

        Ok(account.fetch(remote_id).await?)
    }

    /// 关闭元数据存储
    pub async fn close(&self) -> Result<(), UploadError> {
        self.store.close().await?;
        info!("上传编排器已关闭");
        Ok(())
    }
}
