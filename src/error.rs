// 上传错误类型

use crate::drive::DriveError;
use crate::metadata::StoreError;
use thiserror::Error;

/// 上传流程中的错误
#[derive(Debug, Error)]
pub enum UploadError {
    /// 凭证协作方没有返回任何账号（不可重试）
    #[error("账号初始化失败: {0}")]
    Bootstrap(String),

    /// 所有账号都没有剩余空间
    #[error("没有可用空间的账号")]
    PoolExhausted,

    /// 远程调用失败（不可重试的错误，或已耗尽重试次数）
    #[error("远程调用失败: {0}")]
    Remote(#[from] DriveError),

    /// 文件已上传，但设置公开权限失败（远程对象不会被清理）
    #[error("设置公开权限失败: remote_id={remote_id}, {source}")]
    Permission {
        remote_id: String,
        #[source]
        source: DriveError,
    },

    /// 多分片上传中途失败
    ///
    /// `index` 从 0 开始；`orphaned_chunk_ids` 是已经持久化、但不会被任何文件记录引用的分片
    #[error("第 {}/{} 个分片上传失败: {source}", .index + 1, .total)]
    ChunkSequence {
        index: usize,
        total: usize,
        orphaned_chunk_ids: Vec<String>,
        #[source]
        source: Box<UploadError>,
    },

    /// 元数据存储失败
    #[error("元数据存储失败: {0}")]
    Store(#[from] StoreError),

    /// 没有可上传的分片
    #[error("没有可上传的分片")]
    EmptyInput,

    /// 上传参数无效
    #[error("上传参数无效: {0}")]
    InvalidOptions(String),

    /// 读取输入失败
    #[error("读取输入失败: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// 调用方稍后重试是否可能成功
    ///
    /// 账号空间释放、限流解除后重试有意义；初始化失败和参数错误重试无意义
    pub fn is_retriable(&self) -> bool {
        match self {
            UploadError::PoolExhausted => true,
            UploadError::Remote(e) | UploadError::Permission { source: e, .. } => {
                e.kind.is_transient()
            }
            UploadError::ChunkSequence { source, .. } => source.is_retriable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::DriveErrorKind;

    #[test]
    fn test_retriable_classification() {
        assert!(UploadError::PoolExhausted.is_retriable());
        assert!(!UploadError::Bootstrap("no accounts".to_string()).is_retriable());
        assert!(!UploadError::EmptyInput.is_retriable());

        let limited = DriveError::new(DriveErrorKind::RateLimited, Some(403), "slow down");
        assert!(UploadError::Remote(limited.clone()).is_retriable());

        let nested = UploadError::ChunkSequence {
            index: 2,
            total: 3,
            orphaned_chunk_ids: vec!["a".to_string()],
            source: Box::new(UploadError::Remote(limited)),
        };
        assert!(nested.is_retriable());

        let forbidden = DriveError::new(DriveErrorKind::Forbidden, Some(403), "denied");
        let permission = UploadError::Permission {
            remote_id: "obj".to_string(),
            source: forbidden,
        };
        assert!(!permission.is_retriable());
    }

    #[test]
    fn test_chunk_sequence_message() {
        let err = UploadError::ChunkSequence {
            index: 1,
            total: 3,
            orphaned_chunk_ids: vec![],
            source: Box::new(UploadError::PoolExhausted),
        };
        assert_eq!(err.to_string(), "第 2/3 个分片上传失败: 没有可用空间的账号");
    }
}
