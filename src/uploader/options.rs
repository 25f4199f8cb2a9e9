// 上传参数
//
// 调用方传入的参数只在这里校验：缺省字段取默认值，未知字段和类型错误直接拒绝

use crate::error::UploadError;
use crate::uploader::chunk::MAX_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// 分片文件的类型前缀
const CHUNKIFIED_PREFIX: &str = "chunkified-";

/// 上传参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct UploadOptions {
    /// 文件类型标签
    pub file_type: String,
    /// 分片大小（字节），0 表示不切分
    pub chunk_size: u64,
}

impl UploadOptions {
    pub fn new(file_type: impl Into<String>, chunk_size: u64) -> Self {
        Self {
            file_type: file_type.into(),
            chunk_size,
        }
    }

    /// 从 JSON 解析并校验
    pub fn from_json(json: &str) -> Result<Self, UploadError> {
        let options: UploadOptions = serde_json::from_str(json)
            .map_err(|e| UploadError::InvalidOptions(format!("解析上传参数失败: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(UploadError::InvalidOptions(format!(
                "chunkSize {} 超过上限 {}",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        Ok(())
    }

    /// 是否需要切分
    pub fn is_chunkified(&self) -> bool {
        self.chunk_size > 0
    }

    /// 切分后文件记录使用的类型
    pub fn chunkified_file_type(&self) -> String {
        format!("{}{}", CHUNKIFIED_PREFIX, self.file_type)
    }
}
