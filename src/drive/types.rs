// 远程存储类型定义

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// 账号配额快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    /// 总空间（字节）
    pub limit: u64,
    /// 已用空间（字节）
    pub usage: u64,
    /// 网盘内文件占用（字节）
    pub usage_in_backend: u64,
    /// 回收站占用（字节）
    pub usage_in_trash: u64,
}

impl QuotaSnapshot {
    pub fn new(limit: u64, usage: u64) -> Self {
        Self {
            limit,
            usage,
            usage_in_backend: usage,
            usage_in_trash: 0,
        }
    }

    /// 可用空间 = limit - usage
    pub fn available(&self) -> u64 {
        self.limit.saturating_sub(self.usage)
    }
}

/// 上传载荷
#[derive(Debug, Clone)]
pub struct MediaPayload {
    /// 远程对象名
    pub name: String,
    /// MIME 类型
    pub mime_type: String,
    /// 数据
    pub data: Bytes,
}

impl MediaPayload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// 载荷大小（字节）
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 远程对象元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_u64_from_str")]
    pub size: Option<u64>,
    #[serde(default)]
    pub web_content_link: Option<String>,
}

/// 访问权限
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// 角色：reader / writer / owner
    pub role: String,
    /// 授权范围：anyone / user / domain
    #[serde(rename = "type")]
    pub scope: String,
}

impl Permission {
    /// 任何人可读
    pub fn public_reader() -> Self {
        Self {
            role: "reader".to_string(),
            scope: "anyone".to_string(),
        }
    }
}

/// 远程错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveErrorKind {
    /// 限流（唯一会被重试的错误）
    RateLimited,
    /// 凭证无效或过期
    Unauthorized,
    /// 权限不足
    Forbidden,
    /// 对象不存在
    NotFound,
    /// 空间不足
    QuotaExceeded,
    /// 参数错误
    BadRequest,
    /// 服务器错误
    ServerError,
    /// 超时
    Timeout,
    /// 网络错误
    Network,
    /// 响应无法解析
    InvalidResponse,
    /// 未知错误
    Unknown,
}

/// 限流错误的 reason 标识
pub const RATE_LIMIT_REASONS: &[&str] = &["userRateLimitExceeded", "rateLimitExceeded"];

/// 空间不足的 reason 标识
pub const QUOTA_EXCEEDED_REASONS: &[&str] = &["storageQuotaExceeded", "quotaExceeded"];

impl DriveErrorKind {
    /// 稍后重试可能成功
    ///
    /// 注意：RetryExecutor 只会自动重试 RateLimited，其余种类只用于提示调用方
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriveErrorKind::RateLimited
                | DriveErrorKind::ServerError
                | DriveErrorKind::Timeout
                | DriveErrorKind::Network
        )
    }

    /// 根据 HTTP 状态码和错误 reason 分类
    pub fn classify(status: u16, reasons: &[String]) -> Self {
        let has_reason = |candidates: &[&str]| {
            reasons
                .iter()
                .any(|r| candidates.iter().any(|c| r.as_str() == *c))
        };

        if status == 429 || has_reason(RATE_LIMIT_REASONS) {
            return DriveErrorKind::RateLimited;
        }

        match status {
            400 => DriveErrorKind::BadRequest,
            401 => DriveErrorKind::Unauthorized,
            403 if has_reason(QUOTA_EXCEEDED_REASONS) => DriveErrorKind::QuotaExceeded,
            403 => DriveErrorKind::Forbidden,
            404 => DriveErrorKind::NotFound,
            408 => DriveErrorKind::Timeout,
            500..=599 => DriveErrorKind::ServerError,
            _ => DriveErrorKind::Unknown,
        }
    }
}

/// 远程调用错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveError {
    pub kind: DriveErrorKind,
    /// HTTP 状态码（网络错误时为空）
    pub status: Option<u16>,
    pub message: String,
}

impl DriveError {
    pub fn new(kind: DriveErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    /// 从错误响应构造
    ///
    /// 响应体格式：`{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => {
                let reasons: Vec<String> = parsed
                    .error
                    .errors
                    .iter()
                    .filter_map(|e| e.reason.clone())
                    .collect();
                let kind = DriveErrorKind::classify(status, &reasons);
                let message = if reasons.is_empty() {
                    parsed.error.message
                } else {
                    format!("{} ({})", parsed.error.message, reasons.join(", "))
                };
                Self::new(kind, Some(status), message)
            }
            Err(_) => Self::new(DriveErrorKind::classify(status, &[]), Some(status), body),
        }
    }

    /// RetryExecutor 的分类器：只有限流会被重试
    pub fn is_rate_limited(&self) -> bool {
        self.kind == DriveErrorKind::RateLimited
    }
}

impl fmt::Display for DriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{:?}] HTTP {}: {}", self.kind, status, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for DriveError {}

impl From<reqwest::Error> for DriveError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            DriveErrorKind::Timeout
        } else if e.is_decode() {
            DriveErrorKind::InvalidResponse
        } else if e.is_connect() || e.is_request() {
            DriveErrorKind::Network
        } else {
            DriveErrorKind::Unknown
        };
        DriveError::new(kind, e.status().map(|s| s.as_u16()), e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    reason: Option<String>,
}

/// Drive 接口把 int64 字段编码成字符串
pub(crate) fn de_opt_u64_from_str<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }

    match Option::<StrOrNum>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StrOrNum::Num(n)) => Ok(Some(n)),
        Some(StrOrNum::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
