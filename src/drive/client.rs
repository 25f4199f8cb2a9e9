// Drive v3 客户端实现
//
// 只实现账号池需要的四个接口：上传、查询对象、添加权限、查询配额

use crate::config::DriveConfig;
use crate::drive::types::de_opt_u64_from_str;
use crate::drive::{
    DriveError, DriveErrorKind, MediaPayload, Permission, QuotaSnapshot, RemoteBackend,
    RemoteObject,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// multipart/related 分隔符
const MULTIPART_BOUNDARY: &str = "chunkdrive-media-boundary";

/// 查询对象时请求的字段
const OBJECT_FIELDS: &str = "id,name,mimeType,size,webContentLink";

/// Drive 客户端（单个服务账号）
#[derive(Clone)]
pub struct DriveClient {
    /// HTTP客户端
    client: Client,
    /// 访问令牌
    access_token: String,
    /// 元数据接口地址
    api_base: String,
    /// 上传接口地址
    upload_base: String,
}

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutResponse {
    storage_quota: StorageQuota,
}

/// 配额字段均为字符串；不限空间的账号没有 limit
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageQuota {
    #[serde(default, deserialize_with = "de_opt_u64_from_str")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64_from_str")]
    usage: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64_from_str")]
    usage_in_drive: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64_from_str")]
    usage_in_drive_trash: Option<u64>,
}

impl From<StorageQuota> for QuotaSnapshot {
    fn from(q: StorageQuota) -> Self {
        QuotaSnapshot {
            limit: q.limit.unwrap_or(u64::MAX),
            usage: q.usage.unwrap_or(0),
            usage_in_backend: q.usage_in_drive.unwrap_or(0),
            usage_in_trash: q.usage_in_drive_trash.unwrap_or(0),
        }
    }
}

impl DriveClient {
    /// 创建新的 Drive 客户端
    ///
    /// # 参数
    /// * `access_token` - 服务账号访问令牌
    /// * `config` - 接口地址与超时配置
    pub fn new(access_token: impl Into<String>, config: &DriveConfig) -> Result<Self, DriveError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DriveError::new(
                    DriveErrorKind::Unknown,
                    None,
                    format!("创建 HTTP 客户端失败: {}", e),
                )
            })?;

        Ok(Self {
            client,
            access_token: access_token.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
        })
    }

    /// 非 2xx 响应转换为分类后的错误
    async fn check_status(response: Response) -> Result<Response, DriveError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = DriveError::from_response(status.as_u16(), &body);
        debug!("Drive 请求失败: status={}, kind={:?}", status, err.kind);
        Err(err)
    }
}

/// 构建 multipart/related 请求体（元数据 JSON + 文件内容）
pub(crate) fn build_multipart_body(media: &MediaPayload) -> Result<Vec<u8>, DriveError> {
    let metadata = serde_json::json!({ "name": media.name });
    let metadata = serde_json::to_string(&metadata).map_err(|e| {
        DriveError::new(DriveErrorKind::BadRequest, None, format!("序列化元数据失败: {}", e))
    })?;

    let mut body = Vec::with_capacity(media.len() + metadata.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", media.mime_type).as_bytes());
    body.extend_from_slice(&media.data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    Ok(body)
}

#[async_trait]
impl RemoteBackend for DriveClient {
    async fn authorize(&self) -> Result<String, DriveError> {
        if self.access_token.is_empty() {
            return Err(DriveError::new(
                DriveErrorKind::Unauthorized,
                None,
                "访问令牌为空",
            ));
        }
        Ok(self.access_token.clone())
    }

    async fn create_object(&self, media: &MediaPayload) -> Result<String, DriveError> {
        let token = self.authorize().await?;
        let url = format!("{}/files?uploadType=multipart&fields=id", self.upload_base);
        let body = build_multipart_body(media)?;

        info!("上传对象: name={}, size={} bytes", media.name, media.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(
                CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(body)
            .send()
            .await?;
        let created: CreatedObject = Self::check_status(response).await?.json().await?;

        debug!("上传对象成功: name={}, id={}", media.name, created.id);
        Ok(created.id)
    }

    async fn get_object(&self, remote_id: &str) -> Result<RemoteObject, DriveError> {
        let token = self.authorize().await?;
        let url = format!(
            "{}/files/{}?fields={}",
            self.api_base,
            urlencoding::encode(remote_id),
            OBJECT_FIELDS
        );

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let object: RemoteObject = Self::check_status(response).await?.json().await?;
        Ok(object)
    }

    async fn set_permission(
        &self,
        remote_id: &str,
        permission: &Permission,
    ) -> Result<(), DriveError> {
        let token = self.authorize().await?;
        let url = format!(
            "{}/files/{}/permissions",
            self.api_base,
            urlencoding::encode(remote_id)
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(permission)
            .send()
            .await?;
        Self::check_status(response).await?;

        debug!(
            "设置权限成功: id={}, role={}, type={}",
            remote_id, permission.role, permission.scope
        );
        Ok(())
    }

    async fn get_quota(&self) -> Result<QuotaSnapshot, DriveError> {
        let token = self.authorize().await?;
        let url = format!("{}/about?fields=storageQuota", self.api_base);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let about: AboutResponse = Self::check_status(response).await?.json().await?;
        Ok(about.storage_quota.into())
    }
}
