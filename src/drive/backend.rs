// 远程存储能力接口
//
// 每个账号持有一个实现；具体的协议细节（认证、签名、传输）都在实现里

use crate::drive::{DriveError, MediaPayload, Permission, QuotaSnapshot, RemoteObject};
use async_trait::async_trait;

/// 单个远程身份的能力集合
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// 获取 bearer 凭证
    async fn authorize(&self) -> Result<String, DriveError>;

    /// 创建远程对象，返回远程 ID
    async fn create_object(&self, media: &MediaPayload) -> Result<String, DriveError>;

    /// 获取远程对象元数据
    async fn get_object(&self, remote_id: &str) -> Result<RemoteObject, DriveError>;

    /// 为远程对象添加权限
    async fn set_permission(
        &self,
        remote_id: &str,
        permission: &Permission,
    ) -> Result<(), DriveError>;

    /// 查询账号配额
    async fn get_quota(&self) -> Result<QuotaSnapshot, DriveError>;
}
