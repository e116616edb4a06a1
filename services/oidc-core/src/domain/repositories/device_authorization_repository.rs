//! 设备授权仓储接口

use async_trait::async_trait;
use xoidc_errors::AppResult;

use crate::domain::entities::DeviceAuthorization;

/// 设备授权仓储接口
#[async_trait]
pub trait DeviceAuthorizationRepository: Send + Sync {
    /// 保存 device code 与 user code 的配对。
    ///
    /// user code 已绑定到其他 device code 时返回 `DuplicateUserCode`，
    /// 且不覆盖已有映射。相同配对重复保存时覆盖状态；device code 已绑定到
    /// 其他 user code 时返回 `Validation`。
    async fn insert(&self, authorization: &DeviceAuthorization) -> AppResult<()>;

    async fn find_by_device_code(&self, device_code: &str)
    -> AppResult<Option<DeviceAuthorization>>;

    async fn find_by_user_code(&self, user_code: &str) -> AppResult<Option<DeviceAuthorization>>;

    /// 读取并锁定该行直到事务结束
    async fn find_by_user_code_for_update(
        &self,
        user_code: &str,
    ) -> AppResult<Option<DeviceAuthorization>>;

    async fn update(&self, authorization: &DeviceAuthorization) -> AppResult<()>;
}
