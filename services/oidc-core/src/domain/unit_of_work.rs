//! Unit of Work 模式
//!
//! 提供跨多个 Repository 的事务协调能力，确保操作的原子性。
//! 令牌轮换的级联删除与会话终止的跨表删除都必须在同一个 Unit of Work 内完成。

use async_trait::async_trait;
use tracing::error;
use xoidc_common::RequestContext;
use xoidc_errors::AppResult;

use crate::domain::repositories::{
    AccessTokenRepository, AuthCodeRepository, AuthRequestRepository, ClientRepository,
    DeviceAuthorizationRepository, RefreshTokenRepository, UserRepository,
};

/// Unit of Work trait
///
/// # 使用示例
///
/// ```ignore
/// let uow = uow_factory.begin(&ctx).await?;
///
/// uow.refresh_tokens().take(&old_id).await?;
/// uow.access_tokens().delete_by_refresh_token_id(&old_id).await?;
///
/// uow.commit().await?;
/// ```
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn auth_requests(&self) -> &dyn AuthRequestRepository;

    fn auth_codes(&self) -> &dyn AuthCodeRepository;

    fn access_tokens(&self) -> &dyn AccessTokenRepository;

    fn refresh_tokens(&self) -> &dyn RefreshTokenRepository;

    fn clients(&self) -> &dyn ClientRepository;

    fn device_authorizations(&self) -> &dyn DeviceAuthorizationRepository;

    fn users(&self) -> &dyn UserRepository;

    /// 提交事务
    ///
    /// 提交前检查请求上下文，已取消或超时则回滚并返回 `Cancelled`。
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// 回滚事务
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// Unit of Work 工厂 trait
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// 开始新的事务，事务内的存储调用都受 `ctx` 约束
    async fn begin(&self, ctx: &RequestContext) -> AppResult<Box<dyn UnitOfWork>>;

    /// 存储健康检查
    async fn health(&self, ctx: &RequestContext) -> AppResult<()>;
}

/// 根据操作结果提交或回滚
pub async fn finish<T>(uow: Box<dyn UnitOfWork>, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                error!(error = %rollback_err, "Failed to rollback transaction");
            }
            Err(e)
        }
    }
}
