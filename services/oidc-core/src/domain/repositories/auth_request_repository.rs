//! Authorization Request / Code 仓储接口

use async_trait::async_trait;
use uuid::Uuid;
use xoidc_errors::AppResult;

use crate::domain::entities::{AuthCode, AuthRequest};

/// Authorization Request 仓储接口
#[async_trait]
pub trait AuthRequestRepository: Send + Sync {
    async fn insert(&self, request: &AuthRequest) -> AppResult<()>;

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<AuthRequest>>;

    /// 读取并锁定该行直到事务结束
    async fn find_by_id_for_update(&self, id: &Uuid) -> AppResult<Option<AuthRequest>>;

    async fn update(&self, request: &AuthRequest) -> AppResult<()>;

    /// 返回是否存在被删除的行
    async fn delete(&self, id: &Uuid) -> AppResult<bool>;
}

/// 授权码映射仓储接口
#[async_trait]
pub trait AuthCodeRepository: Send + Sync {
    async fn insert(&self, code: &AuthCode) -> AppResult<()>;

    /// 原子地删除并返回映射，同一授权码只能成功一次
    async fn take(&self, code: &str) -> AppResult<Option<AuthCode>>;

    async fn delete_by_request_id(&self, request_id: &Uuid) -> AppResult<u64>;
}
