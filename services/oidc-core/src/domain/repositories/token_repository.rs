//! Access / Refresh Token 仓储接口

use async_trait::async_trait;
use uuid::Uuid;
use xoidc_common::ClientId;
use xoidc_errors::AppResult;

use crate::domain::entities::{AccessToken, RefreshToken};

/// Access Token 仓储接口
#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    async fn insert(&self, token: &AccessToken) -> AppResult<()>;

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<AccessToken>>;

    /// 读取并锁定该行直到事务结束
    async fn find_by_id_for_update(&self, id: &Uuid) -> AppResult<Option<AccessToken>>;

    async fn delete(&self, id: &Uuid) -> AppResult<bool>;

    /// 删除引用该 Refresh Token 的所有 Access Token
    async fn delete_by_refresh_token_id(&self, refresh_token_id: &str) -> AppResult<u64>;

    /// 删除 (client, subject) 下的所有 Access Token
    async fn delete_by_session(&self, client_id: &ClientId, subject: &str) -> AppResult<u64>;
}

/// Refresh Token 仓储接口
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, token: &RefreshToken) -> AppResult<()>;

    async fn find_by_id(&self, id: &str) -> AppResult<Option<RefreshToken>>;

    /// 原子地删除并返回，轮换与撤销的并发原语
    async fn take(&self, id: &str) -> AppResult<Option<RefreshToken>>;

    /// 删除 (client, subject) 下的所有 Refresh Token
    async fn delete_by_session(&self, client_id: &ClientId, subject: &str) -> AppResult<u64>;
}
