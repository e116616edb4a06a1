//! 用户仓储接口

use async_trait::async_trait;
use xoidc_common::{NamespaceId, UserId};
use xoidc_errors::AppResult;

use crate::domain::entities::User;

/// 用户仓储接口
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> AppResult<()>;

    async fn find_by_id(&self, id: &UserId) -> AppResult<Option<User>>;

    /// 用户名在命名空间内唯一
    async fn find_by_username(
        &self,
        namespace_id: &NamespaceId,
        username: &str,
    ) -> AppResult<Option<User>>;
}
