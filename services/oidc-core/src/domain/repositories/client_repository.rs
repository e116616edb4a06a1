//! OAuth Client 仓储接口

use async_trait::async_trait;
use xoidc_common::{ClientId, Pagination};
use xoidc_errors::AppResult;

use crate::domain::entities::Client;

/// OAuth Client 仓储接口
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn insert(&self, client: &Client) -> AppResult<()>;

    async fn find_by_id(&self, id: &ClientId) -> AppResult<Option<Client>>;

    async fn count(&self) -> AppResult<u64>;

    /// 按 id 排序分页
    async fn list(&self, pagination: &Pagination) -> AppResult<Vec<Client>>;
}
