//! 内存 Unit of Work 实现

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use xoidc_common::RequestContext;
use xoidc_errors::AppResult;

use crate::domain::repositories::{
    AccessTokenRepository, AuthCodeRepository, AuthRequestRepository, ClientRepository,
    DeviceAuthorizationRepository, RefreshTokenRepository, UserRepository,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

use super::repositories::{
    MemAccessTokenRepository, MemAuthCodeRepository, MemAuthRequestRepository,
    MemClientRepository, MemDeviceAuthorizationRepository, MemRefreshTokenRepository,
    MemUserRepository,
};
use super::store::{MemoryStore, TxState};

/// 内存 Unit of Work 工厂
///
/// 克隆后共享同一份数据，适合测试与单进程部署。
#[derive(Clone, Default)]
pub struct InMemoryUnitOfWorkFactory {
    store: Arc<MemoryStore>,
}

impl InMemoryUnitOfWorkFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryUnitOfWorkFactory {
    async fn begin(&self, ctx: &RequestContext) -> AppResult<Box<dyn UnitOfWork>> {
        ctx.check()?;
        Ok(Box::new(InMemoryUnitOfWork::new(
            self.store.clone(),
            ctx.clone(),
        )))
    }

    async fn health(&self, ctx: &RequestContext) -> AppResult<()> {
        ctx.check()
    }
}

pub struct InMemoryUnitOfWork {
    tx: Arc<TxState>,

    auth_request_repo: MemAuthRequestRepository,
    auth_code_repo: MemAuthCodeRepository,
    access_token_repo: MemAccessTokenRepository,
    refresh_token_repo: MemRefreshTokenRepository,
    client_repo: MemClientRepository,
    device_authorization_repo: MemDeviceAuthorizationRepository,
    user_repo: MemUserRepository,
}

impl InMemoryUnitOfWork {
    fn new(store: Arc<MemoryStore>, ctx: RequestContext) -> Self {
        let tx = Arc::new(TxState::new(store, ctx));

        Self {
            auth_request_repo: MemAuthRequestRepository::new(tx.clone()),
            auth_code_repo: MemAuthCodeRepository::new(tx.clone()),
            access_token_repo: MemAccessTokenRepository::new(tx.clone()),
            refresh_token_repo: MemRefreshTokenRepository::new(tx.clone()),
            client_repo: MemClientRepository::new(tx.clone()),
            device_authorization_repo: MemDeviceAuthorizationRepository::new(tx.clone()),
            user_repo: MemUserRepository::new(tx.clone()),
            tx,
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn auth_requests(&self) -> &dyn AuthRequestRepository {
        &self.auth_request_repo
    }

    fn auth_codes(&self) -> &dyn AuthCodeRepository {
        &self.auth_code_repo
    }

    fn access_tokens(&self) -> &dyn AccessTokenRepository {
        &self.access_token_repo
    }

    fn refresh_tokens(&self) -> &dyn RefreshTokenRepository {
        &self.refresh_token_repo
    }

    fn clients(&self) -> &dyn ClientRepository {
        &self.client_repo
    }

    fn device_authorizations(&self) -> &dyn DeviceAuthorizationRepository {
        &self.device_authorization_repo
    }

    fn users(&self) -> &dyn UserRepository {
        &self.user_repo
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        if let Err(e) = self.tx.ctx().check() {
            warn!(error = %e, "Context cancelled before commit, rolling back");
            self.tx.discard();
            self.tx.release_locks();
            return Err(e);
        }

        let result = self.tx.apply();
        self.tx.release_locks();
        result
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.tx.discard();
        self.tx.release_locks();
        Ok(())
    }
}
