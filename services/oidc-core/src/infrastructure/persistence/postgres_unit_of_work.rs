//! PostgreSQL Unit of Work 实现
//!
//! 使用 SQLx Transaction 提供事务协调能力。

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use xoidc_adapter_postgres::{TransactionOptions, begin_with_options, check_connection};
use xoidc_common::RequestContext;
use xoidc_errors::{AppError, AppResult};

use crate::domain::repositories::{
    AccessTokenRepository, AuthCodeRepository, AuthRequestRepository, ClientRepository,
    DeviceAuthorizationRepository, RefreshTokenRepository, UserRepository,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

use super::tx_repositories::{
    SharedTx, TxAccessTokenRepository, TxAuthCodeRepository, TxAuthRequestRepository,
    TxClientRepository, TxDeviceAuthorizationRepository, TxRefreshTokenRepository,
    TxUserRepository,
};

/// PostgreSQL Unit of Work 工厂
pub struct PostgresUnitOfWorkFactory {
    pool: PgPool,
    options: TransactionOptions,
}

impl PostgresUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            options: TransactionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresUnitOfWorkFactory {
    async fn begin(&self, ctx: &RequestContext) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = ctx.run(begin_with_options(&self.pool, &self.options)).await?;
        Ok(Box::new(PostgresUnitOfWork::new(tx, ctx.clone())))
    }

    async fn health(&self, ctx: &RequestContext) -> AppResult<()> {
        ctx.run(check_connection(&self.pool)).await
    }
}

/// PostgreSQL Unit of Work 实现
///
/// 持有一个事务和所有相关的 Repository 实例。
/// 所有 Repository 操作都在同一个事务中执行。
pub struct PostgresUnitOfWork {
    /// 使用 Arc<Mutex> 包装 Transaction，使其可以被多个 Repository 共享
    tx: SharedTx,
    ctx: RequestContext,

    auth_request_repo: TxAuthRequestRepository,
    auth_code_repo: TxAuthCodeRepository,
    access_token_repo: TxAccessTokenRepository,
    refresh_token_repo: TxRefreshTokenRepository,
    client_repo: TxClientRepository,
    device_authorization_repo: TxDeviceAuthorizationRepository,
    user_repo: TxUserRepository,
}

impl PostgresUnitOfWork {
    fn new(tx: Transaction<'static, Postgres>, ctx: RequestContext) -> Self {
        let tx = Arc::new(Mutex::new(Some(tx)));

        Self {
            tx: tx.clone(),
            auth_request_repo: TxAuthRequestRepository::new(tx.clone(), ctx.clone()),
            auth_code_repo: TxAuthCodeRepository::new(tx.clone(), ctx.clone()),
            access_token_repo: TxAccessTokenRepository::new(tx.clone(), ctx.clone()),
            refresh_token_repo: TxRefreshTokenRepository::new(tx.clone(), ctx.clone()),
            client_repo: TxClientRepository::new(tx.clone(), ctx.clone()),
            device_authorization_repo: TxDeviceAuthorizationRepository::new(tx.clone(), ctx.clone()),
            user_repo: TxUserRepository::new(tx, ctx.clone()),
            ctx,
        }
    }

    async fn take_tx(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.tx
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
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

    // ============ Transaction Control ============

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let tx = self.take_tx().await?;

        if let Err(e) = self.ctx.check() {
            warn!(error = %e, "Context cancelled before commit, rolling back");
            tx.rollback()
                .await
                .map_err(|e| AppError::database(format!("Failed to rollback transaction: {}", e)))?;
            return Err(e);
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit transaction: {}", e)))?;

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let tx = self.take_tx().await?;

        tx.rollback()
            .await
            .map_err(|e| AppError::database(format!("Failed to rollback transaction: {}", e)))?;

        Ok(())
    }
}
