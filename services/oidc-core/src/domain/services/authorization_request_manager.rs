//! 授权请求管理
//!
//! 负责交互式登录阶段：创建授权请求、完成登录、保存并兑换授权码。

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use xoidc_common::{RequestContext, UserId};
use xoidc_errors::AppResult;

use crate::domain::entities::{AuthCode, AuthRequest, AuthorizationParams};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory, finish};
use crate::error::OidcError;

use super::{CredentialVerifier, TokenPolicy};

pub struct AuthorizationRequestManager {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    credentials: Arc<dyn CredentialVerifier>,
    policy: TokenPolicy,
}

impl AuthorizationRequestManager {
    pub fn new(
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        credentials: Arc<dyn CredentialVerifier>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            uow_factory,
            credentials,
            policy,
        }
    }

    /// 创建授权请求
    ///
    /// `prompt=none` 时无法进行交互式登录，直接返回 `LoginRequired`，不写入任何状态。
    /// `user_id` 仅用于日志，会话复用由端点层处理。
    pub async fn create(
        &self,
        ctx: &RequestContext,
        params: AuthorizationParams,
        user_id: Option<&UserId>,
    ) -> AppResult<AuthRequest> {
        if params.is_prompt_none() {
            debug!(client_id = %params.client_id, "prompt=none without session");
            return Err(OidcError::LoginRequired.into());
        }

        let request = AuthRequest::from_params(params);
        debug!(
            request_id = %request.id,
            client_id = %request.client_id,
            user_id = ?user_id,
            "Creating auth request"
        );

        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.auth_requests().insert(&request).await;
        finish(uow, result).await?;

        Ok(request)
    }

    pub async fn get_by_id(&self, ctx: &RequestContext, id: &Uuid) -> AppResult<AuthRequest> {
        debug!(request_id = %id, "Loading auth request");

        let uow = self.uow_factory.begin(ctx).await?;
        let result = self.load_live(uow.as_ref(), id).await;
        finish(uow, result).await
    }

    /// 通过授权码取回授权请求
    ///
    /// 授权码在同一事务内被消费，再次使用同一授权码返回 `NotFound`。
    pub async fn get_by_code(&self, ctx: &RequestContext, code: &str) -> AppResult<AuthRequest> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = self.redeem_code(uow.as_ref(), code).await;
        finish(uow, result).await
    }

    /// 完成登录
    ///
    /// 用户不存在与密码错误返回同一个错误。
    pub async fn complete_login(
        &self,
        ctx: &RequestContext,
        id: &Uuid,
        username: &str,
        password: &str,
    ) -> AppResult<AuthRequest> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = self.login(uow.as_ref(), id, username, password).await;
        finish(uow, result).await
    }

    /// 保存授权码映射
    pub async fn save_code(
        &self,
        ctx: &RequestContext,
        request_id: &Uuid,
        code: &str,
    ) -> AppResult<()> {
        debug!(request_id = %request_id, "Saving auth code");

        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow
            .auth_codes()
            .insert(&AuthCode::new(code, *request_id))
            .await;
        finish(uow, result).await
    }

    /// 删除授权请求，并尽力清理授权码映射
    pub async fn delete(&self, ctx: &RequestContext, id: &Uuid) -> AppResult<()> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.auth_requests().delete(id).await;
        let deleted = finish(uow, result).await?;
        debug!(request_id = %id, deleted, "Auth request deleted");

        if let Err(e) = self.delete_codes(ctx, id).await {
            error!(request_id = %id, error = %e, "Failed to delete code mapping");
        }

        Ok(())
    }

    async fn delete_codes(&self, ctx: &RequestContext, id: &Uuid) -> AppResult<u64> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.auth_codes().delete_by_request_id(id).await;
        finish(uow, result).await
    }

    async fn redeem_code(&self, uow: &dyn UnitOfWork, code: &str) -> AppResult<AuthRequest> {
        let mapping = uow
            .auth_codes()
            .take(code)
            .await?
            .filter(|m| !m.is_stale(self.policy.auth_code_ttl))
            .ok_or(OidcError::CodeInvalid)?;

        self.load_live(uow, &mapping.request_id).await
    }

    async fn login(
        &self,
        uow: &dyn UnitOfWork,
        id: &Uuid,
        username: &str,
        password: &str,
    ) -> AppResult<AuthRequest> {
        let mut request = uow
            .auth_requests()
            .find_by_id_for_update(id)
            .await?
            .filter(|r| !r.is_stale(self.policy.auth_request_ttl))
            .ok_or(OidcError::RequestNotFound)?;

        if request.is_done {
            warn!(request_id = %id, "Auth request already completed");
            return Err(OidcError::RequestAlreadyDone.into());
        }

        let client = uow
            .clients()
            .find_by_id(&request.client_id)
            .await?
            .ok_or(OidcError::ClientNotFound)?;

        let user = uow
            .users()
            .find_by_username(&client.namespace_id, username)
            .await?;

        let matched = match &user {
            Some(user) => self.credentials.verify(password, &user.password_hash)?,
            None => {
                self.credentials
                    .verify(password, self.credentials.dummy_digest())?;
                false
            }
        };

        let user = match user {
            Some(user) if matched => user,
            _ => {
                metrics::counter!("oidc_login_attempts_total", "result" => "failure").increment(1);
                warn!(request_id = %id, "Login failed");
                return Err(OidcError::InvalidCredentials.into());
            }
        };

        request.complete(user.id);
        uow.auth_requests().update(&request).await?;

        metrics::counter!("oidc_login_attempts_total", "result" => "success").increment(1);
        info!(request_id = %id, user_id = %user.id, "Login completed");
        Ok(request)
    }

    async fn load_live(&self, uow: &dyn UnitOfWork, id: &Uuid) -> AppResult<AuthRequest> {
        uow.auth_requests()
            .find_by_id(id)
            .await?
            .filter(|r| !r.is_stale(self.policy.auth_request_ttl))
            .ok_or_else(|| OidcError::RequestNotFound.into())
    }
}
