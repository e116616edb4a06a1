//! 令牌生命周期管理
//!
//! 签发、轮换与撤销 Access / Refresh Token。
//!
//! Refresh Token 与引用它的所有 Access Token 是一个整体：轮换和撤销时在同一个
//! Unit of Work 内一并删除。轮换通过 `take` 原子地取走旧令牌，并发的两次轮换
//! 只有一次能拿到旧令牌，另一次得到 `InvalidGrant`。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use xoidc_common::{ClientId, RequestContext};
use xoidc_errors::AppResult;

use crate::domain::entities::{
    AccessToken, IssuedTokens, RefreshToken, RefreshTokenRequest, TokenExchangeRequest,
    TokenRequest,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory, finish};
use crate::error::OidcError;

use super::TokenPolicy;

/// 新 Refresh Token 链的元数据
struct Chain {
    client_id: ClientId,
    subject: String,
    audience: Vec<String>,
    scopes: Vec<String>,
    amr: Vec<String>,
    auth_time: Option<DateTime<Utc>>,
}

impl Chain {
    fn from_request(request: &dyn TokenRequest) -> Self {
        Self {
            client_id: request.client_id(),
            subject: request.subject(),
            audience: request.audience(),
            scopes: request.scopes(),
            amr: request.amr(),
            auth_time: request.auth_time(),
        }
    }

    /// 沿用旧令牌的元数据，scope 只能缩小
    fn rotated_from(old: RefreshToken, requested_scopes: &[String]) -> Self {
        let mut scopes = old.scopes;
        if !requested_scopes.is_empty() {
            scopes.retain(|s| requested_scopes.contains(s));
        }
        Self {
            client_id: old.client_id,
            subject: old.subject,
            audience: old.audience,
            scopes,
            amr: old.amr,
            auth_time: old.auth_time,
        }
    }
}

pub struct TokenLifecycleManager {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    policy: TokenPolicy,
}

impl TokenLifecycleManager {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>, policy: TokenPolicy) -> Self {
        Self {
            uow_factory,
            policy,
        }
    }

    /// 签发不关联 Refresh Token 的 Access Token
    pub async fn issue_access_token(
        &self,
        ctx: &RequestContext,
        client_id: &ClientId,
        subject: &str,
        audience: Vec<String>,
        scopes: Vec<String>,
    ) -> AppResult<IssuedTokens> {
        let token = AccessToken::new(
            *client_id,
            None,
            subject,
            audience,
            scopes,
            self.policy.access_token_ttl,
        );
        debug!(token_id = %token.id, client_id = %client_id, "Issuing access token");

        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.access_tokens().insert(&token).await;
        finish(uow, result).await?;

        metrics::counter!("oidc_tokens_issued_total", "kind" => "access_token").increment(1);
        Ok(IssuedTokens {
            access_token_id: token.id,
            refresh_token: None,
            expires_at: token.expires_at,
        })
    }

    /// 签发 Access + Refresh Token
    ///
    /// - token exchange 请求：签发新的令牌链，不轮换已有令牌
    /// - `current_refresh_token` 为空：首次签发
    /// - 否则为 refresh_token 授权，轮换 `current_refresh_token`
    pub async fn issue_access_and_refresh_tokens(
        &self,
        ctx: &RequestContext,
        request: &dyn TokenRequest,
        current_refresh_token: &str,
    ) -> AppResult<IssuedTokens> {
        if let Some(exchange) = request.as_token_exchange() {
            return self.exchange_refresh_token(ctx, exchange).await;
        }

        if current_refresh_token.is_empty() {
            if request.subject().is_empty() {
                warn!(client_id = %request.client_id(), "Token request without subject");
                return Err(OidcError::SubjectMissing.into());
            }

            let uow = self.uow_factory.begin(ctx).await?;
            let result = self
                .mint_chain(uow.as_ref(), Chain::from_request(request))
                .await;
            return finish(uow, result).await;
        }

        let uow = self.uow_factory.begin(ctx).await?;
        let result = self
            .rotate(uow.as_ref(), request, current_refresh_token)
            .await;
        let issued = finish(uow, result).await?;

        metrics::counter!("oidc_refresh_rotations_total").increment(1);
        Ok(issued)
    }

    async fn exchange_refresh_token(
        &self,
        ctx: &RequestContext,
        request: &TokenExchangeRequest,
    ) -> AppResult<IssuedTokens> {
        debug!(
            client_id = %request.client_id,
            subject = %request.subject,
            "Issuing exchanged tokens"
        );

        let chain = Chain {
            client_id: request.client_id,
            subject: request.subject.clone(),
            audience: request.audience.clone(),
            scopes: request.scopes.clone(),
            amr: Vec::new(),
            auth_time: request.auth_time,
        };

        let uow = self.uow_factory.begin(ctx).await?;
        let result = self.mint_chain(uow.as_ref(), chain).await;
        finish(uow, result).await
    }

    async fn rotate(
        &self,
        uow: &dyn UnitOfWork,
        request: &dyn TokenRequest,
        current: &str,
    ) -> AppResult<IssuedTokens> {
        let Some(old) = uow.refresh_tokens().take(current).await? else {
            metrics::counter!("oidc_refresh_replays_total").increment(1);
            warn!(client_id = %request.client_id(), "Unknown or rotated refresh token presented");
            return Err(OidcError::InvalidRefreshToken.into());
        };

        if old.is_expired() {
            debug!(client_id = %old.client_id, "Expired refresh token presented");
            return Err(OidcError::InvalidRefreshToken.into());
        }

        if old.client_id != request.client_id() {
            warn!(
                token_client_id = %old.client_id,
                client_id = %request.client_id(),
                "Refresh token presented by another client"
            );
            return Err(OidcError::InvalidRefreshToken.into());
        }

        let revoked = uow.access_tokens().delete_by_refresh_token_id(&old.id).await?;
        debug!(revoked, "Access tokens of rotated refresh token deleted");

        self.mint_chain(uow, Chain::rotated_from(old, &request.scopes()))
            .await
    }

    async fn mint_chain(&self, uow: &dyn UnitOfWork, chain: Chain) -> AppResult<IssuedTokens> {
        let refresh_id = RefreshToken::generate_id();

        let access = AccessToken::new(
            chain.client_id,
            Some(refresh_id.clone()),
            chain.subject.clone(),
            chain.audience.clone(),
            chain.scopes.clone(),
            self.policy.access_token_ttl,
        );

        let refresh = RefreshToken {
            id: refresh_id,
            auth_time: chain.auth_time,
            amr: chain.amr,
            audience: chain.audience,
            subject: chain.subject,
            client_id: chain.client_id,
            scopes: chain.scopes,
            expires_at: Utc::now() + self.policy.refresh_token_ttl,
        };

        uow.refresh_tokens().insert(&refresh).await?;
        uow.access_tokens().insert(&access).await?;

        metrics::counter!("oidc_tokens_issued_total", "kind" => "access_token").increment(1);
        metrics::counter!("oidc_tokens_issued_total", "kind" => "refresh_token").increment(1);
        debug!(
            token_id = %access.id,
            client_id = %access.client_id,
            "Issued access and refresh token"
        );

        Ok(IssuedTokens {
            access_token_id: access.id,
            refresh_token: Some(refresh.id),
            expires_at: access.expires_at,
        })
    }

    /// 由 Refresh Token 还原令牌请求
    pub async fn refresh_token_request(
        &self,
        ctx: &RequestContext,
        token: &str,
    ) -> AppResult<RefreshTokenRequest> {
        let refresh = self.load_refresh_token(ctx, token).await?;
        Ok(RefreshTokenRequest::from(&refresh))
    }

    /// 返回 `(subject, token_id)`，令牌必须签发给 `client_id`
    pub async fn refresh_token_info(
        &self,
        ctx: &RequestContext,
        client_id: &ClientId,
        token: &str,
    ) -> AppResult<(String, String)> {
        let refresh = self.load_refresh_token(ctx, token).await?;
        if &refresh.client_id != client_id {
            warn!(client_id = %client_id, "Refresh token info requested by another client");
            return Err(OidcError::InvalidRefreshToken.into());
        }
        Ok((refresh.subject, refresh.id))
    }

    async fn load_refresh_token(&self, ctx: &RequestContext, token: &str) -> AppResult<RefreshToken> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.refresh_tokens().find_by_id(token).await;
        finish(uow, result)
            .await?
            .filter(|t| !t.is_expired())
            .ok_or_else(|| OidcError::InvalidRefreshToken.into())
    }

    /// 撤销令牌
    ///
    /// 先按 Access Token 解析，再按 Refresh Token 解析；两者都不存在时视为成功。
    pub async fn revoke_token(
        &self,
        ctx: &RequestContext,
        token: &str,
        subject: &str,
        client_id: &ClientId,
    ) -> AppResult<()> {
        debug!(client_id = %client_id, subject, "Revoking token");

        let uow = self.uow_factory.begin(ctx).await?;
        let result = self.revoke(uow.as_ref(), token, client_id).await;
        let kind = finish(uow, result).await?;

        match kind {
            Some(kind) => {
                metrics::counter!("oidc_tokens_revoked_total", "kind" => kind).increment(1);
                info!(client_id = %client_id, kind, "Token revoked");
            }
            None => debug!(client_id = %client_id, "Revoked token was already invalid"),
        }
        Ok(())
    }

    async fn revoke(
        &self,
        uow: &dyn UnitOfWork,
        token: &str,
        client_id: &ClientId,
    ) -> AppResult<Option<&'static str>> {
        if let Ok(id) = Uuid::parse_str(token) {
            if let Some(access) = uow.access_tokens().find_by_id_for_update(&id).await? {
                if &access.client_id != client_id {
                    warn!(client_id = %client_id, "Revocation of token issued to another client");
                    return Err(OidcError::TokenNotIssuedForClient.into());
                }
                uow.access_tokens().delete(&access.id).await?;
                return Ok(Some("access_token"));
            }
        }

        let Some(refresh) = uow.refresh_tokens().take(token).await? else {
            return Ok(None);
        };
        if &refresh.client_id != client_id {
            warn!(client_id = %client_id, "Revocation of token issued to another client");
            return Err(OidcError::TokenNotIssuedForClient.into());
        }
        uow.access_tokens()
            .delete_by_refresh_token_id(&refresh.id)
            .await?;
        Ok(Some("refresh_token"))
    }

    /// 终止会话：删除 (client, subject) 下的全部令牌
    pub async fn terminate_session(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        client_id: &ClientId,
    ) -> AppResult<()> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = self.delete_session(uow.as_ref(), user_id, client_id).await;
        let (access, refresh) = finish(uow, result).await?;

        info!(
            client_id = %client_id,
            user_id,
            access_tokens = access,
            refresh_tokens = refresh,
            "Session terminated"
        );
        Ok(())
    }

    async fn delete_session(
        &self,
        uow: &dyn UnitOfWork,
        user_id: &str,
        client_id: &ClientId,
    ) -> AppResult<(u64, u64)> {
        let refresh = uow
            .refresh_tokens()
            .delete_by_session(client_id, user_id)
            .await?;
        let access = uow
            .access_tokens()
            .delete_by_session(client_id, user_id)
            .await?;
        Ok((access, refresh))
    }
}
