//! 身份 Claims 组装
//!
//! 按授予的 scope 把用户资料映射为 userinfo / id_token claims。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;
use uuid::Uuid;
use xoidc_common::{ClientId, RequestContext, UserId};
use xoidc_config::ClaimsConfig;
use xoidc_errors::AppResult;

use crate::domain::entities::{AccessToken, TokenExchangeRequest, User};
use crate::domain::unit_of_work::{UnitOfWorkFactory, finish};
use crate::error::OidcError;

pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_EMAIL: &str = "email";
pub const SCOPE_PROFILE: &str = "profile";
pub const SCOPE_PHONE: &str = "phone";

/// OIDC userinfo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
    /// 扩展 claims
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl UserInfo {
    pub fn append_claim(&mut self, key: impl Into<String>, value: Value) {
        self.claims.insert(key.into(), value);
    }
}

/// 令牌内省结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(flatten)]
    pub user_info: UserInfo,
    pub scope: Vec<String>,
    pub client_id: ClientId,
}

/// 自定义 scope 的扩展 claims
pub trait ClaimsExtension: Send + Sync {
    fn custom_claims(&self, client_id: &ClientId) -> Value;
}

/// 默认扩展：回显 client id
pub struct DefaultClaimsExtension;

impl ClaimsExtension for DefaultClaimsExtension {
    fn custom_claims(&self, client_id: &ClientId) -> Value {
        json!({
            "client": client_id.to_string(),
            "other": "stuff",
        })
    }
}

pub struct ClaimsAssembler {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    extension: Arc<dyn ClaimsExtension>,
    custom_scope: String,
    custom_claim: String,
}

impl ClaimsAssembler {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>, config: &ClaimsConfig) -> Self {
        Self {
            uow_factory,
            extension: Arc::new(DefaultClaimsExtension),
            custom_scope: config.custom_scope.clone(),
            custom_claim: config.custom_claim.clone(),
        }
    }

    pub fn with_extension(mut self, extension: Arc<dyn ClaimsExtension>) -> Self {
        self.extension = extension;
        self
    }

    /// 纯映射，无副作用
    pub fn assemble(&self, user: &User, client_id: &ClientId, scopes: &[String]) -> UserInfo {
        let mut info = UserInfo::default();

        for scope in scopes {
            match scope.as_str() {
                SCOPE_OPENID => info.sub = Some(user.id.to_string()),
                SCOPE_EMAIL => {
                    info.email = Some(user.email.clone());
                    info.email_verified = Some(user.email_verified);
                }
                SCOPE_PROFILE => {
                    info.preferred_username = Some(user.username.clone());
                    info.name = Some(user.display_name());
                    info.given_name = Some(user.given_name.clone());
                    info.family_name = Some(user.family_name.clone());
                    info.locale = user.locale.clone();
                }
                SCOPE_PHONE => {
                    info.phone_number = Some(user.phone.clone());
                    info.phone_number_verified = Some(user.phone_verified);
                }
                s if s == self.custom_scope => {
                    info.append_claim(
                        self.custom_claim.clone(),
                        self.extension.custom_claims(client_id),
                    );
                }
                _ => {}
            }
        }

        info
    }

    /// 加载用户并组装 claims
    pub async fn build_user_info(
        &self,
        ctx: &RequestContext,
        subject: &str,
        client_id: &ClientId,
        scopes: &[String],
    ) -> AppResult<UserInfo> {
        let user_id = UserId::from_string(subject).map_err(|_| OidcError::UserNotFound)?;

        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.users().find_by_id(&user_id).await;
        let user = finish(uow, result).await?.ok_or(OidcError::UserNotFound)?;

        Ok(self.assemble(&user, client_id, scopes))
    }

    /// userinfo 端点：按 access token 组装
    pub async fn user_info_from_token(
        &self,
        ctx: &RequestContext,
        token_id: &str,
    ) -> AppResult<UserInfo> {
        let token = self.load_live_token(ctx, token_id).await?;
        self.build_user_info(ctx, &token.subject, &token.client_id, &token.scopes)
            .await
    }

    /// 令牌内省，调用方 client 必须在令牌 audience 内
    pub async fn introspect(
        &self,
        ctx: &RequestContext,
        token_id: &str,
        client_id: &ClientId,
    ) -> AppResult<Introspection> {
        let token = self.load_live_token(ctx, token_id).await?;

        let caller = client_id.to_string();
        if !token.audience.iter().any(|aud| aud == &caller) {
            debug!(client_id = %client_id, "Introspecting client not in audience");
            return Err(OidcError::AudienceMismatch.into());
        }

        let user_info = self
            .build_user_info(ctx, &token.subject, &token.client_id, &token.scopes)
            .await?;

        Ok(Introspection {
            active: true,
            user_info,
            scope: token.scopes,
            client_id: token.client_id,
        })
    }

    async fn load_live_token(&self, ctx: &RequestContext, token_id: &str) -> AppResult<AccessToken> {
        let id = Uuid::parse_str(token_id).map_err(|_| OidcError::TokenInactive)?;

        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.access_tokens().find_by_id(&id).await;
        finish(uow, result)
            .await?
            .filter(|t| !t.is_expired())
            .ok_or_else(|| OidcError::TokenInactive.into())
    }

    /// JWT access token 的私有 claims
    pub fn private_claims(&self, client_id: &ClientId, scopes: &[String]) -> Map<String, Value> {
        let mut claims = Map::new();
        if scopes.iter().any(|s| s == &self.custom_scope) {
            claims.insert(
                self.custom_claim.clone(),
                self.extension.custom_claims(client_id),
            );
        }
        claims
    }

    /// token exchange 专有 claims：模拟时附加 `act`
    pub fn exchange_claims(&self, request: &TokenExchangeRequest) -> Map<String, Value> {
        let mut claims = Map::new();
        if let Some(act) = &request.act {
            claims.insert("act".to_string(), json!({ "sub": act.sub }));
        }
        claims
    }

    pub fn private_claims_for_exchange(&self, request: &TokenExchangeRequest) -> Map<String, Value> {
        let mut claims = self.private_claims(&request.client_id, &request.scopes);
        claims.extend(self.exchange_claims(request));
        claims
    }

    /// 交换令牌的 id_token claims
    pub async fn user_info_for_exchange(
        &self,
        ctx: &RequestContext,
        request: &TokenExchangeRequest,
    ) -> AppResult<UserInfo> {
        let mut info = self
            .build_user_info(ctx, &request.subject, &request.client_id, &request.scopes)
            .await?;
        info.claims.extend(self.exchange_claims(request));
        Ok(info)
    }

    /// JWT Profile 授权只允许 `openid`
    pub fn validate_jwt_profile_scopes(&self, scopes: &[String]) -> Vec<String> {
        scopes
            .iter()
            .filter(|s| s.as_str() == SCOPE_OPENID)
            .cloned()
            .collect()
    }
}
