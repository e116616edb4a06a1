//! Token Exchange 请求（RFC 8693）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xoidc_common::ClientId;
use xoidc_errors::{AppError, AppResult};

use super::TokenRequest;

/// 令牌类型标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    AccessToken,
    RefreshToken,
    IdToken,
    Jwt,
}

impl TokenType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::AccessToken => "urn:ietf:params:oauth:token-type:access_token",
            Self::RefreshToken => "urn:ietf:params:oauth:token-type:refresh_token",
            Self::IdToken => "urn:ietf:params:oauth:token-type:id_token",
            Self::Jwt => "urn:ietf:params:oauth:token-type:jwt",
        }
    }

    pub fn from_urn(urn: &str) -> AppResult<Self> {
        match urn {
            "urn:ietf:params:oauth:token-type:access_token" => Ok(Self::AccessToken),
            "urn:ietf:params:oauth:token-type:refresh_token" => Ok(Self::RefreshToken),
            "urn:ietf:params:oauth:token-type:id_token" => Ok(Self::IdToken),
            "urn:ietf:params:oauth:token-type:jwt" => Ok(Self::Jwt),
            other => Err(AppError::validation(format!("unknown token type: {}", other))),
        }
    }
}

/// `act` claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorClaim {
    pub sub: String,
}

/// Token Exchange 请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenExchangeRequest {
    pub client_id: ClientId,
    pub subject_token_type: TokenType,
    pub requested_token_type: Option<TokenType>,
    /// subject_token 的主体，即发起交换的用户
    pub exchange_subject: String,
    /// actor_token 的主体，存在时为委托
    pub exchange_actor: Option<String>,
    /// 最终签发令牌的主体，模拟时被改写
    pub subject: String,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
    pub auth_time: Option<DateTime<Utc>>,
    /// 校验通过后填充
    pub act: Option<ActorClaim>,
}

impl TokenExchangeRequest {
    pub fn new(
        client_id: ClientId,
        subject_token_type: TokenType,
        exchange_subject: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        let exchange_subject = exchange_subject.into();
        Self {
            client_id,
            subject_token_type,
            requested_token_type: None,
            subject: exchange_subject.clone(),
            exchange_subject,
            exchange_actor: None,
            scopes,
            audience: vec![client_id.to_string()],
            auth_time: None,
            act: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.exchange_actor = Some(actor.into());
        self
    }

    pub fn with_requested_token_type(mut self, token_type: TokenType) -> Self {
        self.requested_token_type = Some(token_type);
        self
    }

    pub fn with_audience(mut self, audience: Vec<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn is_delegation(&self) -> bool {
        self.exchange_actor.as_deref().is_some_and(|a| !a.is_empty())
    }
}

impl TokenRequest for TokenExchangeRequest {
    fn subject(&self) -> String {
        self.subject.clone()
    }

    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn audience(&self) -> Vec<String> {
        self.audience.clone()
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    fn auth_time(&self) -> Option<DateTime<Utc>> {
        self.auth_time
    }

    fn as_token_exchange(&self) -> Option<&TokenExchangeRequest> {
        Some(self)
    }
}
