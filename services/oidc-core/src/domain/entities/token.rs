//! Access / Refresh Token 实体

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xoidc_common::ClientId;

use super::TokenExchangeRequest;

/// Access Token
///
/// 创建后不可变，撤销或级联删除时整行删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: Uuid,
    pub client_id: ClientId,
    pub subject: String,
    /// 关联的 Refresh Token，删除 Refresh Token 时一并删除
    pub refresh_token_id: Option<String>,
    pub audience: Vec<String>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(
        client_id: ClientId,
        refresh_token_id: Option<String>,
        subject: impl Into<String>,
        audience: Vec<String>,
        scopes: Vec<String>,
        lifetime: Duration,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            client_id,
            subject: subject.into(),
            refresh_token_id,
            audience,
            scopes,
            expires_at: Utc::now() + lifetime,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn belongs_to_session(&self, client_id: &ClientId, subject: &str) -> bool {
        &self.client_id == client_id && self.subject == subject
    }
}

/// Refresh Token，id 即为下发给客户端的令牌值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: String,
    pub auth_time: Option<DateTime<Utc>>,
    pub amr: Vec<String>,
    pub audience: Vec<String>,
    pub subject: String,
    pub client_id: ClientId,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn belongs_to_session(&self, client_id: &ClientId, subject: &str) -> bool {
        &self.client_id == client_id && self.subject == subject
    }

    /// 生成新的令牌值（32 字节随机数，URL 安全 base64）
    pub fn generate_id() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// 可换取令牌的请求
pub trait TokenRequest: Send + Sync {
    fn subject(&self) -> String;

    fn client_id(&self) -> ClientId;

    fn audience(&self) -> Vec<String>;

    fn scopes(&self) -> Vec<String>;

    fn auth_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn amr(&self) -> Vec<String> {
        Vec::new()
    }

    /// token exchange 请求走独立的签发路径
    fn as_token_exchange(&self) -> Option<&TokenExchangeRequest> {
        None
    }
}

/// 由 Refresh Token 还原出的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub token_id: String,
    pub subject: String,
    pub client_id: ClientId,
    pub audience: Vec<String>,
    pub scopes: Vec<String>,
    pub amr: Vec<String>,
    pub auth_time: Option<DateTime<Utc>>,
}

impl RefreshTokenRequest {
    /// 缩小 scope，只能是原有 scope 的子集
    pub fn restrict_scopes(&mut self, requested: &[String]) {
        if requested.is_empty() {
            return;
        }
        self.scopes.retain(|s| requested.contains(s));
    }
}

impl From<&RefreshToken> for RefreshTokenRequest {
    fn from(token: &RefreshToken) -> Self {
        Self {
            token_id: token.id.clone(),
            subject: token.subject.clone(),
            client_id: token.client_id,
            audience: token.audience.clone(),
            scopes: token.scopes.clone(),
            amr: token.amr.clone(),
            auth_time: token.auth_time,
        }
    }
}

impl TokenRequest for RefreshTokenRequest {
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

    fn amr(&self) -> Vec<String> {
        self.amr.clone()
    }
}

/// client_credentials 授权生成的请求，subject 为 client 自身
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentialsRequest {
    pub client_id: ClientId,
    pub scopes: Vec<String>,
}

impl TokenRequest for ClientCredentialsRequest {
    fn subject(&self) -> String {
        self.client_id.to_string()
    }

    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn audience(&self) -> Vec<String> {
        vec![self.client_id.to_string()]
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }
}

/// 令牌签发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub access_token_id: Uuid,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}
