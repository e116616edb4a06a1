//! Authorization Request 实体

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use xoidc_common::{ClientId, UserId};
use xoidc_errors::{AppError, AppResult};

use super::TokenRequest;

/// PKCE 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    Plain,
    S256,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "plain" | "" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            other => Err(AppError::validation(format!(
                "unsupported code_challenge_method: {}",
                other
            ))),
        }
    }
}

/// PKCE code challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

impl CodeChallenge {
    pub fn new(challenge: impl Into<String>, method: CodeChallengeMethod) -> Self {
        Self {
            challenge: challenge.into(),
            method,
        }
    }

    /// 校验 code_verifier
    pub fn verify(&self, verifier: &str) -> bool {
        match self.method {
            CodeChallengeMethod::S256 => {
                let digest = Sha256::digest(verifier.as_bytes());
                general_purpose::URL_SAFE_NO_PAD.encode(digest) == self.challenge
            }
            CodeChallengeMethod::Plain => verifier == self.challenge,
        }
    }
}

/// 端点层解析出的授权请求参数
#[derive(Debug, Clone, Default)]
pub struct AuthorizationParams {
    /// 为空时由存储分配
    pub id: Option<Uuid>,
    pub client_id: ClientId,
    pub redirect_uri: String,
    pub response_type: String,
    pub response_mode: Option<String>,
    pub state: Option<String>,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<CodeChallenge>,
    pub prompt: Vec<String>,
    pub ui_locales: Vec<String>,
    pub login_hint: Option<String>,
    pub max_age_secs: Option<i64>,
}

impl AuthorizationParams {
    /// prompt 恰好为 `none`
    pub fn is_prompt_none(&self) -> bool {
        self.prompt.len() == 1 && self.prompt[0] == "none"
    }
}

/// 进行中的交互式授权请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub client_id: ClientId,
    pub redirect_uri: String,
    pub response_type: String,
    pub response_mode: Option<String>,
    pub state: Option<String>,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<CodeChallenge>,
    pub prompt: Vec<String>,
    pub ui_locales: Vec<String>,
    pub login_hint: Option<String>,
    pub max_age_secs: Option<i64>,
    /// 登录完成前为空
    pub user_id: Option<UserId>,
    pub is_done: bool,
    pub auth_time: Option<DateTime<Utc>>,
}

impl AuthRequest {
    pub fn from_params(params: AuthorizationParams) -> Self {
        Self {
            id: params.id.unwrap_or_else(Uuid::now_v7),
            created_at: Utc::now(),
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            response_type: params.response_type,
            response_mode: params.response_mode,
            state: params.state,
            scopes: params.scopes,
            nonce: params.nonce,
            code_challenge: params.code_challenge,
            prompt: params.prompt,
            ui_locales: params.ui_locales,
            login_hint: params.login_hint,
            max_age_secs: params.max_age_secs,
            user_id: None,
            is_done: false,
            auth_time: None,
        }
    }

    /// 标记登录完成，之后视为不可变
    pub fn complete(&mut self, user_id: UserId) {
        self.user_id = Some(user_id);
        self.is_done = true;
        self.auth_time = Some(Utc::now());
    }

    /// 是否超过有效期
    pub fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() > self.created_at + ttl
    }

    /// 认证方式引用，仅支持密码登录
    pub fn amr(&self) -> Vec<String> {
        if self.is_done {
            vec!["pwd".to_string()]
        } else {
            Vec::new()
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

impl TokenRequest for AuthRequest {
    fn subject(&self) -> String {
        self.user_id.map(|u| u.to_string()).unwrap_or_default()
    }

    fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// audience 总是 client_id
    fn audience(&self) -> Vec<String> {
        vec![self.client_id.to_string()]
    }

    fn scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    fn auth_time(&self) -> Option<DateTime<Utc>> {
        self.auth_time
    }

    fn amr(&self) -> Vec<String> {
        AuthRequest::amr(self)
    }
}

/// 授权码到请求 ID 的映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCode {
    pub code: String,
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl AuthCode {
    pub fn new(code: impl Into<String>, request_id: Uuid) -> Self {
        Self {
            code: code.into(),
            request_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() > self.created_at + ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_s256() {
        // RFC 7636 附录 B
        let challenge = CodeChallenge::new(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            CodeChallengeMethod::S256,
        );
        assert!(challenge.verify("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"));
        assert!(!challenge.verify("wrong"));
    }

    #[test]
    fn test_pkce_plain() {
        let challenge = CodeChallenge::new("abc", CodeChallengeMethod::Plain);
        assert!(challenge.verify("abc"));
        assert!(!challenge.verify("abd"));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(CodeChallengeMethod::parse("S256").unwrap(), CodeChallengeMethod::S256);
        assert_eq!(CodeChallengeMethod::parse("").unwrap(), CodeChallengeMethod::Plain);
        assert!(CodeChallengeMethod::parse("S512").is_err());
    }

    #[test]
    fn test_new_request_is_pending() {
        let req = AuthRequest::from_params(AuthorizationParams {
            client_id: ClientId::new(),
            scopes: vec!["openid".to_string()],
            ..Default::default()
        });
        assert!(!req.is_done);
        assert!(req.user_id.is_none());
        assert!(req.auth_time.is_none());
        assert!(req.amr().is_empty());
    }

    #[test]
    fn test_complete_sets_user_and_amr() {
        let mut req = AuthRequest::from_params(AuthorizationParams {
            client_id: ClientId::new(),
            ..Default::default()
        });
        let user = UserId::new();
        req.complete(user);
        assert!(req.is_done);
        assert_eq!(req.user_id, Some(user));
        assert!(req.auth_time.is_some());
        assert_eq!(req.amr(), vec!["pwd".to_string()]);
        assert_eq!(TokenRequest::subject(&req), user.to_string());
        assert_eq!(TokenRequest::audience(&req), vec![req.client_id.to_string()]);
    }

    #[test]
    fn test_prompt_none_detection() {
        let mut params = AuthorizationParams {
            prompt: vec!["none".to_string()],
            ..Default::default()
        };
        assert!(params.is_prompt_none());
        params.prompt.push("login".to_string());
        assert!(!params.is_prompt_none());
    }
}
