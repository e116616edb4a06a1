//! OAuth Client 实体

use chrono::Duration;
use serde::{Deserialize, Serialize};
use xoidc_common::{ClientId, NamespaceId};
use xoidc_errors::{AppError, AppResult};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> AppResult<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(AppError::validation(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// 应用类型
    ApplicationType {
        Web => "web",
        UserAgent => "user_agent",
        Native => "native",
    }
);

string_enum!(
    /// Token 端点认证方式
    AuthMethod {
        Basic => "client_secret_basic",
        Post => "client_secret_post",
        None => "none",
        PrivateKeyJwt => "private_key_jwt",
    }
);

string_enum!(
    ResponseType {
        Code => "code",
        IdToken => "id_token",
        IdTokenToken => "id_token token",
    }
);

string_enum!(
    GrantType {
        AuthorizationCode => "authorization_code",
        RefreshToken => "refresh_token",
        ClientCredentials => "client_credentials",
        DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        TokenExchange => "urn:ietf:params:oauth:grant-type:token-exchange",
        JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
    }
);

string_enum!(
    AccessTokenType {
        Bearer => "bearer",
        Jwt => "jwt",
    }
);

/// OAuth Client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    /// Argon2id 摘要，auth method 为 none 时为空
    pub secret_hash: Option<String>,
    pub redirect_uris: Vec<String>,
    pub redirect_uri_globs: Vec<String>,
    pub post_logout_redirect_uri_globs: Vec<String>,
    pub application_type: ApplicationType,
    pub auth_method: AuthMethod,
    pub response_types: Vec<ResponseType>,
    pub grant_types: Vec<GrantType>,
    pub access_token_type: AccessTokenType,
    /// 开发模式放宽 redirect 校验并启用 glob
    pub dev_mode: bool,
    pub id_token_userinfo_claims_assertion: bool,
    pub clock_skew: Duration,
    pub namespace_id: NamespaceId,
    pub name: String,
}

impl Client {
    fn base(
        id: ClientId,
        namespace_id: NamespaceId,
        name: impl Into<String>,
        application_type: ApplicationType,
        auth_method: AuthMethod,
    ) -> Self {
        Self {
            id,
            secret_hash: None,
            redirect_uris: Vec::new(),
            redirect_uri_globs: Vec::new(),
            post_logout_redirect_uri_globs: Vec::new(),
            application_type,
            auth_method,
            response_types: vec![ResponseType::Code],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            access_token_type: AccessTokenType::Bearer,
            dev_mode: false,
            id_token_userinfo_claims_assertion: false,
            clock_skew: Duration::zero(),
            namespace_id,
            name: name.into(),
        }
    }

    /// Native 客户端：只用 PKCE，不需要 secret
    pub fn native(
        id: ClientId,
        namespace_id: NamespaceId,
        name: impl Into<String>,
        redirect_uris: Vec<String>,
    ) -> Self {
        let mut client = Self::base(
            id,
            namespace_id,
            name,
            ApplicationType::Native,
            AuthMethod::None,
        );
        client.redirect_uris = if redirect_uris.is_empty() {
            vec![
                "http://localhost/auth/callback".to_string(),
                "custom://auth/callback".to_string(),
            ]
        } else {
            redirect_uris
        };
        client
    }

    /// Web 客户端：Basic Auth
    pub fn web(
        id: ClientId,
        namespace_id: NamespaceId,
        name: impl Into<String>,
        secret_hash: String,
        redirect_uris: Vec<String>,
    ) -> Self {
        let mut client = Self::base(id, namespace_id, name, ApplicationType::Web, AuthMethod::Basic);
        client.secret_hash = Some(secret_hash);
        client.redirect_uris = if redirect_uris.is_empty() {
            vec!["http://localhost:9999/auth/callback".to_string()]
        } else {
            redirect_uris
        };
        client
    }

    /// 设备流客户端
    pub fn device(
        id: ClientId,
        namespace_id: NamespaceId,
        name: impl Into<String>,
        secret_hash: String,
    ) -> Self {
        let mut client = Self::base(id, namespace_id, name, ApplicationType::Web, AuthMethod::Basic);
        client.secret_hash = Some(secret_hash);
        client.grant_types = vec![GrantType::DeviceCode];
        client
    }

    pub fn with_dev_mode(mut self, globs: Vec<String>) -> Self {
        self.dev_mode = true;
        self.redirect_uri_globs = globs;
        self
    }

    pub fn with_grant_types(mut self, grant_types: Vec<GrantType>) -> Self {
        self.grant_types = grant_types;
        self
    }

    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// 仅开发模式下暴露 redirect glob
    pub fn effective_redirect_uri_globs(&self) -> &[String] {
        if self.dev_mode {
            &self.redirect_uri_globs
        } else {
            &[]
        }
    }

    pub fn effective_post_logout_redirect_uri_globs(&self) -> &[String] {
        if self.dev_mode {
            &self.post_logout_redirect_uri_globs
        } else {
            &[]
        }
    }

    /// redirect_uri 是否允许
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
            || self
                .effective_redirect_uri_globs()
                .iter()
                .any(|pattern| glob_match(pattern, uri))
    }
}

/// 简单 glob：`*` 匹配任意串，`?` 匹配单个字符
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
