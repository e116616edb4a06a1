//! 数据库行结构与领域实体的转换

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use xoidc_common::{ClientId, NamespaceId, UserId};
use xoidc_errors::{AppError, AppResult};

use crate::domain::entities::{
    AccessToken, AccessTokenType, ApplicationType, AuthCode, AuthMethod, AuthRequest,
    CodeChallenge, CodeChallengeMethod, Client, DeviceAuthorization, GrantType, RefreshToken,
    ResponseType, User,
};

#[derive(sqlx::FromRow)]
pub struct AuthRequestRow {
    pub id: Uuid,
    pub creation_date: DateTime<Utc>,
    pub client_id: Uuid,
    pub redirect_uri: String,
    pub response_type: String,
    pub response_mode: Option<String>,
    pub state: Option<String>,
    pub scopes: Vec<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub prompt: Vec<String>,
    pub ui_locales: Vec<String>,
    pub login_hint: Option<String>,
    pub max_age_secs: Option<i64>,
    pub user_id: Option<Uuid>,
    pub is_done: bool,
    pub auth_time: Option<DateTime<Utc>>,
}

impl TryFrom<AuthRequestRow> for AuthRequest {
    type Error = AppError;

    fn try_from(row: AuthRequestRow) -> AppResult<Self> {
        let code_challenge = match row.code_challenge {
            Some(challenge) => {
                let method =
                    CodeChallengeMethod::parse(row.code_challenge_method.as_deref().unwrap_or(""))?;
                Some(CodeChallenge::new(challenge, method))
            }
            None => None,
        };

        Ok(Self {
            id: row.id,
            created_at: row.creation_date,
            client_id: ClientId::from_uuid(row.client_id),
            redirect_uri: row.redirect_uri,
            response_type: row.response_type,
            response_mode: row.response_mode,
            state: row.state,
            scopes: row.scopes,
            nonce: row.nonce,
            code_challenge,
            prompt: row.prompt,
            ui_locales: row.ui_locales,
            login_hint: row.login_hint,
            max_age_secs: row.max_age_secs,
            user_id: row.user_id.map(UserId::from_uuid),
            is_done: row.is_done,
            auth_time: row.auth_time,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct AuthCodeRow {
    pub code: String,
    pub request_id: Uuid,
    pub create_time: DateTime<Utc>,
}

impl From<AuthCodeRow> for AuthCode {
    fn from(row: AuthCodeRow) -> Self {
        Self {
            code: row.code,
            request_id: row.request_id,
            created_at: row.create_time,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct AccessTokenRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub subject: String,
    pub refresh_token_id: Option<String>,
    pub audience: Vec<String>,
    pub expiration: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl From<AccessTokenRow> for AccessToken {
    fn from(row: AccessTokenRow) -> Self {
        Self {
            id: row.id,
            client_id: ClientId::from_uuid(row.client_id),
            subject: row.subject,
            refresh_token_id: row.refresh_token_id,
            audience: row.audience,
            scopes: row.scopes,
            expires_at: row.expiration,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct RefreshTokenRow {
    pub id: String,
    pub auth_time: Option<DateTime<Utc>>,
    pub amr: Vec<String>,
    pub audience: Vec<String>,
    pub subject: String,
    pub client_id: Uuid,
    pub expiration: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            auth_time: row.auth_time,
            amr: row.amr,
            audience: row.audience,
            subject: row.subject,
            client_id: ClientId::from_uuid(row.client_id),
            scopes: row.scopes,
            expires_at: row.expiration,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct ClientRow {
    pub id: Uuid,
    pub secret: Option<String>,
    pub redirect_uris: Vec<String>,
    pub redirect_uri_globs: Vec<String>,
    pub post_logout_redirect_uri_globs: Vec<String>,
    pub application_type: String,
    pub auth_method: String,
    pub response_types: Vec<String>,
    pub grant_types: Vec<String>,
    pub access_token_type: String,
    pub dev_mode: bool,
    pub id_token_userinfo_assertion: bool,
    pub clock_skew_ms: i64,
    pub namespace_id: Uuid,
    pub name: String,
}

impl TryFrom<ClientRow> for Client {
    type Error = AppError;

    fn try_from(row: ClientRow) -> AppResult<Self> {
        let response_types = row
            .response_types
            .iter()
            .map(|s| ResponseType::parse(s))
            .collect::<AppResult<Vec<_>>>()?;
        let grant_types = row
            .grant_types
            .iter()
            .map(|s| GrantType::parse(s))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            id: ClientId::from_uuid(row.id),
            secret_hash: row.secret,
            redirect_uris: row.redirect_uris,
            redirect_uri_globs: row.redirect_uri_globs,
            post_logout_redirect_uri_globs: row.post_logout_redirect_uri_globs,
            application_type: ApplicationType::parse(&row.application_type)?,
            auth_method: AuthMethod::parse(&row.auth_method)?,
            response_types,
            grant_types,
            access_token_type: AccessTokenType::parse(&row.access_token_type)?,
            dev_mode: row.dev_mode,
            id_token_userinfo_claims_assertion: row.id_token_userinfo_assertion,
            clock_skew: Duration::milliseconds(row.clock_skew_ms),
            namespace_id: NamespaceId::from_uuid(row.namespace_id),
            name: row.name,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct DeviceCodeRow {
    pub device_code: String,
    pub user_code: String,
    pub client_id: Uuid,
    pub scopes: Vec<String>,
    pub expires: DateTime<Utc>,
    pub subject: Option<String>,
    pub done: bool,
    pub denied: bool,
}

impl From<DeviceCodeRow> for DeviceAuthorization {
    fn from(row: DeviceCodeRow) -> Self {
        Self {
            device_code: row.device_code,
            user_code: row.user_code,
            client_id: ClientId::from_uuid(row.client_id),
            scopes: row.scopes,
            expires_at: row.expires,
            subject: row.subject,
            done: row.done,
            denied: row.denied,
        }
    }
}

#[derive(sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub namespace_id: Uuid,
    pub username: String,
    pub password_digest: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub email_verified: bool,
    pub phone: String,
    pub phone_verified: bool,
    pub locale: Option<String>,
    pub is_admin: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId::from_uuid(row.id),
            namespace_id: NamespaceId::from_uuid(row.namespace_id),
            username: row.username,
            password_hash: row.password_digest,
            given_name: row.given_name,
            family_name: row.family_name,
            email: row.email,
            email_verified: row.email_verified,
            phone: row.phone,
            phone_verified: row.phone_verified,
            locale: row.locale,
            is_admin: row.is_admin,
        }
    }
}

pub fn enum_texts<T: std::fmt::Display>(values: &[T]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_row() -> ClientRow {
        ClientRow {
            id: Uuid::new_v4(),
            secret: None,
            redirect_uris: vec!["custom://cb".into()],
            redirect_uri_globs: vec![],
            post_logout_redirect_uri_globs: vec![],
            application_type: "native".into(),
            auth_method: "none".into(),
            response_types: vec!["code".into()],
            grant_types: vec![
                "authorization_code".into(),
                "urn:ietf:params:oauth:grant-type:device_code".into(),
            ],
            access_token_type: "bearer".into(),
            dev_mode: false,
            id_token_userinfo_assertion: false,
            clock_skew_ms: 1500,
            namespace_id: Uuid::new_v4(),
            name: "app".into(),
        }
    }

    #[test]
    fn test_client_row_conversion() {
        let client = Client::try_from(client_row()).unwrap();
        assert_eq!(client.auth_method, AuthMethod::None);
        assert!(client.allows_grant(GrantType::DeviceCode));
        assert_eq!(client.clock_skew, Duration::milliseconds(1500));
        assert_eq!(enum_texts(&client.grant_types)[0], "authorization_code");
    }

    #[test]
    fn test_client_row_rejects_unknown_enum() {
        let mut row = client_row();
        row.auth_method = "magic".into();
        assert!(Client::try_from(row).is_err());
    }

    #[test]
    fn test_auth_request_row_without_challenge() {
        let row = AuthRequestRow {
            id: Uuid::now_v7(),
            creation_date: Utc::now(),
            client_id: Uuid::new_v4(),
            redirect_uri: "custom://cb".into(),
            response_type: "code".into(),
            response_mode: None,
            state: None,
            scopes: vec!["openid".into()],
            nonce: None,
            code_challenge: Some("abc".into()),
            code_challenge_method: None,
            prompt: vec![],
            ui_locales: vec![],
            login_hint: None,
            max_age_secs: None,
            user_id: None,
            is_done: false,
            auth_time: None,
        };
        let request = AuthRequest::try_from(row).unwrap();
        assert_eq!(
            request.code_challenge.map(|c| c.method),
            Some(CodeChallengeMethod::Plain)
        );
    }
}
