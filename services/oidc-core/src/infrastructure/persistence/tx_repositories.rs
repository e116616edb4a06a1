//! 事务感知的 Repository 实现
//!
//! 这些 Repository 共享同一个 Transaction，每条语句都在请求上下文内执行。

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use xoidc_common::{ClientId, NamespaceId, Pagination, RequestContext, UserId};
use xoidc_errors::{AppError, AppResult};

use crate::domain::entities::{
    AccessToken, AuthCode, AuthRequest, Client, DeviceAuthorization, RefreshToken, User,
};
use crate::domain::repositories::{
    AccessTokenRepository, AuthCodeRepository, AuthRequestRepository, ClientRepository,
    DeviceAuthorizationRepository, RefreshTokenRepository, UserRepository,
};
use crate::error::OidcError;

use super::rows::{
    AccessTokenRow, AuthCodeRow, AuthRequestRow, ClientRow, DeviceCodeRow, RefreshTokenRow,
    UserRow, enum_texts,
};

/// 共享事务类型
pub type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// 宏：定义一个简单的 TxRepository 结构体
macro_rules! define_tx_repo {
    ($name:ident) => {
        pub struct $name {
            tx: SharedTx,
            ctx: RequestContext,
        }

        impl $name {
            pub fn new(tx: SharedTx, ctx: RequestContext) -> Self {
                Self { tx, ctx }
            }
        }
    };
}

/// 宏：取出共享事务并在请求上下文内执行
macro_rules! with_tx {
    ($repo:ident, $tx:ident => $body:expr) => {{
        let mut guard = $repo.tx.lock().await;
        let $tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;
        $repo.ctx.run(async { $body }).await
    }};
}

define_tx_repo!(TxAuthRequestRepository);
define_tx_repo!(TxAuthCodeRepository);
define_tx_repo!(TxAccessTokenRepository);
define_tx_repo!(TxRefreshTokenRepository);
define_tx_repo!(TxClientRepository);
define_tx_repo!(TxDeviceAuthorizationRepository);
define_tx_repo!(TxUserRepository);

const AUTH_REQUEST_COLUMNS: &str = "id, creation_date, client_id, redirect_uri, response_type, \
     response_mode, state, scopes, nonce, code_challenge, code_challenge_method, prompt, \
     ui_locales, login_hint, max_age_secs, user_id, is_done, auth_time";

const ACCESS_TOKEN_COLUMNS: &str =
    "id, client_id, subject, refresh_token_id, audience, expiration, scopes";

const REFRESH_TOKEN_COLUMNS: &str =
    "id, auth_time, amr, audience, subject, client_id, expiration, scopes";

const CLIENT_COLUMNS: &str = "id, secret, redirect_uris, redirect_uri_globs, \
     post_logout_redirect_uri_globs, application_type, auth_method, response_types, \
     grant_types, access_token_type, dev_mode, id_token_userinfo_assertion, clock_skew_ms, \
     namespace_id, name";

const DEVICE_CODE_COLUMNS: &str =
    "d.device_code, d.user_code, d.client_id, d.scopes, d.expires, d.subject, d.done, d.denied";

const USER_COLUMNS: &str = "id, namespace_id, username, password_digest, given_name, \
     family_name, email, email_verified, phone, phone_verified, locale, is_admin";

// =============================================================================
// AuthRequestRepository 实现
// =============================================================================

impl TxAuthRequestRepository {
    async fn find(&self, id: &Uuid, lock: bool) -> AppResult<Option<AuthRequest>> {
        let sql = format!(
            "SELECT {} FROM auth_request WHERE id = $1{}",
            AUTH_REQUEST_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, AuthRequestRow>(&sql)
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find auth request: {}", e)))
        })?;

        row.map(AuthRequest::try_from).transpose()
    }
}

#[async_trait]
impl AuthRequestRepository for TxAuthRequestRepository {
    async fn insert(&self, request: &AuthRequest) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query(
                r#"
                INSERT INTO auth_request (id, creation_date, client_id, redirect_uri, response_type,
                                          response_mode, state, scopes, nonce, code_challenge,
                                          code_challenge_method, prompt, ui_locales, login_hint,
                                          max_age_secs, user_id, is_done, auth_time)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
                "#,
            )
            .bind(request.id)
            .bind(request.created_at)
            .bind(request.client_id.0)
            .bind(&request.redirect_uri)
            .bind(&request.response_type)
            .bind(&request.response_mode)
            .bind(&request.state)
            .bind(&request.scopes)
            .bind(&request.nonce)
            .bind(request.code_challenge.as_ref().map(|c| c.challenge.clone()))
            .bind(request.code_challenge.as_ref().map(|c| c.method.as_str()))
            .bind(&request.prompt)
            .bind(&request.ui_locales)
            .bind(&request.login_hint)
            .bind(request.max_age_secs)
            .bind(request.user_id.map(|u| u.0))
            .bind(request.is_done)
            .bind(request.auth_time)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to insert auth request: {}", e)))
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<AuthRequest>> {
        self.find(id, false).await
    }

    async fn find_by_id_for_update(&self, id: &Uuid) -> AppResult<Option<AuthRequest>> {
        self.find(id, true).await
    }

    async fn update(&self, request: &AuthRequest) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query(
                r#"
                UPDATE auth_request
                SET user_id = $2, is_done = $3, auth_time = $4
                WHERE id = $1
                "#,
            )
            .bind(request.id)
            .bind(request.user_id.map(|u| u.0))
            .bind(request.is_done)
            .bind(request.auth_time)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to update auth request: {}", e)))
        })?;

        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> AppResult<bool> {
        let result = with_tx!(self, tx => {
            sqlx::query("DELETE FROM auth_request WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to delete auth request: {}", e)))
        })?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// AuthCodeRepository 实现
// =============================================================================

#[async_trait]
impl AuthCodeRepository for TxAuthCodeRepository {
    async fn insert(&self, code: &AuthCode) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query("INSERT INTO code_map (code, request_id, create_time) VALUES ($1, $2, $3)")
                .bind(&code.code)
                .bind(code.request_id)
                .bind(code.created_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to save code: {}", e)))
        })?;

        Ok(())
    }

    async fn take(&self, code: &str) -> AppResult<Option<AuthCode>> {
        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, AuthCodeRow>(
                "DELETE FROM code_map WHERE code = $1 RETURNING code, request_id, create_time",
            )
            .bind(code)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to take code: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }

    async fn delete_by_request_id(&self, request_id: &Uuid) -> AppResult<u64> {
        let result = with_tx!(self, tx => {
            sqlx::query("DELETE FROM code_map WHERE request_id = $1")
                .bind(request_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to delete codes: {}", e)))
        })?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// AccessTokenRepository 实现
// =============================================================================

impl TxAccessTokenRepository {
    async fn find(&self, id: &Uuid, lock: bool) -> AppResult<Option<AccessToken>> {
        let sql = format!(
            "SELECT {} FROM access_token WHERE id = $1{}",
            ACCESS_TOKEN_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, AccessTokenRow>(&sql)
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find access token: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl AccessTokenRepository for TxAccessTokenRepository {
    async fn insert(&self, token: &AccessToken) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query(
                r#"
                INSERT INTO access_token (id, client_id, subject, refresh_token_id, audience,
                                          expiration, scopes)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(token.id)
            .bind(token.client_id.0)
            .bind(&token.subject)
            .bind(&token.refresh_token_id)
            .bind(&token.audience)
            .bind(token.expires_at)
            .bind(&token.scopes)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to save access token: {}", e)))
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<AccessToken>> {
        self.find(id, false).await
    }

    async fn find_by_id_for_update(&self, id: &Uuid) -> AppResult<Option<AccessToken>> {
        self.find(id, true).await
    }

    async fn delete(&self, id: &Uuid) -> AppResult<bool> {
        let result = with_tx!(self, tx => {
            sqlx::query("DELETE FROM access_token WHERE id = $1")
                .bind(id)
                .execute(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to delete access token: {}", e)))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_refresh_token_id(&self, refresh_token_id: &str) -> AppResult<u64> {
        let result = with_tx!(self, tx => {
            sqlx::query("DELETE FROM access_token WHERE refresh_token_id = $1")
                .bind(refresh_token_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to delete access tokens: {}", e)))
        })?;

        Ok(result.rows_affected())
    }

    async fn delete_by_session(&self, client_id: &ClientId, subject: &str) -> AppResult<u64> {
        let result = with_tx!(self, tx => {
            sqlx::query("DELETE FROM access_token WHERE client_id = $1 AND subject = $2")
                .bind(client_id.0)
                .bind(subject)
                .execute(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to delete access tokens: {}", e)))
        })?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// RefreshTokenRepository 实现
// =============================================================================

#[async_trait]
impl RefreshTokenRepository for TxRefreshTokenRepository {
    async fn insert(&self, token: &RefreshToken) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query(
                r#"
                INSERT INTO refresh_token (id, auth_time, amr, audience, subject, client_id,
                                           expiration, scopes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(&token.id)
            .bind(token.auth_time)
            .bind(&token.amr)
            .bind(&token.audience)
            .bind(&token.subject)
            .bind(token.client_id.0)
            .bind(token.expires_at)
            .bind(&token.scopes)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to save refresh token: {}", e)))
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<RefreshToken>> {
        let sql = format!("SELECT {} FROM refresh_token WHERE id = $1", REFRESH_TOKEN_COLUMNS);

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, RefreshTokenRow>(&sql)
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find refresh token: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }

    async fn take(&self, id: &str) -> AppResult<Option<RefreshToken>> {
        let sql = format!(
            "DELETE FROM refresh_token WHERE id = $1 RETURNING {}",
            REFRESH_TOKEN_COLUMNS
        );

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, RefreshTokenRow>(&sql)
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to take refresh token: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }

    async fn delete_by_session(&self, client_id: &ClientId, subject: &str) -> AppResult<u64> {
        let result = with_tx!(self, tx => {
            sqlx::query("DELETE FROM refresh_token WHERE client_id = $1 AND subject = $2")
                .bind(client_id.0)
                .bind(subject)
                .execute(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to delete refresh tokens: {}", e)))
        })?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// ClientRepository 实现
// =============================================================================

#[async_trait]
impl ClientRepository for TxClientRepository {
    async fn insert(&self, client: &Client) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query(
                r#"
                INSERT INTO client (id, secret, redirect_uris, redirect_uri_globs,
                                    post_logout_redirect_uri_globs, application_type, auth_method,
                                    response_types, grant_types, access_token_type, dev_mode,
                                    id_token_userinfo_assertion, clock_skew_ms, namespace_id, name)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(client.id.0)
            .bind(&client.secret_hash)
            .bind(&client.redirect_uris)
            .bind(&client.redirect_uri_globs)
            .bind(&client.post_logout_redirect_uri_globs)
            .bind(client.application_type.as_str())
            .bind(client.auth_method.as_str())
            .bind(enum_texts(&client.response_types))
            .bind(enum_texts(&client.grant_types))
            .bind(client.access_token_type.as_str())
            .bind(client.dev_mode)
            .bind(client.id_token_userinfo_claims_assertion)
            .bind(client.clock_skew.num_milliseconds())
            .bind(client.namespace_id.0)
            .bind(&client.name)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to save client: {}", e)))
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ClientId) -> AppResult<Option<Client>> {
        let sql = format!("SELECT {} FROM client WHERE id = $1", CLIENT_COLUMNS);

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, ClientRow>(&sql)
                .bind(id.0)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find client: {}", e)))
        })?;

        row.map(Client::try_from).transpose()
    }

    async fn count(&self) -> AppResult<u64> {
        let count: i64 = with_tx!(self, tx => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM client")
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to count clients: {}", e)))
        })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list(&self, pagination: &Pagination) -> AppResult<Vec<Client>> {
        let sql = format!(
            "SELECT {} FROM client ORDER BY id LIMIT $1 OFFSET $2",
            CLIENT_COLUMNS
        );

        let rows = with_tx!(self, tx => {
            sqlx::query_as::<_, ClientRow>(&sql)
                .bind(i64::from(pagination.page_size))
                .bind(i64::from(pagination.offset()))
                .fetch_all(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to list clients: {}", e)))
        })?;

        rows.into_iter().map(Client::try_from).collect()
    }
}

// =============================================================================
// DeviceAuthorizationRepository 实现
// =============================================================================

impl TxDeviceAuthorizationRepository {
    async fn find_by_user_code_inner(
        &self,
        user_code: &str,
        lock: bool,
    ) -> AppResult<Option<DeviceAuthorization>> {
        let sql = format!(
            "SELECT {} FROM user_code u JOIN device_code d ON d.device_code = u.device_code \
             WHERE u.user_code = $1{}",
            DEVICE_CODE_COLUMNS,
            if lock { " FOR UPDATE OF d" } else { "" }
        );

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, DeviceCodeRow>(&sql)
                .bind(user_code)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find device authorization: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl DeviceAuthorizationRepository for TxDeviceAuthorizationRepository {
    async fn insert(&self, authorization: &DeviceAuthorization) -> AppResult<()> {
        // user code 已存在即视为冲突，包括同一对 device code 的重复写入
        let inserted = with_tx!(self, tx => {
            sqlx::query(
                "INSERT INTO user_code (user_code, device_code) VALUES ($1, $2) \
                 ON CONFLICT (user_code) DO NOTHING",
            )
            .bind(&authorization.user_code)
            .bind(&authorization.device_code)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to save user code: {}", e)))
        })?;

        if inserted.rows_affected() == 0 {
            return Err(OidcError::DuplicateUserCode.into());
        }

        let inserted = with_tx!(self, tx => {
            sqlx::query(
                r#"
                INSERT INTO device_code (device_code, user_code, client_id, scopes, expires,
                                         subject, done, denied)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (device_code) DO NOTHING
                "#,
            )
            .bind(&authorization.device_code)
            .bind(&authorization.user_code)
            .bind(authorization.client_id.0)
            .bind(&authorization.scopes)
            .bind(authorization.expires_at)
            .bind(&authorization.subject)
            .bind(authorization.done)
            .bind(authorization.denied)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to save device code: {}", e)))
        })?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::validation(
                "device code is already bound to another user code",
            ));
        }

        Ok(())
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> AppResult<Option<DeviceAuthorization>> {
        let sql = format!(
            "SELECT {} FROM device_code d WHERE d.device_code = $1",
            DEVICE_CODE_COLUMNS
        );

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, DeviceCodeRow>(&sql)
                .bind(device_code)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find device code: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }

    async fn find_by_user_code(&self, user_code: &str) -> AppResult<Option<DeviceAuthorization>> {
        self.find_by_user_code_inner(user_code, false).await
    }

    async fn find_by_user_code_for_update(
        &self,
        user_code: &str,
    ) -> AppResult<Option<DeviceAuthorization>> {
        self.find_by_user_code_inner(user_code, true).await
    }

    async fn update(&self, authorization: &DeviceAuthorization) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query(
                r#"
                UPDATE device_code
                SET subject = $2, done = $3, denied = $4
                WHERE device_code = $1
                "#,
            )
            .bind(&authorization.device_code)
            .bind(&authorization.subject)
            .bind(authorization.done)
            .bind(authorization.denied)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to update device code: {}", e)))
        })?;

        Ok(())
    }
}

// =============================================================================
// UserRepository 实现
// =============================================================================

#[async_trait]
impl UserRepository for TxUserRepository {
    async fn insert(&self, user: &User) -> AppResult<()> {
        with_tx!(self, tx => {
            sqlx::query(
                r#"
                INSERT INTO users (id, namespace_id, username, password_digest, given_name,
                                   family_name, email, email_verified, phone, phone_verified,
                                   locale, is_admin)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(user.id.0)
            .bind(user.namespace_id.0)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.given_name)
            .bind(&user.family_name)
            .bind(&user.email)
            .bind(user.email_verified)
            .bind(&user.phone)
            .bind(user.phone_verified)
            .bind(&user.locale)
            .bind(user.is_admin)
            .execute(&mut **tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to save user: {}", e)))
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> AppResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(id.0)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find user: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }

    async fn find_by_username(
        &self,
        namespace_id: &NamespaceId,
        username: &str,
    ) -> AppResult<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE namespace_id = $1 AND username = $2",
            USER_COLUMNS
        );

        let row = with_tx!(self, tx => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(namespace_id.0)
                .bind(username)
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to find user: {}", e)))
        })?;

        Ok(row.map(Into::into))
    }
}
