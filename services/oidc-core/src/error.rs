//! 核心错误定义

use thiserror::Error;
use xoidc_errors::AppError;

#[derive(Debug, Error)]
pub enum OidcError {
    /// 登录失败。不区分用户不存在与密码错误。
    #[error("username or password wrong")]
    InvalidCredentials,

    #[error("auth request not found")]
    RequestNotFound,

    #[error("code invalid or expired")]
    CodeInvalid,

    #[error("auth request already completed")]
    RequestAlreadyDone,

    /// 授权请求尚未完成登录，没有可签发的主体
    #[error("token request has no authenticated subject")]
    SubjectMissing,

    #[error("client not found")]
    ClientNotFound,

    #[error("client authentication failed")]
    ClientAuthenticationFailed,

    #[error("token was not issued for this client")]
    TokenNotIssuedForClient,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("token is invalid or has expired")]
    TokenInactive,

    #[error("token is not valid for this client")]
    AudienceMismatch,

    #[error("user not found")]
    UserNotFound,

    #[error("device code not found for client")]
    DeviceCodeNotFound,

    #[error("device code expired")]
    DeviceCodeExpired,

    #[error("user code not found")]
    UserCodeNotFound,

    #[error("user code already in use")]
    DuplicateUserCode,

    #[error("device authorization already {0}")]
    DeviceAuthorizationFinished(&'static str),

    #[error("user doesn't have impersonation permission")]
    ImpersonationNotPermitted,

    #[error("exchanging id_token to refresh_token is not supported")]
    IdTokenToRefreshToken,

    #[error("login required")]
    LoginRequired,
}

impl From<OidcError> for AppError {
    fn from(err: OidcError) -> Self {
        let msg = err.to_string();
        match err {
            OidcError::InvalidCredentials => AppError::invalid_credential(msg),
            OidcError::RequestNotFound
            | OidcError::CodeInvalid
            | OidcError::ClientNotFound
            | OidcError::TokenInactive
            | OidcError::UserNotFound
            | OidcError::DeviceCodeNotFound
            | OidcError::UserCodeNotFound => AppError::not_found(msg),
            OidcError::RequestAlreadyDone
            | OidcError::SubjectMissing
            | OidcError::DeviceAuthorizationFinished(_) => {
                AppError::failed_precondition(msg)
            }
            OidcError::ClientAuthenticationFailed | OidcError::TokenNotIssuedForClient => {
                AppError::invalid_client(msg)
            }
            OidcError::InvalidRefreshToken => AppError::invalid_grant(msg),
            OidcError::AudienceMismatch | OidcError::ImpersonationNotPermitted => {
                AppError::permission_denied(msg)
            }
            OidcError::DeviceCodeExpired => AppError::expired(msg),
            OidcError::DuplicateUserCode => AppError::duplicate_user_code(msg),
            OidcError::IdTokenToRefreshToken => AppError::unsupported(msg),
            OidcError::LoginRequired => AppError::login_required(msg),
        }
    }
}
