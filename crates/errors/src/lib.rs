//! xoidc-errors - 统一错误处理
//!
//! 错误分类对齐 OAuth 2.0 / OIDC 协议错误码（RFC 6749 §5.2、RFC 8628 §3.5）

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// 登录失败，消息保持通用，不区分用户不存在与密码错误
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Invalid client: {0}")]
    InvalidClient(String),

    #[error("Login required: {0}")]
    LoginRequired(String),

    /// 设备流 user code 冲突，调用方需要重新生成 user code 后重试
    #[error("Duplicate user code: {0}")]
    DuplicateUserCode(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_credential(msg: impl Into<String>) -> Self {
        Self::InvalidCredential(msg.into())
    }

    pub fn invalid_grant(msg: impl Into<String>) -> Self {
        Self::InvalidGrant(msg.into())
    }

    pub fn invalid_client(msg: impl Into<String>) -> Self {
        Self::InvalidClient(msg.into())
    }

    pub fn login_required(msg: impl Into<String>) -> Self {
        Self::LoginRequired(msg.into())
    }

    pub fn duplicate_user_code(msg: impl Into<String>) -> Self {
        Self::DuplicateUserCode(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        Self::Expired(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否为服务端故障（存储/内部错误）
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::InvalidCredential(_) => 401,
            Self::InvalidGrant(_) => 400,
            Self::InvalidClient(_) => 401,
            Self::LoginRequired(_) => 400,
            Self::DuplicateUserCode(_) => 409,
            Self::PermissionDenied(_) => 403,
            Self::Unsupported(_) => 400,
            Self::Expired(_) => 400,
            Self::FailedPrecondition(_) => 412,
            Self::Cancelled(_) => 499,
            Self::Database(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// 转换为 OAuth 2.0 / OIDC 错误码
    pub fn oauth_error(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "invalid_grant",
            Self::Validation(_) => "invalid_request",
            Self::InvalidCredential(_) => "access_denied",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidClient(_) => "invalid_client",
            Self::LoginRequired(_) => "login_required",
            Self::DuplicateUserCode(_) => "slow_down",
            Self::PermissionDenied(_) => "access_denied",
            Self::Unsupported(_) => "unsupported_token_type",
            Self::Expired(_) => "expired_token",
            Self::FailedPrecondition(_) => "invalid_request",
            Self::Cancelled(_) => "temporarily_unavailable",
            Self::Database(_) => "server_error",
            Self::Internal(_) => "server_error",
        }
    }

    /// 转换为 OAuth 错误响应
    ///
    /// 服务端故障不向客户端暴露细节。
    pub fn to_oauth_response(&self) -> OAuthErrorResponse {
        let description = if self.is_server_error() {
            None
        } else {
            Some(self.to_string())
        };

        OAuthErrorResponse {
            error: self.oauth_error().to_string(),
            error_description: description,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::internal(format!("JSON error: {}", err))
    }
}

/// OAuth 2.0 错误响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
