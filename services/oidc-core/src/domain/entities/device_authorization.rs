//! 设备授权实体（RFC 8628）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xoidc_common::ClientId;

/// 设备授权状态，过期在读取时计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceAuthorizationStatus {
    Pending,
    Completed,
    Denied,
    Expired,
}

/// 设备授权
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub client_id: ClientId,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub subject: Option<String>,
    pub done: bool,
    pub denied: bool,
}

impl DeviceAuthorization {
    pub fn new(
        client_id: ClientId,
        device_code: impl Into<String>,
        user_code: impl Into<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            device_code: device_code.into(),
            user_code: user_code.into(),
            client_id,
            scopes,
            expires_at,
            subject: None,
            done: false,
            denied: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// 终态：已完成或已拒绝
    pub fn is_finished(&self) -> bool {
        self.done || self.denied
    }

    pub fn status(&self) -> DeviceAuthorizationStatus {
        if self.denied {
            DeviceAuthorizationStatus::Denied
        } else if self.done {
            DeviceAuthorizationStatus::Completed
        } else if self.is_expired() {
            DeviceAuthorizationStatus::Expired
        } else {
            DeviceAuthorizationStatus::Pending
        }
    }

    pub fn complete(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
        self.done = true;
    }

    pub fn deny(&mut self) {
        self.denied = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(expires_in: Duration) -> DeviceAuthorization {
        DeviceAuthorization::new(
            ClientId::new(),
            "device",
            "USER-CODE",
            Utc::now() + expires_in,
            vec!["openid".to_string()],
        )
    }

    #[test]
    fn test_status_transitions() {
        let mut auth = pending(Duration::minutes(5));
        assert_eq!(auth.status(), DeviceAuthorizationStatus::Pending);

        auth.complete("user-1");
        assert_eq!(auth.status(), DeviceAuthorizationStatus::Completed);
        assert_eq!(auth.subject.as_deref(), Some("user-1"));

        let mut auth = pending(Duration::minutes(5));
        auth.deny();
        assert_eq!(auth.status(), DeviceAuthorizationStatus::Denied);
        assert!(auth.is_finished());
    }

    #[test]
    fn test_expired_pending() {
        let auth = pending(Duration::seconds(-1));
        assert_eq!(auth.status(), DeviceAuthorizationStatus::Expired);
    }
}
