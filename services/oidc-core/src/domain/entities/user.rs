//! 用户实体

use serde::{Deserialize, Serialize};
use xoidc_common::{NamespaceId, UserId};

/// 用户，用户名在命名空间内唯一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub namespace_id: NamespaceId,
    pub username: String,
    /// Argon2id PHC 字符串
    pub password_hash: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub email_verified: bool,
    pub phone: String,
    pub phone_verified: bool,
    pub locale: Option<String>,
    /// 允许模拟其他用户
    pub is_admin: bool,
}

impl User {
    pub fn new(
        namespace_id: NamespaceId,
        username: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::new(),
            namespace_id,
            username: username.into(),
            password_hash: password_hash.into(),
            given_name: String::new(),
            family_name: String::new(),
            email: String::new(),
            email_verified: false,
            phone: String::new(),
            phone_verified: false,
            locale: None,
            is_admin: false,
        }
    }

    /// 组合显示名
    pub fn display_name(&self) -> String {
        match (self.given_name.is_empty(), self.family_name.is_empty()) {
            (false, false) => format!("{} {}", self.given_name, self.family_name),
            (false, true) => self.given_name.clone(),
            (true, false) => self.family_name.clone(),
            (true, true) => String::new(),
        }
    }
}
