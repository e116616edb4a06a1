//! 内存事务仓储
//!
//! 读取看到已提交数据叠加本事务的暂存写入；`take` 与 `*_for_update`
//! 先获取实体键锁，持有到事务结束。

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;
use xoidc_common::{ClientId, NamespaceId, Pagination, UserId};
use xoidc_errors::{AppError, AppResult};

use crate::domain::entities::{
    AccessToken, AuthCode, AuthRequest, Client, DeviceAuthorization, RefreshToken, User,
};
use crate::domain::repositories::{
    AccessTokenRepository, AuthCodeRepository, AuthRequestRepository, ClientRepository,
    DeviceAuthorizationRepository, RefreshTokenRepository, UserRepository,
};
use crate::error::OidcError;

use super::store::{LockKey, TxState, delete_where, visible, visible_where};

macro_rules! define_mem_repo {
    ($name:ident) => {
        pub struct $name {
            tx: Arc<TxState>,
        }

        impl $name {
            pub(super) fn new(tx: Arc<TxState>) -> Self {
                Self { tx }
            }
        }
    };
}

define_mem_repo!(MemAuthRequestRepository);
define_mem_repo!(MemAuthCodeRepository);
define_mem_repo!(MemAccessTokenRepository);
define_mem_repo!(MemRefreshTokenRepository);
define_mem_repo!(MemClientRepository);
define_mem_repo!(MemDeviceAuthorizationRepository);
define_mem_repo!(MemUserRepository);

fn duplicate_key(table: &str) -> AppError {
    AppError::database(format!("duplicate key value in {}", table))
}

// =============================================================================
// AuthRequestRepository
// =============================================================================

#[async_trait]
impl AuthRequestRepository for MemAuthRequestRepository {
    async fn insert(&self, request: &AuthRequest) -> AppResult<()> {
        self.tx.with(|tables, staged| {
            if visible(&tables.auth_requests, &staged.auth_requests, &request.id).is_some() {
                return Err(duplicate_key("auth_request"));
            }
            staged.auth_requests.insert(request.id, Some(request.clone()));
            Ok(())
        })
    }

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<AuthRequest>> {
        self.tx
            .with(|tables, staged| Ok(visible(&tables.auth_requests, &staged.auth_requests, id)))
    }

    async fn find_by_id_for_update(&self, id: &Uuid) -> AppResult<Option<AuthRequest>> {
        self.tx.lock(LockKey::AuthRequest(*id)).await?;
        self.find_by_id(id).await
    }

    async fn update(&self, request: &AuthRequest) -> AppResult<()> {
        self.tx.with(|tables, staged| {
            if visible(&tables.auth_requests, &staged.auth_requests, &request.id).is_some() {
                staged.auth_requests.insert(request.id, Some(request.clone()));
            }
            Ok(())
        })
    }

    async fn delete(&self, id: &Uuid) -> AppResult<bool> {
        self.tx.lock(LockKey::AuthRequest(*id)).await?;
        self.tx.with(|tables, staged| {
            let existed = visible(&tables.auth_requests, &staged.auth_requests, id).is_some();
            if existed {
                staged.auth_requests.insert(*id, None);
            }
            Ok(existed)
        })
    }
}

// =============================================================================
// AuthCodeRepository
// =============================================================================

#[async_trait]
impl AuthCodeRepository for MemAuthCodeRepository {
    async fn insert(&self, code: &AuthCode) -> AppResult<()> {
        self.tx.lock(LockKey::AuthCode(code.code.clone())).await?;
        self.tx.with(|tables, staged| {
            if visible(&tables.auth_codes, &staged.auth_codes, &code.code).is_some() {
                return Err(duplicate_key("code_map"));
            }
            staged.auth_codes.insert(code.code.clone(), Some(code.clone()));
            Ok(())
        })
    }

    async fn take(&self, code: &str) -> AppResult<Option<AuthCode>> {
        let key = code.to_string();
        self.tx.lock(LockKey::AuthCode(key.clone())).await?;
        self.tx.with(|tables, staged| {
            let found = visible(&tables.auth_codes, &staged.auth_codes, &key);
            if found.is_some() {
                staged.auth_codes.insert(key, None);
            }
            Ok(found)
        })
    }

    async fn delete_by_request_id(&self, request_id: &Uuid) -> AppResult<u64> {
        self.tx.with(|tables, staged| {
            Ok(delete_where(&tables.auth_codes, &mut staged.auth_codes, |c| {
                c.request_id == *request_id
            }))
        })
    }
}

// =============================================================================
// AccessTokenRepository
// =============================================================================

#[async_trait]
impl AccessTokenRepository for MemAccessTokenRepository {
    async fn insert(&self, token: &AccessToken) -> AppResult<()> {
        self.tx.with(|tables, staged| {
            if visible(&tables.access_tokens, &staged.access_tokens, &token.id).is_some() {
                return Err(duplicate_key("access_token"));
            }
            staged.access_tokens.insert(token.id, Some(token.clone()));
            Ok(())
        })
    }

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<AccessToken>> {
        self.tx
            .with(|tables, staged| Ok(visible(&tables.access_tokens, &staged.access_tokens, id)))
    }

    async fn find_by_id_for_update(&self, id: &Uuid) -> AppResult<Option<AccessToken>> {
        self.tx.lock(LockKey::AccessToken(*id)).await?;
        self.find_by_id(id).await
    }

    async fn delete(&self, id: &Uuid) -> AppResult<bool> {
        self.tx.lock(LockKey::AccessToken(*id)).await?;
        self.tx.with(|tables, staged| {
            let existed = visible(&tables.access_tokens, &staged.access_tokens, id).is_some();
            if existed {
                staged.access_tokens.insert(*id, None);
            }
            Ok(existed)
        })
    }

    async fn delete_by_refresh_token_id(&self, refresh_token_id: &str) -> AppResult<u64> {
        self.tx.with(|tables, staged| {
            Ok(delete_where(&tables.access_tokens, &mut staged.access_tokens, |t| {
                t.refresh_token_id.as_deref() == Some(refresh_token_id)
            }))
        })
    }

    async fn delete_by_session(&self, client_id: &ClientId, subject: &str) -> AppResult<u64> {
        self.tx.with(|tables, staged| {
            Ok(delete_where(&tables.access_tokens, &mut staged.access_tokens, |t| {
                t.belongs_to_session(client_id, subject)
            }))
        })
    }
}

// =============================================================================
// RefreshTokenRepository
// =============================================================================

#[async_trait]
impl RefreshTokenRepository for MemRefreshTokenRepository {
    async fn insert(&self, token: &RefreshToken) -> AppResult<()> {
        self.tx.with(|tables, staged| {
            if visible(&tables.refresh_tokens, &staged.refresh_tokens, &token.id).is_some() {
                return Err(duplicate_key("refresh_token"));
            }
            staged.refresh_tokens.insert(token.id.clone(), Some(token.clone()));
            Ok(())
        })
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<RefreshToken>> {
        let key = id.to_string();
        self.tx
            .with(|tables, staged| Ok(visible(&tables.refresh_tokens, &staged.refresh_tokens, &key)))
    }

    async fn take(&self, id: &str) -> AppResult<Option<RefreshToken>> {
        let key = id.to_string();
        self.tx.lock(LockKey::RefreshToken(key.clone())).await?;
        self.tx.with(|tables, staged| {
            let found = visible(&tables.refresh_tokens, &staged.refresh_tokens, &key);
            if found.is_some() {
                staged.refresh_tokens.insert(key, None);
            }
            Ok(found)
        })
    }

    async fn delete_by_session(&self, client_id: &ClientId, subject: &str) -> AppResult<u64> {
        self.tx.with(|tables, staged| {
            Ok(delete_where(&tables.refresh_tokens, &mut staged.refresh_tokens, |t| {
                t.belongs_to_session(client_id, subject)
            }))
        })
    }
}

// =============================================================================
// ClientRepository
// =============================================================================

#[async_trait]
impl ClientRepository for MemClientRepository {
    async fn insert(&self, client: &Client) -> AppResult<()> {
        self.tx.with(|tables, staged| {
            if visible(&tables.clients, &staged.clients, &client.id).is_some() {
                return Err(duplicate_key("client"));
            }
            staged.clients.insert(client.id, Some(client.clone()));
            Ok(())
        })
    }

    async fn find_by_id(&self, id: &ClientId) -> AppResult<Option<Client>> {
        self.tx
            .with(|tables, staged| Ok(visible(&tables.clients, &staged.clients, id)))
    }

    async fn count(&self) -> AppResult<u64> {
        self.tx.with(|tables, staged| {
            Ok(visible_where(&tables.clients, &staged.clients, |_| true).len() as u64)
        })
    }

    async fn list(&self, pagination: &Pagination) -> AppResult<Vec<Client>> {
        self.tx.with(|tables, staged| {
            let mut clients = visible_where(&tables.clients, &staged.clients, |_| true);
            clients.sort_by_key(|(id, _)| id.0);

            Ok(clients
                .into_iter()
                .skip(pagination.offset() as usize)
                .take(pagination.page_size as usize)
                .map(|(_, client)| client)
                .collect())
        })
    }
}

// =============================================================================
// DeviceAuthorizationRepository
// =============================================================================

#[async_trait]
impl DeviceAuthorizationRepository for MemDeviceAuthorizationRepository {
    async fn insert(&self, authorization: &DeviceAuthorization) -> AppResult<()> {
        // 先 user code 后 device code，与按 user code 锁定的读取保持同一顺序
        self.tx
            .lock(LockKey::UserCode(authorization.user_code.clone()))
            .await?;
        self.tx
            .lock(LockKey::DeviceCode(authorization.device_code.clone()))
            .await?;

        self.tx.with(|tables, staged| {
            // user code 已存在即冲突，同一对的重复写入也不能覆盖已有状态
            if visible(&tables.user_codes, &staged.user_codes, &authorization.user_code).is_some() {
                return Err(OidcError::DuplicateUserCode.into());
            }

            if visible(&tables.devices, &staged.devices, &authorization.device_code).is_some() {
                return Err(AppError::validation(
                    "device code is already bound to another user code",
                ));
            }

            staged.user_codes.insert(
                authorization.user_code.clone(),
                Some(authorization.device_code.clone()),
            );
            staged
                .devices
                .insert(authorization.device_code.clone(), Some(authorization.clone()));
            Ok(())
        })
    }

    async fn find_by_device_code(
        &self,
        device_code: &str,
    ) -> AppResult<Option<DeviceAuthorization>> {
        let key = device_code.to_string();
        self.tx
            .with(|tables, staged| Ok(visible(&tables.devices, &staged.devices, &key)))
    }

    async fn find_by_user_code(&self, user_code: &str) -> AppResult<Option<DeviceAuthorization>> {
        let key = user_code.to_string();
        self.tx.with(|tables, staged| {
            Ok(visible(&tables.user_codes, &staged.user_codes, &key)
                .and_then(|device_code| visible(&tables.devices, &staged.devices, &device_code)))
        })
    }

    async fn find_by_user_code_for_update(
        &self,
        user_code: &str,
    ) -> AppResult<Option<DeviceAuthorization>> {
        self.tx.lock(LockKey::UserCode(user_code.to_string())).await?;
        self.find_by_user_code(user_code).await
    }

    async fn update(&self, authorization: &DeviceAuthorization) -> AppResult<()> {
        self.tx.with(|tables, staged| {
            let current = visible(&tables.devices, &staged.devices, &authorization.device_code);
            if let Some(mut current) = current {
                current.subject = authorization.subject.clone();
                current.done = authorization.done;
                current.denied = authorization.denied;
                staged
                    .devices
                    .insert(authorization.device_code.clone(), Some(current));
            }
            Ok(())
        })
    }
}

// =============================================================================
// UserRepository
// =============================================================================

#[async_trait]
impl UserRepository for MemUserRepository {
    async fn insert(&self, user: &User) -> AppResult<()> {
        self.tx.with(|tables, staged| {
            let taken = !visible_where(&tables.users, &staged.users, |u| {
                u.id == user.id
                    || (u.namespace_id == user.namespace_id && u.username == user.username)
            })
            .is_empty();
            if taken {
                return Err(duplicate_key("users"));
            }
            staged.users.insert(user.id, Some(user.clone()));
            Ok(())
        })
    }

    async fn find_by_id(&self, id: &UserId) -> AppResult<Option<User>> {
        self.tx
            .with(|tables, staged| Ok(visible(&tables.users, &staged.users, id)))
    }

    async fn find_by_username(
        &self,
        namespace_id: &NamespaceId,
        username: &str,
    ) -> AppResult<Option<User>> {
        self.tx.with(|tables, staged| {
            Ok(visible_where(&tables.users, &staged.users, |u| {
                u.namespace_id == *namespace_id && u.username == username
            })
            .into_iter()
            .next()
            .map(|(_, user)| user))
        })
    }
}
