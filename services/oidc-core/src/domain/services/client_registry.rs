//! Client 注册表

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use tracing::{debug, info, warn};
use xoidc_common::{ClientId, PagedResult, Pagination, RequestContext};
use xoidc_errors::AppResult;

use crate::domain::entities::{AuthMethod, Client, ClientCredentialsRequest, GrantType};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory, finish};
use crate::error::OidcError;

use super::CredentialVerifier;

pub struct ClientRegistry {
    uow_factory: Arc<dyn UnitOfWorkFactory>,
    credentials: Arc<dyn CredentialVerifier>,
}

impl ClientRegistry {
    pub fn new(
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            uow_factory,
            credentials,
        }
    }

    pub async fn get_by_id(&self, ctx: &RequestContext, id: &ClientId) -> AppResult<Client> {
        debug!(client_id = %id, "Loading client");
        self.find(ctx, id)
            .await?
            .ok_or_else(|| OidcError::ClientNotFound.into())
    }

    /// 校验 client secret
    ///
    /// client 不存在、未配置 secret 或 secret 错误都返回 `InvalidClient`。
    pub async fn authorize_secret(
        &self,
        ctx: &RequestContext,
        id: &ClientId,
        secret: &str,
    ) -> AppResult<Client> {
        let client = self.find(ctx, id).await?;

        let digest = match &client {
            Some(c) if c.auth_method != AuthMethod::None => c.secret_hash.as_deref(),
            _ => None,
        };

        let matched = match digest {
            Some(digest) => self.credentials.verify(secret, digest)?,
            None => {
                self.credentials
                    .verify(secret, self.credentials.dummy_digest())?;
                false
            }
        };

        match client {
            Some(client) if matched => Ok(client),
            _ => {
                warn!(client_id = %id, "Client authentication failed");
                Err(OidcError::ClientAuthenticationFailed.into())
            }
        }
    }

    /// client_credentials 授权：认证并检查授权类型
    pub async fn client_credentials(
        &self,
        ctx: &RequestContext,
        id: &ClientId,
        secret: &str,
    ) -> AppResult<Client> {
        let client = self.authorize_secret(ctx, id, secret).await?;
        if !client.allows_grant(GrantType::ClientCredentials) {
            warn!(client_id = %id, "client_credentials grant not allowed");
            return Err(OidcError::ClientAuthenticationFailed.into());
        }
        Ok(client)
    }

    pub async fn client_credentials_token_request(
        &self,
        ctx: &RequestContext,
        id: &ClientId,
        scopes: Vec<String>,
    ) -> AppResult<ClientCredentialsRequest> {
        let client = self.get_by_id(ctx, id).await?;
        Ok(ClientCredentialsRequest {
            client_id: client.id,
            scopes,
        })
    }

    /// 注册 client
    ///
    /// 需要 secret 的 client 生成新 secret，只存摘要，明文仅返回这一次。
    pub async fn register(
        &self,
        ctx: &RequestContext,
        mut client: Client,
    ) -> AppResult<(Client, Option<String>)> {
        let secret = if client.auth_method == AuthMethod::None {
            client.secret_hash = None;
            None
        } else {
            let secret = generate_secret();
            client.secret_hash = Some(self.credentials.hash(&secret)?);
            Some(secret)
        };

        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.clients().insert(&client).await;
        finish(uow, result).await?;

        info!(client_id = %client.id, name = %client.name, "Client registered");
        Ok((client, secret))
    }

    pub async fn count(&self, ctx: &RequestContext) -> AppResult<u64> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.clients().count().await;
        finish(uow, result).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        pagination: &Pagination,
    ) -> AppResult<PagedResult<Client>> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = page(uow.as_ref(), pagination).await;
        finish(uow, result).await
    }

    async fn find(&self, ctx: &RequestContext, id: &ClientId) -> AppResult<Option<Client>> {
        let uow = self.uow_factory.begin(ctx).await?;
        let result = uow.clients().find_by_id(id).await;
        finish(uow, result).await
    }
}

async fn page(uow: &dyn UnitOfWork, pagination: &Pagination) -> AppResult<PagedResult<Client>> {
    let total = uow.clients().count().await?;
    let items = uow.clients().list(pagination).await?;
    Ok(PagedResult::new(items, total, pagination))
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
