//! 组件装配

use std::sync::Arc;
use tracing::info;
use xoidc_common::{RequestContext, SnowflakeGenerator, SnowflakeId};
use xoidc_config::AppConfig;
use xoidc_errors::AppResult;

use crate::domain::services::{
    Argon2CredentialVerifier, Argon2Params, AuthorizationRequestManager, ClaimsAssembler,
    ClientRegistry, CredentialVerifier, DeviceAuthorizationManager, TokenExchangeValidator,
    TokenLifecycleManager, TokenPolicy,
};
use crate::domain::unit_of_work::UnitOfWorkFactory;

/// 共享同一个存储的全部核心组件
pub struct OidcEngine {
    pub auth_requests: AuthorizationRequestManager,
    pub tokens: TokenLifecycleManager,
    pub devices: DeviceAuthorizationManager,
    pub claims: ClaimsAssembler,
    pub token_exchange: TokenExchangeValidator,
    pub clients: ClientRegistry,
    pub credentials: Arc<dyn CredentialVerifier>,
    ids: SnowflakeGenerator,
    uow_factory: Arc<dyn UnitOfWorkFactory>,
}

impl OidcEngine {
    pub fn new(uow_factory: Arc<dyn UnitOfWorkFactory>, config: &AppConfig) -> AppResult<Self> {
        let credentials: Arc<dyn CredentialVerifier> = Arc::new(Argon2CredentialVerifier::new(
            Argon2Params::from(&config.password_hash),
        )?);

        Self::with_credentials(uow_factory, config, credentials)
    }

    /// 使用外部提供的凭证校验器
    pub fn with_credentials(
        uow_factory: Arc<dyn UnitOfWorkFactory>,
        config: &AppConfig,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> AppResult<Self> {
        let policy = TokenPolicy::from(&config.tokens);
        let ids = SnowflakeGenerator::new(config.snowflake.instance_id)?;

        info!(
            instance_id = config.snowflake.instance_id,
            access_token_ttl_secs = config.tokens.access_token_ttl_secs,
            refresh_token_ttl_secs = config.tokens.refresh_token_ttl_secs,
            "OIDC engine assembled"
        );

        Ok(Self {
            auth_requests: AuthorizationRequestManager::new(
                uow_factory.clone(),
                credentials.clone(),
                policy,
            ),
            tokens: TokenLifecycleManager::new(uow_factory.clone(), policy),
            devices: DeviceAuthorizationManager::new(uow_factory.clone()),
            claims: ClaimsAssembler::new(uow_factory.clone(), &config.claims),
            token_exchange: TokenExchangeValidator::new(uow_factory.clone()),
            clients: ClientRegistry::new(uow_factory.clone(), credentials.clone()),
            credentials,
            ids,
            uow_factory,
        })
    }

    /// 生成新的 Snowflake ID
    pub fn next_id(&self) -> SnowflakeId {
        self.ids.next_id()
    }

    pub async fn health(&self, ctx: &RequestContext) -> AppResult<()> {
        self.uow_factory.health(ctx).await
    }
}
