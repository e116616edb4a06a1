//! 集成测试共享夹具

#![allow(dead_code)]

use std::sync::Arc;

use xoidc_common::{ClientId, NamespaceId, RequestContext};
use xoidc_config::ClaimsConfig;
use xoidc_core::domain::entities::{AuthRequest, AuthorizationParams, Client, GrantType, User};
use xoidc_core::domain::services::{
    Argon2CredentialVerifier, Argon2Params, AuthorizationRequestManager, ClaimsAssembler,
    ClientRegistry, CredentialVerifier, DeviceAuthorizationManager, TokenExchangeValidator,
    TokenLifecycleManager, TokenPolicy,
};
use xoidc_core::domain::unit_of_work::UnitOfWorkFactory;
use xoidc_core::infrastructure::persistence::InMemoryUnitOfWorkFactory;

pub const PASSWORD: &str = "verysecure";

/// 测试用低成本 Argon2 参数
pub fn cheap_credentials() -> Arc<dyn CredentialVerifier> {
    Arc::new(
        Argon2CredentialVerifier::new(Argon2Params {
            memory_kib: 1024,
            iterations: 1,
            ..Default::default()
        })
        .expect("valid argon2 params"),
    )
}

pub fn scopes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub struct Fixture {
    pub store: InMemoryUnitOfWorkFactory,
    pub uow_factory: Arc<dyn UnitOfWorkFactory>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub policy: TokenPolicy,
    pub namespace_id: NamespaceId,
    /// 只用 PKCE 的 native client
    pub native: Client,
    /// 另一个 client，用于越权场景
    pub other: Client,
    pub alice: User,
    pub admin: User,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_policy(TokenPolicy::default()).await
    }

    pub async fn with_policy(policy: TokenPolicy) -> Self {
        let store = InMemoryUnitOfWorkFactory::new();
        let uow_factory: Arc<dyn UnitOfWorkFactory> = Arc::new(store.clone());
        let credentials = cheap_credentials();
        let namespace_id = NamespaceId::new();

        let native = Client::native(ClientId::new(), namespace_id, "native", vec![])
            .with_grant_types(vec![
                GrantType::AuthorizationCode,
                GrantType::RefreshToken,
                GrantType::TokenExchange,
            ]);
        let other = Client::native(ClientId::new(), namespace_id, "other", vec![]);

        let digest = credentials.hash(PASSWORD).expect("hash password");

        let mut alice = User::new(namespace_id, "alice", digest.clone());
        alice.given_name = "Alice".into();
        alice.family_name = "Liddell".into();
        alice.email = "alice@example.com".into();
        alice.email_verified = true;
        alice.phone = "+4915100000000".into();
        alice.locale = Some("de".into());

        let mut admin = User::new(namespace_id, "admin", digest);
        admin.is_admin = true;

        let ctx = RequestContext::new();
        let uow = uow_factory.begin(&ctx).await.expect("begin");
        uow.clients().insert(&native).await.expect("seed native client");
        uow.clients().insert(&other).await.expect("seed other client");
        uow.users().insert(&alice).await.expect("seed alice");
        uow.users().insert(&admin).await.expect("seed admin");
        uow.commit().await.expect("commit seed");

        Self {
            store,
            uow_factory,
            credentials,
            policy,
            namespace_id,
            native,
            other,
            alice,
            admin,
        }
    }

    pub fn auth_requests(&self) -> AuthorizationRequestManager {
        AuthorizationRequestManager::new(
            self.uow_factory.clone(),
            self.credentials.clone(),
            self.policy,
        )
    }

    pub fn tokens(&self) -> TokenLifecycleManager {
        TokenLifecycleManager::new(self.uow_factory.clone(), self.policy)
    }

    pub fn devices(&self) -> DeviceAuthorizationManager {
        DeviceAuthorizationManager::new(self.uow_factory.clone())
    }

    pub fn claims(&self) -> ClaimsAssembler {
        ClaimsAssembler::new(self.uow_factory.clone(), &ClaimsConfig::default())
    }

    pub fn token_exchange(&self) -> TokenExchangeValidator {
        TokenExchangeValidator::new(self.uow_factory.clone())
    }

    pub fn clients(&self) -> ClientRegistry {
        ClientRegistry::new(self.uow_factory.clone(), self.credentials.clone())
    }

    /// native client 的授权请求参数
    pub fn params(&self, scope_list: &[&str]) -> AuthorizationParams {
        AuthorizationParams {
            client_id: self.native.id,
            redirect_uri: "custom://auth/callback".into(),
            response_type: "code".into(),
            state: Some("xyz".into()),
            scopes: scopes(scope_list),
            nonce: Some("n-0S6_WzA2Mj".into()),
            ..Default::default()
        }
    }

    /// 走完登录，返回已完成的授权请求
    pub async fn logged_in_request(&self, scope_list: &[&str]) -> AuthRequest {
        let ctx = RequestContext::new();
        let manager = self.auth_requests();
        let request = manager
            .create(&ctx, self.params(scope_list), None)
            .await
            .expect("create auth request");
        manager
            .complete_login(&ctx, &request.id, "alice", PASSWORD)
            .await
            .expect("login")
    }
}
