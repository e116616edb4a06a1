//! Client 注册与认证

mod common;

use common::{Fixture, scopes};
use xoidc_common::{ClientId, Pagination, RequestContext};
use xoidc_core::domain::entities::{AuthMethod, Client, GrantType};
use xoidc_errors::AppError;

fn web_client(fx: &Fixture, name: &str) -> Client {
    Client::web(ClientId::new(), fx.namespace_id, name, String::new(), vec![])
}

#[tokio::test]
async fn test_register_returns_secret_once() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    let registry = fx.clients();

    let (client, secret) = registry
        .register(&ctx, web_client(&fx, "web"))
        .await
        .expect("register");
    let secret = secret.expect("web client gets a secret");

    // 只保存摘要
    let stored = registry.get_by_id(&ctx, &client.id).await.expect("load");
    let digest = stored.secret_hash.expect("digest");
    assert_ne!(digest, secret);
    assert!(digest.starts_with("$argon2id$"));
    assert!(fx.credentials.verify(&secret, &digest).expect("verify"));

    let authorized = registry
        .authorize_secret(&ctx, &client.id, &secret)
        .await
        .expect("authorize");
    assert_eq!(authorized.id, client.id);
}

#[tokio::test]
async fn test_register_public_client_has_no_secret() {
    let fx = Fixture::new().await;
    let native = Client::native(ClientId::new(), fx.namespace_id, "app", vec![]);

    let (client, secret) = fx
        .clients()
        .register(&RequestContext::new(), native)
        .await
        .expect("register");
    assert!(secret.is_none());
    assert!(client.secret_hash.is_none());
    assert_eq!(client.auth_method, AuthMethod::None);
}

#[tokio::test]
async fn test_authorize_secret_failures_are_uniform() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    let registry = fx.clients();

    let (client, _) = registry
        .register(&ctx, web_client(&fx, "web"))
        .await
        .expect("register");

    let wrong = registry
        .authorize_secret(&ctx, &client.id, "wrong")
        .await
        .unwrap_err();
    let unknown = registry
        .authorize_secret(&ctx, &ClientId::new(), "wrong")
        .await
        .unwrap_err();
    // 无 secret 的 client 不能走 secret 认证
    let public = registry
        .authorize_secret(&ctx, &fx.native.id, "")
        .await
        .unwrap_err();

    for err in [&wrong, &unknown, &public] {
        assert!(matches!(err, AppError::InvalidClient(_)));
    }
    assert_eq!(wrong.to_string(), unknown.to_string());
}

#[tokio::test]
async fn test_client_credentials_requires_grant() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    let registry = fx.clients();

    let (plain, plain_secret) = registry
        .register(&ctx, web_client(&fx, "plain"))
        .await
        .expect("register");
    let err = registry
        .client_credentials(&ctx, &plain.id, &plain_secret.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidClient(_)));

    let service = web_client(&fx, "service").with_grant_types(vec![GrantType::ClientCredentials]);
    let (service, secret) = registry.register(&ctx, service).await.expect("register");
    let secret = secret.unwrap();

    registry
        .client_credentials(&ctx, &service.id, &secret)
        .await
        .expect("client credentials");

    // client 自身作为主体签发
    let request = registry
        .client_credentials_token_request(&ctx, &service.id, scopes(&["api"]))
        .await
        .expect("token request");
    let issued = fx
        .tokens()
        .issue_access_and_refresh_tokens(&ctx, &request, "")
        .await
        .expect("issue");
    let (subject, _) = fx
        .tokens()
        .refresh_token_info(&ctx, &service.id, issued.refresh_token.as_deref().unwrap())
        .await
        .expect("info");
    assert_eq!(subject, service.id.to_string());
}

#[tokio::test]
async fn test_unknown_client() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();

    let err = fx.clients().get_by_id(&ctx, &ClientId::new()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = fx
        .clients()
        .client_credentials_token_request(&ctx, &ClientId::new(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_list_and_count() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    let registry = fx.clients();

    for i in 0..3 {
        let client = Client::native(ClientId::new(), fx.namespace_id, format!("app-{}", i), vec![]);
        registry.register(&ctx, client).await.expect("register");
    }

    // 夹具已有两个 client
    assert_eq!(registry.count(&ctx).await.expect("count"), 5);

    let first = registry
        .list(&ctx, &Pagination::new(1, 2))
        .await
        .expect("page 1");
    let third = registry
        .list(&ctx, &Pagination::new(3, 2))
        .await
        .expect("page 3");
    assert_eq!(first.total, 5);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.total_pages(), 3);
    assert_eq!(third.items.len(), 1);

    let beyond = registry
        .list(&ctx, &Pagination::new(4, 2))
        .await
        .expect("page 4");
    assert!(beyond.items.is_empty());
}
