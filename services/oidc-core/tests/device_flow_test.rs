//! 设备授权流程

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Fixture, scopes};
use xoidc_common::{ClientId, RequestContext};
use xoidc_core::domain::entities::DeviceAuthorizationStatus;
use xoidc_errors::AppError;

async fn start(fx: &Fixture, device_code: &str, user_code: &str, expires_in: Duration) {
    fx.devices()
        .store(
            &RequestContext::new(),
            &fx.native.id,
            device_code,
            user_code,
            Utc::now() + expires_in,
            scopes(&["openid", "profile"]),
        )
        .await
        .expect("store device authorization");
}

#[tokio::test]
async fn test_device_flow_completion() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    let devices = fx.devices();

    start(&fx, "device-1", "ABCD-EFGH", Duration::minutes(5)).await;

    // 1. 设备轮询，尚未授权
    let polled = devices
        .get_by_device_and_client(&ctx, &fx.native.id, "device-1")
        .await
        .expect("poll");
    assert_eq!(polled.status(), DeviceAuthorizationStatus::Pending);
    assert!(polled.subject.is_none());

    // 2. 用户在确认页输入 user code
    let shown = devices.get_by_user_code(&ctx, "ABCD-EFGH").await.expect("lookup");
    assert_eq!(shown.device_code, "device-1");
    assert_eq!(shown.scopes, scopes(&["openid", "profile"]));

    // 3. 用户同意
    let subject = fx.alice.id.to_string();
    devices
        .complete(&ctx, "ABCD-EFGH", &subject)
        .await
        .expect("complete");

    let polled = devices
        .get_by_device_and_client(&ctx, &fx.native.id, "device-1")
        .await
        .expect("poll");
    assert_eq!(polled.status(), DeviceAuthorizationStatus::Completed);
    assert_eq!(polled.subject.as_deref(), Some(subject.as_str()));

    // 4. 终态不可再变
    let err = devices.deny(&ctx, "ABCD-EFGH").await.unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));
    let err = devices.complete(&ctx, "ABCD-EFGH", "someone").await.unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));
}

#[tokio::test]
async fn test_device_flow_denial() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    let devices = fx.devices();

    start(&fx, "device-2", "WXYZ-0000", Duration::minutes(5)).await;
    devices.deny(&ctx, "WXYZ-0000").await.expect("deny");

    let polled = devices
        .get_by_device_and_client(&ctx, &fx.native.id, "device-2")
        .await
        .expect("poll");
    assert_eq!(polled.status(), DeviceAuthorizationStatus::Denied);
    assert!(polled.subject.is_none());

    let err = devices
        .complete(&ctx, "WXYZ-0000", &fx.alice.id.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::FailedPrecondition(_)));
}

#[tokio::test]
async fn test_duplicate_user_code_is_rejected() {
    let fx = Fixture::new().await;
    start(&fx, "device-a", "SAME-CODE", Duration::minutes(5)).await;

    let err = fx
        .devices()
        .store(
            &RequestContext::new(),
            &fx.native.id,
            "device-b",
            "SAME-CODE",
            Utc::now() + Duration::minutes(5),
            vec![],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateUserCode(_)));

    // 失败的写入不影响已有授权
    let shown = fx
        .devices()
        .get_by_user_code(&RequestContext::new(), "SAME-CODE")
        .await
        .expect("lookup");
    assert_eq!(shown.device_code, "device-a");
}

async fn restore(fx: &Fixture, client_id: &ClientId, device_code: &str, user_code: &str) -> AppError {
    fx.devices()
        .store(
            &RequestContext::new(),
            client_id,
            device_code,
            user_code,
            Utc::now() + Duration::minutes(10),
            vec![],
        )
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_storing_same_pair_again_is_rejected() {
    let fx = Fixture::new().await;
    start(&fx, "device-r", "RETRY-001", Duration::minutes(5)).await;

    let err = restore(&fx, &fx.native.id, "device-r", "RETRY-001").await;
    assert!(matches!(err, AppError::DuplicateUserCode(_)));

    let polled = fx
        .devices()
        .get_by_device_and_client(&RequestContext::new(), &fx.native.id, "device-r")
        .await
        .expect("poll");
    assert!(polled.expires_at < Utc::now() + Duration::minutes(6));
}

#[tokio::test]
async fn test_finished_authorization_cannot_be_taken_over() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    start(&fx, "device-t", "TAKE-0001", Duration::minutes(5)).await;
    fx.devices().deny(&ctx, "TAKE-0001").await.expect("deny");

    // 其他 client 重新写入同一对
    let err = restore(&fx, &fx.other.id, "device-t", "TAKE-0001").await;
    assert!(matches!(err, AppError::DuplicateUserCode(_)));

    // 新 user code 也不能复用已有 device code
    let err = restore(&fx, &fx.other.id, "device-t", "TAKE-0002").await;
    assert!(matches!(err, AppError::Validation(_)));

    let err = fx
        .devices()
        .get_by_device_and_client(&ctx, &fx.other.id, "device-t")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let polled = fx
        .devices()
        .get_by_device_and_client(&ctx, &fx.native.id, "device-t")
        .await
        .expect("owner poll");
    assert_eq!(polled.status(), DeviceAuthorizationStatus::Denied);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_complete_and_deny_have_single_winner() {
    for round in 0..10 {
        let fx = Arc::new(Fixture::new().await);
        let device_code = format!("device-race-{}", round);
        let user_code = format!("RACE-{:04}", round);
        start(&fx, &device_code, &user_code, Duration::minutes(5)).await;

        let subject = fx.alice.id.to_string();
        let complete = {
            let fx = fx.clone();
            let user_code = user_code.clone();
            tokio::spawn(async move {
                fx.devices()
                    .complete(&RequestContext::new(), &user_code, &subject)
                    .await
            })
        };
        let deny = {
            let fx = fx.clone();
            let user_code = user_code.clone();
            tokio::spawn(async move { fx.devices().deny(&RequestContext::new(), &user_code).await })
        };

        let results = futures::future::join_all([complete, deny]).await;
        let mut winners = 0;
        for result in results {
            match result.expect("join") {
                Ok(()) => winners += 1,
                Err(e) => assert!(matches!(e, AppError::FailedPrecondition(_))),
            }
        }
        assert_eq!(winners, 1);

        // 终态只能是其中之一
        let shown = fx
            .devices()
            .get_by_device_and_client(&RequestContext::new(), &fx.native.id, &device_code)
            .await
            .expect("poll");
        assert!(shown.done != shown.denied);
    }
}

#[tokio::test]
async fn test_store_for_unknown_client() {
    let fx = Fixture::new().await;
    let err = fx
        .devices()
        .store(
            &RequestContext::new(),
            &ClientId::new(),
            "device-x",
            "NOPE-0000",
            Utc::now() + Duration::minutes(5),
            vec![],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = fx
        .devices()
        .get_by_user_code(&RequestContext::new(), "NOPE-0000")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_polling_by_other_client_is_not_found() {
    let fx = Fixture::new().await;
    start(&fx, "device-3", "MINE-0001", Duration::minutes(5)).await;

    let err = fx
        .devices()
        .get_by_device_and_client(&RequestContext::new(), &fx.other.id, "device-3")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = fx
        .devices()
        .get_by_device_and_client(&RequestContext::new(), &fx.native.id, "device-unknown")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_expired_authorization() {
    let fx = Fixture::new().await;
    let ctx = RequestContext::new();
    start(&fx, "device-4", "OLD-CODE", Duration::seconds(-1)).await;

    // 设备轮询得到过期错误
    let err = fx
        .devices()
        .get_by_device_and_client(&ctx, &fx.native.id, "device-4")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Expired(_)));

    // 用户侧视为不存在
    let err = fx.devices().get_by_user_code(&ctx, "OLD-CODE").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = fx
        .devices()
        .complete(&ctx, "OLD-CODE", &fx.alice.id.to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_unknown_user_code() {
    let fx = Fixture::new().await;
    let err = fx
        .devices()
        .deny(&RequestContext::new(), "NEVER-SEEN")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
