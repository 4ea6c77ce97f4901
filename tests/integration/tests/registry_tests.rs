//! Registry integration tests: fallback composition, launch and shutdown
//!
//! Run with: cargo test -p integration-tests --test registry_tests

use std::time::Duration;

use bridge_common::{AppConfig, BridgeError};
use bridge_connection::{Connection, ConnectionPhase, ConnectionRegistry, LifecycleEvent};
use bridge_core::{
    AccountId, CallRequest, ConnectionDescriptor, ConnectionVariant, ErrorKind, FormPart,
};
use integration_tests::{
    eventually, test_registry, wait_available, EventSink, MockGateway, ACCOUNT, VERIFY_KEY, WAIT,
};
use reqwest::StatusCode;
use serde_json::json;

fn webhook_with_fallback(gateway: &MockGateway) -> ConnectionRegistry {
    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![
                ConnectionDescriptor::forward_http(ACCOUNT, VERIFY_KEY, gateway.http_host()),
                ConnectionDescriptor::reverse_http(ACCOUNT, VERIFY_KEY, "/hook"),
            ],
        )
        .unwrap();
    registry
}

fn socket_with_fallback(gateway: &MockGateway) -> ConnectionRegistry {
    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![
                ConnectionDescriptor::forward_http(ACCOUNT, VERIFY_KEY, gateway.http_host()),
                ConnectionDescriptor::forward_ws(ACCOUNT, VERIFY_KEY, gateway.ws_host()),
            ],
        )
        .unwrap();
    registry
}

fn upload() -> CallRequest {
    CallRequest::multipart("file_upload")
        .param("type", "group")
        .part(FormPart::file("file", b"report".to_vec()).with_file_meta("r.txt", "text/plain"))
}

async fn post_event(registry: &ConnectionRegistry) -> StatusCode {
    let addr = registry.local_addr().expect("reverse server bound");
    reqwest::Client::new()
        .post(format!("http://{addr}/hook"))
        .header("qq", ACCOUNT.to_string())
        .json(&json!({ "type": "BotOnlineEvent", "qq": ACCOUNT.get() }))
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn test_fallback_matches_direct_http() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let composed = webhook_with_fallback(&gateway);
    let mut sink = EventSink::attach(&composed, ACCOUNT).unwrap();
    composed.launch_all().await.unwrap();

    let connection = composed.connection(ACCOUNT).unwrap();
    assert_eq!(connection.variant(), ConnectionVariant::ReverseHttp);
    assert_eq!(
        connection.fallback().map(|f| f.variant()),
        Some(ConnectionVariant::ForwardHttp)
    );

    assert_eq!(post_event(&composed).await, StatusCode::OK);
    assert!(sink.next().await.unwrap().is("BotOnlineEvent"));

    let direct = test_registry();
    direct
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::forward_http(ACCOUNT, VERIFY_KEY, gateway.http_host())],
        )
        .unwrap();

    let request = CallRequest::get("groupList").param("page", 2);
    let via_fallback = composed.call(ACCOUNT, request.clone()).await.unwrap();
    let via_direct = direct.call(ACCOUNT, request).await.unwrap();
    assert_eq!(via_fallback, via_direct);
    assert_eq!(via_fallback["command"], "groupList");

    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.transport == "http"));

    composed.stop_all().await;
}

#[tokio::test]
async fn test_multipart_routed_through_socket_fallback() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let composed = socket_with_fallback(&gateway);
    composed.launch_all().await.unwrap();
    wait_available(&composed, ACCOUNT).await.unwrap();

    let connection = composed.connection(ACCOUNT).unwrap();
    assert_eq!(connection.variant(), ConnectionVariant::ForwardWs);

    let via_fallback = composed.call(ACCOUNT, upload()).await.unwrap();
    assert_eq!(gateway.verify_count(), 0, "fallback reuses the socket session");
    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].transport, "http");
    assert_eq!(calls[0].command, "file_upload");

    let direct = test_registry();
    direct
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::forward_http(ACCOUNT, VERIFY_KEY, gateway.http_host())],
        )
        .unwrap();
    let via_direct = direct.call(ACCOUNT, upload()).await.unwrap();
    assert_eq!(via_fallback, via_direct);
    assert_eq!(via_fallback["echo"]["file"]["fileName"], "r.txt");

    // Socket calls still use the socket
    let reply = composed.call(ACCOUNT, CallRequest::get("friendList")).await.unwrap();
    assert_eq!(reply["command"], "friendList");
    assert_eq!(gateway.calls().last().map(|c| c.transport), Some("ws"));

    composed.stop_all().await;
}

#[tokio::test]
async fn test_fallback_session_error_renews_socket_session() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = socket_with_fallback(&gateway);
    registry.launch_all().await.unwrap();
    let first_key = wait_available(&registry, ACCOUNT).await.unwrap();

    gateway.expire_sessions();
    let err = registry.call(ACCOUNT, upload()).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::InvalidSession));

    assert!(eventually(|| gateway.socket_count() == 2).await);
    let second_key = wait_available(&registry, ACCOUNT).await.unwrap();
    assert_ne!(second_key, first_key);

    let reply = registry.call(ACCOUNT, upload()).await.unwrap();
    assert_eq!(reply["command"], "file_upload");
    assert_eq!(gateway.verify_count(), 0);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_fallback_waits_for_primary_connection() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = webhook_with_fallback(&gateway);
    registry.launch_all().await.unwrap();

    let err = registry
        .call(
            ACCOUNT,
            CallRequest::get("groupList").with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));
    assert_eq!(gateway.verify_count(), 0);

    registry.stop_all().await;
}

#[tokio::test]
async fn test_missing_fallback_is_unsupported() {
    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::reverse_ws(ACCOUNT, VERIFY_KEY, "/gateway")],
        )
        .unwrap();

    let err = registry
        .call(ACCOUNT, CallRequest::multipart("file_upload"))
        .await
        .unwrap_err();
    match err {
        BridgeError::Unsupported { command, variant, .. } => {
            assert_eq!(command, "file_upload");
            assert_eq!(variant, ConnectionVariant::ReverseWs);
        }
        other => panic!("expected Unsupported, got {other:?}"),
    }
}

#[tokio::test]
async fn test_launch_and_stop_all_accounts() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let other = AccountId::new(20_002);

    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::forward_http(ACCOUNT, VERIFY_KEY, gateway.http_host())],
        )
        .unwrap();
    registry
        .register(other, vec![ConnectionDescriptor::reverse_http(other, "k", "/other")])
        .unwrap();
    assert_eq!(registry.accounts(), vec![ACCOUNT, other]);

    let mut lifecycle = registry.subscribe_lifecycle();
    registry.launch_all().await.unwrap();

    let mut launched = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(WAIT, lifecycle.recv()).await.unwrap().unwrap();
        if let LifecycleEvent::AccountLaunch(account) = event {
            launched.push(account);
        }
    }
    launched.sort();
    assert_eq!(launched, vec![ACCOUNT, other]);

    let late = AccountId::new(30_003);
    assert!(registry
        .register(late, vec![ConnectionDescriptor::reverse_http(late, "k", "/late")])
        .is_err());

    let addr = registry.local_addr().expect("reverse server bound");
    let health = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    registry.stop_all().await;
    assert_eq!(registry.phase(ACCOUNT), Some(ConnectionPhase::Stopped));
    assert_eq!(registry.phase(other), Some(ConnectionPhase::Stopped));
    assert!(reqwest::get(format!("http://{addr}/health")).await.is_err());

    let mut shut_down = Vec::new();
    while let Ok(event) = lifecycle.try_recv() {
        if let LifecycleEvent::AccountShutdown(account) = event {
            shut_down.push(account);
        }
    }
    shut_down.sort();
    assert_eq!(shut_down, vec![ACCOUNT, other]);
}

#[tokio::test]
async fn test_registry_from_config() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let config = AppConfig::from_toml(&format!(
        r#"
        [server]
        host = "127.0.0.1"
        port = 0

        [[accounts]]
        account = {account}
        verify_key = "{VERIFY_KEY}"

        [[accounts.connections]]
        kind = "forward-http"
        host = "{host}"
        "#,
        account = ACCOUNT.get(),
        host = gateway.http_host(),
    ))
    .unwrap();

    let registry = ConnectionRegistry::from_config(&config).unwrap();
    assert_eq!(registry.accounts(), vec![ACCOUNT]);
    assert_eq!(
        registry.connection(ACCOUNT).unwrap().variant(),
        ConnectionVariant::ForwardHttp
    );

    let reply = registry
        .call(ACCOUNT, CallRequest::get("about").without_session())
        .await
        .unwrap();
    assert_eq!(reply["command"], "about");
}
