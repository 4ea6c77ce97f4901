//! Forward HTTP integration tests
//!
//! Run with: cargo test -p integration-tests --test forward_http_tests

use bridge_core::{CallKind, CallRequest, ConnectionDescriptor, ErrorKind, FormPart};
use bridge_connection::{ConnectionPhase, ConnectionRegistry};
use integration_tests::{
    eventually, test_registry, EventSink, MockGateway, ACCOUNT, VERIFY_KEY,
};
use serde_json::json;

fn http_registry(gateway: &MockGateway, verify_key: &str) -> ConnectionRegistry {
    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::forward_http(ACCOUNT, verify_key, gateway.http_host())],
        )
        .expect("register failed");
    registry
}

#[tokio::test]
async fn test_poll_delivers_events_in_order() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = http_registry(&gateway, VERIFY_KEY);
    let mut sink = EventSink::attach(&registry, ACCOUNT).unwrap();
    registry.launch_all().await.unwrap();

    gateway.queue_event(json!({ "type": "GroupMessage", "sender": { "id": 1 }, "messageChain": [] }));
    gateway.queue_event(json!({ "type": "GroupMessage", "sender": { "id": 2 }, "messageChain": [] }));

    let first = sink.next().await.unwrap();
    let second = sink.next().await.unwrap();
    assert!(first.is("GroupMessage"));
    assert_eq!(first.data["sender"]["id"], 1);
    assert_eq!(second.data["sender"]["id"], 2);

    assert!(eventually(|| registry.phase(ACCOUNT) == Some(ConnectionPhase::Available)).await);
    assert_eq!(gateway.verify_count(), 1);

    registry.stop_all().await;
    assert_eq!(registry.phase(ACCOUNT), Some(ConnectionPhase::Stopped));
}

#[tokio::test]
async fn test_calls_authenticate_lazily() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = http_registry(&gateway, VERIFY_KEY);
    assert_eq!(gateway.verify_count(), 0);

    let reply = registry
        .call_method(ACCOUNT, "friendList", CallKind::Get, json!({ "page": 1 }))
        .await
        .unwrap();
    assert_eq!(reply, json!({ "command": "friendList", "echo": { "page": "1" } }));

    let reply = registry
        .call_method(
            ACCOUNT,
            "sendFriendMessage",
            CallKind::Post,
            json!({ "target": 9, "messageChain": [] }),
        )
        .await
        .unwrap();
    assert_eq!(reply["echo"]["target"], 9);

    assert_eq!(gateway.verify_count(), 1);
    assert!(gateway.calls().iter().all(|c| c.transport == "http"));
}

#[tokio::test]
async fn test_invalid_session_triggers_reauth() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = http_registry(&gateway, VERIFY_KEY);

    registry.call(ACCOUNT, CallRequest::get("friendList")).await.unwrap();
    let first_key = registry.session(ACCOUNT).unwrap().session_key();
    assert!(first_key.is_some());

    gateway.expire_sessions();
    let err = registry
        .call(ACCOUNT, CallRequest::get("friendList"))
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::InvalidSession));
    assert!(registry.session(ACCOUNT).unwrap().session_key().is_none());

    registry.call(ACCOUNT, CallRequest::get("friendList")).await.unwrap();
    assert_eq!(gateway.verify_count(), 2);
    assert_ne!(registry.session(ACCOUNT).unwrap().session_key(), first_key);
}

#[tokio::test]
async fn test_multipart_upload() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = http_registry(&gateway, VERIFY_KEY);

    let request = CallRequest::multipart("file_upload")
        .param("type", "group")
        .param("path", "/docs")
        .part(FormPart::file("file", b"hello".to_vec()).with_file_meta("hello.txt", "text/plain"));
    let reply = registry.call(ACCOUNT, request).await.unwrap();

    assert_eq!(reply["command"], "file_upload");
    assert_eq!(reply["echo"]["type"], "group");
    assert_eq!(reply["echo"]["path"], "/docs");
    assert_eq!(reply["echo"]["file"]["fileName"], "hello.txt");
    assert_eq!(reply["echo"]["file"]["size"], 5);
}

#[tokio::test]
async fn test_bad_verify_key_is_authentication_error() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = http_registry(&gateway, "wrong-key");

    let err = registry
        .call(ACCOUNT, CallRequest::get("friendList"))
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::InvalidVerifyKey));
    assert!(registry.session(ACCOUNT).unwrap().session_key().is_none());
}

#[tokio::test]
async fn test_sessionless_call_skips_verify() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = http_registry(&gateway, VERIFY_KEY);

    let reply = registry
        .call(ACCOUNT, CallRequest::get("about").without_session())
        .await
        .unwrap();
    assert_eq!(reply["command"], "about");
    assert_eq!(gateway.verify_count(), 0);
}
