//! Forward WebSocket integration tests
//!
//! Run with: cargo test -p integration-tests --test forward_ws_tests

use std::sync::Arc;

use bridge_common::BridgeError;
use bridge_connection::{ConnectionPhase, ConnectionRegistry, LifecycleEvent};
use bridge_core::{CallKind, CallRequest, ConnectionDescriptor, ConnectionVariant};
use integration_tests::{
    eventually, test_registry, wait_available, EventSink, MockGateway, ACCOUNT, VERIFY_KEY, WAIT,
};
use serde_json::json;

async fn launch(gateway: &MockGateway) -> Arc<ConnectionRegistry> {
    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::forward_ws(ACCOUNT, VERIFY_KEY, gateway.ws_host())],
        )
        .expect("register failed");
    registry.launch_all().await.expect("launch failed");
    wait_available(&registry, ACCOUNT).await.expect("no session");
    Arc::new(registry)
}

#[tokio::test]
async fn test_call_round_trip() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = launch(&gateway).await;
    assert!(eventually(|| registry.phase(ACCOUNT) == Some(ConnectionPhase::Available)).await);

    let reply = registry
        .call_method(
            ACCOUNT,
            "sendFriendMessage",
            CallKind::Post,
            json!({ "target": 1, "text": "hi" }),
        )
        .await
        .unwrap();
    assert_eq!(
        reply,
        json!({ "command": "sendFriendMessage", "echo": { "target": 1, "text": "hi" } })
    );

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].transport, "ws");

    registry.stop_all().await;
}

#[tokio::test]
async fn test_replies_matched_out_of_order() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = launch(&gateway).await;
    gateway.hold("sendGroupMessage");

    let calls: Vec<_> = (0..3)
        .map(|seq| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .call(
                        ACCOUNT,
                        CallRequest::post("sendGroupMessage").param("seq", seq),
                    )
                    .await
            })
        })
        .collect();

    assert!(eventually(|| gateway.held_count() == 3).await);
    gateway.release();

    for (seq, call) in calls.into_iter().enumerate() {
        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply["echo"]["seq"], seq);
    }

    registry.stop_all().await;
}

#[tokio::test]
async fn test_reconnect_fails_pending_then_recovers() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = launch(&gateway).await;
    let mut lifecycle = registry.subscribe_lifecycle();
    gateway.hold("friendList");

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.call(ACCOUNT, CallRequest::get("friendList")).await })
        })
        .collect();
    assert!(eventually(|| gateway.held_count() == 3).await);

    gateway.drop_sockets();
    for call in calls {
        let result = tokio::time::timeout(WAIT, call).await.unwrap().unwrap();
        assert!(matches!(result, Err(BridgeError::ConnectionClosed)), "got {result:?}");
    }

    let event = tokio::time::timeout(WAIT, lifecycle.recv()).await.unwrap().unwrap();
    assert!(matches!(
        event,
        LifecycleEvent::AccountConnectionFail { connection: ConnectionVariant::ForwardWs, .. }
    ));

    assert!(eventually(|| gateway.socket_count() == 2).await);
    wait_available(&registry, ACCOUNT).await.unwrap();

    gateway.release();
    let reply = registry
        .call(ACCOUNT, CallRequest::get("friendList"))
        .await
        .unwrap();
    assert_eq!(reply["command"], "friendList");

    registry.stop_all().await;
}

#[tokio::test]
async fn test_pushed_events_reach_listeners() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::forward_ws(ACCOUNT, VERIFY_KEY, gateway.ws_host())],
        )
        .unwrap();
    let mut sink = EventSink::attach(&registry, ACCOUNT).unwrap();
    registry.launch_all().await.unwrap();
    wait_available(&registry, ACCOUNT).await.unwrap();

    gateway.push_event(json!({
        "type": "FriendMessage",
        "sender": { "id": 5, "nickname": "five" },
        "messageChain": [],
    }));
    gateway.push_event(json!({ "type": "BotOnlineEvent", "qq": ACCOUNT.get() }));

    let first = sink.next().await.unwrap();
    assert!(first.is("FriendMessage"));
    assert_eq!(first.data["sender"]["id"], 5);
    assert!(first.field("type").is_none());

    let second = sink.next().await.unwrap();
    assert!(second.is("BotOnlineEvent"));

    registry.stop_all().await;
}

#[tokio::test]
async fn test_bad_verify_key_never_authenticates() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = test_registry();
    registry
        .register(
            ACCOUNT,
            vec![ConnectionDescriptor::forward_ws(ACCOUNT, "wrong-key", gateway.ws_host())],
        )
        .unwrap();
    registry.launch_all().await.unwrap();

    assert!(eventually(|| registry.phase(ACCOUNT) == Some(ConnectionPhase::Degraded)).await);
    assert_eq!(gateway.socket_count(), 0);

    let err = registry
        .call(
            ACCOUNT,
            CallRequest::get("friendList").with_timeout(std::time::Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(_)));

    registry.stop_all().await;
    assert_eq!(registry.phase(ACCOUNT), Some(ConnectionPhase::Stopped));
}

#[tokio::test]
async fn test_calls_after_stop_are_rejected() {
    let gateway = MockGateway::start(ACCOUNT.get(), VERIFY_KEY).await.unwrap();
    let registry = launch(&gateway).await;

    registry.stop_all().await;
    let err = registry
        .call(ACCOUNT, CallRequest::get("about").without_session())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ConnectionClosed));
}
