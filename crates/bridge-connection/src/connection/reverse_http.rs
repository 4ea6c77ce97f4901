//! Reverse HTTP (webhook) connection
//!
//! The gateway POSTs each event as a JSON body. There is no outbound
//! channel, so every call needs a fallback.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{AccountId, CallRequest, ConnectionVariant, ReverseHttpConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::gate::RequestGate;
use super::phase::{ConnectionPhase, PhaseCell};
use super::shutdown::ShutdownSignal;
use super::transport::{Connection, ConnectionContext};
use crate::broadcast::EventDispatcher;
use crate::session::SessionState;

/// Header the gateway sets to the bot account on every webhook POST
pub const ACCOUNT_HEADER: &str = "qq";

pub struct ReverseHttpConnection {
    id: String,
    account: AccountId,
    path: String,
    gate: RequestGate,
    session: Arc<SessionState>,
    dispatcher: Arc<EventDispatcher>,
    phase: PhaseCell,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for ReverseHttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseHttpConnection")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("path", &self.path)
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl ReverseHttpConnection {
    pub fn new(account: AccountId, config: ReverseHttpConfig, context: ConnectionContext) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account,
            gate: RequestGate::new(&config.headers, &HashMap::new())
                .require_header(ACCOUNT_HEADER, account.to_string()),
            path: config.path,
            session: context.session,
            dispatcher: context.dispatcher,
            phase: PhaseCell::default(),
            shutdown: ShutdownSignal::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

async fn webhook_handler(
    State(connection): State<Arc<ReverseHttpConnection>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if connection.shutdown.is_triggered() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    if let Err(rejection) = connection.gate.check(&headers, &HashMap::new()) {
        tracing::warn!(
            account = %connection.account,
            path = %connection.path,
            reason = %rejection,
            "Rejected webhook"
        );
        return (StatusCode::UNAUTHORIZED, "Authorization failed").into_response();
    }

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload @ Value::Object(_)) => payload,
        _ => return (StatusCode::BAD_REQUEST, "Event body must be a JSON object").into_response(),
    };

    connection.session.set_connected(true);
    connection.session.set_alive(true);
    connection.phase.set(ConnectionPhase::Available);
    connection.dispatcher.emit_raw(payload);

    Json(json!({ "command": "", "data": {} })).into_response()
}

#[async_trait]
impl Connection for ReverseHttpConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn variant(&self) -> ConnectionVariant {
        ConnectionVariant::ReverseHttp
    }

    fn account(&self) -> AccountId {
        self.account
    }

    fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    fn phase(&self) -> ConnectionPhase {
        self.phase.get()
    }

    async fn call(&self, request: CallRequest) -> BridgeResult<Value> {
        Err(BridgeError::Unsupported {
            command: request.command,
            kind: request.kind,
            variant: ConnectionVariant::ReverseHttp,
        })
    }

    async fn run(self: Arc<Self>) -> BridgeResult<()> {
        self.shutdown.wait().await;
        self.phase.set(ConnectionPhase::Stopped);
        Ok(())
    }

    fn stop(&self) {
        self.shutdown.trigger();
        self.phase.set(ConnectionPhase::Stopped);
    }

    fn routes(self: Arc<Self>) -> Option<Router> {
        let path = self.path.clone();
        Some(Router::new().route(&path, post(webhook_handler)).with_state(self))
    }
}
