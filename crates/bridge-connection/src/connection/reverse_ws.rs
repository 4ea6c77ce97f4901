//! Reverse WebSocket connection
//!
//! The gateway dials our server. After the request passes the gate the
//! socket is upgraded, we send the `verify` frame and the gateway answers
//! with the session key. From then on calls and events are multiplexed
//! exactly like the forward socket. One socket is served at a time.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{AccountId, CallRequest, ConnectionVariant, ReverseWsConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::gate::RequestGate;
use super::multiplex::{MultiplexChannel, RouteOutcome, OUTBOUND_BUFFER};
use super::phase::{ConnectionPhase, PhaseCell};
use super::shutdown::ShutdownSignal;
use super::transport::{Connection, ConnectionContext};
use crate::protocol::CallFrame;
use crate::session::SessionState;

pub struct ReverseWsConnection {
    id: String,
    account: AccountId,
    verify_key: String,
    path: String,
    gate: RequestGate,
    channel: MultiplexChannel,
    session: Arc<SessionState>,
    /// A socket is currently being served
    active: AtomicBool,
    phase: PhaseCell,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for ReverseWsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseWsConnection")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("path", &self.path)
            .field("active", &self.active.load(Ordering::SeqCst))
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl ReverseWsConnection {
    pub fn new(
        account: AccountId,
        verify_key: impl Into<String>,
        config: ReverseWsConfig,
        context: ConnectionContext,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account,
            verify_key: verify_key.into(),
            gate: RequestGate::new(&config.headers, &config.params),
            path: config.path,
            channel: MultiplexChannel::new(
                account,
                context.session.clone(),
                context.dispatcher,
                context.settings.call_timeout,
            ),
            session: context.session,
            active: AtomicBool::new(false),
            phase: PhaseCell::default(),
            shutdown: ShutdownSignal::default(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn serve_socket(self: Arc<Self>, socket: WebSocket) {
        tracing::info!(account = %self.account, connection = %self.id, "Gateway connected");
        self.phase.set(ConnectionPhase::Authenticating);

        let (mut sink, mut stream) = socket.split();

        match CallFrame::verify(self.account, &self.verify_key).to_json() {
            Ok(verify) => {
                if let Err(e) = sink.send(Message::Text(verify.into())).await {
                    tracing::warn!(account = %self.account, error = %e, "Failed to send verify frame");
                    self.teardown();
                    return;
                }
            }
            Err(e) => {
                tracing::error!(account = %self.account, error = %e, "Failed to encode verify frame");
                self.teardown();
                return;
            }
        }

        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        self.channel.attach(tx);
        self.session.set_alive(true);

        let mut authenticated = false;
        loop {
            tokio::select! {
                () = self.shutdown.wait() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }

                Some(text) = rx.recv() => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!(account = %self.account, error = %e, "Send failed");
                        break;
                    }
                }

                () = self.session.wait_for_disconnected(), if authenticated => {
                    tracing::info!(account = %self.account, "Session key cleared, closing socket");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }

                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text.to_string(),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(_) => {
                                tracing::warn!(account = %self.account, "Discarding non-UTF-8 binary frame");
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!(account = %self.account, error = %e, "Socket error");
                            break;
                        }
                    };

                    match self.channel.route(&text) {
                        RouteOutcome::Continue => {}
                        RouteOutcome::Authenticated => {
                            authenticated = true;
                            self.phase.set(ConnectionPhase::Available);
                        }
                        RouteOutcome::Close => {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            }
        }

        self.teardown();
        tracing::info!(account = %self.account, connection = %self.id, "Gateway disconnected");
    }

    fn teardown(&self) {
        self.channel.detach();
        self.session.reset();
        self.channel.fail_pending();
        if !self.shutdown.is_triggered() {
            self.phase.set(ConnectionPhase::Degraded);
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

async fn upgrade_handler(
    State(connection): State<Arc<ReverseWsConnection>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if connection.shutdown.is_triggered() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    if let Err(rejection) = connection.gate.check(&headers, &params) {
        tracing::warn!(
            account = %connection.account,
            path = %connection.path,
            reason = %rejection,
            "Rejected reverse WebSocket"
        );
        return (StatusCode::UNAUTHORIZED, "Authorization failed").into_response();
    }

    if connection.active.swap(true, Ordering::SeqCst) {
        tracing::warn!(account = %connection.account, "Reverse WebSocket already active");
        return (StatusCode::CONFLICT, "Connection already active").into_response();
    }

    let failed = connection.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(account = %failed.account, error = %e, "WebSocket upgrade failed");
        failed.active.store(false, Ordering::SeqCst);
    })
    .on_upgrade(move |socket| connection.serve_socket(socket))
}

#[async_trait]
impl Connection for ReverseWsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn variant(&self) -> ConnectionVariant {
        ConnectionVariant::ReverseWs
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
        if self.phase.get().is_terminal() {
            return Err(BridgeError::ConnectionClosed);
        }
        self.channel.call(request).await
    }

    /// The socket is driven by the server; this only parks until stopped
    async fn run(self: Arc<Self>) -> BridgeResult<()> {
        self.shutdown.wait().await;
        self.phase.set(ConnectionPhase::Stopped);
        Ok(())
    }

    fn stop(&self) {
        self.shutdown.trigger();
        self.phase.set(ConnectionPhase::Stopped);
        self.channel.fail_pending();
    }

    fn routes(self: Arc<Self>) -> Option<Router> {
        let path = self.path.clone();
        Some(Router::new().route(&path, get(upgrade_handler)).with_state(self))
    }
}
