//! Forward WebSocket connection
//!
//! Dials `{host}/all?verifyKey=..&qq=..`, waits for the handshake frame
//! carrying the session key, then multiplexes calls and events on the one
//! socket. On any drop the session and the correlation table are reset
//! (pending calls fail with `ConnectionClosed`) and the socket is redialed
//! with exponential backoff.

use async_trait::async_trait;
use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{AccountId, CallRequest, ConnectionVariant, ForwardWsConfig};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::backoff::BackoffState;
use super::multiplex::{MultiplexChannel, RouteOutcome, OUTBOUND_BUFFER};
use super::phase::{ConnectionPhase, PhaseCell};
use super::settings::ConnectionSettings;
use super::shutdown::ShutdownSignal;
use super::transport::{Connection, ConnectionContext};
use crate::broadcast::{LifecycleBus, LifecycleEvent};
use crate::protocol::ALL_CHANNEL;
use crate::session::SessionState;

pub struct ForwardWsConnection {
    id: String,
    account: AccountId,
    verify_key: String,
    config: ForwardWsConfig,
    channel: MultiplexChannel,
    session: Arc<SessionState>,
    lifecycle: LifecycleBus,
    settings: ConnectionSettings,
    phase: PhaseCell,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for ForwardWsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardWsConnection")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("host", &self.config.host)
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl ForwardWsConnection {
    pub fn new(
        account: AccountId,
        verify_key: impl Into<String>,
        config: ForwardWsConfig,
        context: ConnectionContext,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account,
            verify_key: verify_key.into(),
            config,
            channel: MultiplexChannel::new(
                account,
                context.session.clone(),
                context.dispatcher.clone(),
                context.settings.call_timeout,
            ),
            session: context.session.clone(),
            lifecycle: context.lifecycle,
            settings: context.settings,
            phase: PhaseCell::default(),
            shutdown: ShutdownSignal::default(),
        }
    }

    /// Endpoint URL with credentials in the query string
    pub fn endpoint(&self) -> BridgeResult<Url> {
        let base = format!("{}/{}", self.config.host.trim_end_matches('/'), ALL_CHANNEL);
        let account = self.account.to_string();
        Url::parse_with_params(
            &base,
            [("verifyKey", self.verify_key.as_str()), ("qq", account.as_str())],
        )
        .map_err(|e| BridgeError::configuration(format!("invalid host `{}`: {e}", self.config.host)))
    }

    /// One socket lifetime: dial, serve frames until the socket drops or
    /// shutdown is requested. `Ok` only on shutdown.
    async fn serve_once(&self, backoff: &mut BackoffState) -> BridgeResult<()> {
        let url = self.endpoint()?;
        self.phase.set(ConnectionPhase::Authenticating);

        let (socket, _) = tokio::select! {
            () = self.shutdown.wait() => return Ok(()),
            connected = connect_async(url.as_str()) => connected.map_err(BridgeError::transport)?,
        };
        tracing::info!(account = %self.account, connection = %self.id, "WebSocket connected");

        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        self.channel.attach(tx);
        self.session.set_alive(true);

        let mut authenticated = false;
        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown.wait() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }

                Some(text) = rx.recv() => {
                    sink.send(Message::Text(text)).await.map_err(BridgeError::transport)?;
                }

                // A session error seen by the fallback clears the shared key
                () = self.session.wait_for_disconnected(), if authenticated => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Err(BridgeError::protocol("session key cleared"));
                }

                _ = heartbeat.tick() => {
                    // A failed ping alone does not mark the socket dead.
                    match sink.send(Message::Ping(Vec::new())).await {
                        Ok(()) => tracing::trace!(account = %self.account, "Heartbeat sent"),
                        Err(e) => tracing::warn!(account = %self.account, error = %e, "Heartbeat failed"),
                    }
                }

                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => text,
                            Err(_) => {
                                tracing::warn!(account = %self.account, "Discarding non-UTF-8 binary frame");
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(account = %self.account, frame = ?frame, "Gateway closed the socket");
                            return Err(BridgeError::ConnectionClosed);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(BridgeError::transport(e)),
                        None => return Err(BridgeError::ConnectionClosed),
                    };

                    match self.channel.route(&text) {
                        RouteOutcome::Continue => {}
                        RouteOutcome::Authenticated => {
                            authenticated = true;
                            backoff.record_success();
                            self.phase.set(ConnectionPhase::Available);
                        }
                        RouteOutcome::Close => {
                            let _ = sink.send(Message::Close(None)).await;
                            return Err(BridgeError::protocol("session invalidated by gateway"));
                        }
                    }
                }
            }
        }
    }

    /// Forget everything tied to the dead socket
    fn teardown(&self) {
        self.channel.detach();
        self.session.reset();
        self.channel.fail_pending();
        if !self.shutdown.is_triggered() {
            self.phase.set(ConnectionPhase::Degraded);
        }
    }
}

#[async_trait]
impl Connection for ForwardWsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn variant(&self) -> ConnectionVariant {
        ConnectionVariant::ForwardWs
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

    async fn run(self: Arc<Self>) -> BridgeResult<()> {
        let mut backoff = BackoffState::new(self.settings.backoff.clone());

        let outcome = loop {
            if self.shutdown.is_triggered() {
                break Ok(());
            }

            let result = self.serve_once(&mut backoff).await;
            self.teardown();
            if self.shutdown.is_triggered() {
                break Ok(());
            }

            let reason = match result {
                Ok(()) => "socket closed".to_string(),
                Err(e) => e.to_string(),
            };
            self.lifecycle.publish(LifecycleEvent::AccountConnectionFail {
                account: self.account,
                connection: ConnectionVariant::ForwardWs,
                reason: reason.clone(),
            });

            let Some(delay) = backoff.record_failure() else {
                tracing::error!(account = %self.account, reason = %reason, "Giving up reconnecting");
                break Err(BridgeError::transport(format!(
                    "gave up after {} attempts: {reason}",
                    backoff.consecutive_failures()
                )));
            };
            tracing::warn!(
                account = %self.account,
                reason = %reason,
                retry_in_ms = delay.as_millis() as u64,
                "WebSocket dropped, reconnecting"
            );

            tokio::select! {
                () = self.shutdown.wait() => break Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.phase.set(ConnectionPhase::Stopped);
        tracing::info!(account = %self.account, connection = %self.id, "Forward WebSocket stopped");
        outcome
    }

    fn stop(&self) {
        self.shutdown.trigger();
        self.phase.set(ConnectionPhase::Stopped);
        self.channel.fail_pending();
    }
}
