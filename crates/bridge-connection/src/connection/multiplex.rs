//! Call/event multiplexing over one WebSocket
//!
//! Shared by the forward and reverse WebSocket connections. The socket loop
//! owns the actual sink and stream; this type owns everything above them:
//! the correlation table, frame routing and the outbound queue handle.

use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{classify, AccountId, CallRequest, Status};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::broadcast::EventDispatcher;
use crate::correlation::CallCorrelator;
use crate::protocol::{CallFrame, InboundFrame};
use crate::session::SessionState;

/// Outbound frames buffered per socket
pub(crate) const OUTBOUND_BUFFER: usize = 256;

/// What the socket loop should do after a frame was routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RouteOutcome {
    Continue,
    /// Handshake completed, session key installed
    Authenticated,
    /// Session was invalidated; drop the socket so it re-authenticates
    Close,
}

pub(crate) struct MultiplexChannel {
    account: AccountId,
    session: Arc<SessionState>,
    correlator: Arc<CallCorrelator>,
    outbound: RwLock<Option<mpsc::Sender<String>>>,
    dispatcher: Arc<EventDispatcher>,
    call_timeout: Duration,
}

impl MultiplexChannel {
    pub(crate) fn new(
        account: AccountId,
        session: Arc<SessionState>,
        dispatcher: Arc<EventDispatcher>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            account,
            session,
            correlator: CallCorrelator::shared(),
            outbound: RwLock::new(None),
            dispatcher,
            call_timeout,
        }
    }

    /// Bind the outbound queue of a freshly opened socket
    pub(crate) fn attach(&self, tx: mpsc::Sender<String>) {
        *self.outbound.write() = Some(tx);
    }

    pub(crate) fn detach(&self) {
        self.outbound.write().take();
    }

    /// Fail every in-flight call with `ConnectionClosed`
    pub(crate) fn fail_pending(&self) -> usize {
        let failed = self.correlator.fail_all(|| BridgeError::ConnectionClosed);
        if failed > 0 {
            tracing::debug!(account = %self.account, failed, "Failed pending calls");
        }
        failed
    }

    pub(crate) async fn call(&self, request: CallRequest) -> BridgeResult<Value> {
        let timeout = request.timeout.unwrap_or(self.call_timeout);
        let deadline = Instant::now() + timeout;

        let mut content = request.params;
        if request.in_session {
            let key = tokio::time::timeout_at(deadline, self.session.wait_for_available())
                .await
                .map_err(|_| BridgeError::Timeout(timeout))?;
            if let Value::Object(map) = &mut content {
                map.insert("sessionKey".to_string(), Value::String(key));
            }
        }

        let handle = self
            .correlator
            .issue(request.kind, deadline.saturating_duration_since(Instant::now()));
        let text = CallFrame::new(handle.id().as_str(), request.command.as_str(), request.kind, content)
            .to_json()?;

        let tx = self
            .outbound
            .read()
            .clone()
            .ok_or(BridgeError::ConnectionClosed)?;
        // A stalled socket loop leaves the queue full; the send is bounded by the call deadline.
        tokio::time::timeout_at(deadline, tx.send(text))
            .await
            .map_err(|_| BridgeError::Timeout(timeout))?
            .map_err(|_| BridgeError::ConnectionClosed)?;

        tracing::debug!(
            account = %self.account,
            sync_id = %handle.id(),
            command = %request.command,
            kind = %request.kind,
            "Call sent"
        );

        let result = handle.wait().await;
        if let Err(e) = &result {
            if e.is_session_error() {
                self.session.set_session_key(None);
            }
        }
        result
    }

    /// Route one inbound text frame
    pub(crate) fn route(&self, text: &str) -> RouteOutcome {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(account = %self.account, error = %e, "Discarding unparsable frame");
                return RouteOutcome::Continue;
            }
        };

        match frame {
            InboundFrame::Handshake { session } => {
                self.session.set_session_key(Some(session));
                self.session.set_alive(true);
                tracing::info!(account = %self.account, "Session authenticated");
                RouteOutcome::Authenticated
            }
            InboundFrame::Failure { sync_id, error } => {
                let invalidates = error.kind.invalidates_session();
                if invalidates {
                    self.session.set_session_key(None);
                }
                if !self.correlator.fail(&sync_id, BridgeError::Remote(error.clone())) {
                    tracing::warn!(account = %self.account, sync_id = %sync_id, error = %error, "Gateway reported an error");
                }
                if invalidates {
                    RouteOutcome::Close
                } else {
                    RouteOutcome::Continue
                }
            }
            InboundFrame::Payload { sync_id, data } => {
                let invalidates = matches!(
                    data.get("code").and_then(Value::as_i64).map(classify),
                    Some(Status::Failure(kind)) if kind.invalidates_session()
                );

                match self.correlator.resolve(&sync_id, data) {
                    Ok(()) => tracing::trace!(account = %self.account, sync_id = %sync_id, "Reply routed"),
                    Err(data) => self.route_unsolicited(&sync_id, data),
                }

                if invalidates {
                    self.session.set_session_key(None);
                    RouteOutcome::Close
                } else {
                    RouteOutcome::Continue
                }
            }
        }
    }

    fn route_unsolicited(&self, sync_id: &str, data: Value) {
        if data.get("type").is_some() {
            self.dispatcher.emit_raw(data);
            return;
        }

        match data.get("code").and_then(Value::as_i64) {
            Some(code) if !classify(code).is_success() => {
                tracing::warn!(account = %self.account, sync_id = %sync_id, code, payload = %data, "Unmatched error reply");
            }
            _ => {
                tracing::debug!(account = %self.account, sync_id = %sync_id, "Dropping reply with no waiter");
            }
        }
    }
}
