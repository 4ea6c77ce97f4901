//! The contract every transport variant implements

use async_trait::async_trait;
use axum::Router;
use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{AccountId, CallKind, CallRequest, ConnectionVariant, EventRegistry};
use serde_json::Value;
use std::sync::Arc;

use super::phase::ConnectionPhase;
use super::settings::ConnectionSettings;
use crate::broadcast::{EventDispatcher, LifecycleBus};
use crate::session::SessionState;

/// Collaborators a connection is constructed with.
///
/// Every connection of one account gets the same `session` and `dispatcher`.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub session: Arc<SessionState>,
    pub dispatcher: Arc<EventDispatcher>,
    pub lifecycle: LifecycleBus,
    pub settings: ConnectionSettings,
}

impl ConnectionContext {
    /// Fresh collaborators for one account, decoding events with the built-in tags
    pub fn new(account: AccountId, settings: ConnectionSettings) -> Self {
        Self {
            session: SessionState::shared(),
            dispatcher: EventDispatcher::shared(account, Arc::new(EventRegistry::with_builtin_tags())),
            lifecycle: LifecycleBus::new(),
            settings,
        }
    }
}

/// A transport connection to the gateway for one account
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Unique instance id, used in logs
    fn id(&self) -> &str;

    fn variant(&self) -> ConnectionVariant;

    fn account(&self) -> AccountId;

    fn session(&self) -> &Arc<SessionState>;

    fn phase(&self) -> ConnectionPhase;

    /// Whether this connection can service `kind` by itself
    fn supports(&self, kind: CallKind) -> bool {
        self.variant().supports(kind)
    }

    /// Invoke a remote command and return its classified result
    async fn call(&self, request: CallRequest) -> BridgeResult<Value>;

    /// Long-lived loop. Returns once [`Connection::stop`] is called, or with
    /// an error when the loop gives up.
    async fn run(self: Arc<Self>) -> BridgeResult<()>;

    /// Signal the loop to exit and fail every pending call. Idempotent.
    fn stop(&self);

    /// Put this connection in fallback mode: it no longer owns
    /// authentication and waits for its primary to connect instead.
    fn hook_as_fallback(&self) -> BridgeResult<()> {
        Err(BridgeError::configuration(format!(
            "{} connection cannot serve as a fallback",
            self.variant()
        )))
    }

    /// Server routes for reverse variants
    fn routes(self: Arc<Self>) -> Option<Router> {
        None
    }
}
