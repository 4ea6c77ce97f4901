//! Fallback composition
//!
//! Wraps a primary connection and at most one forward HTTP fallback for the
//! same account. Calls the primary cannot make are forwarded verbatim to the
//! fallback; both share one [`SessionState`]. Correlation tables are never
//! shared.

use async_trait::async_trait;
use axum::Router;
use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{AccountId, CallKind, CallRequest, ConnectionVariant};
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;

use super::phase::ConnectionPhase;
use super::transport::Connection;
use crate::session::SessionState;

pub struct ComposedConnection {
    primary: Arc<dyn Connection>,
    fallback: RwLock<Option<Arc<dyn Connection>>>,
}

impl std::fmt::Debug for ComposedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedConnection")
            .field("primary", &self.primary.variant())
            .field("fallback", &self.fallback.read().as_ref().map(|c| c.variant()))
            .finish()
    }
}

impl ComposedConnection {
    pub fn new(primary: Arc<dyn Connection>) -> Self {
        Self {
            primary,
            fallback: RwLock::new(None),
        }
    }

    /// Attach `fallback` to the primary.
    ///
    /// Fails if a fallback is already attached, if `fallback` is not a
    /// forward HTTP connection, if it belongs to another account or session,
    /// or if it already serves as someone else's fallback.
    pub fn attach(&self, fallback: Arc<dyn Connection>) -> BridgeResult<()> {
        if !fallback.variant().is_fallback_capable() {
            return Err(BridgeError::configuration(format!(
                "{} connection cannot be a fallback; only forward HTTP can",
                fallback.variant()
            )));
        }
        if fallback.account() != self.primary.account() {
            return Err(BridgeError::configuration(format!(
                "fallback account {} differs from primary account {}",
                fallback.account(),
                self.primary.account()
            )));
        }
        if !Arc::ptr_eq(fallback.session(), self.primary.session()) {
            return Err(BridgeError::configuration(
                "fallback must share the primary's session state",
            ));
        }

        let mut slot = self.fallback.write();
        if slot.is_some() {
            return Err(BridgeError::configuration(format!(
                "account {} already has a fallback connection",
                self.primary.account()
            )));
        }
        fallback.hook_as_fallback()?;

        tracing::info!(
            account = %self.primary.account(),
            primary = %self.primary.variant(),
            fallback = %fallback.variant(),
            "Fallback attached"
        );
        *slot = Some(fallback);
        Ok(())
    }

    pub fn primary(&self) -> &Arc<dyn Connection> {
        &self.primary
    }

    pub fn fallback(&self) -> Option<Arc<dyn Connection>> {
        self.fallback.read().clone()
    }

    /// The connection that will service `kind`, if any
    fn route(&self, kind: CallKind) -> Option<Arc<dyn Connection>> {
        if self.primary.supports(kind) {
            return Some(self.primary.clone());
        }
        self.fallback().filter(|fallback| fallback.supports(kind))
    }
}

#[async_trait]
impl Connection for ComposedConnection {
    fn id(&self) -> &str {
        self.primary.id()
    }

    fn variant(&self) -> ConnectionVariant {
        self.primary.variant()
    }

    fn account(&self) -> AccountId {
        self.primary.account()
    }

    fn session(&self) -> &Arc<SessionState> {
        self.primary.session()
    }

    fn phase(&self) -> ConnectionPhase {
        self.primary.phase()
    }

    fn supports(&self, kind: CallKind) -> bool {
        self.route(kind).is_some()
    }

    async fn call(&self, request: CallRequest) -> BridgeResult<Value> {
        match self.route(request.kind) {
            Some(connection) => connection.call(request).await,
            None => Err(BridgeError::Unsupported {
                command: request.command,
                kind: request.kind,
                variant: self.primary.variant(),
            }),
        }
    }

    async fn run(self: Arc<Self>) -> BridgeResult<()> {
        let primary = self.primary.clone();
        match self.fallback() {
            Some(fallback) => {
                tokio::try_join!(primary.run(), fallback.run())?;
                Ok(())
            }
            None => primary.run().await,
        }
    }

    fn stop(&self) {
        self.primary.stop();
        if let Some(fallback) = self.fallback() {
            fallback.stop();
        }
    }

    fn routes(self: Arc<Self>) -> Option<Router> {
        let primary = self.primary.clone().routes();
        let fallback = self.fallback().and_then(|fallback| fallback.routes());
        match (primary, fallback) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        }
    }
}
