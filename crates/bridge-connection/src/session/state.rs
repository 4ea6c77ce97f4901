//! Session key and liveness flags
//!
//! Writers are the owning connection's receive loop and auth routine.
//! Any number of callers may park in [`SessionState::wait_for_available`];
//! every one of them is released by the same update.

use std::sync::Arc;
use tokio::sync::watch;

/// Point-in-time view of a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_key: Option<String>,
    pub connected: bool,
    pub alive: bool,
}

impl SessionSnapshot {
    /// Connected, authenticated and alive
    #[inline]
    pub fn is_available(&self) -> bool {
        self.connected && self.session_key.is_some() && self.alive
    }
}

/// Observable session state.
///
/// Invariant: a session key is only ever present while `connected` is true.
#[derive(Debug)]
pub struct SessionState {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Set or clear the session key; `connected` follows the key
    pub fn set_session_key(&self, key: Option<String>) {
        self.tx.send_modify(|s| {
            s.connected = key.is_some();
            s.session_key = key;
        });
    }

    /// Mark the transport (dis)connected. Disconnecting drops the key.
    pub fn set_connected(&self, connected: bool) {
        self.tx.send_modify(|s| {
            s.connected = connected;
            if !connected {
                s.session_key = None;
            }
        });
    }

    pub fn set_alive(&self, alive: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.alive != alive;
            s.alive = alive;
            changed
        });
    }

    /// Back to the initial state
    pub fn reset(&self) {
        self.tx.send_replace(SessionSnapshot::default());
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn session_key(&self) -> Option<String> {
        self.tx.borrow().session_key.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.tx.borrow().connected
    }

    pub fn is_available(&self) -> bool {
        self.tx.borrow().is_available()
    }

    /// Watch every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Suspend until available, returning the session key at that instant
    pub async fn wait_for_available(&self) -> String {
        self.wait_until(SessionSnapshot::is_available)
            .await
            .session_key
            .unwrap_or_default()
    }

    /// Suspend until the transport reports connected
    pub async fn wait_for_connected(&self) {
        self.wait_until(|s| s.connected).await;
    }

    /// Suspend until the key is cleared or the transport drops
    pub async fn wait_for_disconnected(&self) {
        self.wait_until(|s| !s.connected).await;
    }

    async fn wait_until(&self, predicate: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let snapshot = match rx.wait_for(predicate).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }
}
