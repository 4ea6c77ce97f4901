//! Call correlator
//!
//! Owns the table of in-flight calls for one connection. Every entry is
//! completed exactly once: by [`CallCorrelator::resolve`], by
//! [`CallCorrelator::fail`], or by expiry. Removal from the map is the
//! single point of truth, so whichever path removes the entry wins and
//! every other path becomes a no-op.

use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{validate_response, CallKind};
use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::sync_id::SyncId;

/// A call awaiting its reply
struct PendingCall {
    kind: CallKind,
    issued_at: Instant,
    deadline: Instant,
    resolver: oneshot::Sender<BridgeResult<Value>>,
}

/// Correlation table private to one connection
#[derive(Default)]
pub struct CallCorrelator {
    pending: DashMap<SyncId, PendingCall>,
}

impl std::fmt::Debug for CallCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCorrelator")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl CallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Allocate a fresh id and park a waiter on it
    pub fn issue(self: &Arc<Self>, kind: CallKind, timeout: Duration) -> CallHandle {
        loop {
            if let Some(handle) = self.register(SyncId::generate(), kind, timeout) {
                return handle;
            }
            tracing::debug!("Sync id collision, drawing another");
        }
    }

    /// Park a waiter on a caller-chosen id; `None` if the id is in use
    pub fn register(self: &Arc<Self>, id: SyncId, kind: CallKind, timeout: Duration) -> Option<CallHandle> {
        let Entry::Vacant(slot) = self.pending.entry(id.clone()) else {
            return None;
        };

        let (resolver, rx) = oneshot::channel();
        let issued_at = Instant::now();
        let deadline = issued_at + timeout;
        slot.insert(PendingCall {
            kind,
            issued_at,
            deadline,
            resolver,
        });

        Some(CallHandle {
            id,
            deadline,
            rx,
            correlator: Arc::clone(self),
            settled: false,
        })
    }

    /// Complete a call with a raw reply, classified through the status table.
    ///
    /// When nothing is waiting on `id` the payload is handed back so the
    /// caller can route it as an event.
    pub fn resolve(&self, id: &str, raw: Value) -> Result<(), Value> {
        match self.pending.remove(id) {
            Some((_, call)) => {
                tracing::trace!(
                    sync_id = %id,
                    kind = %call.kind,
                    elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
                    "Call resolved"
                );
                let _ = call.resolver.send(validate_response(raw).map_err(BridgeError::from));
                Ok(())
            }
            None => Err(raw),
        }
    }

    /// Complete a call with an error
    pub fn fail(&self, id: &str, error: BridgeError) -> bool {
        match self.pending.remove(id) {
            Some((_, call)) => {
                tracing::trace!(sync_id = %id, kind = %call.kind, error = %error, "Call failed");
                let _ = call.resolver.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Expire a call whose deadline has passed
    pub fn expire(&self, id: &str) -> bool {
        let now = Instant::now();
        self.pending
            .remove_if(id, |_, call| now >= call.deadline)
            .map(|(_, call)| Self::send_timeout(id, call))
            .is_some()
    }

    fn expire_now(&self, id: &str) -> bool {
        self.pending
            .remove(id)
            .map(|(_, call)| Self::send_timeout(id, call))
            .is_some()
    }

    fn send_timeout(id: &str, call: PendingCall) {
        let waited = call.deadline.saturating_duration_since(call.issued_at);
        tracing::debug!(sync_id = %id, kind = %call.kind, timeout_ms = waited.as_millis() as u64, "Call timed out");
        let _ = call.resolver.send(Err(BridgeError::Timeout(waited)));
    }

    /// Fail every pending call, returning how many were failed
    pub fn fail_all(&self, make_error: impl Fn() -> BridgeError) -> usize {
        let ids: Vec<SyncId> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.fail(id.as_str(), make_error()))
            .count()
    }

    fn discard(&self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Awaitable side of a pending call. Dropping it unawaited cancels the call.
pub struct CallHandle {
    id: SyncId,
    deadline: Instant,
    rx: oneshot::Receiver<BridgeResult<Value>>,
    correlator: Arc<CallCorrelator>,
    settled: bool,
}

impl CallHandle {
    pub fn id(&self) -> &SyncId {
        &self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Suspend until the call is resolved, failed or expired
    pub async fn wait(mut self) -> BridgeResult<Value> {
        let result = match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::ConnectionClosed),
            Err(_) => {
                self.correlator.expire_now(self.id.as_str());
                // Our expiry or a completion that beat it is now in the channel.
                (&mut self.rx)
                    .await
                    .unwrap_or(Err(BridgeError::ConnectionClosed))
            }
        };
        self.settled = true;
        result
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        if !self.settled {
            self.correlator.discard(self.id.as_str());
        }
    }
}

impl std::fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHandle")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .finish()
    }
}
