//! Account lifecycle notifications

use bridge_core::{AccountId, ConnectionVariant};
use tokio::sync::broadcast;

const LIFECYCLE_BUFFER: usize = 256;

/// Lifecycle transitions published by the registry and its connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The account's connections were launched
    AccountLaunch(AccountId),
    /// A forward connection dropped or failed to connect; a retry follows
    AccountConnectionFail {
        account: AccountId,
        connection: ConnectionVariant,
        reason: String,
    },
    /// The account's connections were stopped
    AccountShutdown(AccountId),
}

impl LifecycleEvent {
    pub fn account(&self) -> AccountId {
        match self {
            Self::AccountLaunch(account) | Self::AccountShutdown(account) => *account,
            Self::AccountConnectionFail { account, .. } => *account,
        }
    }
}

/// Broadcast bus for [`LifecycleEvent`]s. Publishing with no subscriber is fine.
#[derive(Debug, Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(LIFECYCLE_BUFFER);
        Self { tx }
    }

    pub fn publish(&self, event: LifecycleEvent) {
        tracing::debug!(account = %event.account(), event = ?event, "Lifecycle event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}
