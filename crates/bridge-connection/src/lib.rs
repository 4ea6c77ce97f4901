//! # bridge-connection
//!
//! Connection and session layer for the gateway bridge: the wire protocol,
//! call correlation, session state, the four transport variants, fallback
//! composition, event dispatching and the per-account registry.

pub mod broadcast;
pub mod connection;
pub mod correlation;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

// Re-export commonly used types at crate root
pub use broadcast::{EventCallback, EventDispatcher, LifecycleBus, LifecycleEvent};
pub use connection::{
    materialize, BackoffConfig, ComposedConnection, Connection, ConnectionContext,
    ConnectionPhase, ConnectionSettings, ForwardHttpConnection, ForwardWsConnection,
    RequestGate, ReverseHttpConnection, ReverseWsConnection,
};
pub use correlation::{CallCorrelator, CallHandle, SyncId};
pub use registry::ConnectionRegistry;
pub use server::{run, ReverseServer};
pub use session::{SessionSnapshot, SessionState};
