//! Wire protocol
//!
//! Frame shapes exchanged with the gateway over WebSocket, plus the HTTP
//! route names both forward transports use.

mod frames;

pub use frames::{CallFrame, InboundFrame};

/// Authentication step one: verify key for a session
pub const VERIFY: &str = "verify";
/// Authentication step two: bind the session to the account
pub const BIND: &str = "bind";
/// Forward HTTP event poll
pub const FETCH_MESSAGE: &str = "fetchMessage";
/// Forward WebSocket endpoint carrying both calls and events
pub const ALL_CHANNEL: &str = "all";
