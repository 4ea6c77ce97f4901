//! Unified error type

mod bridge_error;

pub use bridge_error::{BridgeError, BridgeResult, ErrorCategory};
