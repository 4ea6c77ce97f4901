//! Event broadcasting
//!
//! Hands decoded inbound events to registered listeners, and publishes
//! account lifecycle notifications.

mod dispatcher;
mod lifecycle;

pub use dispatcher::{EventCallback, EventDispatcher};
pub use lifecycle::{LifecycleBus, LifecycleEvent};
