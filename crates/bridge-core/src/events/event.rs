//! Event - a decoded inbound payload

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// An unsolicited payload pushed by the gateway.
///
/// The bridge does not interpret `data`; listeners do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// The payload's `type` discriminator, e.g. `GroupMessage`
    pub type_tag: String,
    /// Payload with the `type` field removed
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(type_tag: impl Into<String>, data: Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            data,
            received_at: Utc::now(),
        }
    }

    #[inline]
    pub fn is(&self, tag: &str) -> bool {
        self.type_tag == tag
    }

    /// Shortcut for a top-level payload field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Why a payload could not become an [`Event`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Event payload has no string `type` field")]
    MissingType,

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Malformed event payload: {0}")]
    Malformed(String),
}
