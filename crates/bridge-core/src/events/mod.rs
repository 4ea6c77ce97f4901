//! Inbound events - opaque payloads tagged by their `type` field

mod event;
mod registry;
mod tags;

pub use event::{Event, EventError};
pub use registry::{EventDecoder, EventRegistry};
pub use tags::BUILTIN_EVENT_TAGS;
