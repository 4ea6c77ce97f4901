//! Event registry - exact-match lookup from type tag to decoder

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::event::{Event, EventError};
use super::tags::BUILTIN_EVENT_TAGS;

/// Transforms a payload (already stripped of `type`) before it becomes an event
pub type EventDecoder = Arc<dyn Fn(Value) -> Result<Value, EventError> + Send + Sync>;

/// Mapping from type tag to decoder, populated once at startup
#[derive(Clone)]
pub struct EventRegistry {
    decoders: HashMap<String, EventDecoder>,
    accept_unknown: bool,
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::with_builtin_tags()
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("tags", &self.decoders.len())
            .field("accept_unknown", &self.accept_unknown)
            .finish()
    }
}

impl EventRegistry {
    /// Empty registry that rejects every tag
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
            accept_unknown: false,
        }
    }

    /// Registry with the gateway's documented tags as pass-through entries
    pub fn with_builtin_tags() -> Self {
        let mut registry = Self {
            decoders: HashMap::with_capacity(BUILTIN_EVENT_TAGS.len()),
            accept_unknown: true,
        };
        for tag in BUILTIN_EVENT_TAGS {
            registry.register_passthrough(*tag);
        }
        registry
    }

    pub fn accept_unknown(mut self, accept: bool) -> Self {
        self.accept_unknown = accept;
        self
    }

    pub fn register(&mut self, tag: impl Into<String>, decoder: EventDecoder) {
        self.decoders.insert(tag.into(), decoder);
    }

    pub fn register_passthrough(&mut self, tag: impl Into<String>) {
        self.register(tag, Arc::new(Ok::<Value, EventError>));
    }

    #[inline]
    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Turn a raw payload into an event
    pub fn decode(&self, raw: Value) -> Result<Event, EventError> {
        let Value::Object(mut map) = raw else {
            return Err(EventError::Malformed("payload is not an object".into()));
        };

        let tag = match map.remove("type") {
            Some(Value::String(tag)) => tag,
            _ => return Err(EventError::MissingType),
        };

        let data = Value::Object(map);
        let data = match self.decoders.get(&tag) {
            Some(decoder) => decoder(data)?,
            None if self.accept_unknown => data,
            None => return Err(EventError::UnknownType(tag)),
        };

        Ok(Event::new(tag, data))
    }
}
