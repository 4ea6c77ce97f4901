//! # bridge-core
//!
//! Domain layer for the gateway bridge: account identity, connection descriptors,
//! call shapes, the remote status-code mapping and the opaque event model.
//! This crate performs no I/O and knows nothing about sockets or HTTP clients.

pub mod entities;
pub mod error;
pub mod events;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    CallKind, CallRequest, ConnectionDescriptor, ConnectionVariant, Credential, ForwardHttpConfig,
    ForwardWsConfig, FormPart, ReverseHttpConfig, ReverseWsConfig, TransportConfig,
};
pub use error::{classify, validate_response, ErrorKind, RemoteError, Status};
pub use events::{Event, EventDecoder, EventError, EventRegistry, BUILTIN_EVENT_TAGS};
pub use value_objects::{AccountId, AccountIdParseError};
