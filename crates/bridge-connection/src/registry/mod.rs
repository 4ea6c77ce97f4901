//! Connection registry - owns every account's connections

mod connection_registry;

pub use connection_registry::ConnectionRegistry;
