//! Transport connections
//!
//! Four variants behind one [`Connection`] trait, plus the fallback
//! composition that stitches a primary to an HTTP sibling.

mod backoff;
mod fallback;
mod forward_http;
mod forward_ws;
mod gate;
mod multiplex;
mod phase;
mod reverse_http;
mod reverse_ws;
mod settings;
mod shutdown;
mod transport;

pub use backoff::{BackoffConfig, BackoffState};
pub use fallback::ComposedConnection;
pub use forward_http::ForwardHttpConnection;
pub use forward_ws::ForwardWsConnection;
pub use gate::{GateRejection, RequestGate};
pub use phase::ConnectionPhase;
pub use reverse_http::{ReverseHttpConnection, ACCOUNT_HEADER};
pub use reverse_ws::ReverseWsConnection;
pub use settings::ConnectionSettings;
pub use transport::{Connection, ConnectionContext};

use bridge_core::{ConnectionDescriptor, TransportConfig};
use std::sync::Arc;

/// Build the connection a descriptor describes
pub fn materialize(descriptor: ConnectionDescriptor, context: ConnectionContext) -> Arc<dyn Connection> {
    let ConnectionDescriptor {
        account,
        verify_key,
        transport,
    } = descriptor;

    match transport {
        TransportConfig::ForwardWs(config) => {
            Arc::new(ForwardWsConnection::new(account, verify_key, config, context))
        }
        TransportConfig::ForwardHttp(config) => {
            Arc::new(ForwardHttpConnection::new(account, verify_key, config, context))
        }
        TransportConfig::ReverseWs(config) => {
            Arc::new(ReverseWsConnection::new(account, verify_key, config, context))
        }
        TransportConfig::ReverseHttp(config) => {
            Arc::new(ReverseHttpConnection::new(account, config, context))
        }
    }
}
