//! Domain entities - connection descriptors and call shapes

mod call;
mod descriptor;

pub use call::{CallKind, CallRequest, FormPart};
pub use descriptor::{
    ConnectionDescriptor, ConnectionVariant, Credential, ForwardHttpConfig, ForwardWsConfig,
    ReverseHttpConfig, ReverseWsConfig, TransportConfig,
};
