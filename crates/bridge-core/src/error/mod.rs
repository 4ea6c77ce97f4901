//! Remote status mapping

mod remote_error;

pub use remote_error::{classify, validate_response, ErrorKind, RemoteError, Status};
