//! Call correlation - pairing outbound calls with their replies

mod correlator;
mod sync_id;

pub use correlator::{CallCorrelator, CallHandle};
pub use sync_id::{SyncId, HANDSHAKE_SYNC_ID};
