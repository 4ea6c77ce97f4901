//! Correlation identifiers

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use std::borrow::Borrow;
use std::fmt;

/// Sync id the gateway uses for frames that answer no call
pub const HANDSHAKE_SYNC_ID: &str = "#";

/// Random 96-bit token, URL-safe base64 encoded (16 characters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncId(String);

impl SyncId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SyncId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SyncId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for SyncId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
