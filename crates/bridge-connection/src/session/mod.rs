//! Session state shared between a connection and its fallback

mod state;

pub use state::{SessionSnapshot, SessionState};
