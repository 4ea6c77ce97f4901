//! Connection state machine
//!
//! `Created -> Authenticating -> Available -> (Degraded <-> Available) -> Stopped`.
//! `Stopped` is terminal.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionPhase {
    Created = 0,
    Authenticating = 1,
    Available = 2,
    /// Loop is alive but retrying
    Degraded = 3,
    Stopped = 4,
}

impl ConnectionPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Authenticating,
            2 => Self::Available,
            3 => Self::Degraded,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Authenticating => "authenticating",
            Self::Available => "available",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for a [`ConnectionPhase`]
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl Default for PhaseCell {
    fn default() -> Self {
        Self(AtomicU8::new(ConnectionPhase::Created as u8))
    }
}

impl PhaseCell {
    pub fn get(&self) -> ConnectionPhase {
        ConnectionPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` unless already stopped. Returns whether it moved.
    pub fn set(&self, next: ConnectionPhase) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let current = ConnectionPhase::from_u8(raw);
                (!current.is_terminal() && current != next).then_some(next as u8)
            })
            .is_ok()
    }
}
