//! Bridge error types
//!
//! Unified error handling for every public fallible operation.

use bridge_core::{AccountId, CallKind, ConnectionVariant, ErrorKind, RemoteError};
use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;

/// Bridge-wide error type
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    // Setup errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(AccountId),

    #[error("{variant} connection cannot perform {kind} call `{command}` and has no fallback")]
    Unsupported {
        command: String,
        kind: CallKind,
        variant: ConnectionVariant,
    },

    // Gateway replied with a failure code
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    // Transport errors
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

/// Error taxonomy used for retry and session decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad setup; fatal, never retried
    Configuration,
    /// Verify key or account rejected
    Authentication,
    /// Session expired or unverified; forces re-authentication
    Session,
    /// Informational remote refusal, returned as-is
    Business,
    /// Socket or HTTP failure; retried by the reconnect loop
    Transport,
    Unknown,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::Session => "session",
            Self::Business => "business",
            Self::Transport => "transport",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    /// Classify into the error taxonomy
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::UnknownAccount(_) | Self::Unsupported { .. } => {
                ErrorCategory::Configuration
            }
            Self::Remote(e) => match e.kind {
                ErrorKind::InvalidVerifyKey | ErrorKind::AccountNotFound => {
                    ErrorCategory::Authentication
                }
                ErrorKind::InvalidSession | ErrorKind::UnverifiedSession => ErrorCategory::Session,
                ErrorKind::UnknownTarget
                | ErrorKind::FileNotFound
                | ErrorKind::PermissionDenied
                | ErrorKind::AccountMuted
                | ErrorKind::MessageTooLong
                | ErrorKind::InvalidArgument => ErrorCategory::Business,
                ErrorKind::RemoteInternal | ErrorKind::Unknown => ErrorCategory::Unknown,
            },
            Self::Timeout(_) | Self::ConnectionClosed | Self::Transport(_) => {
                ErrorCategory::Transport
            }
            Self::Protocol(_) | Self::Internal(_) => ErrorCategory::Unknown,
        }
    }

    /// Get a stable error code
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::UnknownAccount(_) => "UNKNOWN_ACCOUNT",
            Self::Unsupported { .. } => "UNSUPPORTED_CALL",
            Self::Remote(e) => match e.kind {
                ErrorKind::InvalidVerifyKey => "INVALID_VERIFY_KEY",
                ErrorKind::AccountNotFound => "ACCOUNT_NOT_FOUND",
                ErrorKind::InvalidSession => "INVALID_SESSION",
                ErrorKind::UnverifiedSession => "UNVERIFIED_SESSION",
                ErrorKind::UnknownTarget => "UNKNOWN_TARGET",
                ErrorKind::FileNotFound => "FILE_NOT_FOUND",
                ErrorKind::PermissionDenied => "PERMISSION_DENIED",
                ErrorKind::AccountMuted => "ACCOUNT_MUTED",
                ErrorKind::MessageTooLong => "MESSAGE_TOO_LONG",
                ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
                ErrorKind::RemoteInternal => "REMOTE_INTERNAL_ERROR",
                ErrorKind::Unknown => "UNKNOWN_REMOTE_ERROR",
            },
            Self::Timeout(_) => "TIMEOUT",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the session key must be dropped after this error
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::Remote(e) if e.kind.invalidates_session())
    }

    /// Whether the connection's own reconnect loop may retry
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }

    /// The remote condition, if the gateway refused the call
    #[must_use]
    pub fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote(e) => Some(e.kind),
            _ => None,
        }
    }

    #[must_use]
    pub fn configuration(msg: impl fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    #[must_use]
    pub fn transport(msg: impl fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    #[must_use]
    pub fn protocol(msg: impl fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
