//! Remote errors - the gateway's numeric status table
//!
//! Every raw response passes through [`validate_response`] before a caller
//! sees it, whichever transport carried it.

use serde_json::Value;
use thiserror::Error;

/// Typed remote failure condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidVerifyKey,
    AccountNotFound,
    InvalidSession,
    UnverifiedSession,
    UnknownTarget,
    FileNotFound,
    PermissionDenied,
    AccountMuted,
    MessageTooLong,
    InvalidArgument,
    RemoteInternal,
    Unknown,
}

impl ErrorKind {
    /// Canonical wire code; `None` for [`ErrorKind::Unknown`]
    pub fn code(self) -> Option<i64> {
        match self {
            Self::InvalidVerifyKey => Some(1),
            Self::AccountNotFound => Some(2),
            Self::InvalidSession => Some(3),
            Self::UnverifiedSession => Some(4),
            Self::UnknownTarget => Some(5),
            Self::FileNotFound => Some(6),
            Self::PermissionDenied => Some(10),
            Self::AccountMuted => Some(20),
            Self::MessageTooLong => Some(30),
            Self::InvalidArgument => Some(400),
            Self::RemoteInternal => Some(500),
            Self::Unknown => None,
        }
    }

    /// Kinds that invalidate the current session key
    #[inline]
    pub fn invalidates_session(self) -> bool {
        matches!(
            self,
            Self::AccountNotFound | Self::InvalidSession | Self::UnverifiedSession
        )
    }

    #[inline]
    pub fn is_authentication(self) -> bool {
        matches!(self, Self::InvalidVerifyKey | Self::AccountNotFound)
    }

    #[inline]
    pub fn is_session(self) -> bool {
        matches!(self, Self::InvalidSession | Self::UnverifiedSession)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::InvalidVerifyKey => "invalid verify key",
            Self::AccountNotFound => "account not found",
            Self::InvalidSession => "invalid session",
            Self::UnverifiedSession => "unverified session",
            Self::UnknownTarget => "unknown target",
            Self::FileNotFound => "file not found",
            Self::PermissionDenied => "permission denied",
            Self::AccountMuted => "account muted",
            Self::MessageTooLong => "message too long",
            Self::InvalidArgument => "invalid argument",
            Self::RemoteInternal => "remote internal error",
            Self::Unknown => "unknown remote error",
        }
    }
}

/// Outcome of classifying a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure(ErrorKind),
}

impl Status {
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Map a numeric status code to its condition. Total over `i64`.
pub fn classify(code: i64) -> Status {
    let kind = match code {
        0 | 200 => return Status::Success,
        1 => ErrorKind::InvalidVerifyKey,
        2 => ErrorKind::AccountNotFound,
        3 => ErrorKind::InvalidSession,
        4 => ErrorKind::UnverifiedSession,
        5 => ErrorKind::UnknownTarget,
        6 => ErrorKind::FileNotFound,
        10 => ErrorKind::PermissionDenied,
        20 => ErrorKind::AccountMuted,
        30 => ErrorKind::MessageTooLong,
        400 => ErrorKind::InvalidArgument,
        500 => ErrorKind::RemoteInternal,
        _ => ErrorKind::Unknown,
    };
    Status::Failure(kind)
}

/// A non-success reply from the gateway, with the raw payload kept for diagnostics
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} (code {code}): {}", .kind.description(), display_message(.payload))]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub code: i64,
    pub payload: Value,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, code: i64, payload: Value) -> Self {
        Self {
            kind,
            code,
            payload,
        }
    }

    /// Build from a bare code, classifying it. Success codes map to `Unknown`.
    pub fn from_code(code: i64, payload: Value) -> Self {
        let kind = match classify(code) {
            Status::Failure(kind) => kind,
            Status::Success => ErrorKind::Unknown,
        };
        Self::new(kind, code, payload)
    }

    /// The gateway's `msg` field, when present
    pub fn message(&self) -> Option<&str> {
        self.payload.get("msg").and_then(Value::as_str)
    }
}

fn display_message(payload: &Value) -> &str {
    payload.get("msg").and_then(Value::as_str).unwrap_or("no message")
}

/// Check a raw reply for an error code and unwrap its `data` field.
///
/// A missing or non-integer `code` counts as success. On success the inner
/// `data` is returned if present, otherwise the whole value.
pub fn validate_response(raw: Value) -> Result<Value, RemoteError> {
    let code = raw.get("code").and_then(Value::as_i64);
    if let Some(code) = code {
        if let Status::Failure(kind) = classify(code) {
            return Err(RemoteError::new(kind, code, raw));
        }
    }

    match raw {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => Ok(data),
            None => Ok(Value::Object(map)),
        },
        other => Ok(other),
    }
}
