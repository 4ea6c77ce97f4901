//! WebSocket frames
//!
//! Outbound: `{syncId, command, subCommand?, content}`.
//! Inbound: `{syncId, data}`, optionally with a top-level `code` on failure.

use bridge_common::{BridgeError, BridgeResult};
use bridge_core::{classify, AccountId, CallKind, RemoteError, Status};
use serde::Serialize;
use serde_json::{json, Value};

use crate::correlation::HANDSHAKE_SYNC_ID;

/// Outbound call frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub sync_id: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_command: Option<&'static str>,
    pub content: Value,
}

impl CallFrame {
    pub fn new(sync_id: impl Into<String>, command: impl Into<String>, kind: CallKind, content: Value) -> Self {
        Self {
            sync_id: sync_id.into(),
            command: command.into(),
            sub_command: kind.sub_command(),
            content,
        }
    }

    /// Frame a reverse socket sends right after accepting the gateway
    pub fn verify(account: AccountId, verify_key: &str) -> Self {
        Self {
            sync_id: HANDSHAKE_SYNC_ID.to_string(),
            command: super::VERIFY.to_string(),
            sub_command: None,
            content: json!({
                "verifyKey": verify_key,
                "sessionKey": null,
                "qq": account,
            }),
        }
    }

    pub fn to_json(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound frame, classified by which fields are present
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `data` carries a `session`: the authentication handshake reply
    Handshake { session: String },
    /// Top-level failure `code`
    Failure { sync_id: String, error: RemoteError },
    /// Call result or event; told apart by whether `sync_id` is pending
    Payload { sync_id: String, data: Value },
}

impl InboundFrame {
    pub fn parse(text: &str) -> BridgeResult<Self> {
        let raw: Value = serde_json::from_str(text)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> BridgeResult<Self> {
        let Value::Object(mut map) = raw else {
            return Err(BridgeError::protocol("frame is not a JSON object"));
        };

        let sync_id = match map.get("syncId") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => HANDSHAKE_SYNC_ID.to_string(),
        };

        if let Some(code) = map.get("code").and_then(Value::as_i64) {
            if let Status::Failure(kind) = classify(code) {
                return Ok(Self::Failure {
                    sync_id,
                    error: RemoteError::new(kind, code, Value::Object(map)),
                });
            }
        }

        let data = map
            .remove("data")
            .ok_or_else(|| BridgeError::protocol("frame has no `data` field"))?;

        if let Some(session) = data.get("session").and_then(Value::as_str) {
            return Ok(Self::Handshake {
                session: session.to_string(),
            });
        }

        Ok(Self::Payload { sync_id, data })
    }
}
