//! Call shapes - what a caller asks the gateway to do

use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// How a call is carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Plain GET; params travel as query string over HTTP
    Get,
    /// Plain POST; params travel as JSON body over HTTP
    Post,
    /// REST-style read (`subCommand: "get"` over WebSocket)
    RestGet,
    /// REST-style write (`subCommand: "update"` over WebSocket)
    RestUpdate,
    /// Form upload, HTTP only
    Multipart,
}

impl CallKind {
    /// `subCommand` value for WebSocket frames, if any
    pub fn sub_command(self) -> Option<&'static str> {
        match self {
            Self::RestGet => Some("get"),
            Self::RestUpdate => Some("update"),
            _ => None,
        }
    }

    /// Whether the HTTP request is a GET with a query string
    #[inline]
    pub fn is_query(self) -> bool {
        matches!(self, Self::Get | Self::RestGet)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::RestGet => "rest-get",
            Self::RestUpdate => "rest-update",
            Self::Multipart => "multipart",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        bytes: Vec<u8>,
        filename: Option<String>,
        content_type: Option<String>,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::File {
            name: name.into(),
            bytes: bytes.into(),
            filename: None,
            content_type: None,
        }
    }

    /// Set filename and content type on a file part; no-op for text parts
    pub fn with_file_meta(mut self, file_name: impl Into<String>, mime: impl Into<String>) -> Self {
        if let Self::File {
            filename,
            content_type,
            ..
        } = &mut self
        {
            *filename = Some(file_name.into());
            *content_type = Some(mime.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// A remote method invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub command: String,
    pub kind: CallKind,
    /// Always a JSON object
    pub params: Value,
    /// Multipart body parts, only read for [`CallKind::Multipart`]
    pub parts: Vec<FormPart>,
    /// Falls back to the configured call timeout when unset
    pub timeout: Option<Duration>,
    /// When false the call neither waits for nor carries a session key
    pub in_session: bool,
}

impl CallRequest {
    pub fn new(command: impl Into<String>, kind: CallKind) -> Self {
        Self {
            command: command.into(),
            kind,
            params: Value::Object(Map::new()),
            parts: Vec::new(),
            timeout: None,
            in_session: true,
        }
    }

    pub fn get(command: impl Into<String>) -> Self {
        Self::new(command, CallKind::Get)
    }

    pub fn post(command: impl Into<String>) -> Self {
        Self::new(command, CallKind::Post)
    }

    pub fn rest_get(command: impl Into<String>) -> Self {
        Self::new(command, CallKind::RestGet)
    }

    pub fn rest_update(command: impl Into<String>) -> Self {
        Self::new(command, CallKind::RestUpdate)
    }

    pub fn multipart(command: impl Into<String>) -> Self {
        Self::new(command, CallKind::Multipart)
    }

    /// Replace params; non-object values are ignored
    pub fn with_params(mut self, params: Value) -> Self {
        if params.is_object() {
            self.params = params;
        }
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.params {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn part(mut self, part: FormPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_session(mut self) -> Self {
        self.in_session = false;
        self
    }

    /// URL path segment for HTTP transports (`file_upload` -> `file/upload`)
    pub fn http_path(&self) -> String {
        self.command.replace('_', "/")
    }

    /// Params flattened to text form fields for multipart bodies
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let Value::Object(map) = &self.params else {
            return Vec::new();
        };
        map.iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect()
    }
}
