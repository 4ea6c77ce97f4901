//! Connection descriptors - what one transport connection is configured as

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::call::CallKind;
use crate::value_objects::AccountId;

/// Account credential used to authenticate with the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub account: AccountId,
    pub verify_key: String,
}

/// Outbound WebSocket: this side dials `{host}/all`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardWsConfig {
    pub host: String,
}

/// Outbound HTTP: request/response calls plus a fetch poll loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardHttpConfig {
    pub host: String,
    /// Overrides the bridge-wide poll interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    /// Overrides the bridge-wide fetch batch size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_count: Option<u32>,
}

/// Inbound WebSocket: the gateway dials our server at `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseWsConfig {
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Inbound HTTP webhook: the gateway POSTs events to `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseHttpConfig {
    pub path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Per-variant routing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportConfig {
    ForwardWs(ForwardWsConfig),
    ForwardHttp(ForwardHttpConfig),
    ReverseWs(ReverseWsConfig),
    ReverseHttp(ReverseHttpConfig),
}

impl TransportConfig {
    pub fn variant(&self) -> ConnectionVariant {
        match self {
            Self::ForwardWs(_) => ConnectionVariant::ForwardWs,
            Self::ForwardHttp(_) => ConnectionVariant::ForwardHttp,
            Self::ReverseWs(_) => ConnectionVariant::ReverseWs,
            Self::ReverseHttp(_) => ConnectionVariant::ReverseHttp,
        }
    }

    /// Server path for reverse variants
    pub fn reverse_path(&self) -> Option<&str> {
        match self {
            Self::ReverseWs(c) => Some(&c.path),
            Self::ReverseHttp(c) => Some(&c.path),
            _ => None,
        }
    }

    /// Remote host for forward variants
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::ForwardWs(c) => Some(&c.host),
            Self::ForwardHttp(c) => Some(&c.host),
            _ => None,
        }
    }
}

/// The four transport variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionVariant {
    ForwardWs,
    ForwardHttp,
    ReverseWs,
    ReverseHttp,
}

impl ConnectionVariant {
    /// Whether this variant can service a call kind on its own.
    ///
    /// WebSocket frames cannot carry multipart bodies, and a webhook has
    /// no outbound channel at all.
    pub fn supports(self, kind: CallKind) -> bool {
        match self {
            Self::ForwardWs | Self::ReverseWs => kind != CallKind::Multipart,
            Self::ForwardHttp => true,
            Self::ReverseHttp => false,
        }
    }

    /// Only forward HTTP may serve as another connection's fallback
    #[inline]
    pub fn is_fallback_capable(self) -> bool {
        matches!(self, Self::ForwardHttp)
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        matches!(self, Self::ReverseWs | Self::ReverseHttp)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForwardWs => "forward-ws",
            Self::ForwardHttp => "forward-http",
            Self::ReverseWs => "reverse-ws",
            Self::ReverseHttp => "reverse-http",
        }
    }
}

impl fmt::Display for ConnectionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured connection: credential plus transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub account: AccountId,
    pub verify_key: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl ConnectionDescriptor {
    pub fn new(account: AccountId, verify_key: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            account,
            verify_key: verify_key.into(),
            transport,
        }
    }

    pub fn forward_ws(account: AccountId, verify_key: impl Into<String>, host: impl Into<String>) -> Self {
        Self::new(
            account,
            verify_key,
            TransportConfig::ForwardWs(ForwardWsConfig { host: host.into() }),
        )
    }

    pub fn forward_http(account: AccountId, verify_key: impl Into<String>, host: impl Into<String>) -> Self {
        Self::new(
            account,
            verify_key,
            TransportConfig::ForwardHttp(ForwardHttpConfig {
                host: host.into(),
                poll_interval_ms: None,
                fetch_count: None,
            }),
        )
    }

    pub fn reverse_ws(account: AccountId, verify_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(
            account,
            verify_key,
            TransportConfig::ReverseWs(ReverseWsConfig {
                path: path.into(),
                headers: HashMap::new(),
                params: HashMap::new(),
            }),
        )
    }

    pub fn reverse_http(account: AccountId, verify_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(
            account,
            verify_key,
            TransportConfig::ReverseHttp(ReverseHttpConfig {
                path: path.into(),
                headers: HashMap::new(),
            }),
        )
    }

    #[inline]
    pub fn variant(&self) -> ConnectionVariant {
        self.transport.variant()
    }

    pub fn credential(&self) -> Credential {
        Credential {
            account: self.account,
            verify_key: self.verify_key.clone(),
        }
    }

    /// Add a required header to a reverse descriptor; ignored for forward ones
    pub fn with_required_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        match &mut self.transport {
            TransportConfig::ReverseWs(c) => {
                c.headers.insert(key.into(), value.into());
            }
            TransportConfig::ReverseHttp(c) => {
                c.headers.insert(key.into(), value.into());
            }
            _ => {}
        }
        self
    }

    /// Add a required query parameter to a reverse WebSocket descriptor
    pub fn with_required_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let TransportConfig::ReverseWs(c) = &mut self.transport {
            c.params.insert(key.into(), value.into());
        }
        self
    }
}
