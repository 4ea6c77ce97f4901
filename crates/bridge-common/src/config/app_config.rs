//! Application configuration structs
//!
//! Loads configuration from environment variables and config files.

use bridge_core::{
    AccountId, ConnectionDescriptor, ForwardHttpConfig, ForwardWsConfig, ReverseHttpConfig,
    ReverseWsConfig, TransportConfig,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: default_env(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Timing and tuning knobs shared by every connection
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_fetch_count")]
    pub fetch_count: u32,
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: u32,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_accept_unknown_events")]
    pub accept_unknown_events: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            fetch_count: default_fetch_count(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            accept_unknown_events: default_accept_unknown_events(),
        }
    }
}

impl BridgeSettings {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    #[must_use]
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Bind address of the shared reverse endpoint server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One account and the transports it connects through
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub account: AccountId,
    pub verify_key: String,
    #[serde(default)]
    pub connections: Vec<TransportConfig>,
}

impl AccountConfig {
    /// One descriptor per configured transport
    #[must_use]
    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        self.connections
            .iter()
            .cloned()
            .map(|t| ConnectionDescriptor::new(self.account, self.verify_key.clone(), t))
            .collect()
    }
}

// Default value functions
fn default_app_name() -> String {
    "gateway-bridge".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_fetch_count() -> u32 {
    10
}

fn default_reconnect_initial_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_reconnect_multiplier() -> u32 {
    2
}

fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

fn default_accept_unknown_events() -> bool {
    true
}

/// Parse an optional variable, failing only when it is present but malformed
fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        None => Ok(None),
    }
}

impl AppConfig {
    /// Load a single-account configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let account: AccountId = parse_var(&lookup, "BRIDGE_ACCOUNT")?
            .ok_or(ConfigError::MissingVar("BRIDGE_ACCOUNT"))?;
        let verify_key =
            lookup("BRIDGE_VERIFY_KEY").ok_or(ConfigError::MissingVar("BRIDGE_VERIFY_KEY"))?;

        let mut connections = Vec::new();
        if let Some(host) = lookup("BRIDGE_WS_HOST") {
            connections.push(TransportConfig::ForwardWs(ForwardWsConfig { host }));
        }
        if let Some(path) = lookup("BRIDGE_REVERSE_WS_PATH") {
            connections.push(TransportConfig::ReverseWs(ReverseWsConfig {
                path,
                headers: HashMap::new(),
                params: HashMap::new(),
            }));
        }
        if let Some(path) = lookup("BRIDGE_REVERSE_HTTP_PATH") {
            connections.push(TransportConfig::ReverseHttp(ReverseHttpConfig {
                path,
                headers: HashMap::new(),
            }));
        }
        if let Some(host) = lookup("BRIDGE_HTTP_HOST") {
            connections.push(TransportConfig::ForwardHttp(ForwardHttpConfig {
                host,
                poll_interval_ms: None,
                fetch_count: None,
            }));
        }

        let defaults = BridgeSettings::default();
        let bridge = BridgeSettings {
            call_timeout_ms: parse_var(&lookup, "BRIDGE_CALL_TIMEOUT_MS")?
                .unwrap_or(defaults.call_timeout_ms),
            heartbeat_interval_ms: parse_var(&lookup, "BRIDGE_HEARTBEAT_INTERVAL_MS")?
                .unwrap_or(defaults.heartbeat_interval_ms),
            poll_interval_ms: parse_var(&lookup, "BRIDGE_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval_ms),
            fetch_count: parse_var(&lookup, "BRIDGE_FETCH_COUNT")?.unwrap_or(defaults.fetch_count),
            reconnect_initial_delay_ms: parse_var(&lookup, "BRIDGE_RECONNECT_INITIAL_DELAY_MS")?
                .unwrap_or(defaults.reconnect_initial_delay_ms),
            reconnect_max_delay_ms: parse_var(&lookup, "BRIDGE_RECONNECT_MAX_DELAY_MS")?
                .unwrap_or(defaults.reconnect_max_delay_ms),
            reconnect_multiplier: parse_var(&lookup, "BRIDGE_RECONNECT_MULTIPLIER")?
                .unwrap_or(defaults.reconnect_multiplier),
            shutdown_timeout_ms: parse_var(&lookup, "BRIDGE_SHUTDOWN_TIMEOUT_MS")?
                .unwrap_or(defaults.shutdown_timeout_ms),
            accept_unknown_events: parse_var(&lookup, "BRIDGE_ACCEPT_UNKNOWN_EVENTS")?
                .unwrap_or(defaults.accept_unknown_events),
        };

        let config = Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .as_deref()
                    .and_then(Environment::parse)
                    .unwrap_or_default(),
            },
            bridge,
            server: ServerConfig {
                host: lookup("BRIDGE_SERVER_HOST").unwrap_or_else(default_host),
                port: parse_var(&lookup, "BRIDGE_SERVER_PORT")?.unwrap_or_else(default_port),
            },
            accounts: vec![AccountConfig {
                account,
                verify_key,
                connections,
            }],
        };

        config.validate()?;
        Ok(config)
    }

    /// Load from a config file (any format the `config` crate detects by
    /// extension) with `BRIDGE__*` environment overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let loaded = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(
                ::config::Environment::with_prefix("BRIDGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = loaded.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from inline TOML
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let loaded = ::config::Config::builder()
            .add_source(::config::File::from_str(contents, ::config::FileFormat::Toml))
            .build()?;

        let config: Self = loaded.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::Invalid("no accounts configured".into()));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.account) {
                return Err(ConfigError::Invalid(format!(
                    "account {} configured twice",
                    account.account
                )));
            }
            if account.connections.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "account {} has no connections",
                    account.account
                )));
            }
            for transport in &account.connections {
                if matches!(transport.host(), Some(h) if h.trim().is_empty()) {
                    return Err(ConfigError::Invalid(format!(
                        "account {}: {} connection has an empty host",
                        account.account,
                        transport.variant()
                    )));
                }
            }
        }

        if self.bridge.reconnect_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_multiplier must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Every descriptor across every account
    #[must_use]
    pub fn descriptors(&self) -> Vec<ConnectionDescriptor> {
        self.accounts.iter().flat_map(AccountConfig::descriptors).collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
