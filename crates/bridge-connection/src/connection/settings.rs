//! Per-connection tuning, derived from [`BridgeSettings`]

use bridge_common::BridgeSettings;
use std::time::Duration;

use super::backoff::BackoffConfig;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub call_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub fetch_count: u32,
    pub backoff: BackoffConfig,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&BridgeSettings::default())
    }
}

impl From<&BridgeSettings> for ConnectionSettings {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            call_timeout: settings.call_timeout(),
            heartbeat_interval: settings.heartbeat_interval(),
            poll_interval: settings.poll_interval(),
            fetch_count: settings.fetch_count,
            backoff: BackoffConfig {
                initial_delay: settings.reconnect_initial_delay(),
                max_delay: settings.reconnect_max_delay(),
                multiplier: settings.reconnect_multiplier,
                max_retries: 0,
            },
        }
    }
}
