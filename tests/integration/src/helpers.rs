//! Test helpers for integration tests
//!
//! Registry builders with fast timings, event collection and polling waits.

use std::time::Duration;

use anyhow::{Context, Result};
use bridge_common::{BridgeSettings, ServerConfig};
use bridge_connection::{BackoffConfig, ConnectionRegistry, ConnectionSettings};
use bridge_core::{AccountId, Event};
use tokio::sync::mpsc;

pub const ACCOUNT: AccountId = AccountId::new(10_001);
pub const VERIFY_KEY: &str = "integration-key";

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_test_tracing() {
    let _ = bridge_common::try_init_tracing();
}

/// Timings short enough that reconnects and polls happen within a test
pub fn fast_settings() -> ConnectionSettings {
    ConnectionSettings {
        call_timeout: Duration::from_secs(2),
        heartbeat_interval: Duration::from_millis(500),
        poll_interval: Duration::from_millis(20),
        fetch_count: 10,
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(200),
            multiplier: 2,
            max_retries: 0,
        },
    }
}

/// Registry whose reverse server binds an ephemeral local port
pub fn test_registry() -> ConnectionRegistry {
    init_test_tracing();
    let server = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let settings = BridgeSettings {
        shutdown_timeout_ms: 2_000,
        ..BridgeSettings::default()
    };
    ConnectionRegistry::new(&settings, server).with_settings(fast_settings())
}

/// Wait until the account holds a usable session key
pub async fn wait_available(registry: &ConnectionRegistry, account: AccountId) -> Result<String> {
    let session = registry
        .session(account)
        .with_context(|| format!("account {account} is not registered"))?;
    tokio::time::timeout(WAIT, session.wait_for_available())
        .await
        .context("session never became available")
}

/// Poll `condition` every few milliseconds until it holds or `WAIT` passes
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Collects every event delivered to one account
pub struct EventSink {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventSink {
    pub fn attach(registry: &ConnectionRegistry, account: AccountId) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.listen(account, move |event: Event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event);
            }
        })?;
        Ok(Self { rx })
    }

    pub async fn next(&mut self) -> Result<Event> {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .context("no event within timeout")?
            .context("event channel closed")
    }

    /// Assert nothing arrives for a short while
    pub async fn assert_quiet(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(200), self.rx.recv()).await;
        assert!(got.is_err(), "unexpected event: {got:?}");
    }
}
