//! Reconnect backoff for forward connections
//!
//! Exponential: `initial * multiplier^n`, capped at `max_delay`, reset by
//! every successful handshake.

use std::time::Duration;

/// Backoff tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// Consecutive failures tolerated before giving up (0 = unlimited)
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            max_retries: 0,
        }
    }
}

/// Running backoff state for one connection
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    consecutive_failures: u32,
    current_delay: Duration,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            consecutive_failures: 0,
            current_delay,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Delay before the next attempt, or `None` once retries are exhausted
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.config.max_retries > 0 && self.consecutive_failures > self.config.max_retries {
            return None;
        }

        let delay = self.current_delay;
        self.current_delay = self
            .current_delay
            .saturating_mul(self.config.multiplier)
            .min(self.config.max_delay);

        Some(delay)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }
}
