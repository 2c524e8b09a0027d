//! Broker configuration.
//!
//! [`BrokerConfig`] carries the tunables of the long-poll engine and the
//! transaction coordinator. Values come from [`Default`] or from the
//! environment via [`BrokerConfig::from_env`]; call
//! [`BrokerConfig::validate`] before wiring a [`Broker`](crate::Broker).
//!
//! # Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `LONG_POLL_DEFAULT_TIMEOUT_MS` | `long_poll_default_timeout` | 30s |
//! | `LONG_POLL_MAX_TIMEOUT_MS` | `long_poll_max_timeout` | 60s |
//! | `MAX_PENDING_FETCHES` | `max_pending_fetches` | 10000 |
//! | `FETCH_MAX_BYTES` | `fetch_max_bytes` | 1 MiB |
//! | `TXN_MAX_PARTITIONS_PER_REQUEST` | `max_partitions_per_txn_request` | 1000 |
//! | `TXN_IDLE_TIMEOUT_MS` | `transaction_idle_timeout` | 15min |
//! | `TXN_EXPIRATION_INTERVAL_MS` | `transaction_expiration_interval` | 10s |
//!
//! Unparseable values fall back to the default.

use std::time::Duration;

use crate::constants::{
    DEFAULT_FETCH_MAX_BYTES, DEFAULT_LONG_POLL_MAX_TIMEOUT_MS, DEFAULT_LONG_POLL_TIMEOUT_MS,
    DEFAULT_MAX_PARTITIONS_PER_TXN_REQUEST, DEFAULT_MAX_PENDING_FETCHES,
    DEFAULT_TRANSACTION_EXPIRATION_INTERVAL_MS, DEFAULT_TRANSACTION_IDLE_TIMEOUT_MS,
};

/// Configuration for the broker core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Wait applied when a fetch asks for long polling without naming a timeout.
    pub long_poll_default_timeout: Duration,

    /// Upper bound for any long-poll wait.
    pub long_poll_max_timeout: Duration,

    /// Maximum concurrently parked fetches. New registrations beyond this are
    /// answered immediately with an empty result.
    pub max_pending_fetches: usize,

    /// Maximum bytes requested from storage per pull.
    pub fetch_max_bytes: usize,

    /// Maximum partitions a single AddPartitionsToTxn request may carry.
    pub max_partitions_per_txn_request: usize,

    /// Transactions without activity for this long are dropped.
    pub transaction_idle_timeout: Duration,

    /// Period of the idle transaction sweep.
    pub transaction_expiration_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            long_poll_default_timeout: Duration::from_millis(DEFAULT_LONG_POLL_TIMEOUT_MS),
            long_poll_max_timeout: Duration::from_millis(DEFAULT_LONG_POLL_MAX_TIMEOUT_MS),
            max_pending_fetches: DEFAULT_MAX_PENDING_FETCHES,
            fetch_max_bytes: DEFAULT_FETCH_MAX_BYTES,
            max_partitions_per_txn_request: DEFAULT_MAX_PARTITIONS_PER_TXN_REQUEST,
            transaction_idle_timeout: Duration::from_millis(DEFAULT_TRANSACTION_IDLE_TIMEOUT_MS),
            transaction_expiration_interval: Duration::from_millis(
                DEFAULT_TRANSACTION_EXPIRATION_INTERVAL_MS,
            ),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing or malformed variables keep their default value.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let long_poll_default_timeout = env_millis("LONG_POLL_DEFAULT_TIMEOUT_MS")
            .unwrap_or(defaults.long_poll_default_timeout);

        let long_poll_max_timeout =
            env_millis("LONG_POLL_MAX_TIMEOUT_MS").unwrap_or(defaults.long_poll_max_timeout);

        let max_pending_fetches: usize = std::env::var("MAX_PENDING_FETCHES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_pending_fetches);

        let fetch_max_bytes: usize = std::env::var("FETCH_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.fetch_max_bytes);

        let max_partitions_per_txn_request: usize = std::env::var("TXN_MAX_PARTITIONS_PER_REQUEST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_partitions_per_txn_request);

        let transaction_idle_timeout =
            env_millis("TXN_IDLE_TIMEOUT_MS").unwrap_or(defaults.transaction_idle_timeout);

        let transaction_expiration_interval = env_millis("TXN_EXPIRATION_INTERVAL_MS")
            .unwrap_or(defaults.transaction_expiration_interval);

        Self {
            long_poll_default_timeout,
            long_poll_max_timeout,
            max_pending_fetches,
            fetch_max_bytes,
            max_partitions_per_txn_request,
            transaction_idle_timeout,
            transaction_expiration_interval,
        }
    }

    /// Validate the configuration and return any errors found.
    ///
    /// This should be called at startup to catch configuration issues early.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.long_poll_max_timeout.is_zero() {
            errors.push("long_poll_max_timeout must be greater than 0".to_string());
        }

        if self.long_poll_default_timeout > self.long_poll_max_timeout {
            errors.push(format!(
                "long_poll_default_timeout ({:?}) must not exceed long_poll_max_timeout ({:?})",
                self.long_poll_default_timeout, self.long_poll_max_timeout
            ));
        }

        if self.max_pending_fetches == 0 {
            errors.push("max_pending_fetches must be at least 1".to_string());
        }

        if self.fetch_max_bytes == 0 {
            errors.push("fetch_max_bytes must be greater than 0".to_string());
        }

        if self.max_partitions_per_txn_request == 0 {
            errors.push("max_partitions_per_txn_request must be at least 1".to_string());
        }

        if self.transaction_expiration_interval.is_zero() {
            errors.push("transaction_expiration_interval must be greater than 0".to_string());
        }

        if self.transaction_idle_timeout <= self.transaction_expiration_interval {
            errors.push(format!(
                "transaction_idle_timeout ({:?}) must be greater than transaction_expiration_interval ({:?})",
                self.transaction_idle_timeout, self.transaction_expiration_interval
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve the wait for a fetch request.
    ///
    /// `requested` is the client value in milliseconds; negative or zero means
    /// "answer immediately", `None` selects the default. The result never
    /// exceeds `long_poll_max_timeout`.
    pub fn effective_long_poll_timeout(&self, requested: Option<i64>) -> Duration {
        let wanted = match requested {
            None => self.long_poll_default_timeout,
            Some(ms) if ms <= 0 => Duration::ZERO,
            Some(ms) => Duration::from_millis(ms as u64),
        };
        wanted.min(self.long_poll_max_timeout)
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
