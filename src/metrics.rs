//! Prometheus metrics for the broker core.
//!
//! Metrics cover:
//! - Command dispatch (count and latency per command type)
//! - Sessions (connections, consumers, producers)
//! - Long polling (parked fetches, resolution outcomes)
//! - Transactions (registration results, active transactions, expiries)
//!
//! All metrics live in a custom registry with the "broker" prefix. A metric
//! that fails to register is kept as an unregistered instance instead of
//! panicking.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder, opts,
};
use tracing::warn;

/// Custom Prometheus registry for broker metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("broker".to_string()), None).unwrap_or_else(|_| Registry::new())
});

// =============================================================================
// Metric Declaration Macros
// =============================================================================

/// Declare an IntGauge metric.
macro_rules! define_gauge {
    ($name:ident, $metric_name:expr, $help:expr) => {
        #[doc = $help]
        pub static $name: Lazy<IntGauge> =
            Lazy::new(|| register_int_gauge_safe(&REGISTRY, $metric_name, $help));
    };
}

/// Declare an IntCounter metric (no labels).
macro_rules! define_counter {
    ($name:ident, $metric_name:expr, $help:expr) => {
        #[doc = $help]
        pub static $name: Lazy<IntCounter> =
            Lazy::new(|| register_int_counter_safe(&REGISTRY, $metric_name, $help));
    };
}

/// Declare an IntCounterVec metric with labels.
macro_rules! define_counter_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<IntCounterVec> = Lazy::new(|| {
            register_int_counter_vec_safe(&REGISTRY, $metric_name, $help, &[$($label),+])
        });
    };
}

/// Declare a HistogramVec metric with labels and buckets.
macro_rules! define_histogram_vec {
    ($name:ident, $metric_name:expr, $help:expr, [$($label:expr),+ $(,)?], [$($bucket:expr),+ $(,)?]) => {
        #[doc = $help]
        pub static $name: Lazy<HistogramVec> = Lazy::new(|| {
            register_histogram_vec_safe(&REGISTRY, $metric_name, $help, &[$($label),+], vec![$($bucket),+])
        });
    };
}

// =============================================================================
// Command metrics
// =============================================================================

define_counter_vec!(
    COMMAND_COUNT,
    "commands_total",
    "Total number of dispatched commands",
    ["command", "status"]
);
define_histogram_vec!(
    COMMAND_DURATION,
    "command_duration_seconds",
    "Command handling duration in seconds",
    ["command"],
    [0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
);

// =============================================================================
// Session metrics
// =============================================================================

define_gauge!(
    ACTIVE_CONNECTIONS,
    "active_connections",
    "Number of registered client connections"
);
define_gauge!(
    ACTIVE_CONSUMERS,
    "active_consumers",
    "Number of registered consumers"
);
define_gauge!(
    ACTIVE_PRODUCERS,
    "active_producers",
    "Number of registered producers"
);
define_counter_vec!(
    SESSION_REJECTIONS,
    "session_rejections_total",
    "Session requests rejected before registration",
    ["command", "reason"]
);

// =============================================================================
// Long-poll metrics
// =============================================================================

define_gauge!(
    PENDING_FETCHES,
    "pending_fetches",
    "Number of fetches parked waiting for data"
);
define_counter_vec!(
    LONG_POLL_OUTCOMES,
    "long_poll_outcomes_total",
    "Long-poll resolutions by outcome",
    ["outcome"]
);
define_counter!(
    LONG_POLL_REJECTIONS,
    "long_poll_rejections_total",
    "Long-poll registrations refused because the engine was at capacity"
);
define_histogram_vec!(
    LONG_POLL_WAIT,
    "long_poll_wait_seconds",
    "Time a fetch stayed parked before resolution",
    ["outcome"],
    [0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
);

// =============================================================================
// Transaction metrics
// =============================================================================

define_counter_vec!(
    TXN_PARTITION_REGISTRATIONS,
    "txn_partition_registrations_total",
    "AddPartitionsToTxn outcomes",
    ["result"]
);
define_gauge!(
    ACTIVE_TRANSACTIONS,
    "active_transactions",
    "Number of open transactions tracked by the coordinator"
);
define_counter!(
    EXPIRED_TRANSACTIONS,
    "expired_transactions_total",
    "Transactions dropped after exceeding the idle timeout"
);

/// Register an IntGauge safely, returning an unregistered gauge on error.
fn register_int_gauge_safe(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("metric name/help should be valid");
    match registry.register(Box::new(gauge.clone())) {
        Ok(()) => gauge,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntGauge metric, using unregistered fallback");
            gauge
        }
    }
}

/// Register an IntCounter safely, returning an unregistered counter on error.
fn register_int_counter_safe(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric name/help should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntCounter metric, using unregistered fallback");
            counter
        }
    }
}

/// Register an IntCounterVec safely, returning an unregistered vec on error.
fn register_int_counter_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> IntCounterVec {
    let counter =
        IntCounterVec::new(opts!(name, help), labels).expect("metric opts should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntCounterVec metric, using unregistered fallback");
            counter
        }
    }
}

/// Register a HistogramVec safely, returning an unregistered vec on error.
fn register_histogram_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
    buckets: Vec<f64>,
) -> HistogramVec {
    let histogram = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
        .expect("metric opts should be valid");
    match registry.register(Box::new(histogram.clone())) {
        Ok(()) => histogram,
        Err(e) => {
            warn!(name, error = %e, "Failed to register HistogramVec metric, using unregistered fallback");
            histogram
        }
    }
}

/// Force registration of every metric so they show up before first use.
///
/// Idempotent.
pub fn init_metrics() {
    let _ = &*COMMAND_COUNT;
    let _ = &*COMMAND_DURATION;
    let _ = &*ACTIVE_CONNECTIONS;
    let _ = &*ACTIVE_CONSUMERS;
    let _ = &*ACTIVE_PRODUCERS;
    let _ = &*SESSION_REJECTIONS;
    let _ = &*PENDING_FETCHES;
    let _ = &*LONG_POLL_OUTCOMES;
    let _ = &*LONG_POLL_REJECTIONS;
    let _ = &*LONG_POLL_WAIT;
    let _ = &*TXN_PARTITION_REGISTRATIONS;
    let _ = &*ACTIVE_TRANSACTIONS;
    let _ = &*EXPIRED_TRANSACTIONS;
}

/// Encode all metrics in Prometheus text format.
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a dispatched command.
pub fn record_command(command: &str, status: &str, duration_secs: f64) {
    COMMAND_COUNT.with_label_values(&[command, status]).inc();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration_secs);
}

/// Record a session request refused before any registration happened.
pub fn record_session_rejection(command: &str, reason: &str) {
    SESSION_REJECTIONS
        .with_label_values(&[command, reason])
        .inc();
}

/// Record the resolution of a parked fetch.
///
/// `outcome` is one of `success`, `expire`, `exception`, `cancelled`.
pub fn record_long_poll_outcome(outcome: &str, waited_secs: f64) {
    LONG_POLL_OUTCOMES.with_label_values(&[outcome]).inc();
    LONG_POLL_WAIT
        .with_label_values(&[outcome])
        .observe(waited_secs);
}

pub fn record_long_poll_rejection() {
    LONG_POLL_REJECTIONS.inc();
}

pub fn set_pending_fetches(count: usize) {
    PENDING_FETCHES.set(count as i64);
}

/// Record an AddPartitionsToTxn outcome.
///
/// `result` is one of `success`, `fenced`, `rejected`, `error`.
pub fn record_txn_registration(result: &str) {
    TXN_PARTITION_REGISTRATIONS
        .with_label_values(&[result])
        .inc();
}

pub fn set_active_transactions(count: usize) {
    ACTIVE_TRANSACTIONS.set(count as i64);
}

pub fn record_expired_transactions(count: usize) {
    EXPIRED_TRANSACTIONS.inc_by(count as u64);
}

/// Publish session registry sizes.
pub fn set_session_counts(connections: usize, consumers: usize, producers: usize) {
    ACTIVE_CONNECTIONS.set(connections as i64);
    ACTIVE_CONSUMERS.set(consumers as i64);
    ACTIVE_PRODUCERS.set(producers as i64);
}
