//! Centralized protocol and configuration constants.
//!
//! # Categories
//!
//! - **Identity Constants**: identifier lengths and id layout markers
//! - **Long-Poll Constants**: default and maximum waits, capacity
//! - **Transaction Constants**: request limits and idle expiry

// =============================================================================
// Identity Constants
// =============================================================================

/// Maximum length for topic names (Kafka's MAX_NAME_LENGTH).
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

/// Maximum length for application names.
pub const MAX_APP_NAME_LENGTH: usize = 128;

/// Maximum length for Kafka transactional ids.
pub const MAX_TRANSACTION_ID_LENGTH: usize = 255;

/// Marker embedded in generated consumer ids.
pub const CONSUMER_ID_MARKER: &str = "consumer";

/// Marker embedded in generated producer ids.
pub const PRODUCER_ID_MARKER: &str = "producer";

// =============================================================================
// Long-Poll Constants
// =============================================================================

/// Default long-poll wait when the request does not name one (30 seconds).
pub const DEFAULT_LONG_POLL_TIMEOUT_MS: u64 = 30_000;

/// Upper bound on any long-poll wait (60 seconds).
///
/// Client supplied timeouts are clamped to this value so every pending
/// fetch has a bounded lifetime.
pub const DEFAULT_LONG_POLL_MAX_TIMEOUT_MS: u64 = 60_000;

/// Default maximum number of concurrently parked fetches.
pub const DEFAULT_MAX_PENDING_FETCHES: usize = 10_000;

/// Default maximum bytes returned by a single pull (1 MB).
pub const DEFAULT_FETCH_MAX_BYTES: usize = 1024 * 1024;

/// Default message count for a fetch that does not name one.
pub const DEFAULT_FETCH_COUNT: u16 = 10;

// =============================================================================
// Transaction Constants
// =============================================================================

/// Maximum partitions a single AddPartitionsToTxn request may enlist.
pub const DEFAULT_MAX_PARTITIONS_PER_TXN_REQUEST: usize = 1000;

/// Transactions untouched for this long are expired (15 minutes).
pub const DEFAULT_TRANSACTION_IDLE_TIMEOUT_MS: u64 = 15 * 60 * 1000;

/// How often the idle transaction sweep runs (10 seconds).
pub const DEFAULT_TRANSACTION_EXPIRATION_INTERVAL_MS: u64 = 10_000;
