//! Storage collaborator.
//!
//! The log engine is outside this crate. The broker core needs two things
//! from it: pulling a batch of messages for a consumer, and being told when
//! new data lands on a partition so parked fetches can be retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{ResponseCode, Result};

#[cfg(any(test, feature = "test-utilities"))]
pub mod memory;

#[cfg(any(test, feature = "test-utilities"))]
pub use memory::InMemoryMessageStore;

/// A pull for one consumer on one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub consumer_id: String,
    pub app: String,
    pub topic: String,
    /// Restrict the pull to one partition; `None` lets storage pick.
    pub partition: Option<i32>,
    /// Maximum number of messages.
    pub count: u16,
    pub max_bytes: usize,
    /// How long pulled messages stay reserved before redelivery.
    pub ack_timeout: Duration,
}

/// Outcome of a pull.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PullResult {
    pub buffers: Vec<Bytes>,
    pub code: ResponseCode,
}

impl PullResult {
    /// Successful pull that found nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_buffers(buffers: Vec<Bytes>) -> Self {
        Self {
            buffers,
            code: ResponseCode::Success,
        }
    }

    /// Result carrying only a code.
    pub fn from_code(code: ResponseCode) -> Self {
        Self {
            buffers: Vec::new(),
            code,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.buffers.iter().map(Bytes::len).sum()
    }
}

/// Receives data-arrival notifications from storage.
///
/// Called on the storage write path; implementations must not block.
pub trait DataListener: Send + Sync {
    fn on_data(&self, topic: &str, partition: i32);
}

/// Narrow view of the log engine.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Pull up to `request.count` messages. An empty `buffers` with
    /// `ResponseCode::Success` means nothing is available right now.
    async fn pull(&self, request: &PullRequest) -> Result<PullResult>;

    /// Install the listener notified on every append. Replaces any previous one.
    fn set_listener(&self, listener: Arc<dyn DataListener>);
}
