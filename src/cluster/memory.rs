//! In-memory cluster manager for tests.
//!
//! Available when the `test-utilities` feature is enabled, or during unit
//! tests:
//!
//! ```toml
//! [dev-dependencies]
//! broker-core = { path = ".", features = ["test-utilities"] }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ClusterManager, ConsumerPolicy, ProducerPolicy};
use crate::error::{Error, Result};

/// Cluster manager backed by maps filled in by the test.
#[derive(Debug, Default)]
pub struct InMemoryClusterManager {
    /// app -> token
    tokens: DashMap<String, String>,
    /// (topic, app)
    consumers: DashMap<(String, String), ()>,
    producers: DashMap<(String, String), ()>,
    unavailable: AtomicBool,
    lookups: AtomicU64,
}

impl InMemoryClusterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` for `app`.
    pub fn with_app(self, app: &str, token: &str) -> Self {
        self.tokens.insert(app.to_string(), token.to_string());
        self
    }

    /// Allow `app` to consume `topic`.
    pub fn allow_consumer(self, topic: &str, app: &str) -> Self {
        self.consumers
            .insert((topic.to_string(), app.to_string()), ());
        self
    }

    pub fn allow_producer(self, topic: &str, app: &str) -> Self {
        self.producers
            .insert((topic.to_string(), app.to_string()), ());
        self
    }

    /// Revoke a consumer permission at runtime.
    pub fn revoke_consumer(&self, topic: &str, app: &str) {
        self.consumers.remove(&(topic.to_string(), app.to_string()));
    }

    /// Make every call fail with [`Error::Cluster`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of permission lookups served.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Cluster("metadata service unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterManager for InMemoryClusterManager {
    async fn authenticate(&self, app: &str, token: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self
            .tokens
            .get(app)
            .map(|expected| expected.as_str() == token)
            .unwrap_or(false))
    }

    async fn try_get_consumer(&self, topic: &str, app: &str) -> Result<Option<ConsumerPolicy>> {
        self.check_available()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .consumers
            .get(&(topic.to_string(), app.to_string()))
            .map(|_| ConsumerPolicy {
                topic: topic.to_string(),
                app: app.to_string(),
            }))
    }

    async fn try_get_producer(&self, topic: &str, app: &str) -> Result<Option<ProducerPolicy>> {
        self.check_available()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .producers
            .get(&(topic.to_string(), app.to_string()))
            .map(|_| ProducerPolicy {
                topic: topic.to_string(),
                app: app.to_string(),
            }))
    }
}
