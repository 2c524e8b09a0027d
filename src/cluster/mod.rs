//! Cluster/authorization collaborator.
//!
//! The broker core never decides on its own whether an application may use a
//! topic; it asks a [`ClusterManager`]. Production deployments back the trait
//! with the metadata service; tests use
//! [`InMemoryClusterManager`](memory::InMemoryClusterManager).

use async_trait::async_trait;

use crate::error::Result;

#[cfg(any(test, feature = "test-utilities"))]
pub mod memory;

#[cfg(any(test, feature = "test-utilities"))]
pub use memory::InMemoryClusterManager;

/// Consumer subscription granted by the cluster for an `(app, topic)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerPolicy {
    pub topic: String,
    pub app: String,
}

/// Producer permission granted by the cluster for an `(app, topic)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerPolicy {
    pub topic: String,
    pub app: String,
}

/// Narrow view of the cluster metadata service.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// Verify an application token. `Ok(false)` means the credentials were
    /// rejected; `Err` means the service could not answer.
    async fn authenticate(&self, app: &str, token: &str) -> Result<bool>;

    /// Subscription for `app` on `topic`, or `None` when the app may not consume it.
    async fn try_get_consumer(&self, topic: &str, app: &str) -> Result<Option<ConsumerPolicy>>;

    /// Permission for `app` to produce to `topic`, or `None` when denied.
    async fn try_get_producer(&self, topic: &str, app: &str) -> Result<Option<ProducerPolicy>>;
}
