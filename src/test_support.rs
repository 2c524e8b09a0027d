//! Shared fixtures for unit tests.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::cluster::InMemoryClusterManager;
use crate::config::BrokerConfig;
use crate::polling::LongPollingManager;
use crate::server::BrokerContext;
use crate::session::SessionManager;
use crate::storage::InMemoryMessageStore;
use crate::transaction::TransactionCoordinator;

pub(crate) struct Fixture {
    pub context: BrokerContext,
    pub cluster: Arc<InMemoryClusterManager>,
    pub store: Arc<InMemoryMessageStore>,
}

impl Fixture {
    /// Must be called from within a tokio runtime.
    pub fn new(cluster: InMemoryClusterManager, config: BrokerConfig) -> Self {
        let cluster = Arc::new(cluster);
        let store = Arc::new(InMemoryMessageStore::new());
        let long_polling =
            LongPollingManager::new(store.clone(), config.max_pending_fetches, Handle::current());
        let context = BrokerContext {
            coordinator: Arc::new(TransactionCoordinator::from_config(&config)),
            config: Arc::new(config),
            sessions: Arc::new(SessionManager::new()),
            cluster: cluster.clone(),
            store: store.clone(),
            long_polling,
        };
        Self {
            context,
            cluster,
            store,
        }
    }
}

/// Context with permissive defaults and no apps.
pub(crate) fn context() -> BrokerContext {
    Fixture::new(InMemoryClusterManager::new(), BrokerConfig::default()).context
}
