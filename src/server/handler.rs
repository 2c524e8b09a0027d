//! Handler trait for processing commands.
//!
//! A dispatcher owns one handler per command type. Handlers are built
//! empty, receive their collaborators through
//! [`CommandHandler::inject_context`] while the dispatcher is assembled, and
//! are shared across concurrent requests afterwards.

use std::sync::Arc;

use async_trait::async_trait;

use super::command::Command;
use super::transport::Transport;
use crate::cluster::ClusterManager;
use crate::config::BrokerConfig;
use crate::polling::LongPollingManager;
use crate::session::SessionManager;
use crate::storage::MessageStore;
use crate::transaction::TransactionCoordinator;
use crate::types::CommandType;

/// Collaborators a handler may need.
#[derive(Clone)]
pub struct BrokerContext {
    pub config: Arc<BrokerConfig>,
    pub sessions: Arc<SessionManager>,
    pub cluster: Arc<dyn ClusterManager>,
    pub store: Arc<dyn MessageStore>,
    pub long_polling: LongPollingManager,
    pub coordinator: Arc<TransactionCoordinator>,
}

impl std::fmt::Debug for BrokerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerContext")
            .field("config", &self.config)
            .field("long_polling", &self.long_polling)
            .finish_non_exhaustive()
    }
}

/// Handles one or more command types.
///
/// Handlers translate every fault into a response themselves; only a
/// misconfigured dispatcher fails, and it fails at startup.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Command types routed to this handler.
    fn command_types(&self) -> Vec<CommandType>;

    /// Receive collaborators. Called once, before [`is_configured`].
    ///
    /// [`is_configured`]: CommandHandler::is_configured
    fn inject_context(&mut self, _context: &BrokerContext) {}

    /// Whether the handler has everything it needs to serve requests.
    fn is_configured(&self) -> bool {
        true
    }

    /// Handle `command` received on `transport`.
    ///
    /// `None` means the response will be written later through the
    /// transport, e.g. by a parked long poll.
    async fn handle(&self, transport: Arc<dyn Transport>, command: Command) -> Option<Command>;
}
