//! Broker facade.
//!
//! [`Broker`] wires the session registry, long-polling engine and transaction
//! coordinator into a native and a Kafka [`CommandDispatcher`], runs command
//! handling on the data-plane runtime, and tears connection state down when a
//! transport closes.

use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::background_tasks::{BackgroundTaskRegistry, TaskStatus};
use crate::cluster::ClusterManager;
use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::polling::LongPollingManager;
use crate::server::handlers::{
    AddConnectionHandler, AddConsumerHandler, AddPartitionsToTxnHandler, AddProducerHandler,
    FetchTopicMessageHandler, HeartbeatHandler, KAFKA_COMMANDS, NATIVE_COMMANDS,
    RemoveConnectionHandler, RemoveConsumerHandler, RemoveProducerHandler,
};
use crate::server::{BrokerContext, Command, CommandDispatcher, Transport};
use crate::session::SessionManager;
use crate::storage::MessageStore;
use crate::transaction::TransactionCoordinator;

const TXN_EXPIRATION_TASK: &str = "transaction-expiration";

/// Dispatcher serving every native command.
pub fn native_dispatcher(context: &BrokerContext) -> Result<CommandDispatcher> {
    CommandDispatcher::builder("native")
        .register(AddConnectionHandler::default())
        .register(RemoveConnectionHandler::default())
        .register(AddConsumerHandler::default())
        .register(RemoveConsumerHandler::default())
        .register(AddProducerHandler::default())
        .register(RemoveProducerHandler::default())
        .register(HeartbeatHandler)
        .register(FetchTopicMessageHandler::default())
        .require(NATIVE_COMMANDS)
        .build(context)
}

/// Dispatcher serving the Kafka transaction API.
pub fn kafka_dispatcher(context: &BrokerContext) -> Result<CommandDispatcher> {
    CommandDispatcher::builder("kafka")
        .register(AddPartitionsToTxnHandler::default())
        .require(KAFKA_COMMANDS)
        .build(context)
}

pub struct Broker {
    context: BrokerContext,
    native: Arc<CommandDispatcher>,
    kafka: Arc<CommandDispatcher>,
    runtime: Handle,
    tasks: Mutex<BackgroundTaskRegistry>,
}

impl Broker {
    /// Build a broker and start its maintenance tasks on `runtime`.
    ///
    /// Fails with [`Error::Config`] when `config` is invalid.
    pub fn new(
        config: BrokerConfig,
        cluster: Arc<dyn ClusterManager>,
        store: Arc<dyn MessageStore>,
        runtime: Handle,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| Error::Config(errors.join("; ")))?;
        metrics::init_metrics();

        let long_polling =
            LongPollingManager::new(store.clone(), config.max_pending_fetches, runtime.clone());
        let context = BrokerContext {
            coordinator: Arc::new(TransactionCoordinator::from_config(&config)),
            config: Arc::new(config),
            sessions: Arc::new(SessionManager::new()),
            cluster,
            store,
            long_polling,
        };

        let native = Arc::new(native_dispatcher(&context)?);
        let kafka = Arc::new(kafka_dispatcher(&context)?);

        let mut tasks = BackgroundTaskRegistry::new(runtime.clone());
        let coordinator = context.coordinator.clone();
        tasks.spawn_periodic(
            TXN_EXPIRATION_TASK,
            context.config.transaction_expiration_interval,
            move |_tick| {
                let coordinator = coordinator.clone();
                async move {
                    let expired = coordinator.expire_idle_transactions(Utc::now());
                    if expired > 0 {
                        debug!(expired, "Idle transaction sweep");
                    }
                }
            },
        );

        info!(
            native_commands = native.command_types().len(),
            kafka_commands = kafka.command_types().len(),
            max_pending_fetches = context.config.max_pending_fetches,
            "Broker started"
        );

        Ok(Self {
            context,
            native,
            kafka,
            runtime,
            tasks: Mutex::new(tasks),
        })
    }

    /// Handle a native command on the data-plane runtime and write its
    /// response, if any, to `transport`.
    pub fn on_command(&self, transport: Arc<dyn Transport>, command: Command) -> JoinHandle<()> {
        self.spawn_dispatch(self.native.clone(), transport, command)
    }

    /// Same as [`on_command`](Self::on_command) for Kafka API requests.
    pub fn on_kafka_command(
        &self,
        transport: Arc<dyn Transport>,
        command: Command,
    ) -> JoinHandle<()> {
        self.spawn_dispatch(self.kafka.clone(), transport, command)
    }

    fn spawn_dispatch(
        &self,
        dispatcher: Arc<CommandDispatcher>,
        transport: Arc<dyn Transport>,
        command: Command,
    ) -> JoinHandle<()> {
        self.runtime.spawn(async move {
            let request = command.header;
            let Some(response) = dispatcher.dispatch(transport.clone(), command).await else {
                return;
            };
            if let Err(e) = transport.acknowledge(&request, response) {
                warn!(
                    transport = transport.id(),
                    command = %request.command_type,
                    request_id = request.request_id,
                    error = %e,
                    "Failed to write response"
                );
            }
        })
    }

    /// Forget everything bound to a closed transport: its connection, the
    /// consumers and producers it owned, and its parked fetches.
    pub fn on_connection_closed(&self, transport_id: &str) {
        let cancelled = self.context.long_polling.cancel_connection(transport_id);
        let removed = self
            .context
            .sessions
            .remove_connection_by_transport(transport_id);
        info!(
            transport = transport_id,
            connection_id = removed.as_ref().map(|c| c.id()),
            cancelled_fetches = cancelled,
            "Transport closed"
        );
    }

    /// Answer parked fetches and stop maintenance tasks.
    pub async fn shutdown(&self) {
        let expired = self.context.long_polling.expire_all();
        self.tasks.lock().await.shutdown_all().await;
        info!(expired_fetches = expired, "Broker stopped");
    }

    pub async fn health_check(&self) -> Vec<(&'static str, TaskStatus)> {
        self.tasks.lock().await.health_check()
    }

    pub fn context(&self) -> &BrokerContext {
        &self.context
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.context.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.context.sessions
    }

    pub fn long_polling(&self) -> &LongPollingManager {
        &self.context.long_polling
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.context.coordinator
    }

    pub fn native_dispatcher(&self) -> &CommandDispatcher {
        &self.native
    }

    pub fn kafka_dispatcher(&self) -> &CommandDispatcher {
        &self.kafka
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("native", &self.native)
            .field("kafka", &self.kafka)
            .finish_non_exhaustive()
    }
}
