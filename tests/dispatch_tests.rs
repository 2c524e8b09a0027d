//! Command dispatch registry: routing, startup validation and custom handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use broker_core::broker::{kafka_dispatcher, native_dispatcher};
use broker_core::cluster::InMemoryClusterManager;
use broker_core::config::BrokerConfig;
use broker_core::error::{Error, ResponseCode};
use broker_core::polling::LongPollingManager;
use broker_core::server::handlers::{HeartbeatHandler, NATIVE_COMMANDS};
use broker_core::server::{
    BooleanAck, BrokerContext, ChannelTransport, Command, CommandDispatcher, CommandHandler,
    Payload, Transport,
};
use broker_core::session::SessionManager;
use broker_core::storage::InMemoryMessageStore;
use broker_core::transaction::TransactionCoordinator;
use broker_core::types::CommandType;
use tokio::runtime::Handle;

const PING: CommandType = CommandType::new(900);

fn context() -> BrokerContext {
    let config = BrokerConfig::default();
    let store = Arc::new(InMemoryMessageStore::new());
    BrokerContext {
        coordinator: Arc::new(TransactionCoordinator::from_config(&config)),
        long_polling: LongPollingManager::new(
            store.clone(),
            config.max_pending_fetches,
            Handle::current(),
        ),
        config: Arc::new(config),
        sessions: Arc::new(SessionManager::new()),
        cluster: Arc::new(InMemoryClusterManager::new()),
        store,
    }
}

/// Counts calls and answers every command with a success ack.
#[derive(Default)]
struct Ping {
    calls: Arc<AtomicUsize>,
    wired: bool,
}

#[async_trait]
impl CommandHandler for Ping {
    fn command_types(&self) -> Vec<CommandType> {
        vec![PING]
    }

    fn inject_context(&mut self, _context: &BrokerContext) {
        self.wired = true;
    }

    fn is_configured(&self) -> bool {
        self.wired
    }

    async fn handle(&self, _transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(Command::response_to(&command.header, BooleanAck::success()))
    }
}

/// Never gets a context, so it stays unconfigured.
struct Stubborn;

#[async_trait]
impl CommandHandler for Stubborn {
    fn command_types(&self) -> Vec<CommandType> {
        vec![PING]
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn handle(&self, _transport: Arc<dyn Transport>, _command: Command) -> Option<Command> {
        None
    }
}

fn config_error(result: broker_core::Result<CommandDispatcher>) -> String {
    match result {
        Err(Error::Config(message)) => message,
        other => panic!("expected config error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_custom_handler_is_routed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = CommandDispatcher::builder("custom")
        .register(Ping {
            calls: calls.clone(),
            wired: false,
        })
        .register(HeartbeatHandler)
        .build(&context())
        .unwrap();

    let (transport, _rx) = ChannelTransport::local(41000);
    let response = dispatcher
        .dispatch(transport, Command::with_type(PING, 5, Payload::Heartbeat))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.header.request_id, 5);
    assert_eq!(response.payload, Payload::BooleanAck(BooleanAck::success()));
    assert!(dispatcher.supports(CommandType::HEARTBEAT));
}

#[tokio::test]
async fn test_unknown_command_answered_unsupported() {
    let dispatcher = CommandDispatcher::builder("custom")
        .register(HeartbeatHandler)
        .build(&context())
        .unwrap();

    let (transport, _rx) = ChannelTransport::local(41001);
    let response = dispatcher
        .dispatch(
            transport,
            Command::with_type(CommandType::new(4242), 8, Payload::Heartbeat),
        )
        .await
        .unwrap();

    assert_eq!(response.header.request_id, 8);
    assert_eq!(
        response.payload,
        Payload::BooleanAck(BooleanAck::new(ResponseCode::CnCommandUnsupported))
    );
    assert!(response.is_error());
}

#[tokio::test]
async fn test_duplicate_registration_fails_at_build() {
    let message = config_error(
        CommandDispatcher::builder("custom")
            .register(Ping::default())
            .register(Ping::default())
            .build(&context()),
    );
    assert!(message.contains("duplicate"), "{message}");
}

#[tokio::test]
async fn test_unconfigured_handler_fails_at_build() {
    let result = CommandDispatcher::builder("custom")
        .register(Stubborn)
        .build(&context());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_missing_required_command_fails_at_build() {
    let message = config_error(
        CommandDispatcher::builder("native")
            .register(HeartbeatHandler)
            .require(NATIVE_COMMANDS)
            .build(&context()),
    );
    assert!(message.contains("missing"), "{message}");
}

#[tokio::test]
async fn test_builtin_dispatchers_are_disjoint() {
    let ctx = context();
    let native = native_dispatcher(&ctx).unwrap();
    let kafka = kafka_dispatcher(&ctx).unwrap();

    assert_eq!(native.command_types().len(), NATIVE_COMMANDS.len());
    for command_type in kafka.command_types() {
        assert!(!native.supports(command_type));
    }
}
