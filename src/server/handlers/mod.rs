//! Built-in command handlers.
//!
//! Every handler except [`HeartbeatHandler`] needs the [`BrokerContext`] and
//! reports itself unconfigured until it has been injected.

mod add_partitions_to_txn;
mod connection;
mod consumer;
mod fetch_topic_message;
mod heartbeat;
mod producer;

pub use add_partitions_to_txn::AddPartitionsToTxnHandler;
pub use connection::{AddConnectionHandler, RemoveConnectionHandler};
pub use consumer::{AddConsumerHandler, RemoveConsumerHandler};
pub use fetch_topic_message::{FetchTopicMessageHandler, FetchTopicMessageLongPollCallback};
pub use heartbeat::HeartbeatHandler;
pub use producer::{AddProducerHandler, RemoveProducerHandler};

use std::sync::Arc;

use tracing::{error, warn};

use super::command::{BooleanAck, Command, Header};
use super::handler::BrokerContext;
use super::transport::Transport;
use crate::error::ResponseCode;
use crate::metrics;
use crate::session::Connection;
use crate::types::CommandType;
use crate::validation::{validate_app_name, validate_topic_name};

/// Native command types the native dispatcher must serve.
pub const NATIVE_COMMANDS: &[CommandType] = &[
    CommandType::ADD_CONNECTION,
    CommandType::REMOVE_CONNECTION,
    CommandType::ADD_CONSUMER,
    CommandType::REMOVE_CONSUMER,
    CommandType::ADD_PRODUCER,
    CommandType::REMOVE_PRODUCER,
    CommandType::HEARTBEAT,
    CommandType::FETCH_TOPIC_MESSAGE,
];

/// Kafka API keys the Kafka dispatcher must serve.
pub const KAFKA_COMMANDS: &[CommandType] = &[CommandType::KAFKA_ADD_PARTITIONS_TO_TXN];

pub(crate) fn ack(request: &Header, code: ResponseCode) -> Option<Command> {
    Some(Command::response_to(request, BooleanAck::new(code)))
}

/// Resolve the injected context; a dispatcher never routes to a handler
/// without one, so reaching the `None` arm is a wiring bug.
pub(crate) fn context_of<'a>(
    context: &'a Option<BrokerContext>,
    request: &Header,
) -> Result<&'a BrokerContext, Option<Command>> {
    match context {
        Some(context) => Ok(context),
        None => {
            error!(command = %request.command_type, "Handler invoked without broker context");
            Err(ack(request, ResponseCode::CnServiceNotAvailable))
        }
    }
}

/// Connection bound to `transport` that has authorized `app`.
pub(crate) fn authorized_connection(
    context: &BrokerContext,
    transport: &dyn Transport,
    app: &str,
    request: &Header,
) -> Result<Arc<Connection>, Option<Command>> {
    match context.sessions.connection_for_transport(transport.id()) {
        Some(connection) if connection.is_authorized(app) => Ok(connection),
        found => {
            warn!(
                transport = transport.id(),
                client = %transport.remote_addr(),
                command = %request.command_type,
                app,
                connection_exists = found.is_some(),
                "Connection does not exist or has not authorized app"
            );
            metrics::record_session_rejection(request.command_type.name(), "connection");
            Err(ack(request, ResponseCode::FwConnectionNotExists))
        }
    }
}

/// Validate the app and every topic of a registration request.
pub(crate) fn validate_registration(
    app: &str,
    topics: &[String],
    request: &Header,
) -> Result<(), Option<Command>> {
    if topics.is_empty() {
        return Err(ack(request, ResponseCode::CnParamError));
    }
    let checked = validate_app_name(app)
        .and_then(|_| topics.iter().try_for_each(|t| validate_topic_name(t)));
    if let Err(e) = checked {
        warn!(command = %request.command_type, app, error = %e, "Invalid registration");
        return Err(ack(request, e.to_response_code()));
    }
    Ok(())
}
