use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::ResponseCode;
use crate::metrics;
use crate::server::command::{AddConsumerResponse, Command, Payload};
use crate::server::handler::{BrokerContext, CommandHandler};
use crate::server::transport::Transport;
use crate::session::Consumer;
use crate::types::CommandType;

use super::{ack, authorized_connection, context_of, validate_registration};

/// Subscribe a connection to topics.
///
/// Every topic is checked against the cluster before any consumer is
/// registered, so a denied topic leaves the session untouched.
#[derive(Debug, Default)]
pub struct AddConsumerHandler {
    context: Option<BrokerContext>,
}

#[async_trait]
impl CommandHandler for AddConsumerHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::ADD_CONSUMER]
    }

    fn inject_context(&mut self, context: &BrokerContext) {
        self.context = Some(context.clone());
    }

    fn is_configured(&self) -> bool {
        self.context.is_some()
    }

    async fn handle(&self, transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
        let ctx = match context_of(&self.context, &command.header) {
            Ok(ctx) => ctx,
            Err(response) => return response,
        };
        let Payload::AddConsumer(request) = &command.payload else {
            return ack(&command.header, ResponseCode::CnParamError);
        };

        let connection =
            match authorized_connection(ctx, transport.as_ref(), &request.app, &command.header) {
                Ok(connection) => connection,
                Err(response) => return response,
            };
        if let Err(response) = validate_registration(&request.app, &request.topics, &command.header) {
            return response;
        }

        for topic in &request.topics {
            match ctx.cluster.try_get_consumer(topic, &request.app).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(
                        transport = transport.id(),
                        app = %request.app,
                        topic = %topic,
                        "AddConsumer denied"
                    );
                    metrics::record_session_rejection("add_consumer", "permission");
                    return ack(&command.header, ResponseCode::CnNoPermission);
                }
                Err(e) => {
                    error!(
                        transport = transport.id(),
                        app = %request.app,
                        topic = %topic,
                        error = %e,
                        "Consumer permission lookup failed"
                    );
                    return ack(&command.header, e.to_response_code());
                }
            }
        }

        let mut consumer_ids = BTreeMap::new();
        for topic in &request.topics {
            let consumer = Consumer::new(connection.id(), request.sequence, &request.app, topic);
            let id = consumer.id.clone();
            if !ctx.sessions.add_consumer(consumer) && ctx.sessions.get_consumer(&id).is_none() {
                // the connection closed while we were registering
                return ack(&command.header, ResponseCode::FwConnectionNotExists);
            }
            consumer_ids.insert(topic.clone(), id);
        }

        debug!(
            transport = transport.id(),
            connection_id = connection.id(),
            app = %request.app,
            topics = consumer_ids.len(),
            "Consumers registered"
        );
        Some(Command::response_to(
            &command.header,
            AddConsumerResponse { consumer_ids },
        ))
    }
}

/// Unsubscribe consumers owned by the transport's connection.
///
/// Unknown ids and ids owned by other connections are ignored.
#[derive(Debug, Default)]
pub struct RemoveConsumerHandler {
    context: Option<BrokerContext>,
}

#[async_trait]
impl CommandHandler for RemoveConsumerHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::REMOVE_CONSUMER]
    }

    fn inject_context(&mut self, context: &BrokerContext) {
        self.context = Some(context.clone());
    }

    fn is_configured(&self) -> bool {
        self.context.is_some()
    }

    async fn handle(&self, transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
        let ctx = match context_of(&self.context, &command.header) {
            Ok(ctx) => ctx,
            Err(response) => return response,
        };
        let Payload::RemoveConsumer(request) = &command.payload else {
            return ack(&command.header, ResponseCode::CnParamError);
        };
        let Some(connection) = ctx.sessions.connection_for_transport(transport.id()) else {
            warn!(transport = transport.id(), "RemoveConsumer without a connection");
            return ack(&command.header, ResponseCode::FwConnectionNotExists);
        };

        for consumer_id in &request.consumer_ids {
            let owned = ctx
                .sessions
                .get_consumer(consumer_id)
                .is_some_and(|c| c.connection_id == connection.id());
            if owned {
                ctx.sessions.remove_consumer(consumer_id);
            } else {
                debug!(transport = transport.id(), consumer_id = %consumer_id, "Ignoring unknown consumer");
            }
        }
        ack(&command.header, ResponseCode::Success)
    }
}
