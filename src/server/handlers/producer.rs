use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::error::ResponseCode;
use crate::metrics;
use crate::server::command::{AddProducerResponse, Command, Payload};
use crate::server::handler::{BrokerContext, CommandHandler};
use crate::server::transport::Transport;
use crate::session::Producer;
use crate::types::CommandType;

use super::{ack, authorized_connection, context_of, validate_registration};

/// Register a connection as producer on topics. All-or-nothing like
/// [`AddConsumerHandler`](super::AddConsumerHandler).
#[derive(Debug, Default)]
pub struct AddProducerHandler {
    context: Option<BrokerContext>,
}

#[async_trait]
impl CommandHandler for AddProducerHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::ADD_PRODUCER]
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
        let Payload::AddProducer(request) = &command.payload else {
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
            match ctx.cluster.try_get_producer(topic, &request.app).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(
                        transport = transport.id(),
                        app = %request.app,
                        topic = %topic,
                        "AddProducer denied"
                    );
                    metrics::record_session_rejection("add_producer", "permission");
                    return ack(&command.header, ResponseCode::CnNoPermission);
                }
                Err(e) => {
                    error!(
                        transport = transport.id(),
                        app = %request.app,
                        topic = %topic,
                        error = %e,
                        "Producer permission lookup failed"
                    );
                    return ack(&command.header, e.to_response_code());
                }
            }
        }

        let mut producer_ids = BTreeMap::new();
        for topic in &request.topics {
            let producer = Producer::new(connection.id(), request.sequence, &request.app, topic);
            let id = producer.id.clone();
            if !ctx.sessions.add_producer(producer) && ctx.sessions.get_producer(&id).is_none() {
                return ack(&command.header, ResponseCode::FwConnectionNotExists);
            }
            producer_ids.insert(topic.clone(), id);
        }

        debug!(
            transport = transport.id(),
            connection_id = connection.id(),
            app = %request.app,
            topics = producer_ids.len(),
            "Producers registered"
        );
        Some(Command::response_to(
            &command.header,
            AddProducerResponse { producer_ids },
        ))
    }
}

/// Unregister producers owned by the transport's connection.
#[derive(Debug, Default)]
pub struct RemoveProducerHandler {
    context: Option<BrokerContext>,
}

#[async_trait]
impl CommandHandler for RemoveProducerHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::REMOVE_PRODUCER]
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
        let Payload::RemoveProducer(request) = &command.payload else {
            return ack(&command.header, ResponseCode::CnParamError);
        };
        let Some(connection) = ctx.sessions.connection_for_transport(transport.id()) else {
            warn!(transport = transport.id(), "RemoveProducer without a connection");
            return ack(&command.header, ResponseCode::FwConnectionNotExists);
        };

        for producer_id in &request.producer_ids {
            let owned = ctx
                .sessions
                .get_producer(producer_id)
                .is_some_and(|p| p.connection_id == connection.id());
            if owned {
                ctx.sessions.remove_producer(producer_id);
            }
        }
        ack(&command.header, ResponseCode::Success)
    }
}
