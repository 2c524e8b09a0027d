use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::ResponseCode;
use crate::metrics;
use crate::server::command::{AddConnectionResponse, Command, Payload};
use crate::server::handler::{BrokerContext, CommandHandler};
use crate::server::transport::Transport;
use crate::session::Connection;
use crate::types::CommandType;
use crate::validation::validate_app_name;

use super::{ack, context_of};

/// Authentication handshake.
///
/// The first successful handshake on a transport creates its connection;
/// later handshakes for other apps extend the connection's authorized apps.
#[derive(Debug, Default)]
pub struct AddConnectionHandler {
    context: Option<BrokerContext>,
}

#[async_trait]
impl CommandHandler for AddConnectionHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::ADD_CONNECTION]
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
        let Payload::AddConnection(request) = &command.payload else {
            return ack(&command.header, ResponseCode::CnParamError);
        };

        if let Err(e) = validate_app_name(&request.app) {
            warn!(transport = transport.id(), app = %request.app, error = %e, "Rejected handshake");
            return ack(&command.header, e.to_response_code());
        }

        match ctx.cluster.authenticate(&request.app, &request.token).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    transport = transport.id(),
                    client = %transport.remote_addr(),
                    app = %request.app,
                    "Authentication failed"
                );
                metrics::record_session_rejection("add_connection", "authentication");
                return ack(&command.header, ResponseCode::CnAuthenticationError);
            }
            Err(e) => {
                error!(
                    transport = transport.id(),
                    app = %request.app,
                    error = %e,
                    "Authentication lookup failed"
                );
                return ack(&command.header, e.to_response_code());
            }
        }

        let handshake = Connection::new(transport.id(), transport.remote_addr(), &request.app)
            .with_client_info(request.language.clone(), request.version.clone());
        let (connection, created) = ctx.sessions.bind_or_authorize(handshake);
        if created {
            info!(
                transport = transport.id(),
                client = %transport.remote_addr(),
                connection_id = connection.id(),
                app = %request.app,
                "Handshake accepted"
            );
        }

        Some(Command::response_to(
            &command.header,
            AddConnectionResponse {
                connection_id: connection.id().to_string(),
            },
        ))
    }
}

/// Tear down the connection bound to the transport.
#[derive(Debug, Default)]
pub struct RemoveConnectionHandler {
    context: Option<BrokerContext>,
}

#[async_trait]
impl CommandHandler for RemoveConnectionHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::REMOVE_CONNECTION]
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

        let cancelled = ctx.long_polling.cancel_connection(transport.id());
        match ctx.sessions.remove_connection_by_transport(transport.id()) {
            Some(connection) => {
                info!(
                    transport = transport.id(),
                    connection_id = connection.id(),
                    cancelled_fetches = cancelled,
                    "Connection removed"
                );
                ack(&command.header, ResponseCode::Success)
            }
            None => {
                warn!(transport = transport.id(), "RemoveConnection without a connection");
                ack(&command.header, ResponseCode::FwConnectionNotExists)
            }
        }
    }
}
