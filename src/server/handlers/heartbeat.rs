use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::error::ResponseCode;
use crate::server::command::Command;
use crate::server::handler::CommandHandler;
use crate::server::transport::Transport;
use crate::types::CommandType;

use super::ack;

/// Keep-alive. Always acknowledged, never touches state.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeartbeatHandler;

#[async_trait]
impl CommandHandler for HeartbeatHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::HEARTBEAT]
    }

    async fn handle(&self, transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
        trace!(transport = transport.id(), "Heartbeat");
        ack(&command.header, ResponseCode::Success)
    }
}
