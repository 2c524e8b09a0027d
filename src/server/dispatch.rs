//! Command dispatch registry.
//!
//! Construction is two-phase: handlers are registered empty, then
//! [`CommandDispatcherBuilder::build`] injects the [`BrokerContext`] into each
//! one and checks the wiring. A dispatcher that builds successfully routes
//! every configured command type in O(1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, debug_span, warn};

use super::command::{BooleanAck, Command};
use super::handler::{BrokerContext, CommandHandler};
use super::transport::Transport;
use crate::error::{Error, ResponseCode, Result};
use crate::metrics;
use crate::types::CommandType;

pub struct CommandDispatcherBuilder {
    name: &'static str,
    handlers: Vec<Box<dyn CommandHandler>>,
    required: Vec<CommandType>,
}

impl CommandDispatcherBuilder {
    /// `name` identifies the dispatcher in logs ("native", "kafka").
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
            required: Vec::new(),
        }
    }

    pub fn register<H>(mut self, handler: H) -> Self
    where
        H: CommandHandler + 'static,
    {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Command types that must have a handler for `build` to succeed.
    pub fn require(mut self, command_types: &[CommandType]) -> Self {
        self.required.extend_from_slice(command_types);
        self
    }

    /// Inject `context` and validate the registry.
    ///
    /// Fails with [`Error::Config`] when a handler is left unconfigured,
    /// declares no command type, claims a type already taken, or when a
    /// required type has no handler.
    pub fn build(self, context: &BrokerContext) -> Result<CommandDispatcher> {
        let mut routes: HashMap<CommandType, Arc<dyn CommandHandler>> = HashMap::new();

        for mut handler in self.handlers {
            handler.inject_context(context);
            let command_types = handler.command_types();

            if command_types.is_empty() {
                return Err(Error::Config(format!(
                    "{} dispatcher: handler declares no command type",
                    self.name
                )));
            }
            if !handler.is_configured() {
                return Err(Error::Config(format!(
                    "{} dispatcher: handler for {:?} is not configured",
                    self.name,
                    command_types.iter().map(|t| t.to_string()).collect::<Vec<_>>()
                )));
            }

            let handler: Arc<dyn CommandHandler> = Arc::from(handler);
            for command_type in command_types {
                if routes.insert(command_type, handler.clone()).is_some() {
                    return Err(Error::Config(format!(
                        "{} dispatcher: duplicate handler for {}",
                        self.name, command_type
                    )));
                }
            }
        }

        let mut missing: Vec<String> = self
            .required
            .iter()
            .filter(|t| !routes.contains_key(t))
            .map(|t| t.to_string())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(Error::Config(format!(
                "{} dispatcher: missing handlers for {}",
                self.name,
                missing.join(", ")
            )));
        }

        Ok(CommandDispatcher {
            name: self.name,
            routes,
        })
    }
}

/// Routes commands to their handlers.
pub struct CommandDispatcher {
    name: &'static str,
    routes: HashMap<CommandType, Arc<dyn CommandHandler>>,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.routes.keys().copied().collect();
        types.sort();
        f.debug_struct("CommandDispatcher")
            .field("name", &self.name)
            .field("command_types", &types)
            .finish()
    }
}

impl CommandDispatcher {
    pub fn builder(name: &'static str) -> CommandDispatcherBuilder {
        CommandDispatcherBuilder::new(name)
    }

    pub fn supports(&self, command_type: CommandType) -> bool {
        self.routes.contains_key(&command_type)
    }

    pub fn command_types(&self) -> Vec<CommandType> {
        let mut types: Vec<_> = self.routes.keys().copied().collect();
        types.sort();
        types
    }

    /// Run the handler for `command`.
    ///
    /// An unknown command type is answered with
    /// `BooleanAck(CnCommandUnsupported)`.
    pub async fn dispatch(&self, transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
        let start = Instant::now();
        let command_type = command.command_type();
        let request_id = uuid::Uuid::new_v4();

        let Some(handler) = self.routes.get(&command_type).cloned() else {
            warn!(
                request_id = %request_id,
                dispatcher = self.name,
                command = %command_type,
                transport = transport.id(),
                client = %transport.remote_addr(),
                "Unsupported command type"
            );
            metrics::record_command(
                command_type.name(),
                "unsupported",
                start.elapsed().as_secs_f64(),
            );
            return Some(Command::response_to(
                &command.header,
                BooleanAck::new(ResponseCode::CnCommandUnsupported),
            ));
        };

        let span = debug_span!(
            "command",
            request_id = %request_id,
            dispatcher = self.name,
            command = %command_type,
            transport = transport.id(),
        );
        let response = handler.handle(transport, command).instrument(span).await;

        let status = match &response {
            None => "parked",
            Some(r) if r.is_error() => "error",
            Some(_) => "success",
        };
        metrics::record_command(command_type.name(), status, start.elapsed().as_secs_f64());
        response
    }
}
