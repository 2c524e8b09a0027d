//! Command surface of the broker.
//!
//! Transports decode frames into [`Command`]s and hand them to a
//! [`CommandDispatcher`], which routes each one to the [`CommandHandler`]
//! registered for its type. Two dispatchers exist: one for the native
//! protocol and one for the Kafka dialect.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use broker_core::error::ResponseCode;
//! use broker_core::server::{BooleanAck, Command, CommandHandler, Transport};
//! use broker_core::types::CommandType;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl CommandHandler for Ping {
//!     fn command_types(&self) -> Vec<CommandType> {
//!         vec![CommandType::new(900)]
//!     }
//!
//!     async fn handle(&self, _transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
//!         Some(Command::response_to(&command.header, BooleanAck::new(ResponseCode::Success)))
//!     }
//! }
//! ```

pub mod command;
mod dispatch;
mod handler;
pub mod handlers;
mod transport;

pub use command::{
    AddConnectionRequest, AddConnectionResponse, AddConsumerRequest, AddConsumerResponse,
    AddPartitionsToTxnRequest, AddPartitionsToTxnResponse, AddProducerRequest,
    AddProducerResponse, BooleanAck, Command, FetchTopicData, FetchTopicMessageAckData,
    FetchTopicMessageRequest, FetchTopicMessageResponse, Header, Payload, RemoveConsumerRequest,
    RemoveProducerRequest,
};
pub use dispatch::{CommandDispatcher, CommandDispatcherBuilder};
pub use handler::{BrokerContext, CommandHandler};
pub use transport::Transport;

#[cfg(any(test, feature = "test-utilities"))]
pub use transport::{Acknowledgement, ChannelTransport};
