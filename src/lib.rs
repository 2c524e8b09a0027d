//! # broker-core
//! Connection-facing core of a multi-protocol message broker.
//!
//! The crate sits between a transport (which frames bytes into [`Command`]s)
//! and the log engine (a [`MessageStore`]). It owns three pieces of state:
//!
//! - the [session registry](session), mapping transports to authenticated
//!   connections and the consumers and producers they registered;
//! - the [long-polling engine](polling), which parks fetches that found no
//!   data and answers each one exactly once on data, deadline or failure;
//! - the [transaction coordinator](transaction), which serves Kafka
//!   `AddPartitionsToTxn` with producer-epoch fencing.
//!
//! Commands are routed by a [`CommandDispatcher`] built from
//! [`CommandHandler`] implementations. [`Broker`] assembles the built-in
//! handlers into one native and one Kafka dispatcher.
//!
//! ## Getting started
//! ```rust,no_run
//! use std::sync::Arc;
//! use broker_core::prelude::*;
//! use broker_core::cluster::InMemoryClusterManager;
//! use broker_core::storage::InMemoryMessageStore;
//!
//! #[tokio::main]
//! async fn main() -> broker_core::Result<()> {
//!     let broker = Broker::new(
//!         BrokerConfig::from_env(),
//!         Arc::new(InMemoryClusterManager::new().with_app("billing", "secret")),
//!         Arc::new(InMemoryMessageStore::new()),
//!         tokio::runtime::Handle::current(),
//!     )?;
//!
//!     // Feed framed commands with `broker.on_command(transport, command)` and
//!     // call `broker.on_connection_closed(id)` when a transport goes away.
//!
//!     broker.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! The in-memory collaborators above require the `test-utilities` feature.
//!
//! [`Command`]: server::Command
//! [`MessageStore`]: storage::MessageStore
//! [`CommandDispatcher`]: server::CommandDispatcher
//! [`CommandHandler`]: server::CommandHandler

#![forbid(unsafe_code)]

pub mod background_tasks;
pub mod broker;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod polling;
pub mod server;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod transaction;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use broker::Broker;
pub use error::{Error, Result};

pub mod prelude {
    //! Commonly used types.
    pub use crate::broker::Broker;
    pub use crate::cluster::ClusterManager;
    pub use crate::config::BrokerConfig;
    pub use crate::error::{Error, KafkaCode, ResponseCode, Result};
    pub use crate::server::{Command, CommandDispatcher, CommandHandler, Payload, Transport};
    pub use crate::storage::{MessageStore, PullRequest, PullResult};
    pub use crate::transaction::{TransactionCoordinator, TransactionError, TxnTopicPartitions};
    pub use crate::types::{CommandType, ProducerEpoch, ProducerId, TopicPartition};

    pub use bytes;
}
