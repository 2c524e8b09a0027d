use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::error::Error;
use crate::server::command::{AddPartitionsToTxnResponse, Command, Payload};
use crate::server::handler::{BrokerContext, CommandHandler};
use crate::server::transport::Transport;
use crate::transaction::{TransactionCoordinator, partition_errors};
use crate::types::CommandType;

/// Kafka AddPartitionsToTxn.
///
/// Always answers with every requested partition; a rejected request carries
/// the same error code on each of them.
#[derive(Debug, Default)]
pub struct AddPartitionsToTxnHandler {
    coordinator: Option<Arc<TransactionCoordinator>>,
}

#[async_trait]
impl CommandHandler for AddPartitionsToTxnHandler {
    fn command_types(&self) -> Vec<CommandType> {
        vec![CommandType::KAFKA_ADD_PARTITIONS_TO_TXN]
    }

    fn inject_context(&mut self, context: &BrokerContext) {
        self.coordinator = Some(context.coordinator.clone());
    }

    fn is_configured(&self) -> bool {
        self.coordinator.is_some()
    }

    async fn handle(&self, transport: Arc<dyn Transport>, command: Command) -> Option<Command> {
        let Payload::AddPartitionsToTxn(request) = &command.payload else {
            error!(
                transport = transport.id(),
                command = %command.command_type(),
                "AddPartitionsToTxn routed a foreign payload"
            );
            return Some(Command::response_to(
                &command.header,
                AddPartitionsToTxnResponse::default(),
            ));
        };

        let outcome = match &self.coordinator {
            Some(coordinator) => {
                coordinator
                    .handle_add_partitions_to_txn(
                        &request.client_id,
                        &request.transaction_id,
                        request.producer_id,
                        request.producer_epoch,
                        &request.topics,
                    )
                    .await
            }
            None => Err(Error::Internal("transaction coordinator not injected".into())),
        };

        let results = match outcome {
            Ok(results) => results,
            Err(Error::Transaction(e)) => {
                warn!(
                    transport = transport.id(),
                    client_id = %request.client_id,
                    transaction_id = %request.transaction_id,
                    producer_id = request.producer_id,
                    producer_epoch = request.producer_epoch,
                    error = %e,
                    "AddPartitionsToTxn rejected"
                );
                partition_errors(&request.topics, e.code())
            }
            Err(e) => {
                error!(
                    transport = transport.id(),
                    client = %transport.remote_addr(),
                    client_id = %request.client_id,
                    transaction_id = %request.transaction_id,
                    error = %e,
                    "AddPartitionsToTxn failed"
                );
                partition_errors(&request.topics, e.to_kafka_code())
            }
        };

        Some(Command::response_to(
            &command.header,
            AddPartitionsToTxnResponse {
                throttle_time_ms: 0,
                results,
            },
        ))
    }
}
