use thiserror::Error;

use crate::error::KafkaCode;

/// Faults raised by the transaction coordinator.
///
/// These are client-visible domain faults: the handler reports
/// [`TransactionError::code`] for every requested partition instead of
/// failing the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The request is malformed (empty transactional id, negative partition,
    /// too many partitions).
    #[error("Invalid transaction request: {0}")]
    InvalidRequest(String),

    /// The request carries an epoch older than the one already observed for
    /// its producer id.
    #[error(
        "Producer fenced for transaction '{transaction_id}': current epoch {current_epoch}, request epoch {request_epoch}"
    )]
    ProducerFenced {
        transaction_id: String,
        current_epoch: i16,
        request_epoch: i16,
    },

    /// The producer id is already known and belongs to another incarnation.
    #[error(
        "Producer id {request_producer_id} is not mapped to transaction '{transaction_id}' (current producer id {current_producer_id})"
    )]
    InvalidProducerIdMapping {
        transaction_id: String,
        current_producer_id: i64,
        request_producer_id: i64,
    },

    /// The transaction cannot accept the operation in its current state.
    #[error("Invalid state for transaction '{transaction_id}': {reason}")]
    InvalidTxnState {
        transaction_id: String,
        reason: String,
    },

    /// No state is held for the transactional id.
    #[error("Unknown transactional id '{0}'")]
    UnknownTransactionalId(String),
}

impl TransactionError {
    /// Kafka wire code reported for this fault.
    pub fn code(&self) -> KafkaCode {
        match self {
            TransactionError::InvalidRequest(_) => KafkaCode::InvalidRequest,
            TransactionError::ProducerFenced { .. } => KafkaCode::InvalidProducerEpoch,
            TransactionError::InvalidProducerIdMapping { .. } => {
                KafkaCode::InvalidProducerIdMapping
            }
            TransactionError::InvalidTxnState { .. } => KafkaCode::InvalidTxnState,
            TransactionError::UnknownTransactionalId(_) => KafkaCode::TransactionalIdNotFound,
        }
    }

    /// Metrics label of the registration outcome.
    pub(crate) fn metric_label(&self) -> &'static str {
        match self {
            TransactionError::ProducerFenced { .. } => "fenced",
            _ => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let fenced = TransactionError::ProducerFenced {
            transaction_id: "txn".into(),
            current_epoch: 5,
            request_epoch: 3,
        };
        assert_eq!(fenced.code().code(), 47);
        assert_eq!(fenced.metric_label(), "fenced");

        let mapping = TransactionError::InvalidProducerIdMapping {
            transaction_id: "txn".into(),
            current_producer_id: 1,
            request_producer_id: 2,
        };
        assert_eq!(mapping.code().code(), 49);
        assert_eq!(mapping.metric_label(), "rejected");

        assert_eq!(
            TransactionError::InvalidRequest("x".into()).code(),
            KafkaCode::InvalidRequest
        );
        assert_eq!(
            TransactionError::UnknownTransactionalId("x".into()).code().code(),
            105
        );
    }

    #[test]
    fn test_display_names_transaction() {
        let err = TransactionError::ProducerFenced {
            transaction_id: "payments".into(),
            current_epoch: 5,
            request_epoch: 3,
        };
        let text = err.to_string();
        assert!(text.contains("payments"));
        assert!(text.contains("current epoch 5"));
    }
}
