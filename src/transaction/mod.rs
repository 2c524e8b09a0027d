//! Transaction coordinator.
//!
//! Tracks, per transactional id, which partitions an open transaction has
//! enlisted, and fences zombie producers by epoch.

mod coordinator;
mod error;
mod state;

pub use coordinator::{AddPartitionsResult, TransactionCoordinator};
pub use error::TransactionError;
pub use state::TransactionMetadata;

use crate::error::KafkaCode;

/// Partitions of one topic in an AddPartitionsToTxn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnTopicPartitions {
    pub topic: String,
    pub partitions: Vec<i32>,
}

impl TxnTopicPartitions {
    pub fn new(topic: impl Into<String>, partitions: Vec<i32>) -> Self {
        Self {
            topic: topic.into(),
            partitions,
        }
    }
}

/// Per-partition result of an AddPartitionsToTxn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMetadataAndError {
    pub partition_index: i32,
    pub error_code: KafkaCode,
}

impl PartitionMetadataAndError {
    pub fn new(partition_index: i32, error_code: KafkaCode) -> Self {
        Self {
            partition_index,
            error_code,
        }
    }

    /// Successful registration.
    pub fn none(partition_index: i32) -> Self {
        Self::new(partition_index, KafkaCode::None)
    }
}

/// Report `code` for every requested partition, grouped by topic.
pub fn partition_errors(topics: &[TxnTopicPartitions], code: KafkaCode) -> AddPartitionsResult {
    let mut result = AddPartitionsResult::new();
    for topic in topics {
        result
            .entry(topic.topic.clone())
            .or_default()
            .extend(
                topic
                    .partitions
                    .iter()
                    .map(|&p| PartitionMetadataAndError::new(p, code)),
            );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_errors_cover_every_partition() {
        let topics = vec![
            TxnTopicPartitions::new("orders", vec![0, 1]),
            TxnTopicPartitions::new("payments", vec![4]),
        ];
        let result = partition_errors(&topics, KafkaCode::InvalidProducerEpoch);

        assert_eq!(result.len(), 2);
        assert_eq!(result["orders"].len(), 2);
        assert!(
            result
                .values()
                .flatten()
                .all(|p| p.error_code == KafkaCode::InvalidProducerEpoch)
        );
    }
}
