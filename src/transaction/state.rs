use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::types::{ProducerEpoch, ProducerId, TopicPartition};

/// Coordinator-side view of one open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionMetadata {
    pub transaction_id: String,
    /// Client id of the last request that touched the transaction.
    pub client_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    /// Enlisted partitions. Grows by union; reset only by a new incarnation.
    pub partitions: BTreeSet<TopicPartition>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl TransactionMetadata {
    pub fn new(
        transaction_id: impl Into<String>,
        client_id: impl Into<String>,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: transaction_id.into(),
            client_id: client_id.into(),
            producer_id,
            producer_epoch,
            partitions: BTreeSet::new(),
            created_at: now,
            last_update: now,
        }
    }

    /// Start a new producer incarnation: adopt id and epoch, drop enlistments.
    pub(crate) fn reset(&mut self, producer_id: ProducerId, producer_epoch: ProducerEpoch) {
        self.producer_id = producer_id;
        self.producer_epoch = producer_epoch;
        self.partitions.clear();
    }

    /// Union `partitions` into the enlisted set. Returns how many were new.
    pub(crate) fn enlist<I>(&mut self, partitions: I) -> usize
    where
        I: IntoIterator<Item = TopicPartition>,
    {
        partitions
            .into_iter()
            .filter(|tp| self.partitions.insert(tp.clone()))
            .count()
    }

    pub(crate) fn touch(&mut self, client_id: &str) {
        if self.client_id != client_id {
            self.client_id = client_id.to_string();
        }
        self.last_update = Utc::now();
    }

    /// Whether the transaction has been idle for at least `timeout` at `now`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_update) >= timeout
    }

    pub fn contains(&self, topic: &str, partition: i32) -> bool {
        self.partitions.contains(&TopicPartition::new(topic, partition))
    }
}
