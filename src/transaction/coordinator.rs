//! Per-transaction-id registration of partitions with producer-epoch fencing.
//!
//! Every transaction id owns a slot guarded by a `tokio::sync::Mutex`. The
//! slot map is a `DashMap`, so different ids never wait on each other and the
//! check-then-mutate sequence for one id is serialized by its slot lock.
//!
//! The producer-id high-water epoch spans transaction ids; its map entry is
//! held for the whole check and update so that two ids sharing a producer
//! id never accept an epoch below one already recorded.
//!
//! A slot removed from the map (completion, expiry, or a failed first request)
//! is marked `retired` under its lock. A request that cloned the slot before
//! the removal sees the mark and retries against a fresh slot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::{
    PartitionMetadataAndError, TransactionError, TransactionMetadata, TxnTopicPartitions,
    partition_errors,
};
use crate::config::BrokerConfig;
use crate::error::{KafkaCode, Result};
use crate::metrics;
use crate::types::{ProducerEpoch, ProducerId, TopicPartition};
use crate::validation::{validate_topic_name, validate_transaction_id};

type Slot = Arc<Mutex<SlotState>>;

#[derive(Debug, Default)]
struct SlotState {
    metadata: Option<TransactionMetadata>,
    retired: bool,
}

/// Response body of a successful AddPartitionsToTxn: topic to partitions.
pub type AddPartitionsResult = BTreeMap<String, Vec<PartitionMetadataAndError>>;

#[derive(Debug)]
pub struct TransactionCoordinator {
    transactions: DashMap<String, Slot>,
    /// Highest epoch ever observed per producer id. Never evicted.
    producer_epochs: DashMap<i64, i16>,
    max_partitions_per_request: usize,
    idle_timeout: Duration,
}

impl TransactionCoordinator {
    pub fn new(max_partitions_per_request: usize, idle_timeout: Duration) -> Self {
        Self {
            transactions: DashMap::new(),
            producer_epochs: DashMap::new(),
            max_partitions_per_request,
            idle_timeout,
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(
            config.max_partitions_per_txn_request,
            config.transaction_idle_timeout,
        )
    }

    /// Enlist partitions in a transaction.
    ///
    /// On success every requested partition is reported with
    /// [`KafkaCode::None`](crate::error::KafkaCode::None), grouped by topic.
    /// On a [`TransactionError`] nothing is registered.
    pub async fn handle_add_partitions_to_txn(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        topics: &[TxnTopicPartitions],
    ) -> Result<AddPartitionsResult> {
        let outcome = self
            .add_partitions(client_id, transaction_id, producer_id, producer_epoch, topics)
            .await;

        match &outcome {
            Ok(_) => metrics::record_txn_registration("success"),
            Err(e) => metrics::record_txn_registration(e.metric_label()),
        }
        metrics::set_active_transactions(self.active_transactions());

        Ok(outcome?)
    }

    async fn add_partitions(
        &self,
        client_id: &str,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        topics: &[TxnTopicPartitions],
    ) -> std::result::Result<AddPartitionsResult, TransactionError> {
        let requested = self.validate_request(transaction_id, producer_id, producer_epoch, topics)?;

        let Some((slot, mut guard)) = self.lock_slot(transaction_id, true).await else {
            return Err(TransactionError::UnknownTransactionalId(
                transaction_id.to_string(),
            ));
        };

        let result = self.apply(
            &mut guard,
            client_id,
            transaction_id,
            ProducerId(producer_id),
            ProducerEpoch(producer_epoch),
            requested,
        );

        if result.is_err() && guard.metadata.is_none() {
            self.retire(transaction_id, &slot, &mut guard);
        }
        result?;

        Ok(partition_errors(topics, KafkaCode::None))
    }

    fn validate_request(
        &self,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
        topics: &[TxnTopicPartitions],
    ) -> std::result::Result<Vec<TopicPartition>, TransactionError> {
        validate_transaction_id(transaction_id)
            .map_err(|e| TransactionError::InvalidRequest(e.to_string()))?;

        if producer_id < 0 || producer_epoch < 0 {
            return Err(TransactionError::InvalidRequest(format!(
                "producer id {} and epoch {} must be non-negative",
                producer_id, producer_epoch
            )));
        }

        let total: usize = topics.iter().map(|t| t.partitions.len()).sum();
        if total > self.max_partitions_per_request {
            return Err(TransactionError::InvalidRequest(format!(
                "{} partitions requested, at most {} allowed per request",
                total, self.max_partitions_per_request
            )));
        }

        let mut requested = Vec::with_capacity(total);
        for topic in topics {
            validate_topic_name(&topic.topic)
                .map_err(|e| TransactionError::InvalidRequest(e.to_string()))?;
            for &partition in &topic.partitions {
                if partition < 0 {
                    return Err(TransactionError::InvalidRequest(format!(
                        "invalid partition {} for topic '{}'",
                        partition, topic.topic
                    )));
                }
                requested.push(TopicPartition::new(topic.topic.as_str(), partition));
            }
        }
        Ok(requested)
    }

    fn apply(
        &self,
        slot: &mut SlotState,
        client_id: &str,
        transaction_id: &str,
        producer_id: ProducerId,
        producer_epoch: ProducerEpoch,
        requested: Vec<TopicPartition>,
    ) -> std::result::Result<(), TransactionError> {
        // Held until the request is decided: the fence check and the raise are
        // one step for every transaction id sharing this producer id.
        let high_water = self.producer_epochs.entry(producer_id.0);
        let observed = match &high_water {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(_) => None,
        };
        if let Some(current) = observed {
            if current > producer_epoch.0 {
                return Err(TransactionError::ProducerFenced {
                    transaction_id: transaction_id.to_string(),
                    current_epoch: current,
                    request_epoch: producer_epoch.0,
                });
            }
        }

        let metadata = slot.metadata.get_or_insert_with(|| {
            TransactionMetadata::new(transaction_id, client_id, producer_id, producer_epoch)
        });

        if metadata.producer_id == producer_id {
            if producer_epoch < metadata.producer_epoch {
                return Err(TransactionError::ProducerFenced {
                    transaction_id: transaction_id.to_string(),
                    current_epoch: metadata.producer_epoch.0,
                    request_epoch: producer_epoch.0,
                });
            }
            if producer_epoch > metadata.producer_epoch {
                info!(
                    transaction_id,
                    producer_id = producer_id.0,
                    old_epoch = metadata.producer_epoch.0,
                    new_epoch = producer_epoch.0,
                    dropped_partitions = metadata.partitions.len(),
                    "Producer epoch bumped, resetting enlisted partitions"
                );
                metadata.reset(producer_id, producer_epoch);
            }
        } else if observed.is_some() {
            return Err(TransactionError::InvalidProducerIdMapping {
                transaction_id: transaction_id.to_string(),
                current_producer_id: metadata.producer_id.0,
                request_producer_id: producer_id.0,
            });
        } else {
            info!(
                transaction_id,
                old_producer_id = metadata.producer_id.0,
                new_producer_id = producer_id.0,
                epoch = producer_epoch.0,
                "New producer incarnation, resetting enlisted partitions"
            );
            metadata.reset(producer_id, producer_epoch);
        }

        let added = metadata.enlist(requested);
        metadata.touch(client_id);

        match high_water {
            Entry::Occupied(mut entry) => {
                if *entry.get() < producer_epoch.0 {
                    entry.insert(producer_epoch.0);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(producer_epoch.0);
            }
        }

        debug!(
            transaction_id,
            producer_id = producer_id.0,
            epoch = producer_epoch.0,
            added,
            enlisted = metadata.partitions.len(),
            "Partitions added to transaction"
        );
        Ok(())
    }

    /// Terminate a transaction after an external commit or abort.
    ///
    /// Applies the same fencing as registration and returns the final state.
    pub async fn complete_transaction(
        &self,
        transaction_id: &str,
        producer_id: i64,
        producer_epoch: i16,
    ) -> Result<TransactionMetadata> {
        let unknown = || TransactionError::UnknownTransactionalId(transaction_id.to_string());

        let Some((slot, mut guard)) = self.lock_slot(transaction_id, false).await else {
            return Err(unknown().into());
        };
        let Some(metadata) = guard.metadata.as_ref() else {
            return Err(unknown().into());
        };

        if metadata.producer_id.0 != producer_id {
            return Err(TransactionError::InvalidProducerIdMapping {
                transaction_id: transaction_id.to_string(),
                current_producer_id: metadata.producer_id.0,
                request_producer_id: producer_id,
            }
            .into());
        }
        if producer_epoch < metadata.producer_epoch.0 {
            return Err(TransactionError::ProducerFenced {
                transaction_id: transaction_id.to_string(),
                current_epoch: metadata.producer_epoch.0,
                request_epoch: producer_epoch,
            }
            .into());
        }
        if producer_epoch > metadata.producer_epoch.0 {
            return Err(TransactionError::InvalidTxnState {
                transaction_id: transaction_id.to_string(),
                reason: format!(
                    "epoch {} has no enlisted partitions (current epoch {})",
                    producer_epoch, metadata.producer_epoch.0
                ),
            }
            .into());
        }

        let finished = self.retire(transaction_id, &slot, &mut guard);
        metrics::set_active_transactions(self.active_transactions());
        let finished = finished.ok_or_else(unknown)?;

        info!(
            transaction_id,
            producer_id,
            epoch = producer_epoch,
            partitions = finished.partitions.len(),
            "Transaction completed"
        );
        Ok(finished)
    }

    /// Drop transactions idle for at least the configured timeout at `now`.
    ///
    /// Slots locked by an in-flight request are skipped; they are not idle.
    pub fn expire_idle_transactions(&self, now: DateTime<Utc>) -> usize {
        let Ok(timeout) = chrono::Duration::from_std(self.idle_timeout) else {
            return 0;
        };

        let candidates: Vec<(String, Slot)> = self
            .transactions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut expired = 0;
        for (transaction_id, slot) in candidates {
            let Ok(mut guard) = slot.clone().try_lock_owned() else {
                continue;
            };
            let idle = guard
                .metadata
                .as_ref()
                .is_some_and(|m| m.is_idle(now, timeout));
            if !idle {
                continue;
            }
            if let Some(metadata) = self.retire(&transaction_id, &slot, &mut guard) {
                info!(
                    transaction_id = %transaction_id,
                    producer_id = metadata.producer_id.0,
                    epoch = metadata.producer_epoch.0,
                    partitions = metadata.partitions.len(),
                    "Expiring idle transaction"
                );
                expired += 1;
            }
        }

        if expired > 0 {
            metrics::record_expired_transactions(expired);
        }
        metrics::set_active_transactions(self.active_transactions());
        expired
    }

    /// Snapshot of a transaction's state.
    pub async fn transaction(&self, transaction_id: &str) -> Option<TransactionMetadata> {
        let (_, guard) = self.lock_slot(transaction_id, false).await?;
        guard.metadata.clone()
    }

    /// Number of transaction ids with a live slot, including ones whose first
    /// request is still in flight.
    pub fn active_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// Highest epoch observed for `producer_id`.
    pub fn producer_epoch(&self, producer_id: i64) -> Option<i16> {
        self.producer_epochs.get(&producer_id).map(|e| *e)
    }

    async fn lock_slot(
        &self,
        transaction_id: &str,
        create: bool,
    ) -> Option<(Slot, OwnedMutexGuard<SlotState>)> {
        loop {
            let slot = if create {
                self.transactions
                    .entry(transaction_id.to_string())
                    .or_default()
                    .clone()
            } else {
                self.transactions.get(transaction_id)?.clone()
            };
            let guard = slot.clone().lock_owned().await;
            if guard.retired {
                continue;
            }
            return Some((slot, guard));
        }
    }

    /// Remove `slot` from the map. Caller holds the slot lock.
    fn retire(
        &self,
        transaction_id: &str,
        slot: &Slot,
        guard: &mut SlotState,
    ) -> Option<TransactionMetadata> {
        guard.retired = true;
        self.transactions
            .remove_if(transaction_id, |_, current| Arc::ptr_eq(current, slot));
        guard.metadata.take()
    }
}
