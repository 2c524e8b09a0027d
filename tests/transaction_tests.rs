//! Transaction coordinator scenarios exercised through the public API.

use std::sync::Arc;
use std::time::Duration;

use broker_core::error::{Error, KafkaCode};
use broker_core::transaction::{TransactionCoordinator, TransactionError, TxnTopicPartitions};
use chrono::Utc;

fn coordinator() -> TransactionCoordinator {
    TransactionCoordinator::new(1000, Duration::from_secs(60))
}

fn topics(layout: &[(&str, &[i32])]) -> Vec<TxnTopicPartitions> {
    layout.iter()
        .map(|(topic, partitions)| TxnTopicPartitions::new(*topic, partitions.to_vec()))
        .collect()
}

fn txn_error(result: broker_core::Result<impl std::fmt::Debug>) -> TransactionError {
    match result {
        Err(Error::Transaction(e)) => e,
        other => panic!("expected transaction error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_partitions_accumulate_across_requests() {
    let coordinator = coordinator();

    let first = coordinator
        .handle_add_partitions_to_txn("c1", "txn-A", 1000, 5, &topics(&[("orders", &[0, 1])]))
        .await
        .unwrap();
    assert_eq!(first["orders"].len(), 2);

    coordinator
        .handle_add_partitions_to_txn(
            "c1",
            "txn-A",
            1000,
            5,
            &topics(&[("orders", &[1, 2]), ("refunds", &[0])]),
        )
        .await
        .unwrap();

    let txn = coordinator.transaction("txn-A").await.unwrap();
    assert_eq!(txn.partitions.len(), 4);
    assert!(txn.contains("orders", 2));
    assert!(txn.contains("refunds", 0));
    assert_eq!(txn.client_id, "c1");
}

#[tokio::test]
async fn test_stale_epoch_fenced_without_side_effects() {
    let coordinator = coordinator();
    coordinator
        .handle_add_partitions_to_txn("c1", "txn-A", 1000, 5, &topics(&[("orders", &[0])]))
        .await
        .unwrap();

    let error = txn_error(
        coordinator
            .handle_add_partitions_to_txn("c1", "txn-A", 1000, 3, &topics(&[("orders", &[9])]))
            .await,
    );
    assert_eq!(error.code(), KafkaCode::InvalidProducerEpoch);

    let txn = coordinator.transaction("txn-A").await.unwrap();
    assert_eq!(txn.partitions.len(), 1);
    assert_eq!(txn.producer_epoch.0, 5);
}

#[tokio::test]
async fn test_stale_epoch_fenced_on_other_transaction_of_same_producer() {
    let coordinator = coordinator();
    coordinator
        .handle_add_partitions_to_txn("c1", "txn-A", 1000, 5, &topics(&[("orders", &[0])]))
        .await
        .unwrap();

    let error = txn_error(
        coordinator
            .handle_add_partitions_to_txn("c1", "txn-B", 1000, 4, &topics(&[("orders", &[0])]))
            .await,
    );
    assert!(matches!(error, TransactionError::ProducerFenced { current_epoch: 5, .. }));
    assert!(coordinator.transaction("txn-B").await.is_none());
    assert_eq!(coordinator.active_transactions(), 1);
}

#[tokio::test]
async fn test_epoch_bump_starts_fresh_transaction() {
    let coordinator = coordinator();
    coordinator
        .handle_add_partitions_to_txn("c1", "txn-A", 1000, 5, &topics(&[("orders", &[0, 1])]))
        .await
        .unwrap();
    coordinator
        .handle_add_partitions_to_txn("c2", "txn-A", 1000, 6, &topics(&[("refunds", &[3])]))
        .await
        .unwrap();

    let txn = coordinator.transaction("txn-A").await.unwrap();
    assert_eq!(txn.producer_epoch.0, 6);
    assert_eq!(txn.partitions.len(), 1);
    assert!(txn.contains("refunds", 3));
    assert_eq!(coordinator.producer_epoch(1000), Some(6));
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let coordinator = TransactionCoordinator::new(3, Duration::from_secs(60));

    let cases = vec![
        ("", 1, 0, topics(&[("orders", &[0])])),
        ("txn-A", -1, 0, topics(&[("orders", &[0])])),
        ("txn-A", 1, -1, topics(&[("orders", &[0])])),
        ("txn-A", 1, 0, topics(&[("orders", &[-2])])),
        ("txn-A", 1, 0, topics(&[("", &[0])])),
        ("txn-A", 1, 0, topics(&[("orders", &[0, 1]), ("refunds", &[0, 1])])),
    ];

    for (txn, pid, epoch, request) in cases {
        let error = txn_error(
            coordinator
                .handle_add_partitions_to_txn("c1", txn, pid, epoch, &request)
                .await,
        );
        assert_eq!(error.code(), KafkaCode::InvalidRequest, "case {txn:?} {pid} {epoch}");
    }
    assert_eq!(coordinator.active_transactions(), 0);
}

#[tokio::test]
async fn test_complete_then_reuse_transaction_id() {
    let coordinator = coordinator();
    coordinator
        .handle_add_partitions_to_txn("c1", "txn-A", 1000, 5, &topics(&[("orders", &[0])]))
        .await
        .unwrap();

    let finished = coordinator.complete_transaction("txn-A", 1000, 5).await.unwrap();
    assert_eq!(finished.partitions.len(), 1);
    assert!(coordinator.transaction("txn-A").await.is_none());

    let error = txn_error(coordinator.complete_transaction("txn-A", 1000, 5).await);
    assert!(matches!(error, TransactionError::UnknownTransactionalId(_)));

    // the epoch high-water survives completion
    let error = txn_error(
        coordinator
            .handle_add_partitions_to_txn("c1", "txn-A", 1000, 4, &topics(&[("orders", &[0])]))
            .await,
    );
    assert_eq!(error.code(), KafkaCode::InvalidProducerEpoch);

    coordinator
        .handle_add_partitions_to_txn("c1", "txn-A", 1000, 5, &topics(&[("orders", &[7])]))
        .await
        .unwrap();
    let txn = coordinator.transaction("txn-A").await.unwrap();
    assert!(txn.contains("orders", 7));
    assert!(!txn.contains("orders", 0));
}

#[tokio::test]
async fn test_idle_transactions_expire() {
    let coordinator = coordinator();
    coordinator
        .handle_add_partitions_to_txn("c1", "txn-A", 1000, 0, &topics(&[("orders", &[0])]))
        .await
        .unwrap();

    assert_eq!(coordinator.expire_idle_transactions(Utc::now()), 0);
    let later = Utc::now() + chrono::Duration::seconds(61);
    assert_eq!(coordinator.expire_idle_transactions(later), 1);
    assert_eq!(coordinator.active_transactions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_keeps_union() {
    let coordinator = Arc::new(coordinator());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .handle_add_partitions_to_txn(
                        "c1",
                        "txn-A",
                        1000,
                        2,
                        &[TxnTopicPartitions::new("orders", vec![i, i + 16])],
                    )
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let txn = coordinator.transaction("txn-A").await.unwrap();
    assert_eq!(txn.partitions.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_epochs_never_regress() {
    let coordinator = Arc::new(coordinator());

    let tasks: Vec<_> = (0..10i16)
        .map(|epoch| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .handle_add_partitions_to_txn(
                        "c1",
                        "txn-A",
                        1000,
                        epoch,
                        &[TxnTopicPartitions::new("orders", vec![epoch as i32])],
                    )
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        if task.await.unwrap() {
            accepted += 1;
        }
    }
    assert!(accepted >= 1);

    let txn = coordinator.transaction("txn-A").await.unwrap();
    assert_eq!(coordinator.producer_epoch(1000), Some(txn.producer_epoch.0));
    // only partitions enlisted at the surviving epoch remain
    assert_eq!(txn.partitions.len(), 1);
    assert!(txn.contains("orders", txn.producer_epoch.0 as i32));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_epochs_across_transaction_ids_share_one_fence() {
    for _ in 0..100 {
        let coordinator = Arc::new(coordinator());
        let tasks: Vec<_> = (0..8i16)
            .map(|epoch| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    let accepted = coordinator
                        .handle_add_partitions_to_txn(
                            "c1",
                            &format!("txn-{epoch}"),
                            1000,
                            epoch,
                            &topics(&[("orders", &[0])]),
                        )
                        .await
                        .is_ok();
                    (epoch, accepted)
                })
            })
            .collect();

        let mut accepted = Vec::new();
        for task in tasks {
            let (epoch, ok) = task.await.unwrap();
            if ok {
                accepted.push(epoch);
            }
        }

        // the highest epoch can never be fenced
        assert!(accepted.contains(&7));
        assert_eq!(coordinator.producer_epoch(1000), Some(7));

        // once the high-water is recorded, every lower epoch is refused on any id
        for epoch in 0..7i16 {
            let error = txn_error(
                coordinator
                    .handle_add_partitions_to_txn(
                        "c1",
                        &format!("txn-late-{epoch}"),
                        1000,
                        epoch,
                        &topics(&[("orders", &[1])]),
                    )
                    .await,
            );
            assert!(matches!(error, TransactionError::ProducerFenced { current_epoch: 7, .. }));
        }
        assert_eq!(coordinator.producer_epoch(1000), Some(7));
    }
}
