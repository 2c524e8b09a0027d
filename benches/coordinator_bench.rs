//! Criterion micro-benchmarks for the broker core hot paths.
//!
//! - AddPartitionsToTxn on a warm transaction, by request size
//! - AddPartitionsToTxn across many distinct transactions
//! - Consumer lookup in the session registry
//!
//! Run with: `cargo bench --bench coordinator_bench`

use std::net::SocketAddr;
use std::time::Duration;

use broker_core::session::{Connection, Consumer, SessionManager};
use broker_core::transaction::{TransactionCoordinator, TxnTopicPartitions};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

fn request(partitions: i32) -> Vec<TxnTopicPartitions> {
    vec![TxnTopicPartitions::new("orders", (0..partitions).collect())]
}

fn bench_add_partitions_warm(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("add_partitions_warm");

    for size in [1, 16, 256].iter() {
        let coordinator = TransactionCoordinator::new(1000, Duration::from_secs(900));
        let topics = request(*size);
        runtime
            .block_on(coordinator.handle_add_partitions_to_txn("c1", "txn-A", 1, 0, &topics))
            .unwrap();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.to_async(&runtime).iter(|| async {
                coordinator
                    .handle_add_partitions_to_txn("c1", "txn-A", 1, 0, black_box(&topics))
                    .await
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_add_partitions_spread(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let coordinator = TransactionCoordinator::new(1000, Duration::from_secs(900));
    let topics = request(4);
    let ids: Vec<String> = (0..1024).map(|i| format!("txn-{i}")).collect();
    let ids = &ids;
    let mut next = 0usize;

    c.bench_function("add_partitions_spread", |b| {
        b.to_async(&runtime).iter(|| {
            let id = ids[next % ids.len()].as_str();
            let pid = (next % ids.len()) as i64;
            next += 1;
            let coordinator = &coordinator;
            let topics = &topics;
            async move {
                coordinator
                    .handle_add_partitions_to_txn("c1", id, pid, 0, topics)
                    .await
                    .unwrap()
            }
        });
    });
}

fn bench_find_consumer(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_consumer");
    let addr = SocketAddr::from(([127, 0, 0, 1], 5000));

    for consumers in [10, 1_000].iter() {
        let sessions = SessionManager::new();
        let connection = sessions.add_connection(Connection::new("t0", addr, "billing"));
        for i in 0..*consumers {
            sessions.add_consumer(Consumer::new(
                connection.id(),
                1,
                "billing",
                &format!("topic-{i}"),
            ));
        }

        group.bench_with_input(BenchmarkId::from_parameter(consumers), consumers, |b, _| {
            b.iter(|| sessions.find_consumer(black_box(connection.id()), "billing", "topic-5"));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_add_partitions_warm,
    bench_add_partitions_spread,
    bench_find_consumer
);
criterion_main!(benches);
