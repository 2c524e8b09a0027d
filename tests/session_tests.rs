//! Session registry tests: connections own their consumers and producers.

use std::net::SocketAddr;
use std::sync::{Arc, Barrier};

use broker_core::session::{Connection, Consumer, Producer, SessionManager, consumer_id};

fn addr() -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 7], 5120))
}

#[test]
fn test_connection_lookup_by_id_and_transport() {
    let sessions = SessionManager::new();
    let connection = sessions.add_connection(Connection::new("t1", addr(), "billing"));

    assert_eq!(connection.transport_id(), "t1");
    assert_eq!(connection.app(), "billing");
    assert!(!connection.id().contains('_'));

    let by_transport = sessions.connection_for_transport("t1").unwrap();
    assert!(Arc::ptr_eq(&by_transport, &connection));
    assert!(sessions.get_connection(connection.id()).is_some());
    assert!(sessions.connection_for_transport("t2").is_none());
}

#[test]
fn test_connection_ids_are_unique() {
    let sessions = SessionManager::new();
    let a = sessions.add_connection(Connection::new("t1", addr(), "billing"));
    let b = sessions.add_connection(Connection::new("t2", addr(), "billing"));
    assert_ne!(a.id(), b.id());
    assert_eq!(sessions.connection_count(), 2);
}

#[test]
fn test_authorization_is_per_app() {
    let connection = Connection::new("t1", addr(), "billing");
    assert!(connection.is_authorized("billing"));
    assert!(!connection.is_authorized("audit"));

    assert!(connection.authorize("audit"));
    assert!(!connection.authorize("audit"));
    assert_eq!(connection.authorized_apps(), vec!["audit", "billing"]);
}

#[test]
fn test_consumer_registration_is_idempotent() {
    let sessions = SessionManager::new();
    let connection = sessions.add_connection(Connection::new("t1", addr(), "billing"));

    assert!(sessions.add_consumer(Consumer::new(connection.id(), 1, "billing", "orders")));
    assert!(!sessions.add_consumer(Consumer::new(connection.id(), 1, "billing", "orders")));
    assert_eq!(sessions.consumer_count(), 1);

    let id = consumer_id(connection.id(), 1, "billing", "orders");
    let consumer = sessions.get_consumer(&id).unwrap();
    assert_eq!(consumer.topic, "orders");
    assert_eq!(consumer.connection_id, connection.id());
}

#[test]
fn test_consumer_requires_live_connection() {
    let sessions = SessionManager::new();
    assert!(!sessions.add_consumer(Consumer::new("ghost", 1, "billing", "orders")));
    assert!(!sessions.add_producer(Producer::new("ghost", 1, "billing", "orders")));
    assert_eq!(sessions.consumer_count(), 0);
    assert_eq!(sessions.producer_count(), 0);
}

#[test]
fn test_find_consumer_scoped_to_connection() {
    let sessions = SessionManager::new();
    let a = sessions.add_connection(Connection::new("t1", addr(), "billing"));
    let b = sessions.add_connection(Connection::new("t2", addr(), "billing"));

    sessions.add_consumer(Consumer::new(a.id(), 3, "billing", "orders"));
    sessions.add_consumer(Consumer::new(a.id(), 1, "billing", "orders"));

    let found = sessions.find_consumer(a.id(), "billing", "orders").unwrap();
    assert_eq!(found.id, consumer_id(a.id(), 1, "billing", "orders"));
    assert!(sessions.find_consumer(b.id(), "billing", "orders").is_none());
    assert!(sessions.find_consumer(a.id(), "billing", "refunds").is_none());
    assert_eq!(sessions.consumers_of(a.id()).len(), 2);
}

#[test]
fn test_removing_connection_cascades() {
    let sessions = SessionManager::new();
    let a = sessions.add_connection(Connection::new("t1", addr(), "billing"));
    let b = sessions.add_connection(Connection::new("t2", addr(), "billing"));

    sessions.add_consumer(Consumer::new(a.id(), 1, "billing", "orders"));
    sessions.add_producer(Producer::new(a.id(), 1, "billing", "orders"));
    sessions.add_consumer(Consumer::new(b.id(), 1, "billing", "orders"));

    let removed = sessions.remove_connection_by_transport("t1").unwrap();
    assert_eq!(removed.id(), a.id());

    assert_eq!(sessions.connection_count(), 1);
    assert_eq!(sessions.consumer_count(), 1);
    assert_eq!(sessions.producer_count(), 0);
    assert!(sessions.connection_for_transport("t1").is_none());
    assert!(sessions.remove_connection_by_transport("t1").is_none());

    sessions.remove_connection(b.id());
    assert_eq!(sessions.consumer_count(), 0);
}

#[test]
fn test_remove_consumer_and_producer() {
    let sessions = SessionManager::new();
    let connection = sessions.add_connection(Connection::new("t1", addr(), "billing"));
    sessions.add_consumer(Consumer::new(connection.id(), 1, "billing", "orders"));
    sessions.add_producer(Producer::new(connection.id(), 1, "billing", "orders"));

    let consumer = sessions
        .find_consumer(connection.id(), "billing", "orders")
        .unwrap();
    assert!(sessions.remove_consumer(&consumer.id).is_some());
    assert!(sessions.remove_consumer(&consumer.id).is_none());

    let producer = sessions
        .find_producer(connection.id(), "billing", "orders")
        .unwrap();
    assert!(sessions.remove_producer(&producer.id).is_some());
    assert!(sessions.get_producer(&producer.id).is_none());
    assert_eq!(sessions.connection_count(), 1);
}

#[test]
fn test_concurrent_registration_from_many_threads() {
    let sessions = Arc::new(SessionManager::new());
    let connection = sessions.add_connection(Connection::new("t1", addr(), "billing"));

    let handles: Vec<_> = (0..8)
        .map(|thread| {
            let sessions = sessions.clone();
            let connection_id = connection.id().to_string();
            std::thread::spawn(move || {
                let mut inserted = 0;
                for seq in 0..50 {
                    // threads overlap on even sequences
                    let seq = if seq % 2 == 0 { seq } else { seq + 1000 * (thread + 1) };
                    if sessions.add_consumer(Consumer::new(&connection_id, seq, "billing", "orders")) {
                        inserted += 1;
                    }
                }
                inserted
            })
        })
        .collect();

    let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(inserted, sessions.consumer_count());
    assert_eq!(sessions.consumer_count(), 25 + 8 * 25);
}

#[test]
fn test_registration_racing_connection_removal_leaves_no_orphans() {
    let sessions = Arc::new(SessionManager::new());

    for round in 0..2000 {
        let connection = sessions.add_connection(Connection::new(format!("t{round}"), addr(), "billing"));
        let barrier = Arc::new(Barrier::new(2));

        let register = {
            let sessions = sessions.clone();
            let barrier = barrier.clone();
            let connection_id = connection.id().to_string();
            std::thread::spawn(move || {
                barrier.wait();
                for seq in 0..20 {
                    sessions.add_consumer(Consumer::new(&connection_id, seq, "billing", "orders"));
                    sessions.add_producer(Producer::new(&connection_id, seq, "billing", "orders"));
                }
            })
        };
        let close = {
            let sessions = sessions.clone();
            let barrier = barrier.clone();
            let connection_id = connection.id().to_string();
            std::thread::spawn(move || {
                barrier.wait();
                sessions.remove_connection(&connection_id);
            })
        };
        register.join().unwrap();
        close.join().unwrap();

        assert_eq!(sessions.connection_count(), 0);
        assert_eq!(sessions.consumer_count(), 0, "orphan consumers in round {round}");
        assert_eq!(sessions.producer_count(), 0, "orphan producers in round {round}");
        assert!(
            sessions
                .get_consumer(&consumer_id(connection.id(), 0, "billing", "orders"))
                .is_none()
        );
    }
}

#[test]
fn test_concurrent_handshakes_bind_one_connection() {
    let sessions = Arc::new(SessionManager::new());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|thread| {
            let sessions = sessions.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let app = format!("app-{thread}");
                sessions.bind_or_authorize(Connection::new("t1", addr(), app))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(sessions.connection_count(), 1);
    assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
    let bound = sessions.connection_for_transport("t1").unwrap();
    for (connection, _) in &results {
        assert!(Arc::ptr_eq(connection, &bound));
    }
    for thread in 0..8 {
        assert!(bound.is_authorized(&format!("app-{thread}")));
    }
}

#[test]
fn test_bind_or_authorize_rebinds_after_connection_removed() {
    let sessions = SessionManager::new();
    let (first, created) = sessions.bind_or_authorize(Connection::new("t1", addr(), "billing"));
    assert!(created);
    sessions.remove_connection(first.id());

    let (second, created) = sessions.bind_or_authorize(Connection::new("t1", addr(), "audit"));
    assert!(created);
    assert_ne!(first.id(), second.id());
    assert!(!second.is_authorized("billing"));
    assert_eq!(sessions.connection_for_transport("t1").unwrap().id(), second.id());
}

#[test]
fn test_lookup_follows_removals_within_a_connection() {
    let sessions = SessionManager::new();
    let a = sessions.add_connection(Connection::new("t1", addr(), "billing"));
    let b = sessions.add_connection(Connection::new("t2", addr(), "billing"));
    for seq in 1..=3 {
        sessions.add_consumer(Consumer::new(a.id(), seq, "billing", "orders"));
        sessions.add_consumer(Consumer::new(b.id(), seq, "billing", "orders"));
    }

    let first = sessions.find_consumer(a.id(), "billing", "orders").unwrap();
    assert_eq!(first.id, consumer_id(a.id(), 1, "billing", "orders"));
    sessions.remove_consumer(&first.id);

    let next = sessions.find_consumer(a.id(), "billing", "orders").unwrap();
    assert_eq!(next.id, consumer_id(a.id(), 2, "billing", "orders"));
    assert_eq!(sessions.consumers_of(a.id()).len(), 2);

    sessions.remove_connection(a.id());
    assert!(sessions.find_consumer(a.id(), "billing", "orders").is_none());
    assert!(sessions.consumers_of(a.id()).is_empty());
    assert_eq!(sessions.consumers_of(b.id()).len(), 3);
    assert_eq!(sessions.consumer_count(), 3);
}
