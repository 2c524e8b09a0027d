//! Session & consumer registry.
//!
//! Tracks which connections are open, which applications each one has
//! authenticated, and the consumers and producers attached through them.
//! All maps are sharded [`DashMap`]s; no operation holds a lock across an
//! await point.
//!
//! Ownership: every connection entry indexes the consumers and producers
//! registered through it, keyed by `(app, topic)`. Removing a connection
//! removes exactly the ids in its index.
//!
//! Lock order is transports, then connections, then consumers/producers.
//! Registering a consumer or producer holds the owning connection's shard
//! for the whole insert, so it never interleaves with that connection's
//! removal.

mod connection;
mod consumer;

pub use connection::Connection;
pub use consumer::{ConsumeType, Consumer, Producer, consumer_id, producer_id};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use crate::metrics;

/// Registry of connections, consumers and producers.
#[derive(Debug, Default)]
pub struct SessionManager {
    connections: DashMap<String, ConnectionEntry>,
    /// transport id -> connection id
    transports: DashMap<String, String>,
    consumers: DashMap<String, Arc<Consumer>>,
    producers: DashMap<String, Arc<Producer>>,
}

#[derive(Debug)]
struct ConnectionEntry {
    connection: Arc<Connection>,
    consumers: OwnedIds,
    producers: OwnedIds,
}

impl ConnectionEntry {
    fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            consumers: OwnedIds::default(),
            producers: OwnedIds::default(),
        }
    }
}

/// (app, topic) -> ids, ordered so the smallest id comes first.
#[derive(Debug, Default)]
struct OwnedIds(HashMap<(String, String), BTreeSet<String>>);

impl OwnedIds {
    fn insert(&mut self, app: &str, topic: &str, id: &str) {
        self.0
            .entry((app.to_string(), topic.to_string()))
            .or_default()
            .insert(id.to_string());
    }

    fn remove(&mut self, app: &str, topic: &str, id: &str) {
        let key = (app.to_string(), topic.to_string());
        if let Some(ids) = self.0.get_mut(&key) {
            ids.remove(id);
            if ids.is_empty() {
                self.0.remove(&key);
            }
        }
    }

    fn first(&self, app: &str, topic: &str) -> Option<&String> {
        self.0.get(&(app.to_string(), topic.to_string()))?.first()
    }

    fn ids(&self) -> impl Iterator<Item = &String> {
        self.0.values().flatten()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and bind it to its transport.
    ///
    /// A transport carries at most one connection; registering a second one
    /// replaces the binding and removes the previous connection.
    pub fn add_connection(&self, connection: Connection) -> Arc<Connection> {
        let connection = Arc::new(connection);
        self.connections.insert(
            connection.id().to_string(),
            ConnectionEntry::new(connection.clone()),
        );
        let previous = self.transports.insert(
            connection.transport_id().to_string(),
            connection.id().to_string(),
        );

        if let Some(previous) = previous {
            self.remove_connection_entries(&previous);
        }

        info!(
            connection_id = connection.id(),
            transport = connection.transport_id(),
            app = connection.app(),
            address = %connection.address(),
            "Connection added"
        );
        self.publish_counts();
        connection
    }

    /// Handshake on a transport: reuse the connection already bound to it, or
    /// register `connection` when there is none.
    ///
    /// An existing connection gains `connection.app()` as an authorized app.
    /// Returns the connection now bound to the transport and whether it was
    /// created by this call. Concurrent handshakes on one transport all land
    /// on the same connection.
    pub fn bind_or_authorize(&self, connection: Connection) -> (Arc<Connection>, bool) {
        let bound = match self.transports.entry(connection.transport_id().to_string()) {
            Entry::Occupied(mut binding) => {
                let existing = self.get_connection(binding.get());
                if let Some(existing) = existing {
                    existing.authorize(connection.app());
                    debug!(
                        connection_id = existing.id(),
                        app = connection.app(),
                        "Application authorized on connection"
                    );
                    return (existing, false);
                }
                // binding outlived its connection
                let connection = Arc::new(connection);
                self.connections.insert(
                    connection.id().to_string(),
                    ConnectionEntry::new(connection.clone()),
                );
                binding.insert(connection.id().to_string());
                connection
            }
            Entry::Vacant(binding) => {
                let connection = Arc::new(connection);
                self.connections.insert(
                    connection.id().to_string(),
                    ConnectionEntry::new(connection.clone()),
                );
                binding.insert(connection.id().to_string());
                connection
            }
        };

        info!(
            connection_id = bound.id(),
            transport = bound.transport_id(),
            app = bound.app(),
            address = %bound.address(),
            "Connection added"
        );
        self.publish_counts();
        (bound, true)
    }

    /// Remove a connection with every consumer and producer it owns.
    pub fn remove_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        let removed = self.remove_connection_entries(connection_id)?;
        self.transports
            .remove_if(removed.transport_id(), |_, id| id == connection_id);
        info!(
            connection_id,
            transport = removed.transport_id(),
            "Connection removed"
        );
        self.publish_counts();
        Some(removed)
    }

    /// Remove whatever connection is bound to `transport_id`.
    pub fn remove_connection_by_transport(&self, transport_id: &str) -> Option<Arc<Connection>> {
        let (_, connection_id) = self.transports.remove(transport_id)?;
        let removed = self.remove_connection_entries(&connection_id);
        if removed.is_some() {
            info!(connection_id, transport = transport_id, "Connection closed");
            self.publish_counts();
        }
        removed
    }

    fn remove_connection_entries(&self, connection_id: &str) -> Option<Arc<Connection>> {
        // Once the entry is gone no registration can index a new id under it.
        let (_, entry) = self.connections.remove(connection_id)?;
        for id in entry.consumers.ids() {
            self.consumers.remove(id);
        }
        for id in entry.producers.ids() {
            self.producers.remove(id);
        }
        Some(entry.connection)
    }

    pub fn get_connection(&self, connection_id: &str) -> Option<Arc<Connection>> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.connection.clone())
    }

    /// Connection bound to a transport, if the handshake happened.
    pub fn connection_for_transport(&self, transport_id: &str) -> Option<Arc<Connection>> {
        let connection_id = self.transports.get(transport_id)?.clone();
        self.get_connection(&connection_id)
    }

    /// Register a consumer.
    ///
    /// Returns `false` when a consumer with the same id already exists; ids are
    /// derived from `(connection, sequence, app, topic)` so repeating a request
    /// converges on the existing entry. Fails with `false` as well when the
    /// owning connection is gone.
    pub fn add_consumer(&self, consumer: Consumer) -> bool {
        let Some(mut owner) = self.connections.get_mut(&consumer.connection_id) else {
            return false;
        };
        let inserted = match self.consumers.entry(consumer.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                debug!(
                    consumer_id = %consumer.id,
                    app = %consumer.app,
                    topic = %consumer.topic,
                    "Consumer added"
                );
                owner
                    .consumers
                    .insert(&consumer.app, &consumer.topic, &consumer.id);
                entry.insert(Arc::new(consumer));
                true
            }
        };
        drop(owner);
        self.publish_counts();
        inserted
    }

    pub fn remove_consumer(&self, consumer_id: &str) -> Option<Arc<Consumer>> {
        let connection_id = self.consumers.get(consumer_id)?.connection_id.clone();
        let removed = match self.connections.get_mut(&connection_id) {
            Some(mut owner) => {
                let removed = self.consumers.remove(consumer_id).map(|(_, c)| c);
                if let Some(consumer) = &removed {
                    owner
                        .consumers
                        .remove(&consumer.app, &consumer.topic, &consumer.id);
                }
                removed
            }
            None => self.consumers.remove(consumer_id).map(|(_, c)| c),
        };
        if removed.is_some() {
            debug!(consumer_id, "Consumer removed");
            self.publish_counts();
        }
        removed
    }

    pub fn get_consumer(&self, consumer_id: &str) -> Option<Arc<Consumer>> {
        self.consumers.get(consumer_id).map(|c| c.clone())
    }

    /// Consumer registered by `connection_id` for `(app, topic)`.
    ///
    /// When several sequences registered the same pair, the one with the
    /// smallest id is returned so lookups are stable.
    pub fn find_consumer(
        &self,
        connection_id: &str,
        app: &str,
        topic: &str,
    ) -> Option<Arc<Consumer>> {
        let owner = self.connections.get(connection_id)?;
        let id = owner.consumers.first(app, topic)?;
        self.consumers.get(id).map(|c| c.clone())
    }

    /// Register a producer. Same idempotence rules as [`add_consumer`](Self::add_consumer).
    pub fn add_producer(&self, producer: Producer) -> bool {
        let Some(mut owner) = self.connections.get_mut(&producer.connection_id) else {
            return false;
        };
        let inserted = match self.producers.entry(producer.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                debug!(
                    producer_id = %producer.id,
                    app = %producer.app,
                    topic = %producer.topic,
                    "Producer added"
                );
                owner
                    .producers
                    .insert(&producer.app, &producer.topic, &producer.id);
                entry.insert(Arc::new(producer));
                true
            }
        };
        drop(owner);
        self.publish_counts();
        inserted
    }

    pub fn remove_producer(&self, producer_id: &str) -> Option<Arc<Producer>> {
        let connection_id = self.producers.get(producer_id)?.connection_id.clone();
        let removed = match self.connections.get_mut(&connection_id) {
            Some(mut owner) => {
                let removed = self.producers.remove(producer_id).map(|(_, p)| p);
                if let Some(producer) = &removed {
                    owner
                        .producers
                        .remove(&producer.app, &producer.topic, &producer.id);
                }
                removed
            }
            None => self.producers.remove(producer_id).map(|(_, p)| p),
        };
        if removed.is_some() {
            debug!(producer_id, "Producer removed");
            self.publish_counts();
        }
        removed
    }

    pub fn get_producer(&self, producer_id: &str) -> Option<Arc<Producer>> {
        self.producers.get(producer_id).map(|p| p.clone())
    }

    pub fn find_producer(
        &self,
        connection_id: &str,
        app: &str,
        topic: &str,
    ) -> Option<Arc<Producer>> {
        let owner = self.connections.get(connection_id)?;
        let id = owner.producers.first(app, topic)?;
        self.producers.get(id).map(|p| p.clone())
    }

    /// Consumers owned by a connection.
    pub fn consumers_of(&self, connection_id: &str) -> Vec<Arc<Consumer>> {
        let Some(owner) = self.connections.get(connection_id) else {
            return Vec::new();
        };
        owner
            .consumers
            .ids()
            .filter_map(|id| self.consumers.get(id).map(|c| c.clone()))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn producer_count(&self) -> usize {
        self.producers.len()
    }

    fn publish_counts(&self) {
        metrics::set_session_counts(
            self.connections.len(),
            self.consumers.len(),
            self.producers.len(),
        );
    }
}
