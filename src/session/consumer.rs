use std::fmt;

use crate::constants::{CONSUMER_ID_MARKER, PRODUCER_ID_MARKER};

/// Protocol dialect a consumer was registered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumeType {
    Native,
    Kafka,
}

impl fmt::Display for ConsumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumeType::Native => f.write_str("native"),
            ConsumeType::Kafka => f.write_str("kafka"),
        }
    }
}

/// Build the id of a consumer.
///
/// Layout: `{connection_id}_{sequence}_consumer_{app}_{topic}`. Connection ids
/// and app names never contain `_`, so distinct inputs give distinct ids.
pub fn consumer_id(connection_id: &str, sequence: i64, app: &str, topic: &str) -> String {
    format!("{connection_id}_{sequence}_{CONSUMER_ID_MARKER}_{app}_{topic}")
}

/// Build the id of a producer.
///
/// Layout: `{connection_id}_{sequence}_producer_{app}_{topic}`.
pub fn producer_id(connection_id: &str, sequence: i64, app: &str, topic: &str) -> String {
    format!("{connection_id}_{sequence}_{PRODUCER_ID_MARKER}_{app}_{topic}")
}

/// A consumer attached to a topic through a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub id: String,
    pub connection_id: String,
    pub app: String,
    pub topic: String,
    pub consume_type: ConsumeType,
}

impl Consumer {
    pub fn new(connection_id: &str, sequence: i64, app: &str, topic: &str) -> Self {
        Self {
            id: consumer_id(connection_id, sequence, app, topic),
            connection_id: connection_id.to_string(),
            app: app.to_string(),
            topic: topic.to_string(),
            consume_type: ConsumeType::Native,
        }
    }

    pub fn with_consume_type(mut self, consume_type: ConsumeType) -> Self {
        self.consume_type = consume_type;
        self
    }
}

/// A producer attached to a topic through a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producer {
    pub id: String,
    pub connection_id: String,
    pub app: String,
    pub topic: String,
}

impl Producer {
    pub fn new(connection_id: &str, sequence: i64, app: &str, topic: &str) -> Self {
        Self {
            id: producer_id(connection_id, sequence, app, topic),
            connection_id: connection_id.to_string(),
            app: app.to_string(),
            topic: topic.to_string(),
        }
    }
}
