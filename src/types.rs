//! Type-safe wrappers for protocol primitives.
//!
//! These newtypes keep integers with the same representation but different
//! meanings (a command code, a producer id, a partition index) from being
//! mixed up at call sites.

use std::fmt;

/// Command type code selecting a handler in a dispatcher.
///
/// Native commands and Kafka API keys share this representation but are
/// routed by separate dispatchers, so their value ranges may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CommandType(pub i32);

impl CommandType {
    // Native protocol commands.
    pub const ADD_CONNECTION: Self = CommandType(1);
    pub const REMOVE_CONNECTION: Self = CommandType(2);
    pub const ADD_CONSUMER: Self = CommandType(3);
    pub const REMOVE_CONSUMER: Self = CommandType(4);
    pub const ADD_PRODUCER: Self = CommandType(5);
    pub const REMOVE_PRODUCER: Self = CommandType(6);
    pub const HEARTBEAT: Self = CommandType(7);
    pub const FETCH_TOPIC_MESSAGE: Self = CommandType(8);
    /// Generic acknowledgement sent back for commands without a dedicated
    /// response body.
    pub const BOOLEAN_ACK: Self = CommandType(100);
    pub const ADD_CONNECTION_RESPONSE: Self = CommandType(101);
    pub const ADD_CONSUMER_RESPONSE: Self = CommandType(103);
    pub const ADD_PRODUCER_RESPONSE: Self = CommandType(105);
    pub const FETCH_TOPIC_MESSAGE_RESPONSE: Self = CommandType(108);

    // Kafka API keys.
    pub const KAFKA_ADD_PARTITIONS_TO_TXN: Self = CommandType(24);

    /// Create a new command type from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        CommandType(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Human readable name used as a metrics label.
    pub fn name(self) -> &'static str {
        match self {
            Self::ADD_CONNECTION => "add_connection",
            Self::REMOVE_CONNECTION => "remove_connection",
            Self::ADD_CONSUMER => "add_consumer",
            Self::REMOVE_CONSUMER => "remove_consumer",
            Self::ADD_PRODUCER => "add_producer",
            Self::REMOVE_PRODUCER => "remove_producer",
            Self::HEARTBEAT => "heartbeat",
            Self::FETCH_TOPIC_MESSAGE => "fetch_topic_message",
            Self::KAFKA_ADD_PARTITIONS_TO_TXN => "add_partitions_to_txn",
            _ => "other",
        }
    }
}

impl From<i32> for CommandType {
    fn from(value: i32) -> Self {
        CommandType(value)
    }
}

impl From<CommandType> for i32 {
    fn from(t: CommandType) -> Self {
        t.0
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// A partition index within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionIndex(pub i32);

impl PartitionIndex {
    /// Invalid partition index.
    pub const INVALID: Self = PartitionIndex(-1);

    /// Create a new partition index from a raw value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        PartitionIndex(value)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Check if this is a valid (non-negative) partition index.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i32> for PartitionIndex {
    fn from(value: i32) -> Self {
        PartitionIndex(value)
    }
}

impl From<PartitionIndex> for i32 {
    fn from(idx: PartitionIndex) -> Self {
        idx.0
    }
}

impl fmt::Display for PartitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Kafka producer ID for transactional producers.
///
/// Producer IDs are 64-bit signed integers assigned outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProducerId(pub i64);

impl ProducerId {
    /// Invalid/unknown producer ID.
    pub const INVALID: Self = ProducerId(-1);

    #[inline]
    pub const fn new(value: i64) -> Self {
        ProducerId(value)
    }

    #[inline]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Check if this is a valid (non-negative) producer ID.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl From<i64> for ProducerId {
    fn from(value: i64) -> Self {
        ProducerId(value)
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Kafka producer epoch.
///
/// Epochs increase each time a transactional producer restarts; a request
/// carrying an older epoch than the coordinator has seen comes from a zombie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProducerEpoch(pub i16);

impl ProducerEpoch {
    #[inline]
    pub const fn new(value: i16) -> Self {
        ProducerEpoch(value)
    }

    #[inline]
    pub const fn value(self) -> i16 {
        self.0
    }
}

impl From<i16> for ProducerEpoch {
    fn from(value: i16) -> Self {
        ProducerEpoch(value)
    }
}

impl fmt::Display for ProducerEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A topic-partition identifier.
///
/// ```
/// use broker_core::types::TopicPartition;
///
/// let tp = TopicPartition::new("orders", 3);
/// assert_eq!(tp.to_string(), "orders-3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicPartition {
    topic: String,
    partition: PartitionIndex,
}

impl TopicPartition {
    #[inline]
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition: PartitionIndex(partition),
        }
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[inline]
    pub fn partition(&self) -> PartitionIndex {
        self.partition
    }
}

impl From<(&str, i32)> for TopicPartition {
    fn from((topic, partition): (&str, i32)) -> Self {
        Self::new(topic, partition)
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}
