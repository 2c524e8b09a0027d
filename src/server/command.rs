//! Decoded commands exchanged with clients.
//!
//! Framing and wire encoding live in the transport layer; handlers see a
//! [`Command`]: a [`Header`] plus a typed [`Payload`].

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{KafkaCode, ResponseCode};
use crate::storage::PullResult;
use crate::transaction::{AddPartitionsResult, TxnTopicPartitions};
use crate::types::CommandType;

/// Command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command_type: CommandType,
    /// Correlates a response with its request.
    pub request_id: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub header: Header,
    pub payload: Payload,
}

impl Command {
    /// Build a command whose type is derived from its payload.
    pub fn new(request_id: i32, payload: Payload) -> Self {
        Self {
            header: Header {
                command_type: payload.command_type(),
                request_id,
            },
            payload,
        }
    }

    /// Build a command with an explicit type, e.g. one no handler knows.
    pub fn with_type(command_type: CommandType, request_id: i32, payload: Payload) -> Self {
        Self {
            header: Header {
                command_type,
                request_id,
            },
            payload,
        }
    }

    /// Response correlated with `request`.
    pub fn response_to(request: &Header, payload: impl Into<Payload>) -> Self {
        Self::new(request.request_id, payload.into())
    }

    pub fn command_type(&self) -> CommandType {
        self.header.command_type
    }

    /// Whether this response reports a failure.
    pub fn is_error(&self) -> bool {
        match &self.payload {
            Payload::BooleanAck(ack) => !ack.code.is_success(),
            Payload::FetchTopicMessageResponse(r) => r.data.values().any(|d| !d.code.is_success()),
            Payload::AddPartitionsToTxnResponse(r) => r
                .results
                .values()
                .flatten()
                .any(|p| p.error_code != KafkaCode::None),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    AddConnection(AddConnectionRequest),
    RemoveConnection,
    AddConsumer(AddConsumerRequest),
    RemoveConsumer(RemoveConsumerRequest),
    AddProducer(AddProducerRequest),
    RemoveProducer(RemoveProducerRequest),
    Heartbeat,
    FetchTopicMessage(FetchTopicMessageRequest),
    AddPartitionsToTxn(AddPartitionsToTxnRequest),

    BooleanAck(BooleanAck),
    AddConnectionResponse(AddConnectionResponse),
    AddConsumerResponse(AddConsumerResponse),
    AddProducerResponse(AddProducerResponse),
    FetchTopicMessageResponse(FetchTopicMessageResponse),
    AddPartitionsToTxnResponse(AddPartitionsToTxnResponse),
}

impl Payload {
    pub fn command_type(&self) -> CommandType {
        match self {
            Payload::AddConnection(_) => CommandType::ADD_CONNECTION,
            Payload::RemoveConnection => CommandType::REMOVE_CONNECTION,
            Payload::AddConsumer(_) => CommandType::ADD_CONSUMER,
            Payload::RemoveConsumer(_) => CommandType::REMOVE_CONSUMER,
            Payload::AddProducer(_) => CommandType::ADD_PRODUCER,
            Payload::RemoveProducer(_) => CommandType::REMOVE_PRODUCER,
            Payload::Heartbeat => CommandType::HEARTBEAT,
            Payload::FetchTopicMessage(_) => CommandType::FETCH_TOPIC_MESSAGE,
            Payload::AddPartitionsToTxn(_) => CommandType::KAFKA_ADD_PARTITIONS_TO_TXN,
            Payload::BooleanAck(_) => CommandType::BOOLEAN_ACK,
            Payload::AddConnectionResponse(_) => CommandType::ADD_CONNECTION_RESPONSE,
            Payload::AddConsumerResponse(_) => CommandType::ADD_CONSUMER_RESPONSE,
            Payload::AddProducerResponse(_) => CommandType::ADD_PRODUCER_RESPONSE,
            Payload::FetchTopicMessageResponse(_) => CommandType::FETCH_TOPIC_MESSAGE_RESPONSE,
            Payload::AddPartitionsToTxnResponse(_) => CommandType::KAFKA_ADD_PARTITIONS_TO_TXN,
        }
    }
}

macro_rules! impl_into_payload {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$ty(value)
                }
            }
        )*
    };
}

impl_into_payload!(
    BooleanAck,
    AddConnectionResponse,
    AddConsumerResponse,
    AddProducerResponse,
    FetchTopicMessageResponse,
    AddPartitionsToTxnResponse,
);

// ============================================================================
// Requests
// ============================================================================

/// Authentication handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddConnectionRequest {
    pub app: String,
    pub token: String,
    pub language: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddConsumerRequest {
    pub app: String,
    pub topics: Vec<String>,
    /// Client-side sequence, part of the consumer id.
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveConsumerRequest {
    pub consumer_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddProducerRequest {
    pub app: String,
    pub topics: Vec<String>,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveProducerRequest {
    pub producer_ids: Vec<String>,
}

/// Per-topic fetch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTopicData {
    pub count: u16,
    pub partition: Option<i32>,
}

impl FetchTopicData {
    pub fn new(count: u16) -> Self {
        Self {
            count,
            partition: None,
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTopicMessageRequest {
    pub app: String,
    pub topics: BTreeMap<String, FetchTopicData>,
    pub ack_timeout: Duration,
    /// Requested long-poll wait in milliseconds; `None` uses the broker
    /// default, zero or negative disables parking.
    pub long_poll_timeout_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddPartitionsToTxnRequest {
    pub client_id: String,
    pub transaction_id: String,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub topics: Vec<TxnTopicPartitions>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BooleanAck {
    pub code: ResponseCode,
}

impl BooleanAck {
    pub fn new(code: ResponseCode) -> Self {
        Self { code }
    }

    pub fn success() -> Self {
        Self::new(ResponseCode::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddConnectionResponse {
    pub connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddConsumerResponse {
    /// topic -> consumer id
    pub consumer_ids: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddProducerResponse {
    /// topic -> producer id
    pub producer_ids: BTreeMap<String, String>,
}

/// Fetch result for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchTopicMessageAckData {
    pub buffers: Vec<Bytes>,
    pub code: ResponseCode,
}

impl FetchTopicMessageAckData {
    pub fn from_code(code: ResponseCode) -> Self {
        Self {
            buffers: Vec::new(),
            code,
        }
    }
}

impl From<PullResult> for FetchTopicMessageAckData {
    fn from(result: PullResult) -> Self {
        Self {
            buffers: result.buffers,
            code: result.code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchTopicMessageResponse {
    pub data: BTreeMap<String, FetchTopicMessageAckData>,
}

impl FetchTopicMessageResponse {
    /// Response carrying a single topic.
    pub fn single(topic: impl Into<String>, data: FetchTopicMessageAckData) -> Self {
        Self {
            data: BTreeMap::from([(topic.into(), data)]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddPartitionsToTxnResponse {
    pub throttle_time_ms: i32,
    pub results: AddPartitionsResult,
}
