//! Crate & protocol level errors.
//!
//! # Error Hierarchy
//!
//! - [`Error`]: crate-level faults raised by sessions, collaborators and
//!   dispatch wiring.
//! - [`ResponseCode`]: codes carried by native-protocol responses.
//! - [`KafkaCode`]: wire error codes for Kafka-dialect responses.
//! - [`TransactionError`]: transaction coordinator faults, each of which knows
//!   its own [`KafkaCode`].
//!
//! ## Conversion
//!
//! Handlers never let an [`Error`] escape to the transport. At the handler
//! boundary an error is turned into a code with [`Error::to_response_code`]
//! (native commands) or [`Error::to_kafka_code`] (Kafka commands).
//!
//! [`TransactionError`]: crate::transaction::TransactionError

use num_derive::FromPrimitive;
use std::{io, result};
use thiserror::Error as ThisError;

use crate::transaction::TransactionError;

pub type Result<T> = result::Result<T, Error>;

/// Broker level errors.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// An error in the network.
    #[error("IO error: {0:?}")]
    IoError(io::ErrorKind),

    /// Configuration or wiring error detected at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transport could not deliver a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The storage collaborator failed to serve a pull.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The cluster collaborator failed to answer.
    #[error("Cluster error: {0}")]
    Cluster(String),

    /// A recognized broker fault that carries its own response code.
    #[error("Broker error ({code:?}): {message}")]
    Broker { code: ResponseCode, message: String },

    /// A transaction coordinator fault.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Invariant violation inside the broker.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a recognized fault with a response code.
    pub fn broker(code: ResponseCode, message: impl Into<String>) -> Self {
        Error::Broker {
            code,
            message: message.into(),
        }
    }

    /// Map this error to a native-protocol response code.
    ///
    /// | Error | ResponseCode |
    /// |-------|--------------|
    /// | `Broker { code, .. }` | `code` |
    /// | `Config` | `CnParamError` |
    /// | `Transaction(_)` | `CnTransactionError` |
    /// | everything else | `CnUnknownError` |
    pub fn to_response_code(&self) -> ResponseCode {
        match self {
            Error::Broker { code, .. } => *code,
            Error::Config(_) => ResponseCode::CnParamError,
            Error::Transaction(_) => ResponseCode::CnTransactionError,
            _ => ResponseCode::CnUnknownError,
        }
    }

    /// Map this error to a Kafka wire error code.
    ///
    /// | Error | KafkaCode |
    /// |-------|-----------|
    /// | `Transaction(e)` | `e.code()` |
    /// | `IoError` / `Transport` | `NetworkException` |
    /// | `Cluster` | `CoordinatorNotAvailable` |
    /// | everything else | `Unknown` |
    pub fn to_kafka_code(&self) -> KafkaCode {
        match self {
            Error::Transaction(e) => e.code(),
            Error::IoError(_) | Error::Transport(_) => KafkaCode::NetworkException,
            Error::Cluster(_) => KafkaCode::CoordinatorNotAvailable,
            _ => KafkaCode::Unknown,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::IoError(a), Error::IoError(b)) => a == b,
            (Error::Config(a), Error::Config(b)) => a == b,
            (Error::Transport(a), Error::Transport(b)) => a == b,
            (Error::Storage(a), Error::Storage(b)) => a == b,
            (Error::Cluster(a), Error::Cluster(b)) => a == b,
            (
                Error::Broker {
                    code: c1,
                    message: m1,
                },
                Error::Broker {
                    code: c2,
                    message: m2,
                },
            ) => c1 == c2 && m1 == m2,
            (Error::Transaction(a), Error::Transaction(b)) => a == b,
            (Error::Internal(a), Error::Internal(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e.kind())
    }
}

/// Response codes of the native protocol.
///
/// Values are stable on the wire; new codes are appended within their range
/// (`0..100` framework, `100..` consumer/producer side).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, Default)]
pub enum ResponseCode {
    #[default]
    Success = 0,
    /// The connection named by the request is not registered, or has not
    /// authorized the requested application.
    FwConnectionNotExists = 10,
    /// The consumer named by the request is not registered.
    FwConsumerNotExists = 11,
    /// The producer named by the request is not registered.
    FwProducerNotExists = 12,
    /// Authentication of an application token failed.
    CnAuthenticationError = 100,
    /// The cluster denied the application access to the topic.
    CnNoPermission = 101,
    /// The request carried invalid or missing parameters.
    CnParamError = 102,
    /// The command type has no registered handler.
    CnCommandUnsupported = 103,
    /// A transaction could not be processed.
    CnTransactionError = 104,
    /// The broker is temporarily unable to serve the request.
    CnServiceNotAvailable = 105,
    /// An unexpected server error.
    CnUnknownError = 199,
}

impl ResponseCode {
    /// Raw wire value.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn is_success(self) -> bool {
        matches!(self, ResponseCode::Success)
    }
}

/// Various errors reported by a Kafka-compatible server.
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, Default)]
pub enum KafkaCode {
    /// An unexpected server error
    Unknown = -1,
    #[default]
    None = 0,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The coordinator is loading and hence can't process requests.
    CoordinatorLoadInProgress = 14,
    /// The coordinator is not available.
    CoordinatorNotAvailable = 15,
    /// This is not the correct coordinator.
    NotCoordinator = 16,
    /// For a request which attempts to access an invalid topic.
    InvalidTopic = 17,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    /// This most likely occurs because of a request being malformed by the
    /// client library or the message was sent to an incompatible broker.
    InvalidRequest = 42,
    /// The producer's epoch is older than the one the coordinator has
    /// seen; the producer has been fenced by a newer instance.
    InvalidProducerEpoch = 47,
    /// The producer attempted a transactional operation in an invalid state.
    InvalidTxnState = 48,
    /// The producer attempted to use a producer id which is not currently
    /// assigned to its transactional id.
    InvalidProducerIdMapping = 49,
    /// The transaction timeout is larger than the maximum value allowed by
    /// the broker.
    InvalidTransactionTimeout = 50,
    /// The producer attempted to update a transaction while another
    /// concurrent operation on the same transaction was ongoing.
    ConcurrentTransactions = 51,
    /// The transactional id authorization failed.
    TransactionalIdAuthorizationFailed = 53,
    /// The broker could not locate the producer metadata associated with
    /// the producer id in question.
    UnknownProducerId = 59,
    /// There is a newer producer with the same transactional id which fences
    /// the current one.
    ProducerFenced = 90,
    /// The transactional id could not be found.
    TransactionalIdNotFound = 105,
}

impl KafkaCode {
    /// Raw wire value.
    #[inline]
    pub const fn code(self) -> i16 {
        self as i16
    }
}
