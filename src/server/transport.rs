use std::fmt;
use std::net::SocketAddr;

use super::command::{Command, Header};
use crate::error::Result;

/// Write side of a client connection.
///
/// `acknowledge` may be called concurrently from handler tasks, long-poll
/// timers and data notifications, so implementations must tolerate
/// concurrent writers.
pub trait Transport: Send + Sync {
    /// Stable identifier of the underlying connection.
    fn id(&self) -> &str;

    fn remote_addr(&self) -> SocketAddr;

    /// Send `response` correlated with the request described by `request`.
    fn acknowledge(&self, request: &Header, response: Command) -> Result<()>;
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport({}, {})", self.id(), self.remote_addr())
    }
}

#[cfg(any(test, feature = "test-utilities"))]
pub use channel::{Acknowledgement, ChannelTransport};

#[cfg(any(test, feature = "test-utilities"))]
mod channel {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::Transport;
    use crate::error::{Error, Result};
    use crate::server::command::{Command, Header};

    /// A response written to a [`ChannelTransport`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct Acknowledgement {
        pub request: Header,
        pub response: Command,
    }

    /// Transport that forwards every acknowledgement to an unbounded channel.
    #[derive(Debug)]
    pub struct ChannelTransport {
        id: String,
        addr: SocketAddr,
        tx: mpsc::UnboundedSender<Acknowledgement>,
    }

    impl ChannelTransport {
        pub fn new(addr: SocketAddr) -> (Arc<Self>, mpsc::UnboundedReceiver<Acknowledgement>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Arc::new(Self {
                id: uuid::Uuid::new_v4().simple().to_string(),
                addr,
                tx,
            });
            (transport, rx)
        }

        /// Transport bound to `127.0.0.1:port`.
        pub fn local(port: u16) -> (Arc<Self>, mpsc::UnboundedReceiver<Acknowledgement>) {
            Self::new(SocketAddr::from(([127, 0, 0, 1], port)))
        }
    }

    impl Transport for ChannelTransport {
        fn id(&self) -> &str {
            &self.id
        }

        fn remote_addr(&self) -> SocketAddr {
            self.addr
        }

        fn acknowledge(&self, request: &Header, response: Command) -> Result<()> {
            self.tx
                .send(Acknowledgement {
                    request: *request,
                    response,
                })
                .map_err(|_| Error::Transport(format!("transport {} is closed", self.id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::command::{BooleanAck, Payload};

    #[tokio::test]
    async fn test_channel_transport_forwards_acks() {
        let (transport, mut rx) = ChannelTransport::local(9000);
        let request = Command::new(3, Payload::Heartbeat);

        transport
            .acknowledge(&request.header, Command::response_to(&request.header, BooleanAck::success()))
            .unwrap();

        let ack = rx.recv().await.unwrap();
        assert_eq!(ack.request.request_id, 3);
        assert_eq!(ack.response.payload, Payload::BooleanAck(BooleanAck::success()));
    }

    #[tokio::test]
    async fn test_closed_channel_is_transport_error() {
        let (transport, rx) = ChannelTransport::local(9000);
        drop(rx);
        let request = Command::new(1, Payload::Heartbeat);
        let result = transport.acknowledge(&request.header, request.clone());
        assert!(matches!(result, Err(crate::error::Error::Transport(_))));
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _rx_a) = ChannelTransport::local(1);
        let (b, _rx_b) = ChannelTransport::local(1);
        assert_ne!(a.id(), b.id());
    }
}
