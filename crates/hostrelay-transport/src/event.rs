//! Events a transport hands to the relay, one batch per tick.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::{ConnectionId, DeliveryMethod, TransportError};

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The remote peer closed the connection.
    RemoteClose,
    /// The relay called `disconnect()`.
    LocalClose,
    /// Nothing was received within the connection timeout.
    Timeout,
    /// The socket failed.
    ConnectionFailed,
    /// The transport is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RemoteClose => "remote close",
            Self::LocalClose => "local close",
            Self::Timeout => "timeout",
            Self::ConnectionFailed => "connection failed",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// A pending connection waiting for an admission decision.
///
/// Dropping the request without answering rejects it.
#[derive(Debug)]
pub struct ConnectionRequest {
    remote_addr: SocketAddr,
    token: String,
    decision: oneshot::Sender<bool>,
}

impl ConnectionRequest {
    /// Creates a request and the receiver its transport waits on.
    pub fn new(remote_addr: SocketAddr, token: String) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            remote_addr,
            token,
            decision: tx,
        };
        (request, rx)
    }

    /// The address the request came from.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// The admission token the peer presented.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Admits the peer. The transport follows up with `Connected`.
    pub fn accept(self) {
        let _ = self.decision.send(true);
    }

    /// Refuses the peer. No connection is ever created for it.
    pub fn reject(self) {
        let _ = self.decision.send(false);
    }
}

/// Something that happened on the transport since the last tick.
#[derive(Debug)]
pub enum TransportEvent<C> {
    /// A peer asks to connect and presents an admission token.
    ConnectionRequest(ConnectionRequest),

    /// An admitted peer is now connected.
    Connected(C),

    /// A frame arrived from a connected peer.
    Received {
        id: ConnectionId,
        data: Vec<u8>,
        delivery: DeliveryMethod,
    },

    /// A connection closed. Its id may be reused after this event.
    Disconnected {
        id: ConnectionId,
        reason: DisconnectReason,
    },

    /// A socket-level error not tied to room state.
    NetworkError {
        addr: SocketAddr,
        error: TransportError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_request_accept_resolves_true() {
        let (req, rx) = ConnectionRequest::new(addr(), "token".into());
        assert_eq!(req.token(), "token");
        assert_eq!(req.remote_addr(), addr());
        req.accept();
        assert_eq!(rx.await, Ok(true));
    }

    #[tokio::test]
    async fn test_request_reject_resolves_false() {
        let (req, rx) = ConnectionRequest::new(addr(), "nope".into());
        req.reject();
        assert_eq!(rx.await, Ok(false));
    }

    #[tokio::test]
    async fn test_dropped_request_closes_the_receiver() {
        let (req, rx) = ConnectionRequest::new(addr(), "token".into());
        drop(req);
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::Timeout.to_string(), "timeout");
        assert_eq!(DisconnectReason::RemoteClose.to_string(), "remote close");
    }
}
