//! Error types for the transport layer.

use crate::ConnectionId;

/// Errors that can occur in the transport layer.
///
/// None of these ever reach room state: the relay logs them and moves
/// on. A dead connection surfaces to the core only as a
/// `Disconnected` event.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection no longer accepts frames.
    #[error("{0} is closed")]
    ConnectionClosed(ConnectionId),

    /// The peer is not draining its frames; it is being disconnected.
    #[error("{0} send queue is full")]
    SendQueueFull(ConnectionId),

    /// Binding the listening socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting a connection (TCP or WebSocket upgrade) failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_names_the_connection() {
        let err = TransportError::ConnectionClosed(ConnectionId::new(3));
        assert_eq!(err.to_string(), "conn-3 is closed");
    }

    #[test]
    fn test_io_errors_keep_their_source() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err = TransportError::BindFailed(io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("port taken"));
    }
}
