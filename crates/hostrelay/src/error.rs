//! Error types for the relay.

use hostrelay_protocol::{PacketType, ProtocolError};
use hostrelay_room::RoomError;
use hostrelay_transport::TransportError;

/// Top-level error for starting and running the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// The health endpoint could not bind or serve.
    #[error("health endpoint: {0}")]
    Io(#[from] std::io::Error),
}

/// Why one peer request failed.
///
/// Handlers return these; [`RelayEngine`](crate::RelayEngine) turns
/// them into an `Error` frame in one place. None of them end the
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The frame was too short or garbled for its tag.
    #[error("malformed request: {0}")]
    Malformed(ProtocolError),

    /// Well-formed, but the values are unacceptable.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// Something that should not happen, e.g. a poisoned lock.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// The message sent back to the peer.
    pub fn peer_message(&self) -> String {
        match self {
            Self::Malformed(e) => match e.packet() {
                Some(PacketType::CreateRoom) => "Invalid create room packet".to_string(),
                Some(PacketType::JoinRoom) => "Invalid join room packet".to_string(),
                Some(PacketType::Data) => "Invalid data packet".to_string(),
                _ => "Invalid packet".to_string(),
            },
            Self::Validation(message) => message.clone(),
            Self::Room(e) => e.to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<ProtocolError> for RequestError {
    fn from(e: ProtocolError) -> Self {
        Self::Malformed(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: RelayError = TransportError::ConnectionClosed(
            hostrelay_transport::ConnectionId::new(4),
        )
        .into();
        assert!(matches!(err, RelayError::Transport(_)));
        assert!(err.to_string().contains("conn-4"));
    }

    #[test]
    fn test_from_room_error() {
        let err: RelayError = RoomError::RoomNotFound.into();
        assert!(matches!(err, RelayError::Room(_)));
    }

    #[test]
    fn test_from_io_error() {
        let err: RelayError = std::io::Error::other("port taken").into();
        assert!(err.to_string().contains("port taken"));
    }

    #[test]
    fn test_malformed_peer_messages_name_the_packet() {
        let truncated = |packet| {
            RequestError::from(ProtocolError::Truncated {
                packet,
                needed: 4,
                available: 0,
            })
        };
        assert_eq!(
            truncated(PacketType::CreateRoom).peer_message(),
            "Invalid create room packet"
        );
        assert_eq!(
            truncated(PacketType::JoinRoom).peer_message(),
            "Invalid join room packet"
        );
        assert_eq!(truncated(PacketType::Data).peer_message(), "Invalid data packet");
    }

    #[test]
    fn test_room_errors_pass_through() {
        let err = RequestError::from(RoomError::RoomFull);
        assert_eq!(err.peer_message(), "Room is full");
    }

    #[test]
    fn test_internal_details_stay_internal() {
        let err = RequestError::Internal("lock poisoned".into());
        assert_eq!(err.peer_message(), "Internal server error");
        assert!(err.to_string().contains("lock poisoned"));
    }
}
