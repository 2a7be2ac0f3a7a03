//! Error types for the room layer.

/// Why a room operation was refused.
///
/// The `Display` text is exactly what the relay reports to the peer in
/// an `Error` frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// The active room count is at the configured ceiling.
    #[error("Server is full. Maximum rooms reached.")]
    ServerFull,

    /// Another active room already uses this name.
    #[error("Room already exists")]
    RoomExists,

    /// No active room has this name.
    #[error("Room not found")]
    RoomNotFound,

    /// The connection is already the host or a client of some room.
    #[error("Already in a room")]
    AlreadyInRoom,

    /// Every client slot is taken.
    #[error("Room is full")]
    RoomFull,

    /// The room refused the client for a reason other than capacity,
    /// e.g. the connection is its host or already a member.
    #[error("Failed to join room")]
    JoinRejected,
}
