//! Error types for the protocol layer.

use crate::PacketType;

/// Errors that can occur while decoding or encoding a frame.
///
/// A decode error never reaches room state: the relay drops the frame
/// and, where the tag was recognized, tells the sender it was malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame had no tag byte.
    #[error("empty frame")]
    Empty,

    /// The tag byte is not one this side of the protocol accepts.
    #[error("unknown packet tag {0}")]
    UnknownTag(u8),

    /// The frame ended before a required field was complete.
    #[error("truncated {packet} frame: need {needed} bytes, have {available}")]
    Truncated {
        packet: PacketType,
        needed: usize,
        available: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("{packet} frame has a string that is not valid UTF-8")]
    InvalidUtf8 { packet: PacketType },

    /// A string is too long for its u16 length prefix.
    #[error("string of {0} bytes exceeds the length prefix")]
    StringTooLong(usize),
}

impl ProtocolError {
    /// The packet the error belongs to, when the tag was recognized.
    pub fn packet(&self) -> Option<PacketType> {
        match self {
            Self::Truncated { packet, .. } | Self::InvalidUtf8 { packet } => Some(*packet),
            _ => None,
        }
    }
}
