//! Packet tags and the packets that travel on the wire.
//!
//! Every frame starts with one tag byte. Tags 0–3 flow peer → relay,
//! tags 10–16 flow relay → peer:
//!
//! ```text
//! CreateRoom(0)          string name, i32 max_clients
//! JoinRoom(1)            string name
//! LeaveRoom(2)           —
//! Data(3)                [i32 target, host only] payload…
//! RoomCreated(10)        —
//! RoomJoined(11)         —
//! ClientConnected(12)    i32 client
//! ClientDisconnected(13) i32 client
//! HostData(14)           payload…
//! ClientData(15)         i32 sender, payload…
//! Error(16)              string message
//! ```

use std::fmt;

use hostrelay_transport::ConnectionId;

/// The leading tag byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    // peer → relay
    CreateRoom = 0,
    JoinRoom = 1,
    LeaveRoom = 2,
    Data = 3,

    // relay → peer
    RoomCreated = 10,
    RoomJoined = 11,
    ClientConnected = 12,
    ClientDisconnected = 13,
    HostData = 14,
    ClientData = 15,
    Error = 16,
}

impl PacketType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::CreateRoom),
            1 => Some(Self::JoinRoom),
            2 => Some(Self::LeaveRoom),
            3 => Some(Self::Data),
            10 => Some(Self::RoomCreated),
            11 => Some(Self::RoomJoined),
            12 => Some(Self::ClientConnected),
            13 => Some(Self::ClientDisconnected),
            14 => Some(Self::HostData),
            15 => Some(Self::ClientData),
            16 => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns `true` for tags a peer may send to the relay.
    pub fn is_inbound(self) -> bool {
        (self as u8) < 10
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateRoom => "CreateRoom",
            Self::JoinRoom => "JoinRoom",
            Self::LeaveRoom => "LeaveRoom",
            Self::Data => "Data",
            Self::RoomCreated => "RoomCreated",
            Self::RoomJoined => "RoomJoined",
            Self::ClientConnected => "ClientConnected",
            Self::ClientDisconnected => "ClientDisconnected",
            Self::HostData => "HostData",
            Self::ClientData => "ClientData",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// A decoded peer → relay packet.
///
/// `Data` keeps the raw remainder of the frame: whether it starts with a
/// target id depends on who sent it, which only the relay knows. See
/// [`split_host_data`](crate::split_host_data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket<'a> {
    CreateRoom { name: String, max_clients: i32 },
    JoinRoom { name: String },
    LeaveRoom,
    Data { payload: &'a [u8] },
}

impl ClientPacket<'_> {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::CreateRoom { .. } => PacketType::CreateRoom,
            Self::JoinRoom { .. } => PacketType::JoinRoom,
            Self::LeaveRoom => PacketType::LeaveRoom,
            Self::Data { .. } => PacketType::Data,
        }
    }
}

/// A relay → peer packet. Payloads are borrowed so forwarding copies
/// the bytes exactly once, into the outgoing frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket<'a> {
    RoomCreated,
    RoomJoined,
    ClientConnected(ConnectionId),
    ClientDisconnected(ConnectionId),
    HostData(&'a [u8]),
    ClientData {
        sender: ConnectionId,
        payload: &'a [u8],
    },
    Error(&'a str),
}

impl ServerPacket<'_> {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::RoomCreated => PacketType::RoomCreated,
            Self::RoomJoined => PacketType::RoomJoined,
            Self::ClientConnected(_) => PacketType::ClientConnected,
            Self::ClientDisconnected(_) => PacketType::ClientDisconnected,
            Self::HostData(_) => PacketType::HostData,
            Self::ClientData { .. } => PacketType::ClientData,
            Self::Error(_) => PacketType::Error,
        }
    }
}
