//! Binary codec for relay frames.
//!
//! Layout rules:
//! - integers are little-endian `i32`;
//! - strings are a little-endian `u16` holding *byte length + 1*,
//!   followed by the UTF-8 bytes. A prefix of 0 stands for an absent
//!   string and decodes as empty;
//! - payloads are "the rest of the frame" and are never inspected.
//!
//! Connection ids are `u32` in memory and cross the wire bit-for-bit
//! as `i32`.

use hostrelay_transport::ConnectionId;

use crate::{ClientPacket, PacketType, ProtocolError, ServerPacket};

const I32_LEN: usize = 4;
const STR_PREFIX_LEN: usize = 2;
const MAX_STRING_LEN: usize = u16::MAX as usize - 1;

// ---------------------------------------------------------------------------
// Reader / writer
// ---------------------------------------------------------------------------

/// Cursor over the fields of one frame (after the tag byte).
///
/// Errors are tagged with the packet being read so the relay can tell
/// the sender which request was malformed.
#[derive(Debug)]
pub struct PacketReader<'a> {
    packet: PacketType,
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(packet: PacketType, data: &'a [u8]) -> Self {
        Self {
            packet,
            data,
            pos: 0,
        }
    }

    /// Bytes not yet consumed.
    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.available() < n {
            return Err(ProtocolError::Truncated {
                packet: self.packet,
                needed: n,
                available: self.available(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.take(I32_LEN)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_connection_id(&mut self) -> Result<ConnectionId, ProtocolError> {
        Ok(ConnectionId::new(self.read_i32()? as u32))
    }

    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let b = self.take(STR_PREFIX_LEN)?;
        let prefix = u16::from_le_bytes([b[0], b[1]]) as usize;
        if prefix == 0 {
            return Ok(String::new());
        }
        let bytes = self.take(prefix - 1)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8 {
                packet: self.packet,
            })
    }

    /// Consumes and returns everything left.
    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.pos..];
        self.pos = self.data.len();
        bytes
    }
}

/// Builds one frame, tag byte first.
#[derive(Debug)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new(packet: PacketType) -> Self {
        Self::with_capacity(packet, 0)
    }

    pub fn with_capacity(packet: PacketType, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(1 + capacity);
        buf.push(packet as u8);
        Self { buf }
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_connection_id(&mut self, id: ConnectionId) -> &mut Self {
        self.put_i32(id.into_inner() as i32)
    }

    pub fn put_string(&mut self, s: &str) -> Result<&mut Self, ProtocolError> {
        if s.len() > MAX_STRING_LEN {
            return Err(ProtocolError::StringTooLong(s.len()));
        }
        let prefix = (s.len() + 1) as u16;
        self.buf.extend_from_slice(&prefix.to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        Ok(self)
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Peer → relay
// ---------------------------------------------------------------------------

fn split_tag(frame: &[u8]) -> Result<(PacketType, &[u8]), ProtocolError> {
    let (&tag, body) = frame.split_first().ok_or(ProtocolError::Empty)?;
    let packet = PacketType::from_u8(tag).ok_or(ProtocolError::UnknownTag(tag))?;
    Ok((packet, body))
}

/// Decodes a frame a peer sent to the relay.
///
/// # Errors
/// - [`ProtocolError::Empty`] for a zero-length frame.
/// - [`ProtocolError::UnknownTag`] for unknown tags and relay → peer tags.
/// - [`ProtocolError::Truncated`] / [`ProtocolError::InvalidUtf8`] when
///   the fields of a known packet are incomplete or garbled.
pub fn decode_client(frame: &[u8]) -> Result<ClientPacket<'_>, ProtocolError> {
    let (packet, body) = split_tag(frame)?;
    let mut r = PacketReader::new(packet, body);
    match packet {
        PacketType::CreateRoom => {
            let name = r.read_string()?;
            let max_clients = r.read_i32()?;
            Ok(ClientPacket::CreateRoom { name, max_clients })
        }
        PacketType::JoinRoom => Ok(ClientPacket::JoinRoom {
            name: r.read_string()?,
        }),
        PacketType::LeaveRoom => Ok(ClientPacket::LeaveRoom),
        PacketType::Data => Ok(ClientPacket::Data { payload: r.rest() }),
        other => Err(ProtocolError::UnknownTag(other as u8)),
    }
}

/// Splits a host's `Data` payload into target client and forwarded bytes.
///
/// # Errors
/// [`ProtocolError::Truncated`] if the target id is incomplete.
pub fn split_host_data(payload: &[u8]) -> Result<(ConnectionId, &[u8]), ProtocolError> {
    let mut r = PacketReader::new(PacketType::Data, payload);
    let target = r.read_connection_id()?;
    Ok((target, r.rest()))
}

/// Encodes a peer → relay packet. Peers use this; so do tests.
pub fn encode_client(packet: &ClientPacket<'_>) -> Result<Vec<u8>, ProtocolError> {
    let mut w = PacketWriter::new(packet.packet_type());
    match packet {
        ClientPacket::CreateRoom { name, max_clients } => {
            w.put_string(name)?.put_i32(*max_clients);
        }
        ClientPacket::JoinRoom { name } => {
            w.put_string(name)?;
        }
        ClientPacket::LeaveRoom => {}
        ClientPacket::Data { payload } => {
            w.put_bytes(payload);
        }
    }
    Ok(w.finish())
}

/// Encodes a host's `Data` frame addressed to `target`.
pub fn encode_host_data(target: ConnectionId, payload: &[u8]) -> Vec<u8> {
    let mut w = PacketWriter::with_capacity(PacketType::Data, I32_LEN + payload.len());
    w.put_connection_id(target).put_bytes(payload);
    w.finish()
}

// ---------------------------------------------------------------------------
// Relay → peer
// ---------------------------------------------------------------------------

/// Encodes a relay → peer packet.
///
/// # Errors
/// [`ProtocolError::StringTooLong`] if an error message exceeds the
/// string length prefix.
pub fn encode_server(packet: &ServerPacket<'_>) -> Result<Vec<u8>, ProtocolError> {
    let packet_type = packet.packet_type();
    let frame = match packet {
        ServerPacket::RoomCreated | ServerPacket::RoomJoined => {
            PacketWriter::new(packet_type).finish()
        }
        ServerPacket::ClientConnected(id) | ServerPacket::ClientDisconnected(id) => {
            let mut w = PacketWriter::with_capacity(packet_type, I32_LEN);
            w.put_connection_id(*id);
            w.finish()
        }
        ServerPacket::HostData(payload) => {
            let mut w = PacketWriter::with_capacity(packet_type, payload.len());
            w.put_bytes(payload);
            w.finish()
        }
        ServerPacket::ClientData { sender, payload } => {
            let mut w = PacketWriter::with_capacity(packet_type, I32_LEN + payload.len());
            w.put_connection_id(*sender).put_bytes(payload);
            w.finish()
        }
        ServerPacket::Error(message) => {
            let mut w = PacketWriter::with_capacity(packet_type, STR_PREFIX_LEN + message.len());
            w.put_string(message)?;
            w.finish()
        }
    };
    Ok(frame)
}

/// Decodes a relay → peer frame. Peers use this; so do tests.
pub fn decode_server(frame: &[u8]) -> Result<ServerPacket<'_>, ProtocolError> {
    let (packet, body) = split_tag(frame)?;
    let mut r = PacketReader::new(packet, body);
    match packet {
        PacketType::RoomCreated => Ok(ServerPacket::RoomCreated),
        PacketType::RoomJoined => Ok(ServerPacket::RoomJoined),
        PacketType::ClientConnected => Ok(ServerPacket::ClientConnected(r.read_connection_id()?)),
        PacketType::ClientDisconnected => {
            Ok(ServerPacket::ClientDisconnected(r.read_connection_id()?))
        }
        PacketType::HostData => Ok(ServerPacket::HostData(r.rest())),
        PacketType::ClientData => {
            let sender = r.read_connection_id()?;
            Ok(ServerPacket::ClientData {
                sender,
                payload: r.rest(),
            })
        }
        PacketType::Error => {
            let message = read_str(body, packet)?;
            Ok(ServerPacket::Error(message))
        }
        other => Err(ProtocolError::UnknownTag(other as u8)),
    }
}

/// Like [`PacketReader::read_string`], but borrows from the frame.
fn read_str(body: &[u8], packet: PacketType) -> Result<&str, ProtocolError> {
    let truncated = |needed: usize| ProtocolError::Truncated {
        packet,
        needed,
        available: body.len(),
    };
    if body.len() < STR_PREFIX_LEN {
        return Err(truncated(STR_PREFIX_LEN));
    }
    let prefix = u16::from_le_bytes([body[0], body[1]]) as usize;
    if prefix == 0 {
        return Ok("");
    }
    let end = STR_PREFIX_LEN + prefix - 1;
    if body.len() < end {
        return Err(truncated(end));
    }
    std::str::from_utf8(&body[STR_PREFIX_LEN..end])
        .map_err(|_| ProtocolError::InvalidUtf8 { packet })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> ConnectionId {
        ConnectionId::new(n)
    }

    // =====================================================================
    // Byte layout
    // =====================================================================

    #[test]
    fn test_create_room_layout() {
        let frame = encode_client(&ClientPacket::CreateRoom {
            name: "abc".into(),
            max_clients: 2,
        })
        .unwrap();
        // tag, u16 prefix = 3 + 1, "abc", i32 LE 2
        assert_eq!(frame, vec![0, 4, 0, b'a', b'b', b'c', 2, 0, 0, 0]);
    }

    #[test]
    fn test_client_data_layout_prefixes_sender() {
        let frame = encode_server(&ServerPacket::ClientData {
            sender: id(7),
            payload: &[0xAA, 0xBB],
        })
        .unwrap();
        assert_eq!(frame, vec![15, 7, 0, 0, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn test_empty_relay_acks_are_a_single_tag_byte() {
        assert_eq!(encode_server(&ServerPacket::RoomCreated).unwrap(), vec![10]);
        assert_eq!(encode_server(&ServerPacket::RoomJoined).unwrap(), vec![11]);
    }

    #[test]
    fn test_error_message_layout() {
        let frame = encode_server(&ServerPacket::Error("Room is full")).unwrap();
        assert_eq!(frame[0], 16);
        assert_eq!(u16::from_le_bytes([frame[1], frame[2]]), 13);
        assert_eq!(&frame[3..], b"Room is full");
    }

    // =====================================================================
    // Decoding peer frames
    // =====================================================================

    #[test]
    fn test_decode_create_room() {
        let frame = [0, 4, 0, b'a', b'b', b'c', 2, 0, 0, 0];
        assert_eq!(
            decode_client(&frame).unwrap(),
            ClientPacket::CreateRoom {
                name: "abc".into(),
                max_clients: 2
            }
        );
    }

    #[test]
    fn test_decode_negative_max_clients_is_not_a_codec_error() {
        let mut frame = vec![0, 2, 0, b'x'];
        frame.extend_from_slice(&(-5i32).to_le_bytes());
        assert_eq!(
            decode_client(&frame).unwrap(),
            ClientPacket::CreateRoom {
                name: "x".into(),
                max_clients: -5
            }
        );
    }

    #[test]
    fn test_zero_string_prefix_decodes_as_empty() {
        let frame = [1, 0, 0];
        assert_eq!(
            decode_client(&frame).unwrap(),
            ClientPacket::JoinRoom { name: String::new() }
        );
    }

    #[test]
    fn test_data_keeps_whole_remainder() {
        let frame = [3, 1, 2, 3];
        assert_eq!(
            decode_client(&frame).unwrap(),
            ClientPacket::Data { payload: &[1, 2, 3] }
        );
    }

    #[test]
    fn test_leave_room_ignores_trailing_bytes() {
        assert_eq!(decode_client(&[2, 9, 9]).unwrap(), ClientPacket::LeaveRoom);
    }

    #[test]
    fn test_split_host_data() {
        let frame = encode_host_data(id(4), b"hello");
        let ClientPacket::Data { payload } = decode_client(&frame).unwrap() else {
            panic!("expected Data");
        };
        let (target, rest) = split_host_data(payload).unwrap();
        assert_eq!(target, id(4));
        assert_eq!(rest, b"hello");
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_empty_frame() {
        assert_eq!(decode_client(&[]), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(decode_client(&[42]), Err(ProtocolError::UnknownTag(42)));
    }

    #[test]
    fn test_relay_tags_are_rejected_from_peers() {
        assert_eq!(decode_client(&[14, 1, 2]), Err(ProtocolError::UnknownTag(14)));
    }

    #[test]
    fn test_create_room_missing_max_clients() {
        let err = decode_client(&[0, 2, 0, b'a', 1]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Truncated {
                packet: PacketType::CreateRoom,
                needed: 4,
                available: 1
            }
        );
        assert_eq!(err.packet(), Some(PacketType::CreateRoom));
    }

    #[test]
    fn test_create_room_without_any_fields() {
        let err = decode_client(&[0]).unwrap_err();
        assert_eq!(err.packet(), Some(PacketType::CreateRoom));
    }

    #[test]
    fn test_join_room_string_shorter_than_prefix() {
        let err = decode_client(&[1, 10, 0, b'a']).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                packet: PacketType::JoinRoom,
                needed: 9,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_utf8_name() {
        let err = decode_client(&[1, 3, 0, 0xFF, 0xFE]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidUtf8 {
                packet: PacketType::JoinRoom
            }
        );
    }

    #[test]
    fn test_host_data_without_target() {
        let err = split_host_data(&[1, 2]).unwrap_err();
        assert_eq!(err.packet(), Some(PacketType::Data));
    }

    #[test]
    fn test_string_too_long_to_encode() {
        let long = "x".repeat(MAX_STRING_LEN + 1);
        assert_eq!(
            encode_server(&ServerPacket::Error(&long)),
            Err(ProtocolError::StringTooLong(MAX_STRING_LEN + 1))
        );
    }

    // =====================================================================
    // Relay frames as a peer sees them
    // =====================================================================

    #[test]
    fn test_decode_server_frames() {
        let frame = encode_server(&ServerPacket::ClientConnected(id(3))).unwrap();
        assert_eq!(decode_server(&frame).unwrap(), ServerPacket::ClientConnected(id(3)));

        let frame = encode_server(&ServerPacket::HostData(b"abc")).unwrap();
        assert_eq!(decode_server(&frame).unwrap(), ServerPacket::HostData(b"abc"));

        let frame = encode_server(&ServerPacket::Error("Room closed by host")).unwrap();
        assert_eq!(
            decode_server(&frame).unwrap(),
            ServerPacket::Error("Room closed by host")
        );
    }

    #[test]
    fn test_decode_server_rejects_peer_tags() {
        assert_eq!(decode_server(&[0]), Err(ProtocolError::UnknownTag(0)));
    }
}
