//! Wire protocol for hostrelay.
//!
//! This crate defines what peers and the relay say to each other:
//!
//! - **Types** ([`PacketType`], [`ClientPacket`], [`ServerPacket`]) —
//!   one leading tag byte per frame, then fixed fields.
//! - **Codec** ([`decode_client`], [`encode_server`], ...) — the byte
//!   layout of those fields.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the relay
//! engine (room state). It keeps no state and never looks inside an
//! application payload.
//!
//! ```text
//! Transport (frame) → Protocol (ClientPacket) → Relay engine
//! ```

mod codec;
mod error;
mod types;

pub use codec::{
    PacketReader, PacketWriter, decode_client, decode_server, encode_client, encode_host_data,
    encode_server, split_host_data,
};
pub use error::ProtocolError;
pub use types::{ClientPacket, PacketType, ServerPacket};
