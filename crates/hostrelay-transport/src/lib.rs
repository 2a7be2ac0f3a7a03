//! Transport abstraction layer for hostrelay.
//!
//! The relay core never touches sockets. It consumes:
//!
//! - [`Connection`] handles (identity, liveness, non-blocking send, disconnect),
//! - a finite batch of [`TransportEvent`]s per tick, drained through
//!   [`Transport::poll_events`].
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod error;
mod event;
mod ids;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use event::{ConnectionRequest, DisconnectReason, TransportEvent};
pub use ids::IdAllocator;
pub use memory::{MemoryConnection, MemoryTransport, SentFrame};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Opaque identifier for a connection.
///
/// Unique among live connections. An id is handed out again only after
/// the previous owner's `Disconnected` event has been queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u32);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u32`.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying `u32` value.
    pub fn into_inner(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The delivery guarantee requested for a send.
///
/// The relay never picks one for forwarded data: whatever the sender
/// used is handed back to the transport unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryMethod {
    /// Delivered in order, no loss.
    #[default]
    ReliableOrdered,
    /// Delivered, but possibly out of order.
    ReliableUnordered,
    /// Delivered; only the newest message of a sequence is kept.
    ReliableSequenced,
    /// May be lost; stale messages are dropped.
    Sequenced,
    /// May be lost, may arrive out of order.
    Unreliable,
}

/// Liveness of a connection as seen by its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connected = 0,
    /// `disconnect()` was called; the close has not completed yet.
    Disconnecting = 1,
    Disconnected = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connected,
            1 => Self::Disconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// Connection state shared between a handle and the task driving it.
#[derive(Debug, Clone)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub(crate) fn connected() -> Self {
        Self(Arc::new(AtomicU8::new(ConnectionState::Connected as u8)))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from` → `to`. Returns `false` if the state was not `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A handle to one live connection.
///
/// Handles are cheap to clone; every clone refers to the same
/// connection. Nothing here blocks: `send` queues the frame for the
/// transport and returns.
pub trait Connection: Clone + Send + Sync + 'static {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// The remote peer's address.
    fn remote_addr(&self) -> SocketAddr;

    /// Current liveness.
    fn state(&self) -> ConnectionState;

    /// Shorthand for `state() == Connected`.
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Queues `data` for delivery with the given guarantee.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] if the connection is
    /// no longer accepting frames.
    /// A transport with a bounded queue may also refuse the frame and
    /// start disconnecting the peer.
    fn send(&self, data: &[u8], delivery: DeliveryMethod) -> Result<(), TransportError>;

    /// Starts closing the connection. Frames queued before this call are
    /// still flushed. Idempotent.
    fn disconnect(&self);
}

/// A source of connection events, drained once per tick.
pub trait Transport {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Returns the events queued since the previous call, in order.
    /// An implementation may cap the batch; whatever is left over comes
    /// back on the next call.
    fn poll_events(&mut self) -> Vec<TransportEvent<Self::Connection>>;

    /// Stops accepting connections and closes the live ones.
    fn shutdown(&mut self);
}
