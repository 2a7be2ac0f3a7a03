//! In-process transport: connections that record what was sent to them.
//!
//! Used to embed the relay without sockets and to drive it from tests.
//! [`MemoryTransport`] plays the network side: it queues the events a
//! real transport would produce, and [`MemoryConnection`] keeps every
//! outbound frame so callers can inspect it.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::{
    Connection, ConnectionId, ConnectionRequest, ConnectionState, DeliveryMethod,
    DisconnectReason, IdAllocator, SharedState, Transport, TransportError, TransportEvent,
};

/// One frame handed to a [`MemoryConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub data: Vec<u8>,
    pub delivery: DeliveryMethod,
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    addr: SocketAddr,
    state: SharedState,
    sent: Mutex<Vec<SentFrame>>,
    disconnect_requested: AtomicBool,
}

/// A connection whose outbound frames are kept in memory.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    inner: Arc<Inner>,
}

impl MemoryConnection {
    /// Creates a live connection.
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                addr,
                state: SharedState::connected(),
                sent: Mutex::new(Vec::new()),
                disconnect_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a live connection on a loopback address derived from `id`.
    pub fn loopback(id: u32) -> Self {
        let port = 20_000u16.wrapping_add(id as u16);
        Self::new(
            ConnectionId::new(id),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
        )
    }

    /// Removes and returns every frame sent so far.
    pub fn take_sent(&self) -> Vec<SentFrame> {
        let mut sent = self.inner.sent.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *sent)
    }

    /// Number of frames sent and not yet taken.
    pub fn sent_count(&self) -> usize {
        self.inner.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the relay asked for this connection to be closed.
    pub fn disconnect_requested(&self) -> bool {
        self.inner.disconnect_requested.load(Ordering::Acquire)
    }

    /// Marks the connection dead without going through `disconnect()`,
    /// as if the remote side vanished.
    pub fn drop_remote(&self) {
        self.inner.state.set(ConnectionState::Disconnected);
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.inner.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.inner.addr
    }

    fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    fn send(&self, data: &[u8], delivery: DeliveryMethod) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed(self.inner.id));
        }
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentFrame {
                data: data.to_vec(),
                delivery,
            });
        Ok(())
    }

    fn disconnect(&self) {
        self.inner.disconnect_requested.store(true, Ordering::Release);
        self.inner.state.set(ConnectionState::Disconnected);
    }
}

/// Queues transport events by hand.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    events: VecDeque<TransportEvent<MemoryConnection>>,
    ids: IdAllocator,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an admission request; the receiver resolves to the decision.
    pub fn request(&mut self, token: &str) -> oneshot::Receiver<bool> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let (request, decision) = ConnectionRequest::new(addr, token.to_string());
        self.events.push_back(TransportEvent::ConnectionRequest(request));
        decision
    }

    /// Opens a connection with a fresh id and queues `Connected`.
    pub fn connect(&mut self) -> MemoryConnection {
        let id = self.ids.allocate();
        let conn = MemoryConnection::loopback(id.into_inner());
        self.events.push_back(TransportEvent::Connected(conn.clone()));
        conn
    }

    /// Queues a frame from `conn`.
    pub fn deliver(&mut self, conn: &MemoryConnection, data: Vec<u8>, delivery: DeliveryMethod) {
        self.events.push_back(TransportEvent::Received {
            id: conn.id(),
            data,
            delivery,
        });
    }

    /// Closes `conn` and queues `Disconnected`, then frees its id.
    pub fn close(&mut self, conn: &MemoryConnection, reason: DisconnectReason) {
        conn.inner.state.set(ConnectionState::Disconnected);
        self.events.push_back(TransportEvent::Disconnected {
            id: conn.id(),
            reason,
        });
        self.ids.release(conn.id());
    }
}

impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    fn poll_events(&mut self) -> Vec<TransportEvent<MemoryConnection>> {
        self.events.drain(..).collect()
    }

    fn shutdown(&mut self) {
        self.events.clear();
    }
}
