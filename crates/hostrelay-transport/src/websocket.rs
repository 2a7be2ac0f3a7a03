//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each accepted socket runs in its own task:
//!
//! 1. WebSocket upgrade.
//! 2. The first frame is the admission token. It is surfaced as a
//!    [`ConnectionRequest`] and the task waits for the relay's answer.
//! 3. On accept, a writer task drains the outbound queue (and pings),
//!    while the reader loop turns frames into `Received` events.
//! 4. Whatever ends the reader loop becomes the `Disconnected` reason.
//!
//! Both queues are bounded. A full event queue stalls the reader, which
//! pushes back on the peer through TCP. A full outbound queue means the
//! peer is not reading, and the connection is dropped.
//!
//! WebSocket runs over TCP, so every [`DeliveryMethod`] is delivered
//! reliable-ordered.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Connection, ConnectionId, ConnectionRequest, ConnectionState, DeliveryMethod,
    DisconnectReason, IdAllocator, SharedState, Transport, TransportError, TransportEvent,
};

type WsStream = WebSocketStream<TcpStream>;
type EventSender = mpsc::Sender<TransportEvent<WebSocketConnection>>;

/// How long a locally closed connection gets to flush its queue.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Timing and queue limits for [`WebSocketTransport`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// How long a new socket has to present its admission token.
    pub admission_timeout: Duration,
    /// Silence longer than this disconnects the peer.
    pub idle_timeout: Duration,
    /// Interval between server pings. Keeps healthy peers under
    /// `idle_timeout` even when they have nothing to say.
    pub ping_interval: Duration,
    /// Frames queued for one peer before it counts as too slow.
    pub send_queue_capacity: usize,
    /// Events buffered between two polls across all connections.
    pub event_queue_capacity: usize,
    /// Most events a single `poll_events` call returns.
    pub max_events_per_poll: usize,
}

impl WebSocketConfig {
    /// Derives all timings from one connection timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            admission_timeout: timeout,
            idle_timeout: timeout,
            ping_interval: (timeout / 3).max(Duration::from_millis(100)),
            send_queue_capacity: 256,
            event_queue_capacity: 4096,
            max_events_per_poll: 1024,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(10))
    }
}

/// A WebSocket-based [`Transport`].
///
/// Sockets are accepted in the background; [`poll_events`](Transport::poll_events)
/// hands the relay whatever happened since the last tick.
pub struct WebSocketTransport {
    local_addr: SocketAddr,
    events: mpsc::Receiver<TransportEvent<WebSocketConnection>>,
    max_events_per_poll: usize,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str, config: WebSocketConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::BindFailed)?;
        let local_addr = listener.local_addr().map_err(TransportError::BindFailed)?;
        tracing::info!(%local_addr, "WebSocket transport listening");

        let (tx, rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let max_events_per_poll = config.max_events_per_poll.max(1);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            tx,
            Arc::new(IdAllocator::new()),
            config,
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            events: rx,
            max_events_per_poll,
            shutdown,
            accept_task,
        })
    }

    /// Returns the local address the transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;

    fn poll_events(&mut self) -> Vec<TransportEvent<WebSocketConnection>> {
        let mut batch = Vec::new();
        while batch.len() < self.max_events_per_poll {
            match self.events.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        batch
    }

    fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        self.accept_task.abort();
        tracing::info!(local_addr = %self.local_addr, "WebSocket transport shut down");
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: EventSender,
    ids: Arc<IdAllocator>,
    config: WebSocketConfig,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(run_socket(
                    stream,
                    addr,
                    tx.clone(),
                    Arc::clone(&ids),
                    config.clone(),
                    shutdown.clone(),
                ));
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                let addr = listener
                    .local_addr()
                    .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
                let event = TransportEvent::NetworkError {
                    addr,
                    error: TransportError::AcceptFailed(e),
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Drives one socket from upgrade to close.
async fn run_socket(
    stream: TcpStream,
    addr: SocketAddr,
    tx: EventSender,
    ids: Arc<IdAllocator>,
    config: WebSocketConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
            return;
        }
    };
    let (mut sink, mut source) = ws.split();

    let token = match time::timeout(config.admission_timeout, read_token(&mut source)).await {
        Ok(Some(token)) => token,
        Ok(None) | Err(_) => {
            tracing::debug!(%addr, "no admission token presented");
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let (request, decision) = ConnectionRequest::new(addr, token);
    if tx
        .send(TransportEvent::ConnectionRequest(request))
        .await
        .is_err()
    {
        return;
    }
    if !decision.await.unwrap_or(false) {
        let _ = sink.send(Message::Close(None)).await;
        return;
    }

    let id = ids.allocate();
    let (out_tx, out_rx) = mpsc::channel(config.send_queue_capacity.max(1));
    let closer = out_tx.clone();
    let state = SharedState::connected();
    let close = Arc::new(Notify::new());
    let conn = WebSocketConnection {
        id,
        addr,
        state: state.clone(),
        outbound: out_tx,
        close: Arc::clone(&close),
    };
    tracing::debug!(%id, %addr, "accepted WebSocket connection");
    if tx.send(TransportEvent::Connected(conn)).await.is_err() {
        ids.release(id);
        return;
    }

    let writer = tokio::spawn(write_loop(sink, out_rx, config.ping_interval));
    let reason = read_loop(
        &mut source,
        id,
        addr,
        &tx,
        config.idle_timeout,
        &close,
        &mut shutdown,
    )
    .await;
    state.set(ConnectionState::Disconnected);

    match reason {
        DisconnectReason::LocalClose => flush(writer).await,
        DisconnectReason::Shutdown => {
            let _ = closer.try_send(Outbound::Close);
            flush(writer).await;
        }
        _ => writer.abort(),
    }

    let _ = tx.send(TransportEvent::Disconnected { id, reason }).await;
    ids.release(id);
}

/// Lets the writer drain its queue, including the Close frame, for at
/// most `FLUSH_TIMEOUT`.
async fn flush(mut writer: JoinHandle<()>) {
    if time::timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Reads the admission token: the first text or binary frame.
async fn read_token(source: &mut SplitStream<WsStream>) -> Option<String> {
    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.as_str().to_owned()),
            Ok(Message::Binary(data)) => return String::from_utf8(data.to_vec()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn read_loop(
    source: &mut SplitStream<WsStream>,
    id: ConnectionId,
    addr: SocketAddr,
    tx: &EventSender,
    idle_timeout: Duration,
    close: &Notify,
    shutdown: &mut watch::Receiver<bool>,
) -> DisconnectReason {
    loop {
        let next = tokio::select! {
            _ = close.notified() => return DisconnectReason::LocalClose,
            _ = shutdown.changed() => return DisconnectReason::Shutdown,
            next = time::timeout(idle_timeout, source.next()) => next,
        };

        let data: Vec<u8> = match next {
            Err(_) => return DisconnectReason::Timeout,
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => return DisconnectReason::RemoteClose,
            Ok(Some(Ok(Message::Binary(data)))) => data.into(),
            Ok(Some(Ok(Message::Text(text)))) => text.as_bytes().to_vec(),
            // ping/pong/raw frames only count as liveness
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                let _ = tx
                    .send(TransportEvent::NetworkError {
                        addr,
                        error: TransportError::ReceiveFailed(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        )),
                    })
                    .await;
                return DisconnectReason::ConnectionFailed;
            }
        };

        let event = TransportEvent::Received {
            id,
            data,
            delivery: DeliveryMethod::ReliableOrdered,
        };
        if tx.send(event).await.is_err() {
            return DisconnectReason::Shutdown;
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    ping_interval: Duration,
) {
    let mut ping = time::interval(ping_interval);
    ping.tick().await;

    loop {
        tokio::select! {
            msg = outbound.recv() => match msg {
                Some(Outbound::Frame(data)) => {
                    if sink.send(Message::Binary(data.into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                None => break,
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[derive(Debug)]
enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// A single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    state: SharedState,
    outbound: mpsc::Sender<Outbound>,
    close: Arc<Notify>,
}

impl Connection for WebSocketConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send(&self, data: &[u8], _delivery: DeliveryMethod) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        match self.outbound.try_send(Outbound::Frame(data.to_vec())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    id = %self.id,
                    addr = %self.addr,
                    "send queue full, dropping slow peer"
                );
                self.disconnect();
                Err(TransportError::SendQueueFull(self.id))
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::ConnectionClosed(self.id)),
        }
    }

    fn disconnect(&self) {
        if self
            .state
            .transition(ConnectionState::Connected, ConnectionState::Disconnecting)
        {
            // A full queue gets no Close frame; the flush timeout still
            // bounds the teardown.
            let _ = self.outbound.try_send(Outbound::Close);
            self.close.notify_one();
        }
    }
}
