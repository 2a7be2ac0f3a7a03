//! The relay engine: room protocol state machine and forwarding.
//!
//! The engine consumes one transport event at a time. Nothing here
//! blocks: sends are queued on the connection and every state change
//! completes inside the call that received the event.
//!
//! ```text
//! TransportEvent ─▶ handle_event ─▶ on_receive ─▶ decode_client ─▶ handle_*
//!                                        │                            │
//!                                        ◀──── Error frame ◀── RequestError
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use hostrelay_protocol::{
    ClientPacket, ProtocolError, ServerPacket, decode_client, encode_server, split_host_data,
};
use hostrelay_room::{Departure, Room};
use hostrelay_transport::{
    Connection, ConnectionId, ConnectionRequest, DeliveryMethod, DisconnectReason, TransportEvent,
};

use crate::stats::{RelayState, StatsHandle, format_uptime};
use crate::{Reaper, RelayConfig, RequestError};

/// Sent to every client when its host closes the room.
pub const ROOM_CLOSED_MESSAGE: &str = "Room closed by host";

/// Runs the room protocol over connections of type `C`.
///
/// The engine owns the live-connection table; rooms store only their
/// host's id and resolve the handle here when they need it.
pub struct RelayEngine<C: Connection> {
    admission_token: String,
    max_clients_per_room: usize,
    reaper: Reaper,
    peers: HashMap<ConnectionId, C>,
    state: Arc<Mutex<RelayState<C>>>,
}

impl<C: Connection> RelayEngine<C> {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            admission_token: config.admission_token.clone(),
            max_clients_per_room: config.max_clients_per_room,
            reaper: Reaper::new(config.room_idle_timeout),
            peers: HashMap::new(),
            state: Arc::new(Mutex::new(RelayState::new(config.max_rooms))),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn start(&mut self) {
        let mut state = self.lock();
        state.running = true;
        state.started_at = Some(Instant::now());
        state.stopped_at = None;
        tracing::info!("relay engine started");
    }

    /// Drops every room and registration and logs the final statistics.
    pub fn stop(&mut self) {
        let mut state = self.lock();
        state.running = false;
        state.stopped_at = Some(Instant::now());
        let stats = state.snapshot();
        state.rooms.clear();
        drop(state);

        tracing::info!(
            uptime = %format_uptime(stats.uptime),
            total_connections = stats.total_connections,
            total_rooms = stats.total_rooms_created,
            active_rooms = stats.active_rooms,
            "relay engine stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn stats(&self) -> StatsHandle<C> {
        StatsHandle::new(Arc::clone(&self.state))
    }

    /// Number of live connections the engine knows about.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn find_room(&self, name: &str) -> Option<Arc<Room<C>>> {
        self.lock().rooms.find(name)
    }

    /// The room `id` is registered to, as host or client.
    pub fn room_of(&self, id: ConnectionId) -> Option<Arc<Room<C>>> {
        self.lock().rooms.lookup(id)
    }

    /// Processes one tick's batch of events in order, then reaps stale
    /// rooms once.
    pub fn tick(&mut self, events: Vec<TransportEvent<C>>, now: Instant) {
        for event in events {
            self.handle_event(event);
        }
        self.reap(now);
    }

    /// Closes rooms that are empty and either hostless or idle.
    /// Returns the names of the rooms removed.
    pub fn reap(&mut self, now: Instant) -> Vec<String> {
        let peers = &self.peers;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.reaper.sweep(
            &mut state.rooms,
            |id| peers.get(&id).is_some_and(Connection::is_connected),
            now,
        )
    }

    // Lifecycle paths never leave the registry half-updated, so a
    // poisoned lock is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, RelayState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_for_request(&self) -> Result<MutexGuard<'_, RelayState<C>>, RequestError> {
        self.state
            .lock()
            .map_err(|_| RequestError::Internal("relay state lock poisoned".to_string()))
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    pub fn handle_event(&mut self, event: TransportEvent<C>) {
        match event {
            TransportEvent::ConnectionRequest(request) => self.on_connection_request(request),
            TransportEvent::Connected(conn) => self.on_peer_connected(conn),
            TransportEvent::Received { id, data, delivery } => self.on_receive(id, &data, delivery),
            TransportEvent::Disconnected { id, reason } => self.on_peer_disconnected(id, reason),
            TransportEvent::NetworkError { addr, error } => {
                tracing::warn!(%addr, %error, "network error");
            }
        }
    }

    /// Admits the peer only if it presented the admission token.
    pub fn on_connection_request(&mut self, request: ConnectionRequest) {
        if request.token() == self.admission_token {
            tracing::debug!(addr = %request.remote_addr(), "admission accepted");
            request.accept();
        } else {
            tracing::warn!(addr = %request.remote_addr(), "admission rejected: bad token");
            request.reject();
        }
    }

    pub fn on_peer_connected(&mut self, conn: C) {
        let id = conn.id();
        tracing::info!(peer = %id, addr = %conn.remote_addr(), "peer connected");
        self.peers.insert(id, conn);
        self.lock().total_connections += 1;
    }

    /// Same effect as `LeaveRoom`, minus any reply to the peer that left.
    pub fn on_peer_disconnected(&mut self, id: ConnectionId, reason: DisconnectReason) {
        self.peers.remove(&id);
        tracing::info!(peer = %id, %reason, "peer disconnected");
        let departure = self.lock().rooms.depart(id);
        if let Some(departure) = departure {
            self.announce_departure(id, departure);
        }
    }

    /// Decodes and handles one frame. The only place a failed request
    /// turns into an `Error` frame.
    ///
    /// Frames from a peer that is already disconnecting (evicted, or
    /// closed by the transport) are dropped unread.
    pub fn on_receive(&mut self, id: ConnectionId, data: &[u8], delivery: DeliveryMethod) {
        let Some(peer) = self.live_peer(id).cloned() else {
            tracing::debug!(peer = %id, "frame from unknown or closing peer dropped");
            return;
        };

        let result = match decode_client(data) {
            Ok(ClientPacket::CreateRoom { name, max_clients }) => {
                self.handle_create_room(&peer, &name, max_clients)
            }
            Ok(ClientPacket::JoinRoom { name }) => self.handle_join_room(&peer, &name),
            Ok(ClientPacket::LeaveRoom) => {
                self.handle_leave_room(&peer);
                Ok(())
            }
            Ok(ClientPacket::Data { payload }) => {
                self.handle_data(&peer, payload, delivery)
            }
            Err(e @ (ProtocolError::Empty | ProtocolError::UnknownTag(_))) => {
                tracing::debug!(peer = %id, error = %e, "unrecognized frame dropped");
                return;
            }
            Err(e) => Err(RequestError::Malformed(e)),
        };

        if let Err(e) = result {
            match &e {
                RequestError::Internal(_) => {
                    tracing::error!(peer = %id, error = %e, "request failed");
                }
                _ => tracing::debug!(peer = %id, error = %e, "request refused"),
            }
            let message = e.peer_message();
            self.send(
                &peer,
                &ServerPacket::Error(&message),
                DeliveryMethod::ReliableOrdered,
            );
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    fn handle_create_room(
        &mut self,
        peer: &C,
        name: &str,
        max_clients: i32,
    ) -> Result<(), RequestError> {
        if name.trim().is_empty() {
            return Err(RequestError::Validation("Room name cannot be empty".to_string()));
        }
        let max = self.max_clients_per_room;
        let max_clients = usize::try_from(max_clients)
            .ok()
            .filter(|n| (1..=max).contains(n))
            .ok_or_else(|| {
                RequestError::Validation(format!(
                    "Invalid max clients count. Must be between 1 and {max}"
                ))
            })?;

        {
            let mut state = self.lock_for_request()?;
            state.rooms.create_room(name, peer.id(), max_clients)?;
            state.total_rooms_created += 1;
        }

        self.send(peer, &ServerPacket::RoomCreated, DeliveryMethod::ReliableOrdered);
        Ok(())
    }

    fn handle_join_room(&mut self, peer: &C, name: &str) -> Result<(), RequestError> {
        let room = self.lock_for_request()?.rooms.join_room(name, peer.clone())?;

        self.send(peer, &ServerPacket::RoomJoined, DeliveryMethod::ReliableOrdered);
        if let Some(host) = self.live_peer(room.host_id()) {
            self.send(
                host,
                &ServerPacket::ClientConnected(peer.id()),
                DeliveryMethod::ReliableOrdered,
            );
        }
        Ok(())
    }

    fn handle_leave_room(&mut self, peer: &C) {
        let id = peer.id();
        let departure = self.lock().rooms.depart(id);
        match departure {
            Some(departure) => self.announce_departure(id, departure),
            None => tracing::debug!(peer = %id, "leave from peer not in a room"),
        }
    }

    fn handle_data(
        &mut self,
        peer: &C,
        payload: &[u8],
        delivery: DeliveryMethod,
    ) -> Result<(), RequestError> {
        let id = peer.id();
        let Some(room) = self.lock_for_request()?.rooms.lookup(id) else {
            tracing::debug!(peer = %id, "data from peer not in a room dropped");
            return Ok(());
        };
        room.touch();

        if id == room.host_id() {
            let (target, body) = split_host_data(payload)?;
            match room.get_client(target).filter(Connection::is_connected) {
                Some(client) => self.send(&client, &ServerPacket::HostData(body), delivery),
                None => {
                    tracing::debug!(
                        room = %room.name(),
                        %target,
                        "host data for absent client dropped"
                    );
                }
            }
        } else {
            match self.live_peer(room.host_id()) {
                Some(host) => self.send(
                    host,
                    &ServerPacket::ClientData {
                        sender: id,
                        payload,
                    },
                    delivery,
                ),
                None => tracing::debug!(room = %room.name(), "client data for absent host dropped"),
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Room closure and notifications
    // -----------------------------------------------------------------------

    /// Closes the room called `name`: every client is told and then
    /// disconnected, and every member is unregistered. Returns whether
    /// the room existed.
    pub fn close_room(&mut self, name: &str) -> bool {
        let clients = self.lock().rooms.close_room(name);
        match clients {
            Some(clients) => {
                self.evict(name, &clients);
                true
            }
            None => false,
        }
    }

    fn announce_departure(&self, id: ConnectionId, departure: Departure<C>) {
        match departure {
            Departure::Client { room } => {
                if let Some(host) = self.live_peer(room.host_id()) {
                    self.send(
                        host,
                        &ServerPacket::ClientDisconnected(id),
                        DeliveryMethod::ReliableOrdered,
                    );
                }
            }
            Departure::Host { room, clients } => {
                tracing::info!(room = %room.name(), host = %id, "host left, room closed");
                self.evict(room.name(), &clients);
            }
        }
    }

    fn evict(&self, room: &str, clients: &[C]) {
        for client in clients {
            self.send(
                client,
                &ServerPacket::Error(ROOM_CLOSED_MESSAGE),
                DeliveryMethod::ReliableOrdered,
            );
            client.disconnect();
        }
        if !clients.is_empty() {
            tracing::info!(%room, clients = clients.len(), "clients evicted");
        }
    }

    fn live_peer(&self, id: ConnectionId) -> Option<&C> {
        self.peers.get(&id).filter(|conn| conn.is_connected())
    }

    fn send(&self, conn: &C, packet: &ServerPacket<'_>, delivery: DeliveryMethod) {
        let frame = match encode_server(packet) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(
                    peer = %conn.id(),
                    packet = %packet.packet_type(),
                    error = %e,
                    "encode failed"
                );
                return;
            }
        };
        if let Err(e) = conn.send(&frame, delivery) {
            tracing::debug!(peer = %conn.id(), error = %e, "send dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use hostrelay_protocol::{decode_server, encode_client};
    use hostrelay_transport::MemoryConnection;

    use super::*;

    fn engine() -> RelayEngine<MemoryConnection> {
        let mut engine = RelayEngine::new(&RelayConfig::default());
        engine.start();
        engine
    }

    fn connect(engine: &mut RelayEngine<MemoryConnection>, n: u32) -> MemoryConnection {
        let conn = MemoryConnection::loopback(n);
        engine.on_peer_connected(conn.clone());
        conn
    }

    fn request(
        engine: &mut RelayEngine<MemoryConnection>,
        conn: &MemoryConnection,
        packet: ClientPacket<'_>,
    ) {
        let frame = encode_client(&packet).unwrap();
        engine.on_receive(conn.id(), &frame, DeliveryMethod::ReliableOrdered);
    }

    fn last_error(conn: &MemoryConnection) -> Option<String> {
        conn.take_sent()
            .into_iter()
            .rev()
            .find_map(|frame| match decode_server(&frame.data) {
                Ok(ServerPacket::Error(message)) => Some(message.to_string()),
                _ => None,
            })
    }

    #[test]
    fn test_start_and_stop() {
        let mut engine = RelayEngine::<MemoryConnection>::new(&RelayConfig::default());
        assert!(!engine.is_running());
        engine.start();
        assert!(engine.is_running());
        engine.stop();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_uptime_stops_with_the_relay() {
        let mut engine = engine();
        engine.stop();
        let stopped = engine.stats().snapshot().uptime;
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(engine.stats().snapshot().uptime, stopped);

        engine.start();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(engine.stats().snapshot().uptime >= std::time::Duration::from_millis(20));
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut engine = engine();
        let host = connect(&mut engine, 1);
        let blank = ClientPacket::CreateRoom {
            name: "   ".into(),
            max_clients: 2,
        };
        request(&mut engine, &host, blank);
        assert_eq!(last_error(&host).as_deref(), Some("Room name cannot be empty"));
    }

    #[test]
    fn test_max_clients_bounds() {
        let mut engine = engine();
        let host = connect(&mut engine, 1);
        for bad in [0, -1, 101] {
            let create = ClientPacket::CreateRoom {
                name: "abc".into(),
                max_clients: bad,
            };
            request(&mut engine, &host, create);
            assert_eq!(
                last_error(&host).as_deref(),
                Some("Invalid max clients count. Must be between 1 and 100")
            );
        }
        let create = ClientPacket::CreateRoom {
            name: "abc".into(),
            max_clients: 100,
        };
        request(&mut engine, &host, create);
        assert_eq!(last_error(&host), None);
    }

    #[test]
    fn test_unknown_peer_frames_are_ignored() {
        let mut engine = engine();
        engine.on_receive(ConnectionId::new(99), &[2], DeliveryMethod::ReliableOrdered);
        assert_eq!(engine.peer_count(), 0);
    }

    #[test]
    fn test_connected_peers_are_counted() {
        let mut engine = engine();
        connect(&mut engine, 1);
        connect(&mut engine, 2);
        engine.on_peer_disconnected(ConnectionId::new(1), DisconnectReason::RemoteClose);
        assert_eq!(engine.peer_count(), 1);
        assert_eq!(engine.stats().snapshot().total_connections, 2);
    }

    #[test]
    fn test_close_room_unknown_name() {
        let mut engine = engine();
        assert!(!engine.close_room("nope"));
    }
}
