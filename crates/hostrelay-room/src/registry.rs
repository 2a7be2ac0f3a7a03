//! Connection → room index, and the pair of structures it must stay
//! consistent with.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use hostrelay_transport::{Connection, ConnectionId};

use crate::{Room, RoomError, RoomTable};

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Which room each connection currently occupies.
///
/// A connection has at most one entry: hosting and joining both go
/// through [`register`](Self::register), which refuses a second room.
#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    entries: HashMap<ConnectionId, Arc<Room<C>>>,
}

impl<C> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<C> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// [`RoomError::AlreadyInRoom`] if `id` is already registered.
    pub fn register(&mut self, id: ConnectionId, room: Arc<Room<C>>) -> Result<(), RoomError> {
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(RoomError::AlreadyInRoom),
            Entry::Vacant(slot) => {
                slot.insert(room);
                Ok(())
            }
        }
    }

    pub fn unregister(&mut self, id: ConnectionId) -> Option<Arc<Room<C>>> {
        self.entries.remove(&id)
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<Arc<Room<C>>> {
        self.entries.get(&id).cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConnectionId, &Arc<Room<C>>)> {
        self.entries.iter().map(|(id, room)| (*id, room))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// RoomRegistry
// ---------------------------------------------------------------------------

/// What happened when a connection left its room.
#[derive(Debug)]
pub enum Departure<C> {
    /// A client left; the room lives on.
    Client { room: Arc<Room<C>> },
    /// The host left and the room was closed. `clients` were members at
    /// closure time and have already been unregistered.
    Host { room: Arc<Room<C>>, clients: Vec<C> },
}

/// The room table and the connection registry, updated as one.
///
/// Every method leaves the two consistent: a connection is registered
/// to a room exactly when it is that room's host or one of its clients,
/// and every registered room is in the table.
#[derive(Debug)]
pub struct RoomRegistry<C> {
    rooms: RoomTable<C>,
    connections: ConnectionRegistry<C>,
    max_rooms: usize,
}

impl<C: Connection> RoomRegistry<C> {
    /// Creates an empty registry that holds at most `max_rooms` rooms.
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: RoomTable::new(),
            connections: ConnectionRegistry::new(),
            max_rooms,
        }
    }

    pub fn rooms(&self) -> &RoomTable<C> {
        &self.rooms
    }

    pub fn connections(&self) -> &ConnectionRegistry<C> {
        &self.connections
    }

    pub fn max_rooms(&self) -> usize {
        self.max_rooms
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn lookup(&self, id: ConnectionId) -> Option<Arc<Room<C>>> {
        self.connections.lookup(id)
    }

    pub fn find(&self, name: &str) -> Option<Arc<Room<C>>> {
        self.rooms.find(name)
    }

    /// Creates a room hosted by `host_id`.
    ///
    /// Checks run in order: room ceiling, name, host membership. The
    /// first failure wins and nothing is changed.
    pub fn create_room(
        &mut self,
        name: &str,
        host_id: ConnectionId,
        max_clients: usize,
    ) -> Result<Arc<Room<C>>, RoomError> {
        if self.rooms.len() >= self.max_rooms {
            return Err(RoomError::ServerFull);
        }
        if self.rooms.contains(name) {
            return Err(RoomError::RoomExists);
        }
        if self.connections.contains(host_id) {
            return Err(RoomError::AlreadyInRoom);
        }

        let room = Arc::new(Room::new(name, host_id, max_clients));
        self.rooms.create(Arc::clone(&room))?;
        self.connections.register(host_id, Arc::clone(&room))?;
        tracing::info!(room = %name, host = %host_id, max_clients, "room created");
        Ok(room)
    }

    /// Adds `client` to the room called `name`.
    ///
    /// Checks run in order: room exists, client membership, capacity.
    pub fn join_room(&mut self, name: &str, client: C) -> Result<Arc<Room<C>>, RoomError> {
        let room = self.rooms.find(name).ok_or(RoomError::RoomNotFound)?;
        let id = client.id();
        if self.connections.contains(id) {
            return Err(RoomError::AlreadyInRoom);
        }
        if room.is_full() {
            return Err(RoomError::RoomFull);
        }

        room.try_add_client(client)?;
        if let Err(e) = self.connections.register(id, Arc::clone(&room)) {
            room.remove_client(id);
            return Err(e);
        }
        tracing::info!(
            room = %name,
            client = %id,
            clients = room.client_count(),
            "client joined"
        );
        Ok(room)
    }

    /// Takes `id` out of whatever room it is in.
    ///
    /// A client is removed from its room. A host closes its room.
    /// Returns `None` if `id` was not in a room.
    pub fn depart(&mut self, id: ConnectionId) -> Option<Departure<C>> {
        let room = self.connections.unregister(id)?;
        if room.host_id() == id {
            let clients = self.close_room(room.name()).unwrap_or_default();
            return Some(Departure::Host { room, clients });
        }

        room.remove_client(id);
        tracing::info!(
            room = %room.name(),
            client = %id,
            clients = room.client_count(),
            "client left"
        );
        Some(Departure::Client { room })
    }

    /// Removes the room called `name` and unregisters its host and every
    /// client. Returns the clients that were members, or `None` if the
    /// room did not exist.
    pub fn close_room(&mut self, name: &str) -> Option<Vec<C>> {
        let room = self.rooms.remove(name)?;
        let clients = room.all_clients();
        self.connections.unregister(room.host_id());
        for client in &clients {
            self.connections.unregister(client.id());
        }
        tracing::info!(room = %name, clients = clients.len(), "room closed");
        Some(clients)
    }

    /// Drops every room and registration.
    pub fn clear(&mut self) {
        let rooms = self.rooms.drain().count();
        self.connections.clear();
        if rooms > 0 {
            tracing::info!(rooms, "cleared all rooms");
        }
    }
}
