//! A single room: host identity, clients, capacity, activity clock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use hostrelay_transport::{Connection, ConnectionId};

use crate::RoomError;

/// Membership state guarded by the room's own lock.
#[derive(Debug)]
struct Members<C> {
    clients: HashMap<ConnectionId, C>,
    last_activity: Instant,
}

/// One host and up to `max_clients` clients.
///
/// The room keeps only the host's id. Its handle belongs to whoever
/// tracks live connections, so a closed host never dangles here.
#[derive(Debug)]
pub struct Room<C> {
    name: String,
    host_id: ConnectionId,
    max_clients: usize,
    created_at: Instant,
    members: Mutex<Members<C>>,
}

impl<C> Room<C> {
    /// Creates an empty room owned by `host_id`.
    pub fn new(name: impl Into<String>, host_id: ConnectionId, max_clients: usize) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            host_id,
            max_clients,
            created_at: now,
            members: Mutex::new(Members {
                clients: HashMap::new(),
                last_activity: now,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host_id(&self) -> ConnectionId {
        self.host_id
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    // Membership is a plain map; a panic mid-update cannot leave it
    // half-written, so a poisoned lock is still safe to use.
    fn members(&self) -> MutexGuard<'_, Members<C>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Removes a client. Returns whether it was a member.
    pub fn remove_client(&self, id: ConnectionId) -> bool {
        let mut members = self.members();
        let removed = members.clients.remove(&id).is_some();
        if removed {
            refresh(&mut members, Instant::now());
        }
        removed
    }

    /// Ids of every client, sorted.
    pub fn all_client_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.members().clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn client_count(&self) -> usize {
        self.members().clients.len()
    }

    pub fn is_full(&self) -> bool {
        self.client_count() >= self.max_clients
    }

    pub fn is_empty(&self) -> bool {
        self.members().clients.is_empty()
    }

    // -----------------------------------------------------------------------
    // Activity
    // -----------------------------------------------------------------------

    /// Records activity now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Records activity at `at`. Never moves the clock backwards.
    pub fn touch_at(&self, at: Instant) {
        refresh(&mut self.members(), at);
    }

    pub fn last_activity(&self) -> Instant {
        self.members().last_activity
    }
}

impl<C: Connection> Room<C> {
    /// Admits `client`.
    ///
    /// # Errors
    /// - [`RoomError::RoomFull`] if every slot is taken.
    /// - [`RoomError::JoinRejected`] if `client` is the host or already
    ///   a member.
    pub fn try_add_client(&self, client: C) -> Result<(), RoomError> {
        let id = client.id();
        if id == self.host_id {
            return Err(RoomError::JoinRejected);
        }
        let mut members = self.members();
        if members.clients.len() >= self.max_clients {
            return Err(RoomError::RoomFull);
        }
        if members.clients.contains_key(&id) {
            return Err(RoomError::JoinRejected);
        }
        members.clients.insert(id, client);
        refresh(&mut members, Instant::now());
        Ok(())
    }

    pub fn get_client(&self, id: ConnectionId) -> Option<C> {
        self.members().clients.get(&id).cloned()
    }

    /// Handles of every client, in no particular order.
    pub fn all_clients(&self) -> Vec<C> {
        self.members().clients.values().cloned().collect()
    }
}

fn refresh<C>(members: &mut Members<C>, at: Instant) {
    members.last_activity = members.last_activity.max(at);
}
