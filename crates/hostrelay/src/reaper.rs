//! Reclaims rooms nobody can use any more.
//!
//! A room is stale when it has no clients and either its host is gone
//! or nothing has happened in it for `idle_timeout`. Clients are absent
//! in both cases, so nobody is told; the host (if still connected) is
//! simply unregistered and may create or join another room.

use std::time::{Duration, Instant};

use hostrelay_room::{Room, RoomRegistry};
use hostrelay_transport::{Connection, ConnectionId};

#[derive(Debug, Clone)]
pub struct Reaper {
    idle_timeout: Duration,
}

impl Reaper {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Whether `room` should be removed at `now`.
    pub fn is_stale<C>(&self, room: &Room<C>, host_live: bool, now: Instant) -> bool {
        if !room.is_empty() {
            return false;
        }
        !host_live || now.saturating_duration_since(room.last_activity()) > self.idle_timeout
    }

    /// Scans every room and closes the stale ones. Returns their names.
    pub fn sweep<C: Connection>(
        &self,
        rooms: &mut RoomRegistry<C>,
        is_live: impl Fn(ConnectionId) -> bool,
        now: Instant,
    ) -> Vec<String> {
        // TODO: index rooms by last activity so a sweep does not visit
        // every room when only a few can be stale.
        let stale: Vec<String> = rooms
            .rooms()
            .iter()
            .filter(|room| self.is_stale(room, is_live(room.host_id()), now))
            .map(|room| room.name().to_string())
            .collect();

        for name in &stale {
            rooms.close_room(name);
            tracing::info!(room = %name, "reaped stale room");
        }
        stale
    }
}
