//! Aggregate counters and the read-only statistics snapshot.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use hostrelay_room::RoomRegistry;
use hostrelay_transport::Connection;

/// State shared between the engine and statistics readers.
///
/// The room registry and the counters sit behind one lock, so a
/// snapshot always agrees with the table at the moment it was taken.
#[derive(Debug)]
pub(crate) struct RelayState<C> {
    pub(crate) rooms: RoomRegistry<C>,
    pub(crate) running: bool,
    pub(crate) started_at: Option<Instant>,
    pub(crate) stopped_at: Option<Instant>,
    pub(crate) total_connections: u64,
    pub(crate) total_rooms_created: u64,
}

impl<C: Connection> RelayState<C> {
    pub(crate) fn new(max_rooms: usize) -> Self {
        Self {
            rooms: RoomRegistry::new(max_rooms),
            running: false,
            started_at: None,
            stopped_at: None,
            total_connections: 0,
            total_rooms_created: 0,
        }
    }

    pub(crate) fn snapshot(&self) -> RelayStatistics {
        RelayStatistics {
            is_running: self.running,
            active_rooms: self.rooms.room_count(),
            total_connections: self.total_connections,
            total_rooms_created: self.total_rooms_created,
            uptime: self.uptime(),
        }
    }

    /// Time since start, frozen once the relay stops.
    fn uptime(&self) -> Duration {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }
}

/// A point-in-time view of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStatistics {
    pub is_running: bool,
    pub active_rooms: usize,
    /// Connections ever admitted.
    pub total_connections: u64,
    /// Rooms ever created.
    pub total_rooms_created: u64,
    pub uptime: Duration,
}

/// Cloneable read-only access to [`RelayStatistics`].
///
/// Holds the relay lock only for the copy.
#[derive(Debug)]
pub struct StatsHandle<C> {
    state: Arc<Mutex<RelayState<C>>>,
}

impl<C> Clone for StatsHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Connection> StatsHandle<C> {
    pub(crate) fn new(state: Arc<Mutex<RelayState<C>>>) -> Self {
        Self { state }
    }

    pub fn snapshot(&self) -> RelayStatistics {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }
}

/// Formats `uptime` as `HH:MM:SS`. Hours keep counting past 24.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
