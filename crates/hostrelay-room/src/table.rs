//! Active rooms by name.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::{Room, RoomError};

/// Active rooms, keyed by name. A name maps to at most one room.
#[derive(Debug)]
pub struct RoomTable<C> {
    rooms: HashMap<String, Arc<Room<C>>>,
}

impl<C> Default for RoomTable<C> {
    fn default() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }
}

impl<C> RoomTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `room` under its own name.
    ///
    /// # Errors
    /// [`RoomError::RoomExists`] if the name is taken; the table is left
    /// unchanged.
    pub fn create(&mut self, room: Arc<Room<C>>) -> Result<(), RoomError> {
        match self.rooms.entry(room.name().to_string()) {
            Entry::Occupied(_) => Err(RoomError::RoomExists),
            Entry::Vacant(slot) => {
                slot.insert(room);
                Ok(())
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<Arc<Room<C>>> {
        self.rooms.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Room<C>>> {
        self.rooms.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Room<C>>> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Arc<Room<C>>> + '_ {
        self.rooms.drain().map(|(_, room)| room)
    }
}
