//! Connection id allocation with reuse of released ids.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Mutex, PoisonError};

use crate::ConnectionId;

/// Hands out connection ids, preferring the lowest released one.
///
/// Keeping ids small matters because they travel on the wire as int32.
#[derive(Debug, Default)]
pub struct IdAllocator {
    pool: Mutex<IdPool>,
}

#[derive(Debug, Default)]
struct IdPool {
    next: u32,
    free: BinaryHeap<Reverse<u32>>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an id not held by any live connection.
    pub fn allocate(&self) -> ConnectionId {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Reverse(id)) = pool.free.pop() {
            return ConnectionId::new(id);
        }
        let id = pool.next;
        pool.next = pool.next.wrapping_add(1);
        ConnectionId::new(id)
    }

    /// Makes `id` available again. Call only after the connection's
    /// `Disconnected` event has been queued.
    pub fn release(&self, id: ConnectionId) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        pool.free.push(Reverse(id.into_inner()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_sequentially_from_zero() {
        let ids = IdAllocator::new();
        assert_eq!(ids.allocate(), ConnectionId::new(0));
        assert_eq!(ids.allocate(), ConnectionId::new(1));
        assert_eq!(ids.allocate(), ConnectionId::new(2));
    }

    #[test]
    fn test_reuses_lowest_released_id_first() {
        let ids = IdAllocator::new();
        for _ in 0..4 {
            ids.allocate();
        }
        ids.release(ConnectionId::new(3));
        ids.release(ConnectionId::new(1));

        assert_eq!(ids.allocate(), ConnectionId::new(1));
        assert_eq!(ids.allocate(), ConnectionId::new(3));
        assert_eq!(ids.allocate(), ConnectionId::new(4));
    }
}
