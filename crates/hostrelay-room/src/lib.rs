//! Room membership for hostrelay.
//!
//! A room is one host plus a capacity-bounded set of clients, keyed by
//! a unique name. This crate holds the state; deciding what to tell
//! peers is the relay engine's job.
//!
//! # Key types
//!
//! - [`Room`] — one room's membership, serialized by its own lock
//! - [`RoomTable`] — active rooms by name
//! - [`ConnectionRegistry`] — which room each connection is in
//! - [`RoomRegistry`] — table and registry updated together
//!
//! # Locking
//!
//! [`RoomRegistry`] is meant to live behind a single outer lock. Each
//! [`Room`] has an inner lock over its members, so a client count can be
//! read without the outer one. When both are needed the outer lock is
//! taken first.

mod error;
mod registry;
mod room;
mod table;

pub use error::RoomError;
pub use registry::{ConnectionRegistry, Departure, RoomRegistry};
pub use room::Room;
pub use table::RoomTable;
