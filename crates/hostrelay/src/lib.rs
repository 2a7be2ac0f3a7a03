//! # hostrelay
//!
//! A relay server that lets one host peer and many client peers talk
//! without a direct connection between them. Peers gather in named,
//! capacity-bounded rooms; the relay forwards opaque bytes between a
//! room's host and its clients.
//!
//! ## Layers
//!
//! ```text
//! hostrelay-transport  connections, admission, events
//! hostrelay-protocol   packet tags and the wire codec
//! hostrelay-room       rooms, room table, connection registry
//! hostrelay-tick       fixed-rate processing loop
//! hostrelay            engine, reaper, server, health endpoint
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hostrelay::prelude::*;
//!
//! # async fn run() -> Result<(), RelayError> {
//! let server = RelayServer::bind(RelayConfig::default()).await?;
//! server.run(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

mod config;
mod engine;
mod error;
pub mod health;
mod logger;
mod reaper;
mod server;
mod stats;

pub use config::{DEFAULT_ADMISSION_TOKEN, RelayConfig};
pub use engine::{ROOM_CLOSED_MESSAGE, RelayEngine};
pub use error::{RelayError, RequestError};
pub use logger::setup_logger;
pub use reaper::Reaper;
pub use server::RelayServer;
pub use stats::{RelayStatistics, StatsHandle, format_uptime};

pub use hostrelay_protocol as protocol;
pub use hostrelay_room as room;
pub use hostrelay_tick as tick;
pub use hostrelay_transport as transport;

pub mod prelude {
    pub use crate::{
        RelayConfig, RelayEngine, RelayError, RelayServer, RelayStatistics, StatsHandle,
    };
    pub use hostrelay_transport::{
        Connection, ConnectionId, DeliveryMethod, Transport, TransportEvent,
    };
}
