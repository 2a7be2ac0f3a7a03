//! Tracing subscriber setup for the binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a fmt subscriber filtered by `RUST_LOG`.
///
/// Without `RUST_LOG`, every hostrelay crate logs at `default_level`.
pub fn setup_logger(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        [
            "hostrelay",
            "hostrelay_transport",
            "hostrelay_protocol",
            "hostrelay_room",
            "hostrelay_tick",
        ]
        .iter()
        .map(|krate| format!("{krate}={default_level}"))
        .collect::<Vec<_>>()
        .join(",")
        .into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
