//! hostrelay server binary.
//!
//! ```not_rust
//! hostrelay
//! hostrelay --port 9050 --max-rooms 500 --tick-rate 60 --health-port 8080
//! ```

use std::time::Duration;

use clap::{Parser, ValueEnum};
use hostrelay::tick::TickPolicy;
use hostrelay::{RelayConfig, RelayError, RelayServer, health, setup_logger};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Parser, Debug)]
#[command(name = "hostrelay")]
#[command(about = "Room relay between one host and its clients", long_about = None)]
struct Args {
    /// Relay listen port
    #[arg(short = 'p', long, default_value_t = 9050)]
    port: u16,

    /// Maximum number of concurrent rooms
    #[arg(short = 'r', long, default_value_t = 1000)]
    max_rooms: usize,

    /// Processing ticks per second (1-128)
    #[arg(short = 't', long = "tick-rate", default_value_t = 30)]
    tick_rate: u32,

    /// What to do when a tick fires late
    #[arg(long, value_enum, default_value_t = PolicyArg::Skip)]
    tick_policy: PolicyArg,

    /// Missed ticks replayed back to back under `catch-up`
    #[arg(long, default_value_t = 3)]
    max_catchup: u32,

    /// Maximum clients allowed in one room
    #[arg(long, default_value_t = 100)]
    max_clients: usize,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Health endpoint port
    #[arg(long, default_value_t = 8080)]
    health_port: u16,

    /// Address to bind both listeners to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Admission token peers must present
    #[arg(long, default_value = hostrelay::DEFAULT_ADMISSION_TOKEN)]
    token: String,

    /// Seconds an empty room may stay idle before it is reaped
    #[arg(long, default_value_t = 300)]
    idle_timeout_secs: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Skip,
    CatchUp,
    Drop,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            bind_host: args.bind,
            max_rooms: args.max_rooms,
            tick_rate_hz: args.tick_rate,
            tick_policy: match args.tick_policy {
                PolicyArg::Skip => TickPolicy::Skip,
                PolicyArg::CatchUp => TickPolicy::CatchUp {
                    max_catchup: args.max_catchup,
                },
                PolicyArg::Drop => TickPolicy::Drop,
            },
            timeout_secs: args.timeout,
            max_clients_per_room: args.max_clients,
            health_port: args.health_port,
            admission_token: args.token,
            room_idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    setup_logger("info");

    let config = RelayConfig::from(Args::parse()).validated();
    let health_listener = TcpListener::bind(config.health_addr()).await?;
    let server = RelayServer::bind(config).await?;
    tracing::info!(addr = %server.local_addr(), "press Ctrl+C to stop");

    let (stop_health, health_stopped) = oneshot::channel::<()>();
    let health_task = tokio::spawn(health::serve(health_listener, server.stats(), async move {
        let _ = health_stopped.await;
    }));

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
            }
        })
        .await?;

    let _ = stop_health.send(());
    match health_task.await {
        Ok(result) => result?,
        Err(e) => tracing::error!(error = %e, "health endpoint task failed"),
    }
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_relay_config() {
        let args = Args::try_parse_from(["hostrelay"]).unwrap();
        assert_eq!(RelayConfig::from(args), RelayConfig::default());
    }

    #[test]
    fn test_catch_up_policy_takes_max_catchup() {
        let args = Args::try_parse_from([
            "hostrelay",
            "--tick-policy",
            "catch-up",
            "--max-catchup",
            "5",
        ])
        .unwrap();
        let config = RelayConfig::from(args);
        assert_eq!(config.tick_policy, TickPolicy::CatchUp { max_catchup: 5 });
    }
}
