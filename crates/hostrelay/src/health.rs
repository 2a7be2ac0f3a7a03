//! HTTP health and status endpoint.
//!
//! | Route | Body |
//! |---|---|
//! | `GET /`, `GET /health` | `{"status","relay"}` |
//! | `GET /status` | status plus a statistics object |
//! | `GET /ping` | `pong` |
//! | anything else | 404 `Not Found` |

use std::future::Future;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use hostrelay_transport::Connection;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::{RelayStatistics, StatsHandle, format_uptime};

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    relay: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    relay: RelayStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayStatus {
    running: bool,
    active_rooms: usize,
    total_connections: u64,
    total_rooms: u64,
    uptime: String,
}

fn health_status(stats: &RelayStatistics) -> &'static str {
    if stats.is_running { "healthy" } else { "unhealthy" }
}

async fn health<C: Connection>(State(stats): State<StatsHandle<C>>) -> Json<HealthBody> {
    let stats = stats.snapshot();
    Json(HealthBody {
        status: health_status(&stats),
        relay: if stats.is_running { "running" } else { "stopped" },
    })
}

async fn status<C: Connection>(State(stats): State<StatsHandle<C>>) -> Json<StatusBody> {
    let stats = stats.snapshot();
    Json(StatusBody {
        status: health_status(&stats),
        relay: RelayStatus {
            running: stats.is_running,
            active_rooms: stats.active_rooms,
            total_connections: stats.total_connections,
            total_rooms: stats.total_rooms_created,
            uptime: format_uptime(stats.uptime),
        },
    })
}

async fn ping() -> &'static str {
    "pong"
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Builds the health router over `stats`.
pub fn router<C: Connection>(stats: StatsHandle<C>) -> Router {
    Router::new()
        .route("/", get(health::<C>))
        .route("/health", get(health::<C>))
        .route("/status", get(status::<C>))
        .route("/ping", get(ping))
        .fallback(not_found)
        .with_state(stats)
}

/// Serves the health endpoint on `listener` until `shutdown` resolves.
pub async fn serve<C: Connection>(
    listener: TcpListener,
    stats: StatsHandle<C>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "health endpoint listening");
    }
    axum::serve(listener, router(stats))
        .with_graceful_shutdown(shutdown)
        .await
}
