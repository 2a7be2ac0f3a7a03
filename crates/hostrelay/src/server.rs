//! `RelayServer`: the WebSocket transport driven by the tick loop.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use hostrelay_tick::TickScheduler;
use hostrelay_transport::{Transport, WebSocketConnection, WebSocketTransport};

use crate::{RelayConfig, RelayEngine, RelayError, StatsHandle};

/// A bound relay, ready to [`run`](Self::run).
pub struct RelayServer {
    config: RelayConfig,
    transport: WebSocketTransport,
    engine: RelayEngine<WebSocketConnection>,
}

impl RelayServer {
    /// Validates `config` and binds the relay listener.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let config = config.validated();
        let transport =
            WebSocketTransport::bind(&config.bind_addr(), config.websocket_config()).await?;
        let engine = RelayEngine::new(&config);
        Ok(Self {
            config,
            transport,
            engine,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Statistics for the health endpoint; stays valid after `run` ends.
    pub fn stats(&self) -> StatsHandle<WebSocketConnection> {
        self.engine.stats()
    }

    /// Runs the processing loop until `shutdown` resolves.
    ///
    /// Each tick drains the transport into the engine, then reaps stale
    /// rooms.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), RelayError> {
        let mut scheduler = TickScheduler::new(self.config.tick_config());
        self.engine.start();
        tracing::info!(
            addr = %self.transport.local_addr(),
            tick_rate_hz = scheduler.tick_rate_hz(),
            max_rooms = self.config.max_rooms,
            max_clients_per_room = self.config.max_clients_per_room,
            "relay server running"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = scheduler.wait_for_tick() => {
                    let events = self.transport.poll_events();
                    self.engine.tick(events, Instant::now());
                    scheduler.record_tick_end();
                }
            }
        }

        let metrics = scheduler.metrics();
        tracing::info!(
            ticks = metrics.total_ticks,
            overruns = metrics.total_overruns,
            skipped = metrics.total_skipped,
            avg_tick_us = metrics.avg_tick_time.as_micros() as u64,
            max_tick_us = metrics.max_tick_time.as_micros() as u64,
            "relay server shutting down"
        );
        self.engine.stop();
        self.transport.shutdown();
        Ok(())
    }
}
