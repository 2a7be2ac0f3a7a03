//! Relay configuration, fixed at startup.

use std::time::Duration;

use hostrelay_tick::{TickConfig, TickPolicy};
use hostrelay_transport::WebSocketConfig;

/// Admission token peers must present unless configured otherwise.
pub const DEFAULT_ADMISSION_TOKEN: &str = "PurrRelay";

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Everything the relay reads at startup.
///
/// Call [`validated`](Self::validated) before use; out-of-range values
/// are clamped with a warning rather than refused.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Relay (WebSocket) listen port.
    pub port: u16,
    pub bind_host: String,
    /// Ceiling on concurrently active rooms.
    pub max_rooms: usize,
    /// Processing loop rate, 1–128 Hz.
    pub tick_rate_hz: u32,
    /// What the loop does when a tick fires late.
    pub tick_policy: TickPolicy,
    /// Connection timeout handed to the transport.
    pub timeout_secs: u64,
    /// Upper bound for a room's `max_clients`.
    pub max_clients_per_room: usize,
    pub health_port: u16,
    pub admission_token: String,
    /// Empty rooms idle longer than this are reaped.
    pub room_idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 9050,
            bind_host: "0.0.0.0".to_string(),
            max_rooms: 1000,
            tick_rate_hz: 30,
            tick_policy: TickPolicy::Skip,
            timeout_secs: 10,
            max_clients_per_room: 100,
            health_port: 8080,
            admission_token: DEFAULT_ADMISSION_TOKEN.to_string(),
            room_idle_timeout: Duration::from_secs(5 * 60),
        }
    }
}

impl RelayConfig {
    /// Clamps every field into its valid range.
    pub fn validated(mut self) -> Self {
        if self.max_rooms == 0 {
            tracing::warn!("max_rooms must be at least 1, using 1");
            self.max_rooms = 1;
        }
        let rate = self
            .tick_rate_hz
            .clamp(TickConfig::MIN_TICK_RATE_HZ, TickConfig::MAX_TICK_RATE_HZ);
        if rate != self.tick_rate_hz {
            tracing::warn!(requested = self.tick_rate_hz, using = rate, "tick rate out of range");
            self.tick_rate_hz = rate;
        }
        if self.timeout_secs == 0 {
            tracing::warn!("timeout must be at least 1 second, using 1");
            self.timeout_secs = 1;
        }
        if self.max_clients_per_room == 0 {
            tracing::warn!("max_clients_per_room must be at least 1, using 1");
            self.max_clients_per_room = 1;
        }
        if self.admission_token.is_empty() {
            tracing::warn!(using = DEFAULT_ADMISSION_TOKEN, "empty admission token");
            self.admission_token = DEFAULT_ADMISSION_TOKEN.to_string();
        }
        self
    }

    /// `host:port` for the relay listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// `host:port` for the health endpoint.
    pub fn health_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.health_port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::with_timeout(self.timeout())
    }

    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            policy: self.tick_policy,
            ..TickConfig::with_rate(self.tick_rate_hz)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.port, 9050);
        assert_eq!(cfg.max_rooms, 1000);
        assert_eq!(cfg.tick_rate_hz, 30);
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.max_clients_per_room, 100);
        assert_eq!(cfg.health_port, 8080);
        assert_eq!(cfg.admission_token, "PurrRelay");
        assert_eq!(cfg.room_idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_defaults_are_already_valid() {
        assert_eq!(RelayConfig::default().validated(), RelayConfig::default());
    }

    #[test]
    fn test_validated_clamps() {
        let cfg = RelayConfig {
            max_rooms: 0,
            tick_rate_hz: 1000,
            timeout_secs: 0,
            max_clients_per_room: 0,
            admission_token: String::new(),
            ..RelayConfig::default()
        }
        .validated();
        assert_eq!(cfg.max_rooms, 1);
        assert_eq!(cfg.tick_rate_hz, 128);
        assert_eq!(cfg.timeout_secs, 1);
        assert_eq!(cfg.max_clients_per_room, 1);
        assert_eq!(cfg.admission_token, DEFAULT_ADMISSION_TOKEN);
    }

    #[test]
    fn test_addresses() {
        let cfg = RelayConfig {
            bind_host: "127.0.0.1".into(),
            port: 7000,
            health_port: 7001,
            ..RelayConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:7000");
        assert_eq!(cfg.health_addr(), "127.0.0.1:7001");
    }

    #[test]
    fn test_tick_config_carries_rate_and_policy() {
        let cfg = RelayConfig {
            tick_rate_hz: 60,
            tick_policy: TickPolicy::CatchUp { max_catchup: 4 },
            ..RelayConfig::default()
        };
        let tick = cfg.tick_config();
        assert_eq!(tick.tick_rate_hz, 60);
        assert_eq!(tick.policy, TickPolicy::CatchUp { max_catchup: 4 });
        assert_eq!(RelayConfig::default().tick_config().policy, TickPolicy::Skip);
    }

    #[test]
    fn test_transport_timeouts_follow_config() {
        let cfg = RelayConfig {
            timeout_secs: 6,
            ..RelayConfig::default()
        };
        let ws = cfg.websocket_config();
        assert_eq!(ws.idle_timeout, Duration::from_secs(6));
        assert_eq!(ws.ping_interval, Duration::from_secs(2));
    }
}
