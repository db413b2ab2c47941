//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. Every section is `#[serde(default)]`
//! so partial JSON files are accepted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FanoutSettings {
    /// Listener and identity settings.
    pub server: ServerSettings,
    /// Per-connection limits and timers.
    pub connection: ConnectionSettings,
    /// Hub request channel settings.
    pub hub: HubSettings,
    /// Publish/subscribe bus settings.
    pub bus: BusSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl FanoutSettings {
    /// Correct invalid invariants in place.
    ///
    /// Out-of-range values are replaced with a warning rather than rejected.
    pub fn validate(&mut self) {
        let conn = &mut self.connection;
        if conn.pong_wait_ms == 0 {
            tracing::warn!("pong_wait_ms must be positive, using default");
            conn.pong_wait_ms = ConnectionSettings::default().pong_wait_ms;
        }
        if conn.ping_period_ms == 0 || conn.ping_period_ms >= conn.pong_wait_ms {
            let corrected = conn.pong_wait_ms * 9 / 10;
            tracing::warn!(
                ping_period_ms = conn.ping_period_ms,
                pong_wait_ms = conn.pong_wait_ms,
                corrected,
                "ping period must be shorter than pong wait"
            );
            conn.ping_period_ms = corrected.max(1);
        }
        if conn.write_wait_ms == 0 {
            tracing::warn!("write_wait_ms must be positive, using default");
            conn.write_wait_ms = ConnectionSettings::default().write_wait_ms;
        }
        if conn.mailbox_capacity == 0 {
            tracing::warn!("mailbox_capacity must be at least 1");
            conn.mailbox_capacity = 1;
        }
        if conn.max_message_size == 0 {
            tracing::warn!("max_message_size must be positive, using default");
            conn.max_message_size = ConnectionSettings::default().max_message_size;
        }
        if self.hub.request_buffer == 0 {
            tracing::warn!("hub request_buffer must be at least 1");
            self.hub.request_buffer = 1;
        }
    }
}

/// Listener and identity settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Identity attached to every outbound message as `"from"`.
    pub server_name: String,
    /// Browser origins allowed by CORS. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// Whether `POST /ping` publishes to the bus.
    pub publisher: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            server_name: "server 1".to_string(),
            allowed_origins: vec!["http://localhost:8080".to_string()],
            publisher: true,
        }
    }
}

impl ServerSettings {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Apply a `host:port` or `:port` listen address.
    pub fn set_addr(&mut self, addr: &str) -> Result<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| SettingsError::ListenAddr(addr.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| SettingsError::ListenPort(addr.to_string()))?;
        if !host.is_empty() {
            self.host = host.to_string();
        }
        self.port = port;
        Ok(())
    }
}

/// Per-connection limits and timers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Time allowed for a single frame write.
    pub write_wait_ms: u64,
    /// Time allowed between pongs before the read side gives up.
    pub pong_wait_ms: u64,
    /// Ping interval. Must be less than `pong_wait_ms`.
    pub ping_period_ms: u64,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Outbound mailbox capacity per client.
    pub mailbox_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_wait_ms: 10_000,
            pong_wait_ms: 60_000,
            ping_period_ms: 54_000,
            max_message_size: 512,
            mailbox_capacity: 256,
        }
    }
}

impl ConnectionSettings {
    /// Write deadline per attempt.
    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    /// Idle-read deadline refreshed by pongs.
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Keepalive ping period.
    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }
}

/// Hub request channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Capacity of the hub's request channel. Producers wait when it is full.
    pub request_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            request_buffer: 256,
        }
    }
}

/// Which bus implementation to connect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BusKind {
    /// Process-local broadcast channels.
    #[default]
    InProcess,
    /// NATS core pub/sub.
    Nats,
}

impl std::str::FromStr for BusKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "inprocess" | "in-process" | "memory" => Ok(Self::InProcess),
            "nats" => Ok(Self::Nats),
            other => Err(SettingsError::UnknownBus(other.to_string())),
        }
    }
}

/// Who owns bus subscriptions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionScope {
    /// Every connection opens its own subscription, released on disconnect.
    #[default]
    PerConnection,
    /// One subscription for the whole hub, opened at startup.
    Shared,
}

/// Publish/subscribe bus settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusSettings {
    /// Bus implementation.
    pub kind: BusKind,
    /// Server URL (NATS only).
    pub url: String,
    /// Topic relayed to connected clients.
    pub topic: String,
    /// Subscription ownership.
    pub subscription: SubscriptionScope,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            kind: BusKind::InProcess,
            url: "nats://127.0.0.1:4222".to_string(),
            topic: "com.testws.updates".to_string(),
            subscription: SubscriptionScope::PerConnection,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace` .. `error`).
    pub level: String,
    /// JSON lines output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}
