//! Configuration types for the signaling client

use crate::protocol::DeviceIdentity;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default signaling server address (host:port)
pub const DEFAULT_ADDRESS: &str = "ncus.signal.kinnode.io:8080";

/// Default WebSocket path on the signaling server
pub const DEFAULT_PATH: &str = "/ws";

/// Main configuration for SignalClient
///
/// Built once at startup and handed to the client by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Signaling server address as host:port
    pub address: String,

    /// URL scheme, `ws` or `wss` (default: ws)
    pub scheme: String,

    /// Request path (default: /ws)
    pub path: String,

    /// Identity announced once per established connection
    pub identity: DeviceIdentity,

    /// Heartbeat period in milliseconds (default: 5000ms)
    pub heartbeat_interval_ms: u64,

    /// Bound on dial + WebSocket handshake in milliseconds (default: 45000ms)
    pub handshake_timeout_ms: u64,

    /// Bound on waiting for the peer to acknowledge a close frame (default: 1000ms)
    pub close_timeout_ms: u64,

    /// Delay policy between failed dial attempts
    pub reconnect: ReconnectConfig,

    /// What to do when an established session is dropped by the peer or network
    pub on_drop: DropPolicy,
}

/// Delay policy between failed dial attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay growth strategy (default: Fixed)
    pub strategy: BackoffStrategy,

    /// Delay before the first retry in milliseconds (default: 5000ms)
    pub base_delay_ms: u64,

    /// Upper bound for exponential growth in milliseconds (default: 60000ms)
    pub max_delay_ms: u64,

    /// Apply ±25% jitter to each delay (default: false)
    pub jitter: bool,
}

/// Delay growth strategy between dial attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles per consecutive failure, capped at `max_delay_ms`
    Exponential,
}

/// Policy applied when an established session drops without an interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Stop the client; the process exits with a failure status
    Exit,
    /// Go back to the connection supervisor and dial again
    Reconnect,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            scheme: "ws".to_string(),
            path: DEFAULT_PATH.to_string(),
            identity: DeviceIdentity::default(),
            heartbeat_interval_ms: 5000,
            handshake_timeout_ms: 45_000,
            close_timeout_ms: 1000,
            reconnect: ReconnectConfig::default(),
            on_drop: DropPolicy::Exit,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: 5000,
            max_delay_ms: 60_000,
            jitter: false,
        }
    }
}

impl ClientConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `address` is empty or has no numeric port
    /// - `scheme` is not `ws` or `wss`
    /// - `path` does not start with `/`
    /// - any interval or timeout is zero
    /// - `reconnect.max_delay_ms` is below `reconnect.base_delay_ms`
    /// - the identity serial or mac is empty
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.address.trim().is_empty() {
            return Err(Error::InvalidConfig("address cannot be empty".to_string()));
        }

        match self.address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "address must be host:port, got {}",
                    self.address
                )))
            }
        }

        if self.scheme != "ws" && self.scheme != "wss" {
            return Err(Error::InvalidConfig(format!(
                "scheme must be ws or wss, got {}",
                self.scheme
            )));
        }

        if !self.path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "path must start with '/', got {}",
                self.path
            )));
        }

        for (name, value) in [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("close_timeout_ms", self.close_timeout_ms),
            ("reconnect.base_delay_ms", self.reconnect.base_delay_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be greater than 0", name)));
            }
        }

        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "reconnect.max_delay_ms ({}) must be >= reconnect.base_delay_ms ({})",
                self.reconnect.max_delay_ms, self.reconnect.base_delay_ms
            )));
        }

        if self.identity.serial.is_empty() || self.identity.mac.is_empty() {
            return Err(Error::InvalidConfig(
                "device identity requires both serial and mac".to_string(),
            ));
        }

        self.endpoint().map(|_| ())
    }

    /// Full WebSocket URL of the signaling endpoint
    pub fn endpoint(&self) -> crate::Result<Url> {
        let raw = format!("{}://{}{}", self.scheme, self.address, self.path);
        Url::parse(&raw)
            .map_err(|e| crate::Error::InvalidConfig(format!("invalid endpoint {}: {}", raw, e)))
    }

    /// Heartbeat period
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Dial + handshake bound
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Graceful close bound
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
