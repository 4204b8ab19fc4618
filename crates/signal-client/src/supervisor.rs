//! Connection supervisor: dial with retry, then announce the device identity
//!
//! # Features
//!
//! - Indefinite retry; dial failures are never surfaced to the caller
//! - Fixed delay by default, optional capped exponential backoff
//! - Optional ±25% jitter to spread reconnect storms across devices
//! - Interrupt-aware: a pending dial, announcement or retry wait is abandoned on shutdown
//! - Sessions that drop before one heartbeat period keep backing off

use crate::config::{BackoffStrategy, ClientConfig, ReconnectConfig};
use crate::protocol::DeviceIdentity;
use crate::shutdown::ShutdownListener;
use crate::transport::{ConnectionHandle, Connector, FrameWriter};
use crate::Result;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Delay calculator for consecutive dial failures
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    config: ReconnectConfig,
    failures: u32,
}

impl ReconnectBackoff {
    /// Create a backoff with no recorded failures
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let base = self.config.base_delay_ms;
        let delay_ms = match self.config.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => base
                .saturating_mul(2_u64.saturating_pow(self.failures))
                .min(self.config.max_delay_ms),
        };
        self.failures = self.failures.saturating_add(1);

        if !self.config.jitter {
            return Duration::from_millis(delay_ms);
        }

        let jitter_range = delay_ms / 4;
        let low = delay_ms - jitter_range;
        let high = delay_ms.saturating_add(jitter_range);
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }

    /// Forget recorded failures once a session has proved stable
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Produces live connections, one dial in flight at a time
pub struct ConnectionSupervisor {
    url: Url,
    identity: DeviceIdentity,
    connector: Arc<dyn Connector>,
    backoff: ReconnectBackoff,
    stable_after: Duration,
    attempts: u64,
    connections: u64,
}

impl ConnectionSupervisor {
    /// Create a supervisor for the endpoint and identity in `config`
    pub fn new(config: &ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        Ok(Self {
            url: config.endpoint()?,
            identity: config.identity.clone(),
            connector,
            backoff: ReconnectBackoff::new(config.reconnect.clone()),
            stable_after: config.heartbeat_interval(),
            attempts: 0,
            connections: 0,
        })
    }

    /// Dial until a connection is established and the identity is announced
    ///
    /// Returns `None` only when `interrupt` fires before a connection is
    /// made; no dial is started once it has fired. A failed identity send is
    /// logged and the handle is still returned: the session loops detect a
    /// dead connection on their own. An interrupt during the announcement
    /// abandons it and returns the handle so the session can be closed.
    pub async fn acquire(&mut self, interrupt: &mut ShutdownListener) -> Option<ConnectionHandle> {
        loop {
            if interrupt.is_triggered() {
                info!("Shutdown requested, not dialing");
                return None;
            }

            self.attempts += 1;
            let attempt = self.attempts;
            info!(attempt, "Connecting to {}", self.url);

            let dialed = tokio::select! {
                biased;

                reason = interrupt.wait() => {
                    info!(%reason, attempt, "Shutdown requested while dialing");
                    return None;
                }

                dialed = self.connector.dial(&self.url) => dialed,
            };

            match dialed {
                Ok((sink, reader)) => {
                    self.connections += 1;
                    let connection_id = self.connections;

                    let handle = ConnectionHandle::new(connection_id, self.url.clone(), sink, reader);
                    info!(connection_id, attempt, "Connected successfully.");

                    let writer = handle.writer().clone();
                    tokio::select! {
                        biased;

                        reason = interrupt.wait() => {
                            warn!(connection_id, %reason, "Shutdown requested before identity was sent");
                        }

                        _ = self.announce(&writer, connection_id) => {}
                    }
                    return Some(handle);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Dial failed: {}, retrying in {:?}...",
                        e,
                        delay
                    );

                    tokio::select! {
                        biased;

                        reason = interrupt.wait() => {
                            info!(%reason, "Shutdown requested during retry wait");
                            return None;
                        }

                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Wait before redialing after an established session dropped
    ///
    /// The backoff is reset only if the session stayed up for at least one
    /// heartbeat period, so a server that accepts and immediately hangs up
    /// is redialed with growing delays. Returns early on interrupt.
    pub async fn pause_after_drop(&mut self, uptime: Duration, interrupt: &mut ShutdownListener) {
        if uptime >= self.stable_after {
            self.backoff.reset();
        }

        let delay = self.backoff.next_delay();
        warn!(
            uptime_ms = uptime.as_millis() as u64,
            retry_in_ms = delay.as_millis() as u64,
            "Connection lost, reconnecting in {:?}...",
            delay
        );

        tokio::select! {
            biased;

            reason = interrupt.wait() => {
                info!(%reason, "Shutdown requested during reconnect wait");
            }

            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn announce(&self, writer: &FrameWriter, connection_id: u64) {
        let message = match self.identity.to_json() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Error marshalling device identity");
                return;
            }
        };

        match writer.send_text(message).await {
            Ok(()) => info!(
                connection_id,
                serial = %self.identity.serial,
                mac = %self.identity.mac,
                "Device identity announced"
            ),
            Err(e) => warn!(connection_id, error = %e, "Error sending device identity"),
        }
    }

    /// Total dial attempts so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Connections established so far
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Endpoint being dialed
    pub fn url(&self) -> &Url {
        &self.url
    }
}
