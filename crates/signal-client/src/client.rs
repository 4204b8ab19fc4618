//! Connection lifecycle: connect → identify → heartbeat + receive → close → (reconnect)

use crate::config::{ClientConfig, DropPolicy};
use crate::dispatcher::{done_channel, DispatchEnd, InboundDispatcher, MessageRouter};
use crate::heartbeat::HeartbeatDriver;
use crate::protocol::{MessageKind, SignalMessage};
use crate::shutdown::{SessionEnd, SessionState, ShutdownCoordinator, ShutdownListener};
use crate::supervisor::ConnectionSupervisor;
use crate::transport::{ConnectionHandle, Connector, WebSocketConnector};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Final result of [`SignalClient::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOutcome {
    /// Interrupt closed an established session
    Interrupted {
        /// Peer acknowledged the close before the timeout
        acknowledged: bool,
    },
    /// Interrupt arrived while no connection was established
    InterruptedBeforeConnect,
    /// Interrupt arrived but the close frame could not be written
    CloseFailed(String),
    /// Session dropped by the peer or network and the drop policy is `Exit`
    ConnectionLost(DispatchEnd),
}

impl ClientOutcome {
    /// Whether the run ended because of an interrupt
    pub fn is_interrupt(&self) -> bool {
        !matches!(self, ClientOutcome::ConnectionLost(_))
    }
}

/// Resilient signaling client
///
/// # Example
///
/// ```ignore
/// use signal_client::{ClientConfig, ShutdownReason, ShutdownSignal, SignalClient};
///
/// let shutdown = ShutdownSignal::new();
/// let client = SignalClient::websocket(ClientConfig::default())?;
/// let outcome = client.run(shutdown.listener()).await?;
/// ```
pub struct SignalClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    router: MessageRouter,
}

impl fmt::Debug for SignalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalClient")
            .field("config", &self.config)
            .field("handlers", &self.router.len())
            .finish_non_exhaustive()
    }
}

impl SignalClient {
    /// Create a client over an arbitrary transport
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` does not validate.
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            router: MessageRouter::new(),
        })
    }

    /// Create a client over tokio-tungstenite
    pub fn websocket(config: ClientConfig) -> Result<Self> {
        let connector = Arc::new(WebSocketConnector::new(config.handshake_timeout()));
        Self::new(config, connector)
    }

    /// Register a callback for inbound messages of `kind`
    pub fn on<F>(mut self, kind: MessageKind, callback: F) -> Self
    where
        F: Fn(SignalMessage) + Send + Sync + 'static,
    {
        self.router = self.router.on(kind, callback);
        self
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run sessions until an interrupt, or until a drop under `DropPolicy::Exit`
    ///
    /// Once `interrupt` has fired no further dial is attempted, and a drop
    /// observed after it fired is reported as an interrupt.
    pub async fn run(self, mut interrupt: ShutdownListener) -> Result<ClientOutcome> {
        let mut supervisor = ConnectionSupervisor::new(&self.config, Arc::clone(&self.connector))?;

        loop {
            let Some(handle) = supervisor.acquire(&mut interrupt).await else {
                return Ok(ClientOutcome::InterruptedBeforeConnect);
            };

            let connected_at = Instant::now();
            match self.run_session(handle, interrupt.clone()).await {
                SessionEnd::Closed { acknowledged } => {
                    return Ok(ClientOutcome::Interrupted { acknowledged });
                }
                SessionEnd::CloseFailed(cause) => {
                    return Ok(ClientOutcome::CloseFailed(cause));
                }
                SessionEnd::ConnectionLost(cause) if interrupt.is_triggered() => {
                    info!(cause = %cause, "Connection lost while shutting down");
                    return Ok(ClientOutcome::Interrupted { acknowledged: false });
                }
                SessionEnd::ConnectionLost(cause) => {
                    if self.config.on_drop == DropPolicy::Exit {
                        return Ok(ClientOutcome::ConnectionLost(cause));
                    }
                    info!(cause = %cause, "Connection lost");
                    supervisor
                        .pause_after_drop(connected_at.elapsed(), &mut interrupt)
                        .await;
                }
            }
        }
    }

    async fn run_session(&self, handle: ConnectionHandle, interrupt: ShutdownListener) -> SessionEnd {
        let connection_id = handle.id();
        let (writer, reader) = handle.into_parts();
        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let (notifier, waiter) = done_channel();

        let mut heartbeat = tokio::spawn(
            HeartbeatDriver::new(writer.clone(), self.config.heartbeat_interval(), connection_id)
                .run(state_rx.clone()),
        );
        let mut dispatcher = tokio::spawn(
            InboundDispatcher::new(reader, self.router.clone(), connection_id).run(state_rx, notifier),
        );

        let report = ShutdownCoordinator::new(writer, self.config.close_timeout(), connection_id)
            .run(interrupt, waiter, &state_tx)
            .await;

        // Both loops observe `Closed`; joins share the close deadline, so a
        // heartbeat blocked inside a write cannot extend shutdown.
        match tokio::time::timeout_at(report.deadline, &mut heartbeat).await {
            Ok(Ok(sent)) => debug!(connection_id, heartbeats = sent, "Heartbeat loop joined"),
            Ok(Err(e)) => warn!(connection_id, error = %e, "Heartbeat task failed"),
            Err(_) => {
                debug!(connection_id, "Heartbeat loop still running at close deadline, aborting");
                heartbeat.abort();
            }
        }
        match tokio::time::timeout_at(report.deadline, &mut dispatcher).await {
            Ok(Ok(summary)) => debug!(
                connection_id,
                received = summary.received,
                malformed = summary.malformed,
                handled = summary.handled,
                "Dispatcher joined"
            ),
            Ok(Err(e)) => warn!(connection_id, error = %e, "Dispatcher task failed"),
            Err(_) => {
                debug!(connection_id, "Dispatcher still running at close deadline, aborting");
                dispatcher.abort();
            }
        }

        info!(connection_id, outcome = ?report.end, "Session ended");
        report.end
    }
}
