//! Shutdown signalling and the graceful-close state machine
//!
//! Two sources end a session: an external interrupt ([`ShutdownSignal`])
//! and the inbound dispatcher's completion notification. The
//! [`ShutdownCoordinator`] arbitrates between them and publishes the
//! resulting [`SessionState`] so every loop can stop between iterations.

use crate::dispatcher::{DispatchEnd, DoneWaiter};
use crate::transport::{CloseReason, FrameWriter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Why shutdown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Process interrupt or termination signal
    Interrupt,
    /// Requested programmatically by the embedding application
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => f.write_str("interrupt"),
            ShutdownReason::Requested => f.write_str("requested"),
        }
    }
}

/// Single-fire shutdown latch
///
/// Clones share the same latch. Only the first [`trigger`](Self::trigger)
/// has any effect; once fired it stays fired.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownSignal {
    /// Create an unfired latch
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the latch. Returns `true` only for the call that fired it.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    /// Whether the latch has fired
    pub fn is_triggered(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Reason recorded by the firing call
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Observer handle for loops that must react to the latch
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a [`ShutdownSignal`]
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownReason>>,
}

impl ShutdownListener {
    /// Whether the latch has fired
    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until the latch fires
    ///
    /// Resolves immediately if it already has. Never resolves if every
    /// [`ShutdownSignal`] is dropped without firing.
    pub async fn wait(&mut self) -> ShutdownReason {
        let fired = match self.rx.wait_for(Option::is_some).await {
            Ok(guard) => *guard,
            Err(_) => None,
        };
        match fired {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }
}

/// Lifecycle of one connection session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Heartbeat and dispatcher active
    Running,
    /// Close frame sent, waiting for the peer or the timeout
    ClosingSent,
    /// Terminal: all loops stop
    Closed,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Dispatcher finished before any interrupt; no close frame was sent
    ConnectionLost(DispatchEnd),
    /// Interrupt handled; `acknowledged` is false when the close wait timed out
    Closed {
        /// Dispatcher finished within the close timeout
        acknowledged: bool,
    },
    /// Interrupt handled but the close frame could not be sent
    CloseFailed(String),
}

/// Result of [`ShutdownCoordinator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReport {
    /// How the session ended
    pub end: SessionEnd,
    /// Instant by which the session's loops must have stopped: `close_timeout`
    /// after the interrupt, or after the connection was lost
    pub deadline: Instant,
}

/// Drives `Running → ClosingSent → Closed` for one session
pub struct ShutdownCoordinator {
    writer: FrameWriter,
    close_timeout: Duration,
    connection_id: u64,
}

impl ShutdownCoordinator {
    /// Create a coordinator for the session owning `writer`
    pub fn new(writer: FrameWriter, close_timeout: Duration, connection_id: u64) -> Self {
        Self {
            writer,
            close_timeout,
            connection_id,
        }
    }

    /// Wait for the first of interrupt or dispatcher completion and close the session
    ///
    /// Publishes every transition on `state`. Always ends in
    /// [`SessionState::Closed`]; after an interrupt this takes at most
    /// `close_timeout`, including the close-frame write. The returned
    /// deadline bounds whatever cleanup the caller does afterwards.
    pub async fn run(
        self,
        mut interrupt: ShutdownListener,
        mut done: DoneWaiter,
        state: &watch::Sender<SessionState>,
    ) -> CloseReport {
        let connection_id = self.connection_id;
        let (end, deadline) = tokio::select! {
            biased;

            dispatch_end = done.wait() => {
                info!(
                    connection_id,
                    cause = %dispatch_end,
                    "Connection ended by peer or network"
                );
                let deadline = Instant::now() + self.close_timeout;
                (SessionEnd::ConnectionLost(dispatch_end), deadline)
            }

            reason = interrupt.wait() => {
                info!(connection_id, %reason, "Interrupt received, closing websocket connection");
                let deadline = Instant::now() + self.close_timeout;
                state.send_replace(SessionState::ClosingSent);
                (self.close_gracefully(&mut done, deadline).await, deadline)
            }
        };

        state.send_replace(SessionState::Closed);
        debug!(connection_id, ?end, "Session closed");
        CloseReport { end, deadline }
    }

    async fn close_gracefully(&self, done: &mut DoneWaiter, deadline: Instant) -> SessionEnd {
        let connection_id = self.connection_id;
        let handshake = async {
            self.writer.close(CloseReason::normal()).await?;
            Ok::<_, crate::Error>(done.wait().await)
        };

        match tokio::time::timeout_at(deadline, handshake).await {
            Ok(Ok(dispatch_end)) => {
                debug!(connection_id, cause = %dispatch_end, "Close acknowledged");
                SessionEnd::Closed { acknowledged: true }
            }
            Ok(Err(e)) => {
                error!(connection_id, error = %e, "Failed to send close frame");
                SessionEnd::CloseFailed(e.to_string())
            }
            Err(_) => {
                warn!(
                    connection_id,
                    timeout_ms = self.close_timeout.as_millis() as u64,
                    "Peer did not acknowledge close in time"
                );
                SessionEnd::Closed {
                    acknowledged: false,
                }
            }
        }
    }
}
