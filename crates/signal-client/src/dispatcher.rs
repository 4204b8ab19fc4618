//! Inbound dispatcher: receive loop, envelope decode and routing by kind

use crate::protocol::{MessageKind, SignalMessage};
use crate::shutdown::SessionState;
use crate::transport::{CloseReason, Frame, FrameStream};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

/// Callback invoked for a decoded message of a registered kind
pub type MessageCallback = Arc<dyn Fn(SignalMessage) + Send + Sync>;

/// Why the receive loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEnd {
    /// Peer sent a close frame
    PeerClosed(Option<CloseReason>),
    /// Receive failed (connection reset, stream ended, protocol error)
    ReadFailed(String),
    /// Session reached `Closed` while the loop was still reading
    SessionClosed,
    /// Notifier dropped without reporting, e.g. the task panicked
    Abandoned,
}

impl fmt::Display for DispatchEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchEnd::PeerClosed(Some(reason)) => {
                write!(f, "peer closed (code {}, reason {:?})", reason.code, reason.reason)
            }
            DispatchEnd::PeerClosed(None) => f.write_str("peer closed"),
            DispatchEnd::ReadFailed(cause) => write!(f, "read error: {}", cause),
            DispatchEnd::SessionClosed => f.write_str("session closed"),
            DispatchEnd::Abandoned => f.write_str("dispatcher abandoned"),
        }
    }
}

/// Create the dispatcher's one-shot completion pair
pub fn done_channel() -> (DoneNotifier, DoneWaiter) {
    let (tx, rx) = oneshot::channel();
    (
        DoneNotifier { tx: Some(tx) },
        DoneWaiter { rx, received: None },
    )
}

/// Sending side of the completion notification
///
/// Fires at most once; further calls are no-ops. Dropping an unfired
/// notifier reports [`DispatchEnd::Abandoned`].
#[derive(Debug)]
pub struct DoneNotifier {
    tx: Option<oneshot::Sender<DispatchEnd>>,
}

impl DoneNotifier {
    /// Report completion. Returns `true` only on the first call.
    pub fn notify(&mut self, end: DispatchEnd) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // Waiter may already be gone once the session is closed
                let _ = tx.send(end);
                true
            }
            None => false,
        }
    }

    /// Whether completion has been reported
    pub fn is_fired(&self) -> bool {
        self.tx.is_none()
    }
}

impl Drop for DoneNotifier {
    fn drop(&mut self) {
        self.notify(DispatchEnd::Abandoned);
    }
}

/// Receiving side of the completion notification
#[derive(Debug)]
pub struct DoneWaiter {
    rx: oneshot::Receiver<DispatchEnd>,
    received: Option<DispatchEnd>,
}

impl DoneWaiter {
    /// Wait for the dispatcher to finish. Cancel safe; repeat calls return the same value.
    pub async fn wait(&mut self) -> DispatchEnd {
        if let Some(end) = &self.received {
            return end.clone();
        }
        let end = (&mut self.rx).await.unwrap_or(DispatchEnd::Abandoned);
        self.received = Some(end.clone());
        end
    }
}

/// Routes decoded messages to callbacks by kind
///
/// This is the extension point for the signaling layer (offer, answer,
/// candidate handling). Kinds without a callback are only logged.
#[derive(Clone, Default)]
pub struct MessageRouter {
    handlers: HashMap<MessageKind, MessageCallback>,
}

impl MessageRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `kind`, replacing any previous one
    pub fn on<F>(mut self, kind: MessageKind, callback: F) -> Self
    where
        F: Fn(SignalMessage) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(callback));
        self
    }

    /// Deliver `message`. Returns whether a callback handled it.
    pub fn route(&self, message: SignalMessage) -> bool {
        match self.handlers.get(&message.kind) {
            Some(callback) => {
                callback(message);
                true
            }
            None => {
                match &message.kind {
                    MessageKind::Heartbeat => debug!("Heartbeat from server"),
                    MessageKind::Unknown(tag) => debug!(kind = %tag, "Ignoring message of unknown kind"),
                    kind => debug!(%kind, "No handler registered"),
                }
                false
            }
        }
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no kinds are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Counters reported when the receive loop ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Why the loop stopped
    pub end: DispatchEnd,
    /// Text frames received
    pub received: u64,
    /// Text frames that failed to decode
    pub malformed: u64,
    /// Messages delivered to a registered callback
    pub handled: u64,
}

/// Blocking receive loop over a session's reader
pub struct InboundDispatcher {
    reader: Box<dyn FrameStream>,
    router: MessageRouter,
    connection_id: u64,
}

impl InboundDispatcher {
    /// Create a dispatcher that owns `reader` for the session's lifetime
    pub fn new(reader: Box<dyn FrameStream>, router: MessageRouter, connection_id: u64) -> Self {
        Self {
            reader,
            router,
            connection_id,
        }
    }

    /// Read until the peer closes, a receive fails, or the session reaches `Closed`
    ///
    /// Decode errors are logged and skipped. `done` is fired exactly once
    /// when the loop ends.
    pub async fn run(
        mut self,
        mut state: watch::Receiver<SessionState>,
        mut done: DoneNotifier,
    ) -> DispatchSummary {
        let connection_id = self.connection_id;
        let mut received = 0u64;
        let mut malformed = 0u64;
        let mut handled = 0u64;

        let end = loop {
            let frame = tokio::select! {
                biased;

                _ = state.wait_for(|s| *s == SessionState::Closed) => {
                    debug!(connection_id, "Session closed, stopping receive loop");
                    break DispatchEnd::SessionClosed;
                }

                frame = self.reader.receive() => frame,
            };

            match frame {
                Ok(Frame::Text(text)) => {
                    received += 1;
                    info!(connection_id, "Received: {}", text);

                    match SignalMessage::from_json(&text) {
                        Ok(message) => {
                            if self.router.route(message) {
                                handled += 1;
                            }
                        }
                        Err(e) => {
                            malformed += 1;
                            warn!(connection_id, error = %e, "Discarding undecodable frame");
                        }
                    }
                }
                Ok(Frame::Binary(data)) => {
                    debug!(connection_id, len = data.len(), "Ignoring binary frame");
                }
                Ok(Frame::Control) => {
                    trace!(connection_id, "Control frame");
                }
                Ok(Frame::Close(reason)) => {
                    info!(connection_id, ?reason, "Peer sent close frame");
                    break DispatchEnd::PeerClosed(reason);
                }
                Err(e) => {
                    warn!(connection_id, error = %e, "Read error");
                    break DispatchEnd::ReadFailed(e.to_string());
                }
            }
        };

        done.notify(end.clone());

        DispatchSummary {
            end,
            received,
            malformed,
            handled,
        }
    }
}
