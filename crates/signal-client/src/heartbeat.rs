//! Periodic keep-alive over the session writer

use crate::protocol::SignalMessage;
use crate::shutdown::SessionState;
use crate::transport::FrameWriter;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Emits `{"type":"heartbeat","data":"ping"}` once per period
pub struct HeartbeatDriver {
    writer: FrameWriter,
    period: Duration,
    connection_id: u64,
}

impl HeartbeatDriver {
    /// Create a driver writing through `writer`
    pub fn new(writer: FrameWriter, period: Duration, connection_id: u64) -> Self {
        Self {
            writer,
            period,
            connection_id,
        }
    }

    /// Send heartbeats until the session leaves `Running` or a send fails
    ///
    /// The first heartbeat goes out one full period after the call. A send
    /// failure stops only this loop; the dispatcher is left to detect the
    /// dead connection on its read side. Returns the number of heartbeats sent.
    pub async fn run(self, mut state: watch::Receiver<SessionState>) -> u64 {
        let connection_id = self.connection_id;
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = state.wait_for(|s| *s != SessionState::Running) => {
                    debug!(connection_id, sent, "Heartbeat stopped, session closing");
                    break;
                }

                _ = ticker.tick() => {}
            }

            let message = match SignalMessage::heartbeat().to_json() {
                Ok(message) => message,
                Err(e) => {
                    warn!(connection_id, error = %e, "Failed to marshal heartbeat message");
                    continue;
                }
            };

            debug!(connection_id, "Sending heartbeat message");
            if let Err(e) = self.writer.send_text(message).await {
                warn!(connection_id, error = %e, "Failed to send heartbeat message, stopping heartbeat");
                break;
            }
            sent += 1;
        }

        sent
    }
}
