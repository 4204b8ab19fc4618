//! Resilient client endpoint for a WebSocket signaling channel
//!
//! This crate keeps one persistent connection to a signaling server alive:
//! it dials with retry, announces the local device identity, sends periodic
//! heartbeats, dispatches inbound envelopes by kind, and closes gracefully
//! on interrupt.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SignalClient::run                                        │
//! │  ├─ ConnectionSupervisor (dial + retry, identity frame)   │
//! │  └─ per session:                                          │
//! │     ├─ HeartbeatDriver   (writer clone, fixed period)     │
//! │     ├─ InboundDispatcher (reader, MessageRouter)          │
//! │     └─ ShutdownCoordinator                                │
//! │          Running → ClosingSent → Closed                   │
//! │     ↓                                                     │
//! │  Connector / FrameSink / FrameStream (tokio-tungstenite)  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Offer/answer/candidate semantics are not handled here; register
//! callbacks with [`SignalClient::on`] to build them on top.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod shutdown;
pub mod supervisor;
pub mod transport;

// Re-exports for public API
pub use client::{ClientOutcome, SignalClient};
pub use config::{BackoffStrategy, ClientConfig, DropPolicy, ReconnectConfig};
pub use dispatcher::{DispatchEnd, MessageRouter};
pub use error::{Error, Result};
pub use protocol::{DeviceIdentity, MessageKind, SignalMessage};
pub use shutdown::{SessionEnd, SessionState, ShutdownListener, ShutdownReason, ShutdownSignal};
pub use transport::{CloseReason, ConnectionHandle, Connector, Frame, FrameSink, FrameStream, WebSocketConnector};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
