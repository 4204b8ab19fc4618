//! Test harness for signaling client lifecycle tests
//!
//! Provides a scripted in-memory transport:
//! - `MockConnector` fails a configurable number of dials, then succeeds
//! - every successful dial hands a `MockPeer` to the test
//! - the peer sees every frame the client writes and can inject inbound
//!   frames, errors, or a hang-up
//!
//! Basic usage pattern:
//!
//! 1. Create a `MockConnector` and keep the returned `PeerQueue`
//! 2. Spawn `SignalClient::run` with a `ShutdownSignal` listener
//! 3. Pull the `MockPeer` for each connection from the queue
//! 4. Assert on outbound frames, inject inbound ones
//! 5. Trigger the shutdown signal and await the outcome

#![allow(dead_code)]

use async_trait::async_trait;
use signal_client::config::ClientConfig;
use signal_client::transport::{Connector, Frame, FrameSink, FrameStream};
use signal_client::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// Result type for harness helpers
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Error type for harness helpers
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Peer hung up: {0}")]
    HungUp(String),
}

/// Receives one `MockPeer` per successful dial
pub type PeerQueue = mpsc::UnboundedReceiver<MockPeer>;

/// Scripted connector
pub struct MockConnector {
    failures_left: AtomicUsize,
    ack_close: bool,
    stall_writes: Arc<AtomicBool>,
    dials: Mutex<Vec<Instant>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    /// Fail the first `failures` dials, then succeed on every later one.
    /// With `ack_close` the fake server answers a close frame with its own.
    pub fn new(failures: usize, ack_close: bool) -> (Arc<Self>, PeerQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            failures_left: AtomicUsize::new(failures),
            ack_close,
            stall_writes: Arc::new(AtomicBool::new(false)),
            dials: Mutex::new(Vec::new()),
            peers: tx,
        });
        (connector, rx)
    }

    /// Make every client write on any connection block forever
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Instants at which dials were attempted
    pub fn dial_times(&self) -> Vec<Instant> {
        self.dials.lock().unwrap().clone()
    }

    /// Number of dial attempts so far
    pub fn dial_count(&self) -> usize {
        self.dials.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn dial(&self, url: &Url) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        self.dials.lock().unwrap().push(Instant::now());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::DialFailed(format!("{}: connection refused", url)));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let fail_writes = Arc::new(AtomicBool::new(false));
        let reads = Arc::new(AtomicUsize::new(0));

        let sink = MockSink {
            outbound: outbound_tx,
            inbound: inbound_tx.clone(),
            fail_writes: Arc::clone(&fail_writes),
            stall_writes: Arc::clone(&self.stall_writes),
            ack_close: self.ack_close,
        };
        let stream = MockStream {
            inbound: inbound_rx,
            reads: Arc::clone(&reads),
        };

        let _ = self.peers.send(MockPeer {
            outbound: outbound_rx,
            inbound: Some(inbound_tx),
            fail_writes,
            stall_writes: Arc::clone(&self.stall_writes),
            reads,
        });

        let sink: Box<dyn FrameSink> = Box::new(sink);
        let stream: Box<dyn FrameStream> = Box::new(stream);
        Ok((sink, stream))
    }
}

struct MockSink {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedSender<Result<Frame>>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
    ack_close: bool,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed("broken pipe".to_string()));
        }
        let is_close = matches!(frame, Frame::Close(_));
        let echoed = frame.clone();
        self.outbound
            .send(frame)
            .map_err(|_| Error::ConnectionClosed("peer gone".to_string()))?;
        if is_close && self.ack_close {
            let _ = self.inbound.send(Ok(echoed));
        }
        Ok(())
    }
}

struct MockStream {
    inbound: mpsc::UnboundedReceiver<Result<Frame>>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn receive(&mut self) -> Result<Frame> {
        let next = self.inbound.recv().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        match next {
            Some(frame) => frame,
            None => Err(Error::ConnectionClosed("stream ended".to_string())),
        }
    }
}

/// Server side of one mock connection
pub struct MockPeer {
    outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: Option<mpsc::UnboundedSender<Result<Frame>>>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl MockPeer {
    /// Next frame written by the client
    pub async fn next_frame(&mut self, within: Duration) -> HarnessResult<Frame> {
        match tokio::time::timeout(within, self.outbound.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(HarnessError::HungUp("client writer dropped".to_string())),
            Err(_) => Err(HarnessError::Timeout(format!("no frame within {:?}", within))),
        }
    }

    /// Frames already written by the client, without waiting
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Deliver a text frame to the client
    pub fn send_text(&self, text: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(Frame::Text(text.to_string())));
        }
    }

    /// Make the client's next receive fail
    pub fn fail_read(&self, cause: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(Error::ConnectionClosed(cause.to_string())));
        }
    }

    /// Hang up: the client's next read fails and nothing more is delivered
    pub fn hang_up(&mut self) {
        if let Some(inbound) = self.inbound.take() {
            let _ = inbound.send(Err(Error::ConnectionClosed("peer hung up".to_string())));
        }
    }

    /// Make every further client write fail
    pub fn break_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Make every further client write block forever
    pub fn stall_writes(&self) {
        self.stall_writes.store(true, Ordering::SeqCst);
    }

    /// Number of completed receive calls on the client side
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Configuration with reference timings and a mock endpoint
pub fn test_config() -> ClientConfig {
    ClientConfig {
        address: "127.0.0.1:8080".to_string(),
        ..Default::default()
    }
}

/// The identity frame produced by the default configuration
pub const IDENTITY_FRAME: &str = r#"{"serial":"123456789","mac":"00:1A:2B:3C:4D:5E"}"#;

/// The heartbeat frame
pub const HEARTBEAT_FRAME: &str = r#"{"type":"heartbeat","data":"ping"}"#;

/// Initialize test logging once
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("signal_client=debug")
        .with_test_writer()
        .try_init();
}
