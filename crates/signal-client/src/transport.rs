//! Transport adapter seam and the tokio-tungstenite implementation
//!
//! The lifecycle core only needs four operations from the underlying
//! socket: dial, send a frame, receive a frame, and send a close frame.
//! They are expressed as the [`Connector`], [`FrameSink`] and
//! [`FrameStream`] traits so the WebSocket can be swapped for a test double.

use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket close code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// One discrete unit sent or received over the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload
    Text(String),
    /// Binary payload
    Binary(Vec<u8>),
    /// Protocol close frame
    Close(Option<CloseReason>),
    /// Ping/pong and other control traffic the adapter answers itself
    Control,
}

/// Code and text carried by a close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code
    pub code: u16,
    /// Free-form reason text
    pub reason: String,
}

impl CloseReason {
    /// Normal closure with empty reason text
    pub fn normal() -> Self {
        Self {
            code: NORMAL_CLOSURE,
            reason: String::new(),
        }
    }
}

/// Write half of a live transport session
#[async_trait]
pub trait FrameSink: Send {
    /// Send one complete frame
    async fn send(&mut self, frame: Frame) -> Result<()>;
}

/// Read half of a live transport session
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next frame
    ///
    /// Returns `Error::ConnectionClosed` once the stream has ended.
    async fn receive(&mut self) -> Result<Frame>;
}

/// Opens transport sessions against the signaling endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial `url` and complete the handshake
    async fn dial(&self, url: &Url) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)>;
}

/// Serialized write access to a session's sink
///
/// Clones share one sink behind an async mutex, so the heartbeat loop and
/// the close-frame sender never interleave partial frames.
#[derive(Clone)]
pub struct FrameWriter {
    sink: Arc<Mutex<Box<dyn FrameSink>>>,
}

impl FrameWriter {
    /// Wrap a sink for shared use
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Send one frame, waiting for any in-flight write to finish first
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.sink.lock().await.send(frame).await
    }

    /// Send a text frame
    pub async fn send_text(&self, text: String) -> Result<()> {
        self.send(Frame::Text(text)).await
    }

    /// Send a close frame
    pub async fn close(&self, reason: CloseReason) -> Result<()> {
        self.send(Frame::Close(Some(reason))).await
    }
}

/// One live transport session
///
/// Owned by the connection supervisor until it is split between the
/// heartbeat driver (writer clone), the shutdown coordinator (writer clone)
/// and the inbound dispatcher (reader).
pub struct ConnectionHandle {
    id: u64,
    url: Url,
    writer: FrameWriter,
    reader: Box<dyn FrameStream>,
}

impl ConnectionHandle {
    /// Assemble a handle from a freshly dialed session
    pub fn new(id: u64, url: Url, sink: Box<dyn FrameSink>, reader: Box<dyn FrameStream>) -> Self {
        Self {
            id,
            url,
            writer: FrameWriter::new(sink),
            reader,
        }
    }

    /// Connection sequence number, starting at 1
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Endpoint this session is connected to
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Shared writer for this session
    pub fn writer(&self) -> &FrameWriter {
        &self.writer
    }

    /// Split into the shared writer and the exclusively owned reader
    pub fn into_parts(self) -> (FrameWriter, Box<dyn FrameStream>) {
        (self.writer, self.reader)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .finish()
    }
}

/// tokio-tungstenite backed [`Connector`]
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    handshake_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector whose dial + handshake is bounded by `handshake_timeout`
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn dial(&self, url: &Url) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        // Nagle disabled: signaling frames are small and latency sensitive
        let handshake = connect_async_with_config(url.as_str(), None, true);

        let (ws_stream, response) = tokio::time::timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| {
                Error::OperationTimeout(format!(
                    "handshake with {} exceeded {:?}",
                    url, self.handshake_timeout
                ))
            })?
            .map_err(|e| Error::DialFailed(format!("{}: {}", url, e)))?;

        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        let sink: Box<dyn FrameSink> = Box::new(WebSocketSink(write));
        let reader: Box<dyn FrameStream> = Box::new(WebSocketReader(read));
        Ok((sink, reader))
    }
}

struct WebSocketSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.0.send(Message::from(frame)).await.map_err(Error::from)
    }
}

struct WebSocketReader(SplitStream<WsStream>);

#[async_trait]
impl FrameStream for WebSocketReader {
    async fn receive(&mut self) -> Result<Frame> {
        match self.0.next().await {
            Some(Ok(message)) => Ok(Frame::from(message)),
            Some(Err(e)) => Err(Error::from(e)),
            None => Err(Error::ConnectionClosed("stream ended".to_string())),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
                code: CloseCode::from(r.code),
                reason: Cow::Owned(r.reason),
            })),
            Frame::Control => Message::Ping(Vec::new()),
        }
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(data),
            Message::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
                code: u16::from(f.code),
                reason: f.reason.into_owned(),
            })),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Control,
        }
    }
}
