//! Signaling envelope types exchanged over the WebSocket channel

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload carried by every heartbeat
pub const HEARTBEAT_PAYLOAD: &str = "ping";

/// Known message kinds plus a catch-all for anything else the server sends
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Keep-alive
    Heartbeat,
    /// SDP offer
    Offer,
    /// SDP answer
    Answer,
    /// ICE candidate
    Candidate,
    /// Any tag not listed above, kept verbatim
    Unknown(String),
}

impl MessageKind {
    /// Wire tag for this kind
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::Candidate => "candidate",
            MessageKind::Unknown(tag) => tag,
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "heartbeat" => MessageKind::Heartbeat,
            "offer" => MessageKind::Offer,
            "answer" => MessageKind::Answer,
            "candidate" => MessageKind::Candidate,
            _ => MessageKind::Unknown(tag),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope for every application message after the identity announcement
///
/// Wire form: `{"type": <kind>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Message tag
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Opaque payload, empty when the sender omitted it
    #[serde(rename = "data", default)]
    pub payload: String,
}

impl SignalMessage {
    /// Create a message of the given kind
    pub fn new(kind: MessageKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The keep-alive message emitted by the heartbeat driver
    pub fn heartbeat() -> Self {
        Self::new(MessageKind::Heartbeat, HEARTBEAT_PAYLOAD)
    }

    /// Encode for the wire
    ///
    /// Refuses to emit an empty kind.
    pub fn to_json(&self) -> Result<String> {
        if self.kind.as_str().is_empty() {
            return Err(Error::InvalidData("message kind cannot be empty".to_string()));
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a received text frame
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::InvalidData(format!("malformed signal message: {}", e)))
    }
}

/// Identity of the local device, announced as the first frame of every connection
///
/// Wire form: `{"serial": <serial>, "mac": <mac>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device serial number
    pub serial: String,

    /// Hardware (MAC) address
    pub mac: String,
}

impl DeviceIdentity {
    /// Create an identity from opaque serial and hardware address strings
    pub fn new(serial: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            mac: mac.into(),
        }
    }

    /// Encode the announcement frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new("123456789", "00:1A:2B:3C:4D:5E")
    }
}
