//! Error types for the signaling client

use tokio_tungstenite::tungstenite;

/// Result type alias using the signaling client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while maintaining the signaling connection
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Dial or handshake against the signaling server failed
    #[error("Dial failed: {0}")]
    DialFailed(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    /// WebSocket protocol or transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Connection was closed by the peer or the network
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is worth another dial attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::DialFailed(_)
                | Error::OperationTimeout(_)
                | Error::WebSocketError(_)
                | Error::ConnectionClosed(_)
                | Error::IoError(_)
        )
    }

    /// Check if this error means the transport is no longer usable
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Error::ConnectionClosed(_) | Error::WebSocketError(_) | Error::IoError(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Error::ConnectionClosed(err.to_string())
            }
            tungstenite::Error::Io(e) => Error::IoError(e),
            other => Error::WebSocketError(other.to_string()),
        }
    }
}
