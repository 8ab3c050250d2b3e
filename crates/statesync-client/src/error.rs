//! Client-side error types

use statesync_core::ProtocolError;
use thiserror::Error;

/// Errors surfaced to callers of the client API
#[derive(Error, Debug)]
pub enum ClientError {
    /// No live connection; nothing was sent
    #[error("Socket not connected")]
    NotConnected,

    /// The connection went away before a response arrived
    #[error("Connection closed")]
    ConnectionClosed,

    /// The server answered a call with an error
    #[error("{0}")]
    Remote(String),

    /// Optional call timeout elapsed
    #[error("Call timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Transport could not be opened or failed mid-stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Frame encode/decode problem
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
