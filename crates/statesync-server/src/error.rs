//! Server-side error types

use statesync_core::RejectReason;
use thiserror::Error;

/// Errors that can occur in registry, pipeline and procedure operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// A channel with this name is already registered
    #[error("Duplicate channel: {0}")]
    DuplicateChannel(String),

    /// No channel registered under this name
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// A procedure with this name is already registered
    #[error("Duplicate procedure: {0}")]
    DuplicateProcedure(String),

    /// No procedure registered under this name
    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    /// Proposed value refused by the channel validator
    #[error("Invalid payload for {channel}: {reason}")]
    Validation { channel: String, reason: String },

    /// Pre-commit hook vetoed the proposed value
    #[error("Pre-commit hook failed for {0}")]
    PreCommitRejected(String),

    /// Procedure params could not be decoded
    #[error("Invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    /// Procedure handler returned an error or panicked
    #[error("Procedure {method} failed: {message}")]
    Handler { method: String, message: String },

    /// Peer is not attached
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ServerError {
    /// Reason code to send back to a proposer, if this error is a rejection
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            ServerError::Validation { .. } => Some(RejectReason::ValidationFailed),
            ServerError::PreCommitRejected(_) => Some(RejectReason::PreCommitRejected),
            ServerError::UnknownChannel(_) => Some(RejectReason::UnknownChannel),
            _ => None,
        }
    }

    /// Text placed in the `error` field of a call response.
    ///
    /// Handler failures carry the handler's own message verbatim.
    pub fn response_message(&self) -> String {
        match self {
            ServerError::Handler { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Serialization(err.to_string())
    }
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
