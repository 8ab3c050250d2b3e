//! Protocol error types

use thiserror::Error;

/// Errors raised while encoding or decoding wire messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Frame could not be parsed into a known message
    #[error("Decode error: {0}")]
    Decode(String),

    /// Frame exceeds the configured size limit
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
