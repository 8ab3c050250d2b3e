//! JSON text-frame codec
//!
//! One message per text frame. Both ends share these helpers so the wire
//! format is defined in exactly one place.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ProtocolError, Result};

/// Default maximum accepted frame size (1 MB)
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// Serialize a message into a text frame
pub fn encode<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string(message).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Parse a text frame, refusing frames over `max_size` bytes
pub fn decode<T: DeserializeOwned>(frame: &str, max_size: usize) -> Result<T> {
    if frame.len() > max_size {
        return Err(ProtocolError::FrameTooLarge {
            size: frame.len(),
            max: max_size,
        });
    }
    serde_json::from_str(frame).map_err(|e| ProtocolError::Decode(e.to_string()))
}
