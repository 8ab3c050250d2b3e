//! Client configuration types

use serde::{Deserialize, Serialize};
use statesync_core::codec::DEFAULT_MAX_FRAME;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Give up on a call after this many milliseconds (None = wait forever)
    pub call_timeout_ms: Option<u64>,
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: None,
            max_message_size: DEFAULT_MAX_FRAME,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for local testing
    pub fn local_test() -> Self {
        Self {
            call_timeout_ms: Some(5_000),
            max_message_size: 64 * 1024,
        }
    }

    /// Get the call timeout as a Duration
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
