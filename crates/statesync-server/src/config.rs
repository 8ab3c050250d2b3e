//! Server configuration types

use serde::{Deserialize, Serialize};
use statesync_core::codec::DEFAULT_MAX_FRAME;

/// Sync server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Outbound queue depth per peer; a peer that falls this far behind is evicted
    pub peer_queue_capacity: usize,
    /// Send a `rejected` notice to the proposer when a set is dropped
    pub notify_rejections: bool,
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            peer_queue_capacity: 256,
            notify_rejections: true,
            max_message_size: DEFAULT_MAX_FRAME,
        }
    }
}

impl ServerConfig {
    /// Create a configuration for local testing
    pub fn local_test() -> Self {
        Self {
            peer_queue_capacity: 64,
            notify_rejections: true,
            max_message_size: 64 * 1024,
        }
    }

    /// Drop rejected proposals without telling the proposer
    pub fn silent_rejections(mut self) -> Self {
        self.notify_rejections = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert!(config.notify_rejections);
        assert_eq!(config.peer_queue_capacity, 256);
        assert_eq!(config.max_message_size, 1024 * 1024);
    }

    #[test]
    fn test_silent_rejections() {
        let config = ServerConfig::local_test().silent_rejections();
        assert!(!config.notify_rejections);
        assert_eq!(config.peer_queue_capacity, 64);
    }
}
