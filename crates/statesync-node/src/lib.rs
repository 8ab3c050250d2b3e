//! Statesync Node - Sync server host
//!
//! Serves the sync protocol over WebSocket at `/ws` alongside a small
//! REST API for inspecting channels, peers and counters.

pub mod demo;
pub mod server;

use statesync_server::SyncServer;
use std::sync::Arc;
use std::time::Instant;

pub use server::create_router;

/// Application state shared across handlers
pub struct AppState {
    /// Authoritative channels, procedures and sessions
    pub sync: Arc<SyncServer>,
    /// Node start time
    pub start_time: Instant,
    /// Node name
    pub node_name: String,
}

impl AppState {
    pub fn new(sync: Arc<SyncServer>, node_name: impl Into<String>) -> Self {
        Self {
            sync,
            start_time: Instant::now(),
            node_name: node_name.into(),
        }
    }
}
