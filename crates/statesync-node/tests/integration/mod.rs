//! Node integration tests
//!
//! Spawns the router on an ephemeral port and drives it over real
//! WebSocket connections and direct handler calls.

mod rest_handlers;
mod websocket_sync;

use statesync_node::demo::{self, Demo};
use statesync_node::{create_router, AppState};
use statesync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// A node serving the demo channels
pub struct TestNode {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    pub demo: Demo,
}

impl TestNode {
    /// Build state without binding a socket
    pub fn offline() -> (Arc<AppState>, Demo) {
        let sync = Arc::new(SyncServer::new(ServerConfig::local_test()));
        let demo = demo::register(&sync).expect("register demo");
        (Arc::new(AppState::new(sync, "TestNode")), demo)
    }

    /// Serve the router on 127.0.0.1 with an OS-assigned port
    pub async fn spawn() -> Self {
        let (state, demo) = Self::offline();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");

        let app = create_router(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, demo }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Poll `check` until it holds, failing after two seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {}", what));
}
