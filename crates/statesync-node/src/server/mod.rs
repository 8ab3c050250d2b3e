//! HTTP server for the sync node
//!
//! This module provides the WebSocket endpoint peers attach to and a REST
//! API for inspecting the node.

pub mod rest;
pub mod websocket;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

/// Create the server router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(rest::health))
        // Node info
        .route("/api/info", get(rest::node_info))
        // WebSocket endpoint
        .route("/ws", get(websocket::ws_handler))
        // REST endpoints
        .route("/api/channels", get(rest::list_channels))
        .route("/api/channel/:name", get(rest::get_channel))
        .route("/api/procedures", get(rest::list_procedures))
        .route("/api/peers", get(rest::list_peers))
        .route("/api/stats", get(rest::get_stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
