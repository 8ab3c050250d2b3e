//! REST API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use statesync_core::PROTOCOL_VERSION;
use statesync_server::{ServerStats, SessionInfo};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::AppState;

/// Current value of every channel
pub async fn list_channels(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, Value>> {
    Json(state.sync.channels().values())
}

/// Channel detail
#[derive(Serialize)]
pub struct ChannelInfo {
    pub name: String,
    pub value: Value,
    pub initial: Value,
}

pub async fn get_channel(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ChannelInfo>, StatusCode> {
    let channels = state.sync.channels();
    match (channels.get(&name), channels.initial(&name)) {
        (Ok(value), Ok(initial)) => Ok(Json(ChannelInfo { name, value, initial })),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

/// Registered procedure names
pub async fn list_procedures(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.sync.procedures().names())
}

/// Attached peers
pub async fn list_peers(State(state): State<Arc<AppState>>) -> Json<Vec<SessionInfo>> {
    Json(state.sync.sessions().peers())
}

/// Node statistics
#[derive(Serialize)]
pub struct NodeStats {
    pub node_name: String,
    #[serde(flatten)]
    pub server: ServerStats,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<NodeStats> {
    Json(NodeStats {
        node_name: state.node_name.clone(),
        server: state.sync.stats(),
    })
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Node info endpoint
#[derive(Serialize)]
pub struct NodeInfo {
    pub version: &'static str,
    pub protocol_version: &'static str,
    pub name: String,
    pub uptime_seconds: u64,
}

pub async fn node_info(State(state): State<Arc<AppState>>) -> Json<NodeInfo> {
    Json(NodeInfo {
        version: env!("CARGO_PKG_VERSION"),
        protocol_version: PROTOCOL_VERSION,
        name: state.node_name.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
