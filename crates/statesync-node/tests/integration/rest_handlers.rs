//! REST API handler behavior tests

use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::json;

use super::TestNode;
use statesync_node::server::rest;

// ============ Health Endpoint Tests ============

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    assert_eq!(rest::health().await, "OK");
}

// ============ Node Info Tests ============

#[tokio::test]
async fn test_node_info() {
    let (state, _demo) = TestNode::offline();
    let info = rest::node_info(State(state)).await.0;

    assert_eq!(info.name, "TestNode");
    assert_eq!(info.protocol_version, statesync_core::PROTOCOL_VERSION);
    assert_eq!(info.version.split('.').count(), 3);
}

// ============ Channel Endpoint Tests ============

#[tokio::test]
async fn test_list_channels_reports_values() {
    let (state, demo) = TestNode::offline();
    demo.count.set(7).unwrap();

    let channels = rest::list_channels(State(state)).await.0;

    assert_eq!(channels["count"], json!(7));
    assert_eq!(channels["locked"], json!(false));
    assert_eq!(channels["profile"], json!({"val1": 0.0, "val2": false}));
}

#[tokio::test]
async fn test_get_channel_includes_initial() {
    let (state, demo) = TestNode::offline();
    demo.count.set(5).unwrap();

    let info = rest::get_channel(State(state), Path("count".to_string()))
        .await
        .expect("count exists")
        .0;

    assert_eq!(info.value, json!(5));
    assert_eq!(info.initial, json!(100));
}

#[tokio::test]
async fn test_get_unknown_channel_is_404() {
    let (state, _demo) = TestNode::offline();
    let result = rest::get_channel(State(state), Path("missing".to_string())).await;
    assert_eq!(result.err(), Some(StatusCode::NOT_FOUND));
}

// ============ Stats Tests ============

#[tokio::test]
async fn test_stats_count_commits() {
    let (state, _demo) = TestNode::offline();
    let (peer, _rx) = state.sync.attach();
    state.sync.handle_message(&peer, statesync_core::ClientMessage::set("count", json!(1)));
    state.sync.handle_message(&peer, statesync_core::ClientMessage::set("count", json!("x")));

    let stats = serde_json::to_value(rest::get_stats(State(state)).await.0).unwrap();

    assert_eq!(stats["node_name"], "TestNode");
    assert_eq!(stats["commits"], 1);
    assert_eq!(stats["rejections"], 1);
    assert_eq!(stats["channels"], 4);
    assert_eq!(stats["procedures"], 3);
}

#[tokio::test]
async fn test_procedures_and_peers() {
    let (state, _demo) = TestNode::offline();
    assert_eq!(rest::list_procedures(State(state.clone())).await.0, vec!["add", "echo", "fail"]);

    let (_peer, _rx) = state.sync.attach();
    assert_eq!(rest::list_peers(State(state)).await.0.len(), 1);
}
