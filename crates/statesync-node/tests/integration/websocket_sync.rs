//! End-to-end sync over real WebSocket connections

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use statesync_client::{Client, ClientConfig, ClientError, SyncedCache};
use statesync_core::{codec, ServerMessage};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use super::{eventually, TestNode};

async fn connect(node: &TestNode) -> Client {
    let client = Client::new(ClientConfig::local_test());
    client.connect_ws(&node.ws_url()).await.expect("connect");
    eventually("welcome", || client.manifest().is_some()).await;
    client
}

async fn converge<T>(cache: &SyncedCache<T>, want: T)
where
    T: serde::Serialize + serde::de::DeserializeOwned + Clone + PartialEq + Send + Sync + 'static,
{
    let mut rx = cache.subscribe();
    timeout(Duration::from_secs(2), rx.wait_for(|v| *v == want))
        .await
        .expect("mirror never converged")
        .expect("mirror dropped");
}

// ============ Manifest Tests ============

#[tokio::test]
async fn test_welcome_lists_demo_names() {
    let node = TestNode::spawn().await;
    let client = connect(&node).await;

    let manifest = client.manifest().unwrap();
    assert_eq!(manifest.channels, vec!["count", "flag", "locked", "profile"]);
    assert_eq!(manifest.procedures, vec!["add", "echo", "fail"]);
    assert_eq!(manifest.version, statesync_core::PROTOCOL_VERSION);
}

// ============ Channel Tests ============

#[tokio::test]
async fn test_set_propagates_between_clients() {
    let node = TestNode::spawn().await;
    let a = connect(&node).await;
    let b = connect(&node).await;

    let count_a = SyncedCache::<i64>::attach(&a, "count", 0);
    let count_b = SyncedCache::<i64>::attach(&b, "count", 0);
    converge(&count_a, 100).await;
    converge(&count_b, 100).await;

    count_b.set(101).unwrap();

    converge(&count_a, 101).await;
    assert_eq!(node.demo.count.get(), 101);
}

#[tokio::test]
async fn test_invalid_set_is_corrected() {
    let node = TestNode::spawn().await;
    let a = connect(&node).await;

    // Mirror typed loosely so it can propose a bad value
    let loose = SyncedCache::<Value>::attach(&a, "count", Value::Null);
    converge(&loose, json!(100)).await;

    loose.set(json!("abc")).unwrap();

    converge(&loose, json!(100)).await;
    assert_eq!(node.demo.count.get(), 100);
}

#[tokio::test]
async fn test_disconnect_keeps_value_and_other_peers() {
    let node = TestNode::spawn().await;
    let a = connect(&node).await;
    let b = connect(&node).await;
    let count_b = SyncedCache::<i64>::attach(&b, "count", 0);
    converge(&count_b, 100).await;

    let count_a = SyncedCache::<i64>::attach(&a, "count", 0);
    count_a.set(3).unwrap();
    converge(&count_b, 3).await;

    a.disconnect();
    eventually("server to drop peer", || node.state.sync.sessions().count() == 1).await;

    node.demo.count.set(4).unwrap();
    converge(&count_b, 4).await;
    assert!(!a.is_connected());
}

// ============ Procedure Tests ============

#[tokio::test]
async fn test_calls_over_websocket() {
    let node = TestNode::spawn().await;
    let a = connect(&node).await;

    let echoed: String = a.call("echo", "hi").await.unwrap();
    assert_eq!(echoed, "hi");

    let sum: i64 = a.procedure::<(i64, i64), i64>("add").call((2, 3)).await.unwrap();
    assert_eq!(sum, 5);

    match a.call::<_, Value>("fail", ()).await {
        Err(ClientError::Remote(message)) => assert_eq!(message, "boom"),
        other => panic!("Expected remote error, got {:?}", other),
    }
}

// ============ Raw Frame Tests ============

#[tokio::test]
async fn test_bad_frame_answered_with_error() {
    let node = TestNode::spawn().await;
    let (mut socket, _) = tokio_tungstenite::connect_async(node.ws_url()).await.unwrap();

    let next = |text: String| codec::decode::<ServerMessage>(&text, codec::DEFAULT_MAX_FRAME).unwrap();

    let welcome = timeout(Duration::from_secs(2), socket.next()).await.unwrap().unwrap().unwrap();
    match welcome {
        Message::Text(text) => assert!(matches!(next(text), ServerMessage::Welcome(_))),
        other => panic!("Expected text frame, got {:?}", other),
    }

    socket.send(Message::Text("not json".into())).await.unwrap();
    let reply = timeout(Duration::from_secs(2), socket.next()).await.unwrap().unwrap().unwrap();
    match reply {
        Message::Text(text) => assert!(matches!(next(text), ServerMessage::Error { .. })),
        other => panic!("Expected text frame, got {:?}", other),
    }

    // Connection stays usable
    socket
        .send(Message::Text(r#"{"type":"get","channel":"count"}"#.into()))
        .await
        .unwrap();
    let value = timeout(Duration::from_secs(2), socket.next()).await.unwrap().unwrap().unwrap();
    match value {
        Message::Text(text) => assert_eq!(next(text), ServerMessage::value("count", json!(100))),
        other => panic!("Expected text frame, got {:?}", other),
    }
}
