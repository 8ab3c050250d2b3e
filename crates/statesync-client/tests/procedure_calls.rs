//! Procedure calls against an in-process server

mod helpers;

use serde_json::{json, Value};
use statesync_client::{Client, ClientError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpers::{eventually, Recorder, TestServer};

// ============ Call Tests ============

#[tokio::test]
async fn test_echo_returns_params() {
    let env = TestServer::spawn();
    let a = env.connect().await;

    let echoed: String = a.call("echo", "hi").await.unwrap();
    assert_eq!(echoed, "hi");
}

#[tokio::test]
async fn test_typed_stub() {
    let env = TestServer::spawn();
    let a = env.connect().await;

    let add = a.procedure::<(i64, i64), i64>("add");
    assert_eq!(add.call((2, 40)).await.unwrap(), 42);
}

#[tokio::test]
async fn test_failure_reaches_caller_only() {
    let env = TestServer::spawn();
    let a = env.connect().await;
    let b = env.connect().await;
    let mut seen_b = Recorder::on(&b, "count");

    match a.call::<_, Value>("fail", ()).await {
        Err(ClientError::Remote(message)) => assert_eq!(message, "boom"),
        other => panic!("Expected remote error, got {:?}", other),
    }

    seen_b.assert_quiet().await;
    assert_eq!(b.pending_calls(), 0);
}

#[tokio::test]
async fn test_unknown_procedure() {
    let env = TestServer::spawn();
    let a = env.connect().await;

    let result = a.call::<_, Value>("missing", ()).await;
    assert!(matches!(result, Err(ClientError::Remote(_))));
}

#[tokio::test]
async fn test_bad_params_reported() {
    let env = TestServer::spawn();
    let a = env.connect().await;

    let result = a.call::<_, i64>("add", "not a pair").await;
    assert!(matches!(result, Err(ClientError::Remote(_))));
}

#[tokio::test]
async fn test_concurrent_calls_same_method() {
    let env = TestServer::spawn();
    let a = env.connect().await;

    // The slower call is issued first and must not take the faster one's result
    let slow = a.call::<_, u64>("slow", 80u64);
    let fast = a.call::<_, u64>("slow", 5u64);
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow.unwrap(), 80);
    assert_eq!(fast.unwrap(), 5);
}

#[tokio::test]
async fn test_slow_call_does_not_block_channels() {
    let env = TestServer::spawn();
    let a = env.connect().await;
    let mut seen = Recorder::on(&a, "count");

    let pending = tokio::spawn({
        let a = a.clone();
        async move { a.call::<_, u64>("slow", 200u64).await }
    });
    eventually("call sent", || a.pending_calls() == 1).await;

    env.count.set(1).unwrap();
    assert_eq!(seen.next_value().await, json!(1));
    assert_eq!(a.pending_calls(), 1);

    assert_eq!(pending.await.unwrap().unwrap(), 200);
}

// ============ Connection Tests ============

#[tokio::test]
async fn test_call_without_connection() {
    let client = Client::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let errors = seen.clone();

    client.call_with(
        "echo",
        json!("hi"),
        |_| panic!("disconnected call succeeded"),
        move |e| errors.lock().unwrap().push(e.to_string()),
    );

    assert_eq!(*seen.lock().unwrap(), vec!["Socket not connected".to_string()]);
}

#[tokio::test]
async fn test_disconnect_fails_in_flight_call() {
    let env = TestServer::spawn();
    let a = env.connect().await;

    let pending = tokio::spawn({
        let a = a.clone();
        async move { a.call::<_, u64>("slow", 500u64).await }
    });
    eventually("call sent", || a.pending_calls() == 1).await;

    a.disconnect();

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("call never completed")
        .unwrap();
    assert!(matches!(result, Err(ClientError::ConnectionClosed)));
}
