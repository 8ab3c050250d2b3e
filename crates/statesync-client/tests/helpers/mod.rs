//! TestServer - In-process sync server with the scenario channels
//!
//! Registers:
//! - `count`: integer, initial 100
//! - `locked`: boolean, initial false
//! - `flag`: boolean whose pre-commit refuses `true` while `locked` is set
//! - procedures `echo`, `fail`, `add`, `slow`

use serde_json::Value;
use statesync_client::{ChannelEvent, Client, ClientConfig};
use statesync_server::{ChannelDef, ChannelHandle, ServerConfig, SyncServer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long to wait before concluding a message will never arrive
pub const QUIET: Duration = Duration::from_millis(50);

pub struct TestServer {
    pub server: Arc<SyncServer>,
    pub count: ChannelHandle<i64>,
    pub locked: ChannelHandle<bool>,
    pub flag: ChannelHandle<bool>,
    /// Times the `flag` post-commit hook ran
    pub flag_commits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn spawn() -> Self {
        Self::with_config(ServerConfig::local_test())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let server = Arc::new(SyncServer::new(config));
        let channels = server.channels();

        let count = channels
            .register(ChannelDef::<i64>::schema("count", 100))
            .expect("register count");
        let locked = channels
            .register(ChannelDef::<bool>::schema("locked", false))
            .expect("register locked");

        let flag_commits = Arc::new(AtomicUsize::new(0));
        let guard = locked.clone();
        let commits = flag_commits.clone();
        let flag = channels
            .register(
                ChannelDef::<bool>::schema("flag", false)
                    .pre_commit(move |next| !(*next && guard.get()))
                    .post_commit(move |_| {
                        commits.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
            )
            .expect("register flag");

        let procedures = server.procedures();
        procedures
            .register_sync("echo", |v: Value| Ok::<_, String>(v))
            .expect("register echo");
        procedures
            .register_sync("fail", |_: Value| Err::<Value, _>("boom"))
            .expect("register fail");
        procedures
            .register_sync("add", |(a, b): (i64, i64)| Ok::<_, String>(a + b))
            .expect("register add");
        procedures
            .register_fn("slow", |ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok::<_, String>(ms)
            })
            .expect("register slow");

        Self {
            server,
            count,
            locked,
            flag,
            flag_commits,
        }
    }

    /// Connect a new client over an in-memory link and wait for its welcome
    pub async fn connect(&self) -> Client {
        let client = Client::new(ClientConfig::local_test());
        self.connect_client(&client).await;
        client
    }

    /// Attach an existing client to this server
    pub async fn connect_client(&self, client: &Client) {
        let link = self.server.connect_local();
        client.connect_with(link.outgoing, link.incoming);
        eventually("welcome", || client.peer_id().is_some()).await;
    }
}

/// Records every event a client sees on one channel
pub struct Recorder {
    rx: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Recorder {
    pub fn on(client: &Client, channel: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        client.on_channel(channel, move |event| {
            let _ = tx.send(event.clone());
        });
        Self { rx }
    }

    pub async fn next(&mut self) -> ChannelEvent {
        timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("recorder closed")
    }

    /// Next event, which must be a value
    pub async fn next_value(&mut self) -> Value {
        match self.next().await {
            ChannelEvent::Value(value) => value,
            other => panic!("Expected value, got {:?}", other),
        }
    }

    /// Assert nothing arrives within [`QUIET`]
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(event)) = timeout(QUIET, self.rx.recv()).await {
            panic!("Unexpected channel event: {:?}", event);
        }
    }
}

/// Poll `check` until it holds, failing after one second
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {}", what));
}
