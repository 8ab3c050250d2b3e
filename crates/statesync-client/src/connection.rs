//! Client connection manager
//!
//! A [`Client`] has an explicit lifecycle: `connect_*` opens a transport and
//! spawns its reader/writer tasks, `disconnect` tears them down. Mirrors and
//! RPC stubs hold a clone of the client and keep working across reconnects.

use futures::future::ready;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use statesync_core::message::response_outcome;
use statesync_core::{codec, CallId, ClientMessage, Manifest, PeerId, RejectReason, ServerMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// What a channel listener is told about
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Snapshot reply or broadcast push
    Value(Value),
    /// A proposal from this client was dropped by the server
    Rejected { reason: RejectReason, message: String },
}

/// Handle for removing a channel listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

pub(crate) type PendingCall = Box<dyn FnOnce(Result<Value>) + Send>;

struct Link {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    reader: JoinHandle<()>,
    generation: u64,
}

pub(crate) struct Inner {
    config: ClientConfig,
    link: RwLock<Option<Link>>,
    generation: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_listener_id: AtomicU64,
    pending: Mutex<HashMap<CallId, PendingCall>>,
    next_call_id: AtomicU64,
    manifest: RwLock<Option<Manifest>>,
}

impl Inner {
    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn send(&self, msg: ClientMessage) -> Result<()> {
        let link = self.link.read();
        let link = link.as_ref().ok_or(ClientError::NotConnected)?;
        link.outbound.send(msg).map_err(|_| ClientError::ConnectionClosed)
    }

    /// Register `done` and send the call. `done` always runs exactly once,
    /// synchronously with `NotConnected` if there is no connection.
    pub(crate) fn start_call(&self, method: &str, params: Value, done: PendingCall) -> Option<CallId> {
        let outbound = self.link.read().as_ref().map(|link| link.outbound.clone());
        let Some(outbound) = outbound else {
            done(Err(ClientError::NotConnected));
            return None;
        };

        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(id, done);
        debug!("call_{} ({})", method, id);

        if outbound.send(ClientMessage::call(id, method, params)).is_err() {
            if let Some(done) = self.take_pending(id) {
                done(Err(ClientError::ConnectionClosed));
            }
            return None;
        }
        Some(id)
    }

    pub(crate) fn take_pending(&self, id: CallId) -> Option<PendingCall> {
        self.pending.lock().remove(&id)
    }

    fn dispatch(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome(manifest) => {
                info!(
                    "Attached as {} ({} channels, {} procedures)",
                    manifest.peer_id.short(),
                    manifest.channels.len(),
                    manifest.procedures.len()
                );
                *self.manifest.write() = Some(manifest);
            }

            ServerMessage::Value { channel, value } => {
                self.notify(&channel, &ChannelEvent::Value(value));
            }

            ServerMessage::Rejected { channel, reason, message } => {
                warn!("Update to {} rejected ({}): {}", channel, reason, message);
                self.notify(&channel, &ChannelEvent::Rejected { reason, message });
            }

            ServerMessage::Response { id, method, result, error } => match self.take_pending(id) {
                Some(done) => done(response_outcome(result, error).map_err(ClientError::Remote)),
                None => debug!("Dropping response {} for {}: no pending call", id, method),
            },

            ServerMessage::Error { message } => {
                warn!("Server reported error: {}", message);
            }
        }
    }

    fn notify(&self, channel: &str, event: &ChannelEvent) {
        let listeners: Vec<Listener> = match self.listeners.read().get(channel) {
            Some(list) => list.iter().map(|(_, l)| l.clone()).collect(),
            None => return,
        };
        for listener in listeners {
            listener(event);
        }
    }

    fn listened_channels(&self) -> Vec<String> {
        self.listeners
            .read()
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn fail_pending(&self) {
        let drained: Vec<PendingCall> = self.pending.lock().drain().map(|(_, done)| done).collect();
        if !drained.is_empty() {
            debug!("Failing {} pending calls", drained.len());
        }
        for done in drained {
            done(Err(ClientError::ConnectionClosed));
        }
    }

    /// Reader for `generation` ended on its own
    fn connection_lost(&self, generation: u64) {
        let mut link = self.link.write();
        if link.as_ref().map(|l| l.generation) != Some(generation) {
            return;
        }
        *link = None;
        drop(link);

        info!("Connection lost");
        *self.manifest.write() = None;
        self.fail_pending();
    }
}

/// Explicit connection manager shared by caches and RPC stubs
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<Inner>,
}

impl Client {
    /// Create a disconnected client
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                link: RwLock::new(None),
                generation: AtomicU64::new(0),
                listeners: RwLock::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                next_call_id: AtomicU64::new(1),
                manifest: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Connect over any message sink/stream pair.
    ///
    /// Replaces an existing connection. Every channel with listeners is
    /// pulled again so mirrors converge on the new connection.
    pub fn connect_with<S, R>(&self, mut sink: S, mut stream: R)
    where
        S: Sink<ClientMessage> + Unpin + Send + 'static,
        R: Stream<Item = ServerMessage> + Unpin + Send + 'static,
    {
        self.disconnect();

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbound, mut queue) = mpsc::unbounded_channel::<ClientMessage>();

        tokio::spawn(async move {
            while let Some(msg) = queue.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Held until the link is installed so an early close sees it
        let mut slot = self.inner.link.write();
        let inner = self.inner.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                inner.dispatch(msg);
            }
            inner.connection_lost(generation);
        });
        *slot = Some(Link {
            outbound,
            reader,
            generation,
        });
        drop(slot);
        info!("Connected (generation {})", generation);

        for channel in self.inner.listened_channels() {
            let _ = self.inner.send(ClientMessage::get(channel));
        }
    }

    /// Connect to a server's WebSocket endpoint
    pub async fn connect_ws(&self, url: &str) -> Result<()> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = socket.split();

        let sink = write.with(|msg: ClientMessage| {
            ready(
                codec::encode(&msg)
                    .map(Message::Text)
                    .map_err(ClientError::from),
            )
        });

        let max = self.inner.config.max_message_size;
        let stream = read.filter_map(move |frame| {
            ready(match frame {
                Ok(Message::Text(text)) => match codec::decode::<ServerMessage>(&text, max) {
                    Ok(msg) => Some(msg),
                    Err(e) => {
                        warn!("Failed to parse server message: {}", e);
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => {
                    warn!("WebSocket error: {}", e);
                    None
                }
            })
        });

        info!("WebSocket connected: {}", url);
        self.connect_with(sink, stream);
        Ok(())
    }

    /// Close the connection. Pending calls fail with `ConnectionClosed`.
    pub fn disconnect(&self) {
        let Some(link) = self.inner.link.write().take() else {
            return;
        };
        // Dropping the sender lets the writer flush and close the sink
        link.reader.abort();
        drop(link.outbound);

        info!("Disconnected");
        *self.inner.manifest.write() = None;
        self.inner.fail_pending();
    }

    pub fn is_connected(&self) -> bool {
        self.inner.link.read().is_some()
    }

    /// Manifest received on attach, if connected
    pub fn manifest(&self) -> Option<Manifest> {
        self.inner.manifest.read().clone()
    }

    /// Id the server assigned to this connection
    pub fn peer_id(&self) -> Option<PeerId> {
        self.inner.manifest.read().as_ref().map(|m| m.peer_id.clone())
    }

    /// Send a raw protocol message
    pub fn send(&self, msg: ClientMessage) -> Result<()> {
        self.inner.send(msg)
    }

    /// Install a listener for one channel's values and rejections
    pub fn on_channel<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .entry(channel.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not installed.
    pub fn off_channel(&self, channel: &str, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let Some(list) = listeners.get_mut(channel) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(channel);
        }
        removed
    }

    /// Number of listeners installed for a channel
    pub fn listener_count(&self, channel: &str) -> usize {
        self.inner.listeners.read().get(channel).map_or(0, Vec::len)
    }

    /// Number of calls awaiting a response
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as link;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Client wired to hand-driven channels standing in for a server
    fn scripted() -> (
        Client,
        link::UnboundedReceiver<ClientMessage>,
        link::UnboundedSender<ServerMessage>,
    ) {
        let (client_tx, server_rx) = link::unbounded();
        let (server_tx, client_rx) = link::unbounded();
        let client = Client::new(ClientConfig::default());
        client.connect_with(client_tx, client_rx);
        (client, server_rx, server_tx)
    }

    async fn expect_sent(rx: &mut link::UnboundedReceiver<ClientMessage>) -> ClientMessage {
        timeout(Duration::from_secs(1), rx.next())
            .await
            .expect("timed out")
            .expect("link closed")
    }

    #[tokio::test]
    async fn test_not_connected_send() {
        let client = Client::default();
        assert!(!client.is_connected());
        assert!(matches!(client.send(ClientMessage::get("x")), Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_listener_receives_values() {
        let (client, _server_rx, server_tx) = scripted();
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        client.on_channel("count", move |event| {
            let _ = seen_tx.send(event.clone());
        });

        server_tx
            .unbounded_send(ServerMessage::value("count", json!(5)))
            .unwrap();

        let event = timeout(Duration::from_secs(1), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(event, ChannelEvent::Value(json!(5)));
    }

    #[tokio::test]
    async fn test_off_channel() {
        let client = Client::default();
        let id = client.on_channel("count", |_| {});
        assert_eq!(client.listener_count("count"), 1);
        assert!(client.off_channel("count", id));
        assert!(!client.off_channel("count", id));
        assert_eq!(client.listener_count("count"), 0);
    }

    #[tokio::test]
    async fn test_connect_repulls_listened_channels() {
        let client = Client::default();
        client.on_channel("count", |_| {});

        let (client_tx, mut server_rx) = link::unbounded();
        let (_server_tx, client_rx) = link::unbounded::<ServerMessage>();
        client.connect_with(client_tx, client_rx);

        assert_eq!(expect_sent(&mut server_rx).await, ClientMessage::get("count"));
    }

    #[tokio::test]
    async fn test_welcome_sets_manifest() {
        let (client, _server_rx, server_tx) = scripted();
        server_tx
            .unbounded_send(ServerMessage::Welcome(Manifest {
                peer_id: PeerId::from("p-1"),
                version: "1.0.0".into(),
                channels: vec!["count".into()],
                procedures: vec![],
            }))
            .unwrap();

        timeout(Duration::from_secs(1), async {
            while client.peer_id().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(client.peer_id(), Some(PeerId::from("p-1")));
    }

    #[tokio::test]
    async fn test_server_close_marks_disconnected() {
        let (client, _server_rx, server_tx) = scripted();
        assert!(client.is_connected());
        drop(server_tx);

        timeout(Duration::from_secs(1), async {
            while client.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("client never noticed close");
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (client, _server_rx, _server_tx) = scripted();
        client.disconnect();
        client.disconnect();
        assert!(!client.is_connected());
        assert!(client.manifest().is_none());
    }
}
