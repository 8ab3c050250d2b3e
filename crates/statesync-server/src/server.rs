//! Sync server - ties registries and sessions to connections
//!
//! A connection is any pair of `Sink<ServerMessage>` / `Stream` of decoded
//! client messages. The WebSocket adapter and the in-memory link both end up
//! in [`SyncServer::serve_connection`].

use futures::channel::mpsc as link;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use statesync_core::{ClientMessage, Manifest, PeerId, ProtocolError, ServerMessage, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::procedure::ProcedureRegistry;
use crate::registry::ChannelRegistry;
use crate::session::{Fanout, SessionManager};

/// Inbound item of a connection: a decoded message or the reason decoding failed
pub type Inbound = Result<ClientMessage, ProtocolError>;

/// Client half of an in-memory connection
pub struct LocalLink {
    pub peer_id: PeerId,
    pub outgoing: link::UnboundedSender<ClientMessage>,
    pub incoming: link::UnboundedReceiver<ServerMessage>,
}

/// Server statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerStats {
    pub peers: usize,
    pub channels: usize,
    pub procedures: usize,
    pub messages_received: u64,
    pub commits: u64,
    pub rejections: u64,
    pub calls: u64,
    pub uptime_secs: u64,
}

#[derive(Default)]
struct Counters {
    messages_received: AtomicU64,
    commits: AtomicU64,
    rejections: AtomicU64,
    calls: AtomicU64,
}

/// The authoritative side of the protocol
pub struct SyncServer {
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    channels: ChannelRegistry,
    procedures: Arc<ProcedureRegistry>,
    counters: Counters,
    start_time: Instant,
}

impl SyncServer {
    /// Create a new sync server
    pub fn new(config: ServerConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(config.peer_queue_capacity));
        let channels = ChannelRegistry::new(sessions.clone());
        Self {
            config,
            sessions,
            channels,
            procedures: Arc::new(ProcedureRegistry::new()),
            counters: Counters::default(),
            start_time: Instant::now(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn procedures(&self) -> &ProcedureRegistry {
        &self.procedures
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Names currently exposed to peers
    pub fn manifest(&self, peer_id: PeerId) -> Manifest {
        Manifest {
            peer_id,
            version: PROTOCOL_VERSION.to_string(),
            channels: self.channels.names(),
            procedures: self.procedures.names(),
        }
    }

    /// Attach a new peer and queue its welcome manifest
    pub fn attach(&self) -> (PeerId, mpsc::Receiver<ServerMessage>) {
        let (peer_id, outbound) = self.sessions.attach();
        let welcome = ServerMessage::Welcome(self.manifest(peer_id.clone()));
        self.sessions.unicast(&peer_id, welcome);
        (peer_id, outbound)
    }

    /// Detach a peer. Channel values are unaffected.
    pub fn detach(&self, peer: &PeerId) {
        self.sessions.detach(peer);
    }

    /// Handle one inbound item from `peer`.
    ///
    /// `get` and `set` complete before this returns, which keeps them FIFO per
    /// connection. `call` is spawned so a slow handler never blocks the
    /// connection.
    pub fn handle_inbound(&self, peer: &PeerId, inbound: Inbound) {
        match inbound {
            Ok(msg) => self.handle_message(peer, msg),
            Err(e) => {
                warn!("Failed to parse message from {}: {}", peer.short(), e);
                self.sessions.unicast(peer, ServerMessage::Error { message: e.to_string() });
            }
        }
    }

    /// Handle one decoded message from `peer`
    ///
    /// Messages from a peer that is no longer attached, e.g. one evicted for
    /// a stalled queue while its reader was still running, are dropped.
    pub fn handle_message(&self, peer: &PeerId, msg: ClientMessage) {
        if !self.sessions.is_attached(peer) {
            debug!("Dropping {} from detached peer {}", msg.event_name(), peer.short());
            return;
        }
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);
        debug!("Received {} from {}", msg.event_name(), peer.short());

        match msg {
            ClientMessage::Get { channel } => {
                if let Err(e) = self.channels.snapshot_to(peer, &channel) {
                    warn!("Snapshot of {} for {} failed: {}", channel, peer.short(), e);
                    self.notify_rejection(peer, &channel, &e);
                }
            }

            ClientMessage::Set { channel, value } => match self.channels.propose(peer, &channel, value) {
                Ok(_) => {
                    self.counters.commits.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.rejections.fetch_add(1, Ordering::Relaxed);
                    if matches!(e, ServerError::UnknownChannel(_)) {
                        warn!("Set for unknown channel {} from {}", channel, peer.short());
                    }
                    self.notify_rejection(peer, &channel, &e);
                }
            },

            ClientMessage::Call { id, method, params } => {
                self.counters.calls.fetch_add(1, Ordering::Relaxed);
                self.spawn_call(peer.clone(), id, method, params);
            }
        }
    }

    fn notify_rejection(&self, peer: &PeerId, channel: &str, err: &ServerError) {
        if !self.config.notify_rejections {
            return;
        }
        if let Some(reason) = err.reject_reason() {
            self.sessions
                .unicast(peer, ServerMessage::rejected(channel, reason, err.to_string()));
        }
    }

    fn spawn_call(&self, peer: PeerId, id: u64, method: String, params: Value) {
        let procedures = self.procedures.clone();
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let outcome = procedures
                .invoke(&method, params)
                .await
                .map_err(|e| e.response_message());
            if let Err(message) = &outcome {
                debug!("Call {} ({}) from {} failed: {}", method, id, peer.short(), message);
            }
            if !sessions.unicast(&peer, ServerMessage::response(id, method, outcome)) {
                debug!("Caller {} left before call {} completed", peer.short(), id);
            }
        });
    }

    /// Serve one connection until either direction closes
    pub async fn serve_connection<S, R>(self: Arc<Self>, sink: S, stream: R)
    where
        S: Sink<ServerMessage> + Unpin + Send + 'static,
        R: Stream<Item = Inbound> + Unpin + Send + 'static,
    {
        let (peer_id, outbound) = self.attach();
        self.serve_attached(peer_id, outbound, sink, stream).await;
    }

    async fn serve_attached<S, R>(
        self: Arc<Self>,
        peer_id: PeerId,
        mut outbound: mpsc::Receiver<ServerMessage>,
        mut sink: S,
        mut stream: R,
    ) where
        S: Sink<ServerMessage> + Unpin + Send + 'static,
        R: Stream<Item = Inbound> + Unpin + Send + 'static,
    {
        // Forward queued messages to this peer
        let mut send_task = tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Handle incoming messages from the peer
        let server = self.clone();
        let recv_peer = peer_id.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(inbound) = stream.next().await {
                server.handle_inbound(&recv_peer, inbound);
            }
        });

        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        self.detach(&peer_id);
        info!("Connection closed: {}", peer_id.short());
    }

    /// Open an in-memory connection to this server
    pub fn connect_local(self: &Arc<Self>) -> LocalLink {
        let (outgoing, server_rx) = link::unbounded();
        let (server_tx, incoming) = link::unbounded();

        let (peer_id, outbound) = self.attach();
        let stream = server_rx.map(Ok::<ClientMessage, ProtocolError>);
        tokio::spawn(self.clone().serve_attached(peer_id.clone(), outbound, server_tx, stream));

        LocalLink {
            peer_id,
            outgoing,
            incoming,
        }
    }

    /// Current statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            peers: self.sessions.count(),
            channels: self.channels.len(),
            procedures: self.procedures.len(),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
            rejections: self.counters.rejections.load(Ordering::Relaxed),
            calls: self.counters.calls.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for SyncServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}
