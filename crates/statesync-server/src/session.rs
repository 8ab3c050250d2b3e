//! Peer session tracking and message fan-out
//!
//! Every attached peer owns one bounded outbound queue. Unicast replies and
//! broadcasts both go through that queue, so a peer sees them in the order
//! the server produced them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use statesync_core::{PeerId, ServerMessage};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Delivery seam used by the channel registry.
///
/// The registry never holds peer references; it only asks for "everyone" or
/// "this one peer".
pub trait Fanout: Send + Sync {
    /// Deliver to every attached peer
    fn broadcast(&self, message: ServerMessage);

    /// Deliver to a single peer; returns false if the peer is gone
    fn unicast(&self, peer: &PeerId, message: ServerMessage) -> bool;
}

/// Public view of an attached peer
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub peer_id: PeerId,
    pub connected_at: DateTime<Utc>,
}

struct PeerSession {
    outbound: mpsc::Sender<ServerMessage>,
    info: SessionInfo,
}

enum Delivery {
    Sent,
    Full,
    Closed,
}

impl PeerSession {
    fn deliver(&self, message: ServerMessage) -> Delivery {
        match self.outbound.try_send(message) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Tracks live connections and their outbound queues
pub struct SessionManager {
    sessions: RwLock<HashMap<PeerId, PeerSession>>,
    queue_capacity: usize,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new connection, returning its id and outbound queue
    pub fn attach(&self) -> (PeerId, mpsc::Receiver<ServerMessage>) {
        let peer_id = PeerId::random();
        let (outbound, rx) = mpsc::channel(self.queue_capacity);
        let info = SessionInfo {
            peer_id: peer_id.clone(),
            connected_at: Utc::now(),
        };

        let mut sessions = self.sessions.write();
        sessions.insert(peer_id.clone(), PeerSession { outbound, info });
        info!("Peer attached: {} (total: {})", peer_id.short(), sessions.len());

        (peer_id, rx)
    }

    /// Drop a connection. Returns false if it was already gone.
    pub fn detach(&self, peer: &PeerId) -> bool {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(peer).is_some();
        if removed {
            info!("Peer detached: {} (remaining: {})", peer.short(), sessions.len());
        }
        removed
    }

    /// Check whether a peer is attached
    pub fn is_attached(&self, peer: &PeerId) -> bool {
        self.sessions.read().contains_key(peer)
    }

    /// Number of attached peers
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Info for every attached peer
    pub fn peers(&self) -> Vec<SessionInfo> {
        self.sessions.read().values().map(|s| s.info.clone()).collect()
    }

    fn evict(&self, stalled: Vec<PeerId>, closed: Vec<PeerId>) {
        if stalled.is_empty() && closed.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write();
        for peer in stalled {
            if sessions.remove(&peer).is_some() {
                warn!(
                    "Evicting peer {}: outbound queue full ({} messages)",
                    peer.short(),
                    self.queue_capacity
                );
            }
        }
        for peer in closed {
            if sessions.remove(&peer).is_some() {
                debug!("Removing peer {} with closed queue", peer.short());
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Fanout for SessionManager {
    fn broadcast(&self, message: ServerMessage) {
        let mut stalled = Vec::new();
        let mut closed = Vec::new();
        {
            let sessions = self.sessions.read();
            for (peer, session) in sessions.iter() {
                match session.deliver(message.clone()) {
                    Delivery::Sent => {}
                    Delivery::Full => stalled.push(peer.clone()),
                    Delivery::Closed => closed.push(peer.clone()),
                }
            }
        }
        self.evict(stalled, closed);
    }

    fn unicast(&self, peer: &PeerId, message: ServerMessage) -> bool {
        let delivery = match self.sessions.read().get(peer) {
            Some(session) => session.deliver(message),
            None => return false,
        };
        match delivery {
            Delivery::Sent => true,
            Delivery::Full => {
                self.evict(vec![peer.clone()], Vec::new());
                false
            }
            Delivery::Closed => {
                self.evict(Vec::new(), vec![peer.clone()]);
                false
            }
        }
    }
}
