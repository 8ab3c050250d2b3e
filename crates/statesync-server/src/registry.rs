//! Channel registry
//!
//! Owns every named channel. Lookups clone the channel out of the map and
//! release the map lock before any pipeline step runs, so registering a
//! channel never waits on a commit and commits on different channels never
//! wait on each other.

use parking_lot::RwLock;
use serde_json::Value;
use statesync_core::PeerId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::channel::{Channel, ChannelDef, ChannelHandle, ChannelValue, ErasedChannel};
use crate::error::{Result, ServerError};
use crate::session::Fanout;

/// Registry of named, schema-typed state channels
pub struct ChannelRegistry {
    channels: RwLock<BTreeMap<String, Arc<dyn ErasedChannel>>>,
    fanout: Arc<dyn Fanout>,
}

impl ChannelRegistry {
    /// Create an empty registry that delivers through `fanout`
    pub fn new(fanout: Arc<dyn Fanout>) -> Self {
        Self {
            channels: RwLock::new(BTreeMap::new()),
            fanout,
        }
    }

    /// Register a channel and get its typed handle
    pub fn register<T: ChannelValue>(&self, def: ChannelDef<T>) -> Result<ChannelHandle<T>> {
        let mut channels = self.channels.write();
        if channels.contains_key(&def.name) {
            return Err(ServerError::DuplicateChannel(def.name));
        }

        info!("Registering state for: {}", def.name);
        let name = def.name.clone();
        let channel = Arc::new(Channel::new(def, self.fanout.clone()));
        let erased: Arc<dyn ErasedChannel> = channel.clone();
        channels.insert(name, erased);

        Ok(ChannelHandle::new(channel))
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn ErasedChannel>> {
        self.channels
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownChannel(name.to_string()))
    }

    /// Current authoritative value as JSON
    pub fn get(&self, name: &str) -> Result<Value> {
        self.lookup(name)?.current()
    }

    /// Value the channel was registered with
    pub fn initial(&self, name: &str) -> Result<Value> {
        self.lookup(name)?.initial()
    }

    /// Server-originated write. Skips validation and hooks; the value only has
    /// to deserialize into the channel's type. Always broadcasts.
    pub fn apply_local(&self, name: &str, value: Value) -> Result<()> {
        self.lookup(name)?.apply_raw(value)
    }

    /// Run the commit pipeline for a peer proposal.
    ///
    /// Returns the committed value, or the reason the proposal was dropped.
    /// A dropped proposal leaves the value untouched and broadcasts nothing.
    pub fn propose(&self, origin: &PeerId, name: &str, raw: Value) -> Result<Value> {
        self.lookup(name)?.propose(origin, raw)
    }

    /// Send the current value to one peer only
    pub fn snapshot_to(&self, peer: &PeerId, name: &str) -> Result<()> {
        self.lookup(name)?.snapshot_to(peer)
    }

    /// Registered channel names, sorted
    pub fn names(&self) -> Vec<String> {
        self.channels.read().keys().cloned().collect()
    }

    /// Every channel's current value
    pub fn values(&self) -> BTreeMap<String, Value> {
        let channels: Vec<_> = self
            .channels
            .read()
            .iter()
            .map(|(name, ch)| (name.clone(), ch.clone()))
            .collect();

        channels
            .into_iter()
            .filter_map(|(name, ch)| ch.current().ok().map(|v| (name, v)))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}
