//! Peer-side mirror of one channel
//!
//! The mirror is overwritten by every value the server pushes for the
//! channel, last write wins. Local writes are optimistic: the mirror changes
//! first and the proposal follows. If the server rejects one of this
//! cache's proposals the cache pulls the authoritative value again.
//! Rejections it has no write outstanding for, and unknown-channel notices,
//! never trigger a pull.

use serde::de::DeserializeOwned;
use serde::Serialize;
use statesync_core::{ClientMessage, RejectReason};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::connection::{ChannelEvent, Client, ListenerId};
use crate::error::Result;

/// Mirror of a server channel
pub struct SyncedCache<T> {
    client: Client,
    channel: String,
    mirror: Arc<watch::Sender<T>>,
    /// Proposals sent that have not been rejected yet
    unconfirmed: Arc<AtomicUsize>,
    listener: Option<ListenerId>,
}

/// Take one outstanding proposal off the count, if there is one
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl<T> SyncedCache<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Start mirroring `channel`, seeded with `initial` until the first
    /// value arrives
    pub fn attach(client: &Client, channel: impl Into<String>, initial: impl Into<T>) -> Self {
        let channel = channel.into();
        let (mirror, _) = watch::channel(initial.into());
        let mirror = Arc::new(mirror);
        let unconfirmed = Arc::new(AtomicUsize::new(0));

        let listener = {
            let mirror = mirror.clone();
            let unconfirmed = unconfirmed.clone();
            let warned_unknown = AtomicBool::new(false);
            let weak = client.downgrade();
            let name = channel.clone();
            client.on_channel(&channel, move |event| match event {
                ChannelEvent::Value(raw) => match serde_json::from_value::<T>(raw.clone()) {
                    Ok(value) => {
                        mirror.send_replace(value);
                    }
                    Err(e) => warn!("Ignoring undecodable value for {}: {}", name, e),
                },
                ChannelEvent::Rejected {
                    reason: RejectReason::UnknownChannel,
                    ..
                } => {
                    if !warned_unknown.swap(true, Ordering::SeqCst) {
                        warn!("Channel {} is not registered on the server", name);
                    }
                }
                ChannelEvent::Rejected { reason, .. } => {
                    if !take_one(&unconfirmed) {
                        debug!("Rejection on {} without a pending write ({:?})", name, reason);
                        return;
                    }
                    // Undo the optimistic write
                    if let Some(inner) = weak.upgrade() {
                        let _ = inner.send(ClientMessage::get(name.clone()));
                    }
                }
            })
        };

        if client.send(ClientMessage::get(channel.clone())).is_err() {
            debug!("Not connected; {} will be pulled on connect", channel);
        }

        Self {
            client: client.clone(),
            channel,
            mirror,
            unconfirmed,
            listener: Some(listener),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Current mirrored value
    pub fn read(&self) -> T {
        self.mirror.borrow().clone()
    }

    /// Update the mirror and propose `value` to the server.
    ///
    /// Without a connection the mirror is still updated and
    /// `NotConnected` is returned.
    pub fn set(&self, value: impl Into<T>) -> Result<()> {
        let value = value.into();
        let raw = serde_json::to_value(&value)?;
        self.mirror.send_replace(value);

        // Counted before sending so an early rejection still finds it
        self.unconfirmed.fetch_add(1, Ordering::SeqCst);
        let sent = self.client.send(ClientMessage::set(self.channel.clone(), raw));
        if sent.is_err() {
            take_one(&self.unconfirmed);
        }
        sent
    }

    /// Functional form of [`SyncedCache::set`]
    pub fn write<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.mirror.borrow());
        self.set(next)
    }

    /// Ask the server for the current value
    pub fn refresh(&self) -> Result<()> {
        self.client.send(ClientMessage::get(self.channel.clone()))
    }

    /// Watch the mirror for changes
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.mirror.subscribe()
    }

    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Stop following the channel. The last value stays readable.
    pub fn detach(&mut self) {
        if let Some(id) = self.listener.take() {
            self.client.off_channel(&self.channel, id);
        }
    }
}

impl<T> Drop for SyncedCache<T> {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.client.off_channel(&self.channel, id);
        }
    }
}
