//! Channel definitions, validators and the per-channel commit pipeline

use parking_lot::{ReentrantMutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use statesync_core::{PeerId, ServerMessage};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{Result, ServerError};
use crate::scope;
use crate::session::Fanout;

/// Bound for anything stored in a channel
pub trait ChannelValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> ChannelValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

type CheckFn<T> = Arc<dyn Fn(&Value) -> std::result::Result<T, String> + Send + Sync>;

/// Veto predicate run before a validated value is applied
pub type PreCommitFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Callback run after a value has been applied and broadcast
pub type PostCommitFn<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;

/// Parses raw peer input into a typed value, or refuses it with a reason.
pub struct Validator<T> {
    check: CheckFn<T>,
}

impl<T> Clone for Validator<T> {
    fn clone(&self) -> Self {
        Self {
            check: self.check.clone(),
        }
    }
}

impl<T: DeserializeOwned + 'static> Validator<T> {
    /// Accept anything that deserializes into `T`
    pub fn schema() -> Self {
        Self::custom(|raw| serde_json::from_value(raw.clone()).map_err(|e| e.to_string()))
    }
}

impl<T: 'static> Validator<T> {
    /// Build a validator from an arbitrary parse function
    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<T, String> + Send + Sync + 'static,
    {
        Self {
            check: Arc::new(check),
        }
    }

    /// Additionally require `predicate` to hold, failing with `message`
    pub fn refine<P>(self, predicate: P, message: impl Into<String>) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let inner = self.check;
        let message = message.into();
        Self::custom(move |raw| {
            let value = inner(raw)?;
            if predicate(&value) {
                Ok(value)
            } else {
                Err(message.clone())
            }
        })
    }

    /// Run the validator
    pub fn validate(&self, raw: &Value) -> std::result::Result<T, String> {
        (self.check)(raw)
    }
}

/// Everything needed to register a channel
pub struct ChannelDef<T> {
    pub(crate) name: String,
    pub(crate) validator: Validator<T>,
    pub(crate) initial: T,
    pub(crate) pre_commit: Option<PreCommitFn<T>>,
    pub(crate) post_commit: Option<PostCommitFn<T>>,
}

impl<T: ChannelValue> ChannelDef<T> {
    /// Define a channel. `initial` may be any narrower type convertible into `T`.
    pub fn new(name: impl Into<String>, validator: Validator<T>, initial: impl Into<T>) -> Self {
        Self {
            name: name.into(),
            validator,
            initial: initial.into(),
            pre_commit: None,
            post_commit: None,
        }
    }

    /// Define a channel validated purely by deserialization into `T`
    pub fn schema(name: impl Into<String>, initial: impl Into<T>) -> Self {
        Self::new(name, Validator::schema(), initial)
    }

    pub fn pre_commit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.pre_commit = Some(Arc::new(hook));
        self
    }

    pub fn post_commit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.post_commit = Some(Arc::new(hook));
        self
    }
}

/// Type-erased view the registry keeps for each channel
pub(crate) trait ErasedChannel: Send + Sync {
    fn current(&self) -> Result<Value>;
    fn initial(&self) -> Result<Value>;
    fn propose(&self, origin: &PeerId, raw: Value) -> Result<Value>;
    fn apply_raw(self: Arc<Self>, raw: Value) -> Result<()>;
    fn snapshot_to(&self, peer: &PeerId) -> Result<()>;
}

/// One registered channel.
///
/// `guard` serializes the pipeline, local writes and snapshots for this
/// channel only. It is re-entrant so hooks may touch their own channel.
/// A thread holding one channel's guard never waits on another's: such
/// writes are queued in the thread's commit scope instead.
pub(crate) struct Channel<T> {
    name: String,
    validator: Validator<T>,
    initial: T,
    value: RwLock<T>,
    guard: ReentrantMutex<()>,
    pre_commit: Option<PreCommitFn<T>>,
    post_commit: Option<PostCommitFn<T>>,
    fanout: Arc<dyn Fanout>,
}

impl<T: ChannelValue> Channel<T> {
    pub(crate) fn new(def: ChannelDef<T>, fanout: Arc<dyn Fanout>) -> Self {
        Self {
            value: RwLock::new(def.initial.clone()),
            name: def.name,
            validator: def.validator,
            initial: def.initial,
            guard: ReentrantMutex::new(()),
            pre_commit: def.pre_commit,
            post_commit: def.post_commit,
            fanout,
        }
    }

    fn get(&self) -> T {
        self.value.read().clone()
    }

    fn key(&self) -> usize {
        &self.guard as *const ReentrantMutex<()> as usize
    }

    /// Run `f` under this channel's guard, then any writes it queued
    fn guarded<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = {
            let _guard = self.guard.lock();
            let _entered = scope::Entered::new(self.key());
            f()
        };
        scope::flush();
        result
    }

    /// Authority write: no validation, no hooks, unconditional broadcast
    fn apply_local(&self, value: T) -> Result<()> {
        self.guarded(|| {
            let wire = serde_json::to_value(&value)?;
            *self.value.write() = value;
            debug!("Local write to {}", self.name);
            self.fanout.broadcast(ServerMessage::value(&self.name, wire));
            Ok(())
        })
    }

    fn update<F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&T) -> T,
    {
        self.guarded(|| {
            let next = f(&self.get());
            self.apply_local(next.clone())?;
            Ok(next)
        })
    }

    /// Run `job` now, or after the current commit if this thread is inside
    /// another channel's guard
    fn now_or_deferred(self: Arc<Self>, job: impl FnOnce(&Self) -> Result<()> + 'static) -> Result<()> {
        if !scope::must_defer(self.key()) {
            return job(&*self);
        }
        debug!("Queueing write to {} until the current commit finishes", self.name);
        scope::defer(move || {
            if let Err(e) = job(&*self) {
                error!("Queued write to {} failed: {}", self.name, e);
            }
        });
        Ok(())
    }

    fn allowed(&self, value: &T) -> bool {
        let Some(hook) = &self.pre_commit else {
            return true;
        };
        match catch_unwind(AssertUnwindSafe(|| hook(value))) {
            Ok(allowed) => allowed,
            Err(_) => {
                error!("Pre-commit hook panicked for {}; treating as veto", self.name);
                false
            }
        }
    }

    fn after_commit(&self, value: &T) {
        let Some(hook) = &self.post_commit else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| hook(value))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Post-commit hook failed for {}: {:#}", self.name, e),
            Err(_) => error!("Post-commit hook panicked for {}", self.name),
        }
    }
}

impl<T: ChannelValue> ErasedChannel for Channel<T> {
    fn current(&self) -> Result<Value> {
        Ok(serde_json::to_value(&*self.value.read())?)
    }

    fn initial(&self) -> Result<Value> {
        Ok(serde_json::to_value(&self.initial)?)
    }

    fn propose(&self, origin: &PeerId, raw: Value) -> Result<Value> {
        self.guarded(|| self.commit(origin, raw))
    }

    fn apply_raw(self: Arc<Self>, raw: Value) -> Result<()> {
        let value: T = serde_json::from_value(raw)?;
        self.now_or_deferred(move |channel| channel.apply_local(value))
    }

    fn snapshot_to(&self, peer: &PeerId) -> Result<()> {
        self.guarded(|| {
            let wire = self.current()?;
            if self.fanout.unicast(peer, ServerMessage::value(&self.name, wire)) {
                Ok(())
            } else {
                Err(ServerError::PeerNotFound(peer.to_string()))
            }
        })
    }
}

impl<T: ChannelValue> Channel<T> {
    /// Validate, veto, apply, broadcast, then post-commit. Caller holds the guard.
    fn commit(&self, origin: &PeerId, raw: Value) -> Result<Value> {
        let parsed = match self.validator.validate(&raw) {
            Ok(parsed) => parsed,
            Err(reason) => {
                error!(
                    "Invalid payload for {} from {}: {} ({})",
                    self.name,
                    origin.short(),
                    raw,
                    reason
                );
                return Err(ServerError::Validation {
                    channel: self.name.clone(),
                    reason,
                });
            }
        };

        if !self.allowed(&parsed) {
            warn!("Pre-commit hook failed for {}", self.name);
            return Err(ServerError::PreCommitRejected(self.name.clone()));
        }

        // Serialize before applying so a failure leaves the value untouched
        let wire = serde_json::to_value(&parsed)?;
        *self.value.write() = parsed.clone();
        self.fanout.broadcast(ServerMessage::value(&self.name, wire.clone()));
        debug!("Committed {} from {}", self.name, origin.short());

        self.after_commit(&parsed);
        Ok(wire)
    }
}

/// Typed accessor returned by registration
pub struct ChannelHandle<T> {
    inner: Arc<Channel<T>>,
}

impl<T> Clone for ChannelHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ChannelHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle").field("name", &self.inner.name).finish()
    }
}

impl<T: ChannelValue> ChannelHandle<T> {
    pub(crate) fn new(inner: Arc<Channel<T>>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current authoritative value
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Value the channel was registered with
    pub fn initial(&self) -> T {
        self.inner.initial.clone()
    }

    /// Server-side write, broadcast to every peer.
    ///
    /// Called from another channel's hook, the write is queued and applied
    /// once that commit has finished; `Ok` then only means it was queued.
    pub fn set(&self, value: T) -> Result<()> {
        self.inner
            .clone()
            .now_or_deferred(move |channel| channel.apply_local(value))
    }

    /// Read-modify-write as one step relative to other writers of this channel.
    ///
    /// Queued like [`ChannelHandle::set`] when called from another channel's hook.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T + 'static,
    {
        self.inner
            .clone()
            .now_or_deferred(move |channel| channel.update(f).map(|_| ()))
    }
}
