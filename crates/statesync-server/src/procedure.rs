//! Procedure registry and invocation
//!
//! Handlers take JSON params and produce a JSON result. Typed helpers wrap
//! plain closures so callers work with their own param/result types.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};

/// A named server-side operation
#[async_trait]
pub trait Procedure: Send + Sync {
    async fn call(&self, params: Value) -> Result<Value>;
}

type BoxedHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Closure-backed procedure built by the `register_*` helpers
struct FnProcedure {
    handler: BoxedHandler,
}

#[async_trait]
impl Procedure for FnProcedure {
    async fn call(&self, params: Value) -> Result<Value> {
        (self.handler)(params).await
    }
}

fn decode_params<P: DeserializeOwned>(method: &str, params: Value) -> Result<P> {
    serde_json::from_value(params).map_err(|e| ServerError::InvalidParams {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

fn encode_result<R: Serialize, E: Display>(method: &str, outcome: std::result::Result<R, E>) -> Result<Value> {
    let result = outcome.map_err(|e| ServerError::Handler {
        method: method.to_string(),
        message: e.to_string(),
    })?;
    Ok(serde_json::to_value(result)?)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Registry of named procedures
#[derive(Default)]
pub struct ProcedureRegistry {
    procedures: RwLock<BTreeMap<String, Arc<dyn Procedure>>>,
}

impl ProcedureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a procedure under `name`
    pub fn register(&self, name: impl Into<String>, procedure: impl Procedure + 'static) -> Result<()> {
        let name = name.into();
        let mut procedures = self.procedures.write();
        if procedures.contains_key(&name) {
            return Err(ServerError::DuplicateProcedure(name));
        }
        info!("Registering \"{}\" procedure", name);
        procedures.insert(name, Arc::new(procedure));
        Ok(())
    }

    /// Register an async closure with typed params and result
    pub fn register_fn<P, R, E, F, Fut>(&self, name: impl Into<String>, f: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let handler: BoxedHandler = Arc::new(move |params: Value| {
            let method = method.clone();
            let pending = decode_params::<P>(&method, params).map(&f);
            async move {
                let outcome = pending?.await;
                encode_result(&method, outcome)
            }
            .boxed()
        });
        self.register(name, FnProcedure { handler })
    }

    /// Register a synchronous closure with typed params and result
    pub fn register_sync<P, R, E, F>(&self, name: impl Into<String>, f: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(P) -> std::result::Result<R, E> + Send + Sync + 'static,
    {
        let name = name.into();
        let method = name.clone();
        let handler: BoxedHandler = Arc::new(move |params: Value| {
            let outcome = decode_params::<P>(&method, params)
                .and_then(|p| encode_result(&method, f(p)));
            futures::future::ready(outcome).boxed()
        });
        self.register(name, FnProcedure { handler })
    }

    /// Run a procedure and return its single result.
    ///
    /// Handler panics are caught here and reported as handler errors.
    pub async fn invoke(&self, name: &str, params: Value) -> Result<Value> {
        let procedure = self
            .procedures
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::UnknownProcedure(name.to_string()))?;

        debug!("Invoking procedure {}", name);
        match AssertUnwindSafe(procedure.call(params)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload);
                warn!("Procedure {} panicked: {}", name, message);
                Err(ServerError::Handler {
                    method: name.to_string(),
                    message,
                })
            }
        }
    }

    /// Registered procedure names, sorted
    pub fn names(&self) -> Vec<String> {
        self.procedures.read().keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procedures.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.procedures.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.read().is_empty()
    }
}
