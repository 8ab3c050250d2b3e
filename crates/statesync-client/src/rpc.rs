//! RPC calls
//!
//! Every call carries its own id, so concurrent calls to the same method
//! each resolve with their own response.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use statesync_core::CallId;
use std::marker::PhantomData;
use tokio::sync::oneshot;
use tracing::debug;

use crate::connection::Client;
use crate::error::{ClientError, Result};

impl Client {
    /// Call a procedure with callbacks.
    ///
    /// Exactly one of `on_success` / `on_error` runs. Without a connection
    /// `on_error` runs immediately with [`ClientError::NotConnected`].
    pub fn call_with<S, E>(&self, method: &str, params: Value, on_success: S, on_error: E) -> Option<CallId>
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(ClientError) + Send + 'static,
    {
        self.inner.start_call(
            method,
            params,
            Box::new(move |outcome| match outcome {
                Ok(value) => on_success(value),
                Err(e) => on_error(e),
            }),
        )
    }

    /// Call a procedure and wait for its typed result
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let (tx, rx) = oneshot::channel();
        let id = self.inner.start_call(
            method,
            params,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );

        let outcome = match (self.inner.config().call_timeout(), id) {
            (Some(limit), Some(id)) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    // A late response finds no pending entry and is dropped
                    self.inner.take_pending(id);
                    debug!("Call {} ({}) timed out", method, id);
                    return Err(ClientError::Timeout {
                        duration_ms: limit.as_millis() as u64,
                    });
                }
            },
            _ => rx.await,
        };

        let value = outcome.map_err(|_| ClientError::ConnectionClosed)??;
        Ok(serde_json::from_value(value)?)
    }

    /// Typed stub for one procedure
    pub fn procedure<P, R>(&self, method: impl Into<String>) -> ProcedureStub<P, R> {
        ProcedureStub {
            client: self.clone(),
            method: method.into(),
            _marker: PhantomData,
        }
    }
}

/// A procedure bound to a name and parameter/result types
pub struct ProcedureStub<P, R> {
    client: Client,
    method: String,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R> ProcedureStub<P, R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn call(&self, params: P) -> Result<R> {
        self.client.call(&self.method, params).await
    }

    /// Callback form; see [`Client::call_with`]
    pub fn call_with<S, E>(&self, params: P, on_success: S, on_error: E) -> Option<CallId>
    where
        R: Send + 'static,
        S: FnOnce(R) + Send + 'static,
        E: FnOnce(ClientError) + Send + 'static,
    {
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(e) => {
                on_error(e.into());
                return None;
            }
        };
        self.client.inner.start_call(
            &self.method,
            params,
            Box::new(move |outcome| {
                match outcome.and_then(|value| serde_json::from_value::<R>(value).map_err(ClientError::from)) {
                    Ok(result) => on_success(result),
                    Err(e) => on_error(e),
                }
            }),
        )
    }
}

impl<P, R> Clone for ProcedureStub<P, R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            method: self.method.clone(),
            _marker: PhantomData,
        }
    }
}
