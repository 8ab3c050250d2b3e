//! Statesync Server - Authoritative state channels and procedures
//!
//! This crate is the authoritative half of the protocol. It owns every
//! channel value, runs the commit pipeline for peer proposals, executes
//! procedures, and fans results out to attached peers.
//!
//! # Overview
//!
//! - **registry**: named channels with validators and commit hooks
//! - **channel**: validators, definitions and typed channel handles
//! - **procedure**: named async/sync handlers with one response per call
//! - **session**: attached peers and their ordered outbound queues
//! - **server**: connection loop and message dispatch
//!
//! # Commit pipeline
//!
//! A `set` from a peer runs validate → pre-commit → apply → broadcast →
//! post-commit as one step per channel. A dropped proposal changes nothing
//! and broadcasts nothing; the proposer gets a `rejected` notice unless
//! [`ServerConfig::notify_rejections`] is off.
//!
//! A hook may write its own channel immediately. A hook that writes another
//! channel has that write queued until the commit that ran the hook has
//! released its guard, so two channels whose hooks write each other cannot
//! deadlock.
//!
//! # Example
//!
//! ```rust,no_run
//! use statesync_server::{ChannelDef, ServerConfig, SyncServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Arc::new(SyncServer::new(ServerConfig::default()));
//!
//!     let count = server.channels().register(ChannelDef::<i64>::schema("count", 100))?;
//!     server.procedures().register_sync("echo", |s: String| Ok::<_, String>(s))?;
//!
//!     // Server-side writes are broadcast to every attached peer
//!     count.set(count.get() + 1)?;
//!
//!     // Peers connect through a transport adapter, or in memory:
//!     let _link = server.connect_local();
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod procedure;
pub mod registry;
mod scope;
pub mod server;
pub mod session;

// Re-exports
pub use channel::{ChannelDef, ChannelHandle, ChannelValue, Validator};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use procedure::{Procedure, ProcedureRegistry};
pub use registry::ChannelRegistry;
pub use server::{Inbound, LocalLink, ServerStats, SyncServer};
pub use session::{Fanout, SessionInfo, SessionManager};
