//! Statesync Client - Peer side of the protocol
//!
//! A [`Client`] owns one connection at a time and is shared by everything
//! built on it:
//!
//! - **connection**: explicit connect/disconnect and message dispatch
//! - **cache**: [`SyncedCache`] mirrors of server channels
//! - **rpc**: correlated procedure calls and typed [`ProcedureStub`]s
//!
//! # Example
//!
//! ```rust,no_run
//! use statesync_client::{Client, ClientConfig, SyncedCache};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(ClientConfig::default());
//!     client.connect_ws("ws://127.0.0.1:8080/ws").await?;
//!
//!     let count = SyncedCache::<i64>::attach(&client, "count", 0);
//!     count.write(|n| n + 1)?;
//!
//!     let echoed: String = client.call("echo", "hi").await?;
//!     println!("{} {}", count.read(), echoed);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod rpc;

// Re-exports
pub use cache::SyncedCache;
pub use config::ClientConfig;
pub use connection::{ChannelEvent, Client, ListenerId};
pub use error::{ClientError, Result};
pub use rpc::ProcedureStub;
