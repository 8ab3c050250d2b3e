//! Statesync Core - Shared types for the state synchronization protocol
//!
//! This crate holds everything both ends of a connection agree on: peer
//! identifiers, the wire messages exchanged over the duplex transport, and
//! the JSON codec used to put them in text frames.
//!
//! # Modules
//!
//! - [`peer`] - Connection identifiers
//! - [`message`] - Client and server wire messages
//! - [`codec`] - JSON text-frame encoding
//! - [`error`] - Protocol error types
//!
//! # Example
//!
//! ```rust
//! use statesync_core::{codec, ClientMessage};
//!
//! let frame = codec::encode(&ClientMessage::get("count")).unwrap();
//! assert_eq!(frame, r#"{"type":"get","channel":"count"}"#);
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod peer;

// Re-exports for convenience
pub use error::{ProtocolError, Result};
pub use message::{CallId, ClientMessage, Manifest, RejectReason, ServerMessage};
pub use peer::PeerId;

/// Protocol version advertised in the attach manifest
pub const PROTOCOL_VERSION: &str = "1.0.0";
