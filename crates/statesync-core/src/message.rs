//! Wire messages
//!
//! Every frame on the duplex transport is one of these two enums, tagged by a
//! `type` field. Channel values and procedure params/results are carried as
//! raw JSON; typing happens at the registry (server) and the mirror (client).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::peer::PeerId;

/// Per-client call correlation id
pub type CallId = u64;

/// Messages sent from peer to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the current value of a channel (unicast reply)
    Get { channel: String },

    /// Propose a new value for a channel
    Set {
        channel: String,
        #[serde(default)]
        value: Value,
    },

    /// Invoke a procedure
    Call {
        id: CallId,
        method: String,
        #[serde(default)]
        params: Value,
    },
}

impl ClientMessage {
    pub fn get(channel: impl Into<String>) -> Self {
        Self::Get { channel: channel.into() }
    }

    pub fn set(channel: impl Into<String>, value: Value) -> Self {
        Self::Set { channel: channel.into(), value }
    }

    pub fn call(id: CallId, method: impl Into<String>, params: Value) -> Self {
        Self::Call { id, method: method.into(), params }
    }

    /// Event name in `get_<channel>` / `set_<channel>` / `call_<method>` form, for logs
    pub fn event_name(&self) -> String {
        match self {
            Self::Get { channel } => format!("get_{}", channel),
            Self::Set { channel, .. } => format!("set_{}", channel),
            Self::Call { method, .. } => format!("call_{}", method),
        }
    }
}

/// Why a proposal or pull was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The channel's validator refused the value
    ValidationFailed,
    /// The channel's pre-commit hook vetoed the value
    PreCommitRejected,
    /// No channel is registered under that name
    UnknownChannel,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ValidationFailed => "validation_failed",
            Self::PreCommitRejected => "pre_commit_rejected",
            Self::UnknownChannel => "unknown_channel",
        };
        f.write_str(s)
    }
}

/// Names the server exposes, sent once when a peer attaches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub peer_id: PeerId,
    pub version: String,
    pub channels: Vec<String>,
    pub procedures: Vec<String>,
}

/// Messages sent from server to peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once per attach
    Welcome(Manifest),

    /// Snapshot reply (unicast) or committed value (broadcast)
    Value { channel: String, value: Value },

    /// A proposal or pull from this peer was dropped
    Rejected {
        channel: String,
        reason: RejectReason,
        message: String,
    },

    /// The single response to a `Call`
    Response {
        id: CallId,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Frame-level problem (undecodable input, oversize frame)
    Error { message: String },
}

impl ServerMessage {
    pub fn value(channel: impl Into<String>, value: Value) -> Self {
        Self::Value { channel: channel.into(), value }
    }

    pub fn rejected(channel: impl Into<String>, reason: RejectReason, message: impl Into<String>) -> Self {
        Self::Rejected {
            channel: channel.into(),
            reason,
            message: message.into(),
        }
    }

    /// Package a procedure outcome as its response
    pub fn response(id: CallId, method: impl Into<String>, outcome: Result<Value, String>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(message) => (None, Some(message)),
        };
        Self::Response {
            id,
            method: method.into(),
            result,
            error,
        }
    }

    /// Channel this message concerns, if any
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Value { channel, .. } | Self::Rejected { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

/// Split a `Response` payload back into success or error.
///
/// A response carrying neither field is a success with `null`; JSON `null`
/// results deserialize to `None`.
pub fn response_outcome(result: Option<Value>, error: Option<String>) -> Result<Value, String> {
    match error {
        Some(message) => Err(message),
        None => Ok(result.unwrap_or(Value::Null)),
    }
}
