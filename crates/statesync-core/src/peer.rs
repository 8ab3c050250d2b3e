//! Connection identifiers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one attached peer connection.
///
/// A fresh id is minted for every attach; reconnecting yields a new id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Generate a new random peer ID
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the peer ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get a short form of the peer ID (first 8 characters)
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
