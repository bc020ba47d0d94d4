//! Identity of the local contributor.

use serde::{Deserialize, Serialize};

/// The current user as reported by the identity provider.
///
/// Values are opaque and passed through to every committed stroke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub author_id: String,
    pub author_name: String,
}

impl Identity {
    pub fn new(author_id: impl Into<String>, author_name: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            author_name: author_name.into(),
        }
    }

    /// An identity without an author id cannot write to the log.
    pub fn is_usable(&self) -> bool {
        !self.author_id.trim().is_empty()
    }
}
