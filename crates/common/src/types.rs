//! Common data types for Dark Tower lifecycle components.
//!
//! Room and session identifiers are assigned by the media server, so they are
//! opaque strings rather than UUIDs. A room id (the room *name*) may be reused
//! across sessions; the session id (the media server's room SID) is unique per
//! session.

use crate::error::{DarkTowerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a room (stable across sessions of the same room)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a room id, rejecting empty or whitespace-only values.
    ///
    /// # Errors
    ///
    /// Returns `DarkTowerError::InvalidIdentifier` if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DarkTowerError::InvalidIdentifier(
                "room id is empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one session of a room (unique per room start)
///
/// May be empty when the media server omits it; callers comparing sessions
/// treat an empty session id as "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw session id.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the media server did not supply a session id.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
