//! Lifecycle Service error types.
//!
//! Nothing in the event path is fatal: every error ends up in a log line and,
//! for fan-out tasks, in the `lc_fanout_tasks_total{status="error"}` counter.
//! The upstream media server never sees these errors.

use common::error::DarkTowerError;
use thiserror::Error;

/// Lifecycle Service error type.
#[derive(Debug, Error)]
pub enum LcError {
    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(String),

    /// Outbound HTTP call failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON encoding/decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event is missing data required by the action (e.g. no room descriptor).
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A downstream collaborator rejected or failed the request.
    #[error("{service} failed: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LcError {
    /// Bounded label for metrics (`error_type`).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            LcError::Redis(_) => "redis",
            LcError::Http(_) => "http",
            LcError::Serialization(_) => "serialization",
            LcError::Io(_) => "io",
            LcError::Config(_) => "config",
            LcError::MalformedEvent(_) => "malformed_event",
            LcError::Collaborator { .. } => "collaborator",
            LcError::Internal(_) => "internal",
        }
    }
}

impl From<DarkTowerError> for LcError {
    fn from(err: DarkTowerError) -> Self {
        match err {
            DarkTowerError::InvalidIdentifier(msg) => LcError::MalformedEvent(msg),
            DarkTowerError::Serialization(msg) => LcError::Serialization(msg),
            DarkTowerError::Configuration(msg) => LcError::Config(msg),
        }
    }
}

impl From<serde_json::Error> for LcError {
    fn from(err: serde_json::Error) -> Self {
        LcError::Serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_bounded() {
        let errors = [
            LcError::Redis("x".to_string()),
            LcError::Http("x".to_string()),
            LcError::Serialization("x".to_string()),
            LcError::Io("x".to_string()),
            LcError::Config("x".to_string()),
            LcError::MalformedEvent("x".to_string()),
            LcError::Collaborator {
                service: "speech",
                message: "x".to_string(),
            },
            LcError::Internal("x".to_string()),
        ];
        let kinds: std::collections::HashSet<_> = errors.iter().map(LcError::kind).collect();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            LcError::Redis("timeout".to_string()).to_string(),
            "Redis error: timeout"
        );
        assert_eq!(
            LcError::Collaborator {
                service: "breakout",
                message: "queue full".to_string()
            }
            .to_string(),
            "breakout failed: queue full"
        );
    }

    #[test]
    fn test_common_error_conversion() {
        let err: LcError = DarkTowerError::InvalidIdentifier("room id is empty".to_string()).into();
        assert!(matches!(err, LcError::MalformedEvent(_)));

        let err: LcError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.kind(), "serialization");
    }
}
