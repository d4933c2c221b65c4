//! Common error types for Dark Tower lifecycle components.

use thiserror::Error;

/// Common errors that can occur across Dark Tower components
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DarkTowerError {
    /// Identifier was empty or otherwise unusable
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias using `DarkTowerError`
pub type Result<T> = std::result::Result<T, DarkTowerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            DarkTowerError::InvalidIdentifier("room id is empty".to_string()).to_string(),
            "Invalid identifier: room id is empty"
        );
        assert_eq!(
            DarkTowerError::Configuration("bad flag".to_string()).to_string(),
            "Configuration error: bad flag"
        );
    }
}
