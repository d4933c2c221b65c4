//! Common configuration types for Dark Tower lifecycle components.

use crate::error::{DarkTowerError, Result};
use crate::secret::SecretString;
use serde::Deserialize;
use std::collections::HashMap;

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "lifecycle_service=debug,tower_http=debug";

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (may embed credentials, never logged)
    pub url: SecretString,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Fallback tracing filter directive
    pub log_filter: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl ObservabilityConfig {
    /// Read `LC_LOG_FILTER` and `LC_LOG_JSON` from a variable map.
    ///
    /// # Errors
    ///
    /// Returns `DarkTowerError::Configuration` if `LC_LOG_JSON` is not a boolean.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let log_filter = vars
            .get("LC_LOG_FILTER")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let json_logs = parse_bool(vars, "LC_LOG_JSON", false)?;
        Ok(Self {
            log_filter,
            json_logs,
        })
    }
}

/// Parse an optional boolean variable (`true/false/1/0/yes/no`).
///
/// # Errors
///
/// Returns `DarkTowerError::Configuration` for any other value.
pub fn parse_bool(vars: &HashMap<String, String>, name: &str, default: bool) -> Result<bool> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(DarkTowerError::Configuration(format!(
                "{name} must be a boolean, got '{other}'"
            ))),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_observability_defaults() {
        let config = ObservabilityConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_parse_bool_variants() {
        let vars = HashMap::from([
            ("A".to_string(), "YES".to_string()),
            ("B".to_string(), "0".to_string()),
            ("C".to_string(), "maybe".to_string()),
        ]);
        assert!(parse_bool(&vars, "A", false).unwrap());
        assert!(!parse_bool(&vars, "B", true).unwrap());
        assert!(parse_bool(&vars, "missing", true).unwrap());
        assert!(matches!(
            parse_bool(&vars, "C", false),
            Err(DarkTowerError::Configuration(_))
        ));
    }
}
