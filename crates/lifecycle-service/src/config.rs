//! Lifecycle Service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::config::{parse_bool, ObservabilityConfig, RedisConfig};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default HTTP bind address (webhook ingress, health, metrics).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8090";

/// Default client-facing broadcast channel.
pub const DEFAULT_CLIENT_CHANNEL: &str = "lc:client-events";

/// Default internal duration-watchdog control channel.
pub const DEFAULT_WATCHDOG_CHANNEL: &str = "lc:room-duration-watchdog";

/// Default recorder control channel.
pub const DEFAULT_RECORDER_CHANNEL: &str = "lc:recorder-control";

/// Identities the media server uses for internal service participants.
pub const DEFAULT_SERVICE_IDENTITIES: &[&str] = &["RECORDER_BOT", "RTMP_BOT"];

/// Default directory holding per-session uploads.
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";

/// Default outbound webhook request timeout in seconds.
pub const DEFAULT_WEBHOOK_TIMEOUT_SECONDS: u64 = 10;

/// Lifecycle Service configuration.
#[derive(Clone)]
pub struct Config {
    /// Redis connection (room records, pub/sub, job queues).
    pub redis: RedisConfig,

    /// HTTP bind address (default: "0.0.0.0:8090").
    pub bind_address: String,

    /// Outbound webhook target. Forwarding is disabled when unset.
    /// Protected by `SecretString` because such URLs usually embed a key.
    pub webhook_url: Option<SecretString>,

    /// Outbound webhook request timeout in seconds.
    pub webhook_timeout_seconds: u64,

    /// Channel for client-facing teardown broadcasts.
    pub client_channel: String,

    /// Channel for duration-watchdog control messages.
    pub watchdog_channel: String,

    /// Channel the recorder listens on.
    pub recorder_channel: String,

    /// Participant identities that never count as genuine participants.
    pub service_identities: Vec<String>,

    /// Keep uploaded files after the session ends.
    pub keep_uploads: bool,

    /// Root directory of per-session upload folders.
    pub upload_dir: PathBuf,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("webhook_timeout_seconds", &self.webhook_timeout_seconds)
            .field("client_channel", &self.client_channel)
            .field("watchdog_channel", &self.watchdog_channel)
            .field("recorder_channel", &self.recorder_channel)
            .field("service_identities", &self.service_identities)
            .field("keep_uploads", &self.keep_uploads)
            .field("upload_dir", &self.upload_dir)
            .field("observability", &self.observability)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<common::error::DarkTowerError> for ConfigError {
    fn from(err: common::error::DarkTowerError) -> Self {
        ConfigError::InvalidValue(err.to_string())
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let bind_address = vars
            .get("LC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let webhook_url = vars
            .get("LC_WEBHOOK_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|s| SecretString::from(s.clone()));

        let webhook_timeout_seconds = match vars.get("LC_WEBHOOK_TIMEOUT_SECONDS") {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "LC_WEBHOOK_TIMEOUT_SECONDS must be an integer, got '{raw}'"
                ))
            })?,
            None => DEFAULT_WEBHOOK_TIMEOUT_SECONDS,
        };

        let client_channel = vars
            .get("LC_CLIENT_CHANNEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CLIENT_CHANNEL.to_string());

        let watchdog_channel = vars
            .get("LC_WATCHDOG_CHANNEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WATCHDOG_CHANNEL.to_string());

        let recorder_channel = vars
            .get("LC_RECORDER_CHANNEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_RECORDER_CHANNEL.to_string());

        let service_identities = match vars.get("LC_SERVICE_IDENTITIES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
            None => DEFAULT_SERVICE_IDENTITIES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        };

        let keep_uploads = parse_bool(vars, "LC_KEEP_UPLOADS", false)?;

        let upload_dir = PathBuf::from(
            vars.get("LC_UPLOAD_DIR")
                .map_or(DEFAULT_UPLOAD_DIR, String::as_str),
        );

        let observability = ObservabilityConfig::from_vars(vars)?;

        Ok(Config {
            redis: RedisConfig { url: redis_url },
            bind_address,
            webhook_url,
            webhook_timeout_seconds,
            client_channel,
            watchdog_channel,
            recorder_channel,
            service_identities,
            keep_uploads,
            upload_dir,
            observability,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "REDIS_URL".to_string(),
            "redis://:hunter2@localhost:6379".to_string(),
        )])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(
            config.redis.url.expose_secret(),
            "redis://:hunter2@localhost:6379"
        );
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert!(config.webhook_url.is_none());
        assert_eq!(config.webhook_timeout_seconds, DEFAULT_WEBHOOK_TIMEOUT_SECONDS);
        assert_eq!(config.client_channel, DEFAULT_CLIENT_CHANNEL);
        assert_eq!(config.watchdog_channel, DEFAULT_WATCHDOG_CHANNEL);
        assert_eq!(config.recorder_channel, DEFAULT_RECORDER_CHANNEL);
        assert_eq!(config.service_identities, vec!["RECORDER_BOT", "RTMP_BOT"]);
        assert!(!config.keep_uploads);
        assert_eq!(config.upload_dir, PathBuf::from(DEFAULT_UPLOAD_DIR));
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("LC_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert(
            "LC_WEBHOOK_URL".to_string(),
            "https://hooks.example.com/in?key=abc".to_string(),
        );
        vars.insert("LC_WEBHOOK_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert("LC_CLIENT_CHANNEL".to_string(), "clients".to_string());
        vars.insert(
            "LC_SERVICE_IDENTITIES".to_string(),
            " RECORDER_BOT , SIP_BOT,, ".to_string(),
        );
        vars.insert("LC_KEEP_UPLOADS".to_string(), "true".to_string());
        vars.insert("LC_UPLOAD_DIR".to_string(), "/var/lib/uploads".to_string());
        vars.insert("LC_LOG_JSON".to_string(), "1".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(
            config.webhook_url.as_ref().map(|u| u.expose_secret().to_string()),
            Some("https://hooks.example.com/in?key=abc".to_string())
        );
        assert_eq!(config.webhook_timeout_seconds, 3);
        assert_eq!(config.client_channel, "clients");
        assert_eq!(config.service_identities, vec!["RECORDER_BOT", "SIP_BOT"]);
        assert!(config.keep_uploads);
        assert_eq!(config.upload_dir, PathBuf::from("/var/lib/uploads"));
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_blank_webhook_url_disables_forwarding() {
        let mut vars = base_vars();
        vars.insert("LC_WEBHOOK_URL".to_string(), "  ".to_string());
        let config = Config::from_vars(&vars).unwrap();
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn test_from_vars_missing_redis_url() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "REDIS_URL"));
    }

    #[test]
    fn test_from_vars_invalid_values() {
        let mut vars = base_vars();
        vars.insert("LC_KEEP_UPLOADS".to_string(), "sometimes".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut vars = base_vars();
        vars.insert("LC_WEBHOOK_TIMEOUT_SECONDS".to_string(), "ten".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_debug_redacts_sensitive_fields() {
        let mut vars = base_vars();
        vars.insert(
            "LC_WEBHOOK_URL".to_string(),
            "https://hooks.example.com/in?key=abc".to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains("key=abc"));
    }
}
