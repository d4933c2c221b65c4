//! Secret types for endpoint URLs that carry credentials.
//!
//! Redis URLs may embed a password (`redis://:pw@host:6379`) and outbound
//! webhook URLs usually embed an API key in the path or query. Both are held
//! as [`SecretString`], whose `Debug` output is redacted, so deriving `Debug`
//! on a config struct cannot leak them.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let url = SecretString::from("https://hooks.example.com/lc?key=hunter2");
//! assert!(!format!("{url:?}").contains("hunter2"));
//!
//! // Reading the value is always explicit
//! assert!(url.expose_secret().starts_with("https://"));
//! ```
//!
//! When an operator needs to see *where* a secret URL points, log
//! [`redacted_origin`] instead of the URL.

pub use secrecy::{ExposeSecret, SecretString};

/// Scheme and host of a URL with credentials, path, query and fragment
/// removed: `https://user:pw@hooks.example.com/x?key=1` becomes
/// `https://hooks.example.com`.
///
/// Values without a `scheme://` prefix yield `"[REDACTED]"`.
#[must_use]
pub fn redacted_origin(url: &SecretString) -> String {
    let raw = url.expose_secret();
    let Some((scheme, rest)) = raw.split_once("://") else {
        return "[REDACTED]".to_string();
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    format!("{scheme}://{host}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@redis:6379");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_deserialized_target_stays_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct WebhookTarget {
            name: String,
            url: SecretString,
        }

        let json = r#"{"name": "crm", "url": "https://hooks.example.com/lc?key=abc"}"#;
        let target: WebhookTarget = serde_json::from_str(json).expect("deserialize");

        assert_eq!(
            target.url.expose_secret(),
            "https://hooks.example.com/lc?key=abc"
        );
        let debug = format!("{target:?}");
        assert!(debug.contains("crm"));
        assert!(!debug.contains("key=abc"));
    }

    #[test]
    fn test_redacted_origin() {
        let cases = [
            ("https://hooks.example.com/lc?key=abc", "https://hooks.example.com"),
            ("https://user:pw@hooks.example.com:8443/x", "https://hooks.example.com:8443"),
            ("redis://:hunter2@redis:6379/0", "redis://redis:6379"),
            ("http://localhost#frag", "http://localhost"),
            ("not a url", "[REDACTED]"),
        ];
        for (input, expected) in cases {
            assert_eq!(redacted_origin(&SecretString::from(input)), expected, "{input}");
        }
    }
}
