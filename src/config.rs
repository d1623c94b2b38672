//! Configuration types.
//!
//! Built once at startup from the process environment (after loading `.env`)
//! and passed by reference into the pipeline. Tests construct the structs
//! directly or go through [`RelayConfig::from_lookup`].

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{ConfigError, ValidationError};
use crate::pipeline::sanitize::DEFAULT_MAX_BODY_CHARS;

/// Default outbound timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which value is sent in the downstream session field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKey {
    /// The derived thread identifier (one AI session per conversation).
    #[default]
    Thread,
    /// The cleaned sender address (one AI session per correspondent).
    Sender,
}

impl SessionKey {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "thread" => Some(Self::Thread),
            "sender" => Some(Self::Sender),
            _ => None,
        }
    }
}

/// Downstream AI endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL of the AI backend, e.g. `https://langflow.example.com`.
    pub base_url: Option<String>,
    /// Flow identifier or endpoint name appended to the run path.
    pub endpoint_id: Option<String>,
    /// Sent as `x-api-key` when present.
    pub api_key: Option<SecretString>,
    /// Name of the input field in the request body.
    pub input_field: String,
    /// Name of the session field in the request body.
    pub session_field: String,
    pub session_key: SessionKey,
    /// Character budget for the reply text.
    pub max_body_chars: usize,
    /// Timeout for the single outbound request.
    pub timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            endpoint_id: None,
            api_key: None,
            input_field: "input_value".to_string(),
            session_field: "session_id".to_string(),
            session_key: SessionKey::Thread,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl EndpointConfig {
    /// Config pointing at `base_url` / `endpoint_id`, everything else default.
    pub fn new(base_url: impl Into<String>, endpoint_id: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            endpoint_id: Some(endpoint_id.into()),
            ..Self::default()
        }
    }

    /// Full run URL: `{base}/api/v1/run/{endpoint}?stream=false`.
    ///
    /// Fails if either part is missing or the base is not an http(s) URL.
    pub fn run_url(&self) -> Result<String, ValidationError> {
        let base = required(self.base_url.as_deref(), "LANGFLOW_API_URL")?;
        let endpoint = required(self.endpoint_id.as_deref(), "LANGFLOW_ENDPOINT")?;

        let parsed = reqwest::Url::parse(base).map_err(|e| ValidationError::InvalidUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidUrl {
                url: base.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let base = base.trim_end_matches('/');
        let endpoint = endpoint.trim_matches('/');
        Ok(format!("{base}/api/v1/run/{endpoint}?stream=false"))
    }

    /// Check that the endpoint is usable. Called once at startup.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.run_url().map(|_| ())
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str, ValidationError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::MissingConfig {
            key: key.to_string(),
        }),
    }
}

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_address: String,
    pub port: u16,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
    /// Log file path; `None` disables file output.
    pub log_file: Option<String>,
    pub endpoint: EndpointConfig,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let non_empty = |key: &str| get(key).filter(|v| !v.is_empty());

        let port = parse_or(non_empty("PORT"), "PORT", 8000u16)?;
        let max_body_chars = parse_or(
            non_empty("RELAY_MAX_BODY_CHARS"),
            "RELAY_MAX_BODY_CHARS",
            DEFAULT_MAX_BODY_CHARS,
        )?;
        let timeout_secs = parse_or(
            non_empty("RELAY_TIMEOUT_SECS"),
            "RELAY_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let session_key = match non_empty("RELAY_SESSION_KEY") {
            Some(v) => SessionKey::parse(&v).ok_or_else(|| ConfigError::InvalidValue {
                key: "RELAY_SESSION_KEY".into(),
                message: format!("expected `thread` or `sender`, got `{v}`"),
            })?,
            None => SessionKey::default(),
        };

        let defaults = EndpointConfig::default();
        let endpoint = EndpointConfig {
            base_url: non_empty("LANGFLOW_API_URL"),
            endpoint_id: non_empty("LANGFLOW_ENDPOINT"),
            api_key: non_empty("LANGFLOW_API_KEY").map(SecretString::from),
            input_field: non_empty("RELAY_INPUT_FIELD").unwrap_or(defaults.input_field),
            session_field: non_empty("RELAY_SESSION_FIELD").unwrap_or(defaults.session_field),
            session_key,
            max_body_chars,
            timeout: Duration::from_secs(timeout_secs),
        };

        Ok(Self {
            bind_address: non_empty("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_level: non_empty("LOG_LEVEL")
                .map(|v| v.to_ascii_lowercase())
                .unwrap_or_else(|| "info".to_string()),
            // An explicitly empty LOG_FILE turns file logging off.
            log_file: match get("LOG_FILE") {
                Some(v) if v.is_empty() => None,
                Some(v) => Some(v),
                None => Some("webhook.log".to_string()),
            },
            endpoint,
        })
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = RelayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_file.as_deref(), Some("webhook.log"));
        assert!(config.endpoint.base_url.is_none());
        assert_eq!(config.endpoint.input_field, "input_value");
        assert_eq!(config.endpoint.session_field, "session_id");
        assert_eq!(config.endpoint.session_key, SessionKey::Thread);
        assert_eq!(config.endpoint.timeout, Duration::from_secs(120));
    }

    #[test]
    fn reads_endpoint_settings() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("LANGFLOW_API_URL", "https://flows.example.com/"),
            ("LANGFLOW_ENDPOINT", "email-agent"),
            ("LANGFLOW_API_KEY", "sk-test"),
            ("RELAY_SESSION_KEY", "Sender"),
            ("RELAY_TIMEOUT_SECS", "5"),
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_FILE", ""),
        ]))
        .unwrap();

        assert_eq!(
            config.endpoint.run_url().unwrap(),
            "https://flows.example.com/api/v1/run/email-agent?stream=false"
        );
        assert_eq!(
            config.endpoint.api_key.as_ref().unwrap().expose_secret(),
            "sk-test"
        );
        assert_eq!(config.endpoint.session_key, SessionKey::Sender);
        assert_eq!(config.endpoint.timeout, Duration::from_secs(5));
        assert_eq!(config.log_level, "debug");
        assert!(config.log_file.is_none());
    }

    #[test]
    fn rejects_non_numeric_port() {
        let err = RelayConfig::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(RelayConfig::from_lookup(lookup(&[("RELAY_TIMEOUT_SECS", "0")])).is_err());
    }

    #[test]
    fn rejects_unknown_session_key() {
        assert!(RelayConfig::from_lookup(lookup(&[("RELAY_SESSION_KEY", "user")])).is_err());
    }

    #[test]
    fn run_url_requires_base_url() {
        let config = EndpointConfig {
            endpoint_id: Some("flow".into()),
            ..EndpointConfig::default()
        };
        assert_eq!(
            config.run_url().unwrap_err(),
            ValidationError::MissingConfig {
                key: "LANGFLOW_API_URL".into()
            }
        );
    }

    #[test]
    fn run_url_requires_endpoint_id() {
        let config = EndpointConfig {
            base_url: Some("http://localhost:7860".into()),
            endpoint_id: Some("   ".into()),
            ..EndpointConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingConfig { ref key }) if key == "LANGFLOW_ENDPOINT"
        ));
    }

    #[test]
    fn run_url_rejects_non_http_scheme() {
        let config = EndpointConfig::new("ftp://files.example.com", "flow");
        assert!(matches!(
            config.run_url(),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn run_url_rejects_relative_url() {
        let config = EndpointConfig::new("localhost:7860", "flow");
        // "localhost" parses as a scheme, which is then rejected.
        assert!(config.run_url().is_err());
    }
}
