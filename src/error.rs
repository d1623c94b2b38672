//! Error types for the mail relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Malformed input: {0}")]
    MalformedInput(#[from] MalformedInputError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Environment/configuration parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// The inbound webhook body could not be turned into an `InboundEmail`.
#[derive(Debug, thiserror::Error)]
pub enum MalformedInputError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field {field} is empty after cleaning")]
    EmptyField { field: String },

    #[error("Invalid value for field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Could not decode webhook body: {0}")]
    Body(String),
}

/// Downstream endpoint configuration is missing or unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required configuration: {key}")]
    MissingConfig { key: String },

    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure modes of the outbound call. Always folded into a `RelayResult`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_key() {
        let err = ValidationError::MissingConfig {
            key: "LANGFLOW_API_URL".into(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required configuration: LANGFLOW_API_URL"
        );
    }

    #[test]
    fn timeout_display_starts_with_timeout() {
        let err = DispatchError::Timeout(Duration::from_secs(2));
        assert!(err.to_string().starts_with("timeout"));
    }

    #[test]
    fn top_level_wraps_sub_errors() {
        let err: Error = MalformedInputError::MissingField("from".into()).into();
        assert!(matches!(err, Error::MalformedInput(_)));
        assert_eq!(err.to_string(), "Malformed input: Missing required field: from");
    }
}
