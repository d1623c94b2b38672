//! Payload builder: maps a `CleanedMessage` into the AI endpoint's input schema.

use serde_json::{Map, Value, json};

use crate::config::{EndpointConfig, SessionKey};
use crate::error::ValidationError;

use super::types::{CleanedMessage, OutboundPayload};

/// Context lines prepended to the reply so the flow sees who wrote what.
pub fn email_context(cleaned: &CleanedMessage) -> String {
    format!(
        "From: {}\nTo: {}\nSubject: {}\nThread ID: {}\n\n",
        cleaned.sender, cleaned.recipient, cleaned.subject, cleaned.thread_id
    )
}

/// Build the outbound request for `cleaned`.
///
/// Field names for the input and session values come from `config`. Fails
/// with [`ValidationError`] when the endpoint URL or identifier is missing.
pub fn build_payload(
    cleaned: &CleanedMessage,
    config: &EndpointConfig,
) -> Result<OutboundPayload, ValidationError> {
    let url = config.run_url()?;

    let session = match config.session_key {
        SessionKey::Thread => cleaned.thread_id.as_str(),
        SessionKey::Sender => cleaned.sender.as_str(),
    };

    let mut body = Map::new();
    body.insert("output_type".into(), json!("chat"));
    body.insert("input_type".into(), json!("chat"));
    body.insert("tweaks".into(), json!({}));
    body.insert(config.session_field.clone(), json!(session));
    body.insert(
        config.input_field.clone(),
        json!(format!("{}{}", email_context(cleaned), cleaned.body)),
    );

    Ok(OutboundPayload {
        url,
        body: Value::Object(body),
        thread_id: cleaned.thread_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ThreadSource;

    fn cleaned() -> CleanedMessage {
        CleanedMessage {
            sender: "traveler@example.com".into(),
            recipient: "travel-agent@yourdomain.com".into(),
            subject: "Re: Orlando Day Trip".into(),
            body: "Any lunch spots near the park?".into(),
            thread_id: "orlando.request.abc@example.com".into(),
            thread_source: ThreadSource::References,
            attachment_count: 0,
        }
    }

    #[test]
    fn maps_fields_into_default_schema() {
        let config = EndpointConfig::new("http://localhost:7860/", "travel-flow");
        let payload = build_payload(&cleaned(), &config).unwrap();

        assert_eq!(
            payload.url,
            "http://localhost:7860/api/v1/run/travel-flow?stream=false"
        );
        assert_eq!(payload.body["session_id"], "orlando.request.abc@example.com");
        assert_eq!(payload.body["input_type"], "chat");
        assert_eq!(payload.body["output_type"], "chat");
        assert!(payload.body["tweaks"].as_object().unwrap().is_empty());

        let input = payload.body["input_value"].as_str().unwrap();
        assert!(input.starts_with("From: traveler@example.com\nTo: travel-agent@yourdomain.com\n"));
        assert!(input.contains("Thread ID: orlando.request.abc@example.com\n\n"));
        assert!(input.ends_with("Any lunch spots near the park?"));
        assert_eq!(payload.thread_id, "orlando.request.abc@example.com");
    }

    #[test]
    fn uses_configured_field_names() {
        let config = EndpointConfig {
            input_field: "message".into(),
            session_field: "conversation".into(),
            session_key: SessionKey::Sender,
            ..EndpointConfig::new("https://ai.example.com", "flow")
        };
        let payload = build_payload(&cleaned(), &config).unwrap();

        assert!(payload.body.get("input_value").is_none());
        assert!(payload.body.get("session_id").is_none());
        assert_eq!(payload.body["conversation"], "traveler@example.com");
        assert!(payload.body["message"].as_str().unwrap().contains("lunch spots"));
    }

    #[test]
    fn missing_url_is_a_validation_error() {
        let config = EndpointConfig {
            endpoint_id: Some("flow".into()),
            ..EndpointConfig::default()
        };
        assert_eq!(
            build_payload(&cleaned(), &config).unwrap_err(),
            ValidationError::MissingConfig {
                key: "LANGFLOW_API_URL".into()
            }
        );
    }

    #[test]
    fn missing_endpoint_is_a_validation_error() {
        let config = EndpointConfig {
            base_url: Some("https://ai.example.com".into()),
            ..EndpointConfig::default()
        };
        assert!(matches!(
            build_payload(&cleaned(), &config),
            Err(ValidationError::MissingConfig { .. })
        ));
    }

    #[test]
    fn empty_reply_still_builds() {
        let mut message = cleaned();
        message.body.clear();
        let payload = build_payload(&message, &EndpointConfig::new("http://x.test", "f")).unwrap();
        assert!(payload.body["input_value"].as_str().unwrap().ends_with("\n\n"));
        assert!(payload.body_len() > 0);
    }
}
