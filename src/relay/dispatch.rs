//! Relay dispatcher: the single outbound POST to the AI endpoint.
//!
//! Every failure (timeout, non-2xx, transport) is folded into a
//! [`RelayResult`]; nothing is returned as an error or panics.

use std::time::Instant;

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::EndpointConfig;
use crate::error::DispatchError;
use crate::pipeline::types::OutboundPayload;

/// Maximum characters of a downstream response kept in logs and errors.
pub const RESPONSE_EXCERPT_CHARS: usize = 500;

/// Header carrying the optional API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Outcome status of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    Success,
    Failure,
}

/// Outcome of one outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayResult {
    pub status: RelayStatus,
    /// HTTP status, when a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayResult {
    pub fn success(status_code: u16, response_body: String) -> Self {
        Self {
            status: RelayStatus::Success,
            status_code: Some(status_code),
            response_body: Some(response_body),
            error: None,
        }
    }

    pub fn failure(err: &DispatchError) -> Self {
        let status_code = match err {
            DispatchError::Status { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            status: RelayStatus::Failure,
            status_code,
            response_body: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RelayStatus::Success
    }
}

/// Sends payloads to the configured endpoint.
///
/// Holds a pooled `reqwest::Client`; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RelayDispatcher {
    client: reqwest::Client,
}

impl RelayDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// POST `payload` once. At-most-once: no retries.
    pub async fn dispatch(&self, payload: &OutboundPayload, config: &EndpointConfig) -> RelayResult {
        let started = Instant::now();
        info!(
            endpoint = %payload.url,
            thread_id = %payload.thread_id,
            payload_bytes = payload.body_len(),
            "Forwarding to AI endpoint"
        );

        let result = match self.send(payload, config).await {
            Ok((status, body)) => {
                info!(
                    endpoint = %payload.url,
                    thread_id = %payload.thread_id,
                    status = status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    response = %excerpt(&body),
                    "AI endpoint accepted payload"
                );
                RelayResult::success(status.as_u16(), body)
            }
            Err(err) => {
                match &err {
                    DispatchError::Timeout(after) => warn!(
                        endpoint = %payload.url,
                        thread_id = %payload.thread_id,
                        timeout_ms = after.as_millis() as u64,
                        "AI endpoint timed out"
                    ),
                    _ => error!(
                        endpoint = %payload.url,
                        thread_id = %payload.thread_id,
                        payload_bytes = payload.body_len(),
                        error = %err,
                        "Failed to forward to AI endpoint"
                    ),
                }
                RelayResult::failure(&err)
            }
        };

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Dispatch finished");
        result
    }

    async fn send(
        &self,
        payload: &OutboundPayload,
        config: &EndpointConfig,
    ) -> Result<(StatusCode, String), DispatchError> {
        let mut request = self
            .client
            .post(&payload.url)
            .timeout(config.timeout)
            .json(&payload.body);

        if let Some(key) = &config.api_key {
            debug!("Adding {API_KEY_HEADER} header to request");
            request = request.header(API_KEY_HEADER, key.expose_secret());
        }

        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                DispatchError::Timeout(config.timeout)
            } else {
                DispatchError::Transport(e.to_string())
            }
        };

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }
        Ok((status, body))
    }
}

/// First [`RESPONSE_EXCERPT_CHARS`] chars of `text`, with `...` if cut.
pub fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(RESPONSE_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
