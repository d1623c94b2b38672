//! HTTP surface: the inbound-parse webhook and a health probe.

pub mod form;

pub use form::{InboundForm, email_from_fields};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{MalformedInputError, ValidationError};
use crate::pipeline::{build_payload, clean_email};
use crate::relay::Relay;

/// Largest webhook body accepted. Inbound Parse caps messages at 30 MB.
pub const MAX_WEBHOOK_BYTES: usize = 30 * 1024 * 1024;

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub relay: Relay,
}

/// A webhook delivery that could not be accepted.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    MalformedInput(#[from] MalformedInputError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MalformedInput(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (
            status,
            Json(serde_json::json!({
                "status": "error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Build the webhook routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BYTES)),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// POST /webhook
///
/// Cleans the email, builds the payload, and hands it to the relay. The
/// response goes out before the AI endpoint answers.
async fn receive_webhook(
    State(state): State<WebhookState>,
    InboundForm(email): InboundForm,
) -> Result<Json<serde_json::Value>, WebhookError> {
    let delivery_id = Uuid::new_v4();
    let config = state.relay.config();

    let cleaned = clean_email(&email, config.max_body_chars).inspect_err(|e| {
        warn!(%delivery_id, error = %e, "Rejected malformed email");
    })?;
    // Only cleaned addresses reach the logs
    info!(
        %delivery_id,
        from = %cleaned.sender,
        to = %cleaned.recipient,
        attachments = cleaned.attachment_count,
        "Received inbound email"
    );

    let payload = build_payload(&cleaned, config).inspect_err(|e| {
        error!(%delivery_id, error = %e, "AI endpoint is not configured");
    })?;

    info!(
        %delivery_id,
        thread_id = %cleaned.thread_id,
        thread_source = cleaned.thread_source.label(),
        reply_chars = cleaned.body.chars().count(),
        "Queued email for relay"
    );
    state.relay.spawn(delivery_id, payload);

    Ok(Json(serde_json::json!({ "status": "accepted" })))
}
