//! Inbound webhook body decoding.
//!
//! Parse providers post either `multipart/form-data` (SendGrid Inbound
//! Parse), `application/x-www-form-urlencoded`, or JSON. All three end up as
//! an [`InboundEmail`].

use std::collections::HashMap;

use axum::extract::{Form, FromRequest, Json, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::WebhookError;
use crate::error::MalformedInputError;
use crate::pipeline::types::InboundEmail;

/// Extractor for the inbound email of one webhook delivery.
#[derive(Debug, Clone)]
pub struct InboundForm(pub InboundEmail);

impl<S> FromRequest<S> for InboundForm
where
    S: Send + Sync,
{
    type Rejection = WebhookError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let email = if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| malformed(e.body_text()))?;
            email_from_fields(read_multipart(multipart).await?)?
        } else if content_type.starts_with("application/json") {
            let Json(email) = Json::<InboundEmail>::from_request(req, state)
                .await
                .map_err(|e| malformed(e.body_text()))?;
            email
        } else {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| malformed(e.body_text()))?;
            email_from_fields(fields)?
        };

        Ok(Self(email))
    }
}

fn malformed(reason: String) -> WebhookError {
    warn!(reason = %reason, "Rejected webhook body");
    WebhookError::MalformedInput(MalformedInputError::Body(reason))
}

/// Text fields of a multipart body. File parts are skipped unread.
async fn read_multipart(mut multipart: Multipart) -> Result<HashMap<String, String>, WebhookError> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            debug!(field = %name, "Skipping attachment part");
            continue;
        }
        let value = field.text().await.map_err(|e| malformed(e.body_text()))?;
        fields.insert(name, value);
    }
    debug!(keys = ?fields.keys().collect::<Vec<_>>(), "Multipart fields");
    Ok(fields)
}

/// Build an [`InboundEmail`] from decoded form fields.
///
/// `to` and `from` (or `sender`) are required; `subject`, `text` and
/// `headers` default to empty. A blank `attachments` counts as absent.
pub fn email_from_fields(
    mut fields: HashMap<String, String>,
) -> Result<InboundEmail, MalformedInputError> {
    let to = fields
        .remove("to")
        .ok_or_else(|| MalformedInputError::MissingField("to".into()))?;
    let sender = fields
        .remove("from")
        .or_else(|| fields.remove("sender"))
        .ok_or_else(|| MalformedInputError::MissingField("from".into()))?;

    let attachments = match fields.remove("attachments").map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => {
            Some(v.parse::<u32>().map_err(|e| MalformedInputError::InvalidField {
                field: "attachments".into(),
                reason: e.to_string(),
            })?)
        }
        _ => None,
    };

    Ok(InboundEmail {
        to,
        sender,
        subject: fields.remove("subject").unwrap_or_default(),
        text: fields.remove("text").unwrap_or_default(),
        headers: fields.remove("headers").unwrap_or_default(),
        attachments,
    })
}
