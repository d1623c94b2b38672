//! Core pipeline types: InboundEmail, CleanedMessage, OutboundPayload.

use serde::{Deserialize, Serialize};

/// Raw fields of one webhook delivery, as posted by the parse provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Recipient address (the agent mailbox).
    pub to: String,
    /// Sender address. Posted as `from`.
    #[serde(rename = "from", alias = "sender")]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    /// Raw plain-text body, quoted history included.
    #[serde(default)]
    pub text: String,
    /// Raw header block.
    #[serde(default)]
    pub headers: String,
    /// Number of attachments the provider saw. Counted, never processed.
    #[serde(default)]
    pub attachments: Option<u32>,
}

/// Sender/recipient/subject, already cleaned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
}

/// Which signal produced a thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSource {
    /// Root id of the `References` header.
    References,
    /// Bracketed ticket token in the subject, e.g. `[#1234]`.
    SubjectToken,
    InReplyTo,
    MessageId,
    /// Hash of the normalized subject and participants.
    SubjectHash,
    /// Hash of the participants alone.
    Participants,
}

impl ThreadSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::References => "references",
            Self::SubjectToken => "subject_token",
            Self::InReplyTo => "in_reply_to",
            Self::MessageId => "message_id",
            Self::SubjectHash => "subject_hash",
            Self::Participants => "participants",
        }
    }
}

/// Output of reply extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedReply {
    pub reply_text: String,
    pub thread_id: String,
    pub thread_source: ThreadSource,
}

/// Sanitized, reply-only view of an inbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    /// Newest reply only; no quoted history, no control characters.
    pub body: String,
    pub thread_id: String,
    pub thread_source: ThreadSource,
    pub attachment_count: u32,
}

/// Request ready for the downstream AI endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundPayload {
    pub url: String,
    pub body: serde_json::Value,
    /// Carried for log correlation; not part of the request.
    #[serde(skip)]
    pub thread_id: String,
}

impl OutboundPayload {
    /// Serialized size of the body, for logging instead of the content.
    pub fn body_len(&self) -> usize {
        serde_json::to_vec(&self.body).map(|v| v.len()).unwrap_or(0)
    }
}
