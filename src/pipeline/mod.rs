//! Email extraction pipeline.
//!
//! Every webhook delivery flows through:
//! 1. `sanitize`: control characters, line endings, NFC
//! 2. `extract`: newest reply + thread id
//! 3. `payload`: mapping into the downstream schema
//!
//! Dispatching the payload lives in `crate::relay`.

pub mod extract;
pub mod headers;
pub mod payload;
pub mod sanitize;
pub mod types;

pub use extract::{BoundaryKind, ReplyExtractor, extract_reply};
pub use payload::build_payload;
pub use sanitize::{sanitize, sanitize_line};
pub use types::{CleanedMessage, Envelope, InboundEmail, OutboundPayload, ThreadSource};

use tracing::{debug, warn};

use crate::error::MalformedInputError;
use sanitize::{MAX_LINE_CHARS, TRUNCATION_MARKER};

/// Turn one inbound email into a [`CleanedMessage`].
///
/// Fails only when the sender or recipient is blank after cleaning; every
/// other input produces a (possibly empty) reply.
pub fn clean_email(
    email: &InboundEmail,
    max_body_chars: usize,
) -> Result<CleanedMessage, MalformedInputError> {
    let sender = sanitize_line(&email.sender, MAX_LINE_CHARS);
    if sender.is_empty() {
        return Err(MalformedInputError::EmptyField {
            field: "from".into(),
        });
    }
    let recipient = sanitize_line(&email.to, MAX_LINE_CHARS);
    if recipient.is_empty() {
        return Err(MalformedInputError::EmptyField { field: "to".into() });
    }
    let subject = sanitize_line(&email.subject, MAX_LINE_CHARS);

    let envelope = Envelope {
        sender,
        recipient,
        subject,
    };

    let body = sanitize(&email.text, usize::MAX);
    let headers = sanitize(&email.headers, usize::MAX);
    let extracted = extract_reply(&body, &headers, &envelope);

    let reply = sanitize(&extracted.reply_text, max_body_chars);
    if reply.ends_with(TRUNCATION_MARKER) && !extracted.reply_text.ends_with(TRUNCATION_MARKER) {
        warn!(
            original_chars = extracted.reply_text.chars().count(),
            max_chars = max_body_chars,
            "Truncated long reply text"
        );
    }
    if reply.is_empty() && !body.trim().is_empty() {
        debug!("Body contained only quoted history");
    }

    debug!(
        thread_id = %extracted.thread_id,
        thread_source = extracted.thread_source.label(),
        reply_chars = reply.chars().count(),
        "Extracted reply"
    );

    Ok(CleanedMessage {
        sender: envelope.sender,
        recipient: envelope.recipient,
        subject: envelope.subject,
        body: reply,
        thread_id: extracted.thread_id,
        thread_source: extracted.thread_source,
        attachment_count: email.attachments.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(text: &str) -> InboundEmail {
        InboundEmail {
            to: "agent@example.com".into(),
            sender: "traveler@example.com".into(),
            subject: "Orlando Day Trip".into(),
            text: text.into(),
            headers: String::new(),
            attachments: Some(2),
        }
    }

    #[test]
    fn cleans_fields_and_extracts_reply() {
        let mut inbound = email("Thanks!\r\n\r\nOn Mon, Jan 1, 2024, Agent wrote:\r\n> Hi");
        inbound.subject = "  Re:\tOrlando\u{0000} Day Trip ".into();

        let cleaned = clean_email(&inbound, 1000).unwrap();
        assert_eq!(cleaned.body, "Thanks!");
        assert_eq!(cleaned.subject, "Re: Orlando Day Trip");
        assert_eq!(cleaned.sender, "traveler@example.com");
        assert_eq!(cleaned.recipient, "agent@example.com");
        assert_eq!(cleaned.attachment_count, 2);
        assert_eq!(cleaned.thread_source, ThreadSource::SubjectHash);
    }

    #[test]
    fn body_is_bounded_and_free_of_controls() {
        let long = format!("{}\u{0007}", "word ".repeat(1000));
        let cleaned = clean_email(&email(&long), 100).unwrap();
        assert!(cleaned.body.chars().count() <= 100);
        assert!(cleaned.body.ends_with(TRUNCATION_MARKER));
        assert!(!cleaned.body.contains('\u{0007}'));
    }

    #[test]
    fn empty_body_is_not_an_error() {
        let cleaned = clean_email(&email(""), 100).unwrap();
        assert_eq!(cleaned.body, "");
    }

    #[test]
    fn blank_sender_is_malformed() {
        let mut inbound = email("hi");
        inbound.sender = " \u{0000} ".into();
        assert!(matches!(
            clean_email(&inbound, 100),
            Err(MalformedInputError::EmptyField { ref field }) if field == "from"
        ));
    }

    #[test]
    fn blank_recipient_is_malformed() {
        let mut inbound = email("hi");
        inbound.to = String::new();
        assert!(clean_email(&inbound, 100).is_err());
    }

    #[test]
    fn thread_comes_from_references_when_present() {
        let mut inbound = email("Perfect!\n\nOn Mon, Aug 5, 2024 at 11:45 AM Agent <a@x.com> wrote:\n> earlier");
        inbound.headers = "Message-ID: <r2@example.com>\r\nReferences: <orlando.request.abc@example.com> <r1@x.com>\r\n".into();
        let cleaned = clean_email(&inbound, 1000).unwrap();
        assert_eq!(cleaned.thread_id, "orlando.request.abc@example.com");
        assert_eq!(cleaned.body, "Perfect!");
    }
}
