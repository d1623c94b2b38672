//! Raw header block parsing.
//!
//! Webhook providers hand over the original header block as one string.
//! Usually it is RFC 5322 text; some integrations send a JSON object
//! instead. Anything unparseable yields empty headers, never an error.

use std::borrow::Cow;

use mail_parser::{HeaderValue, MessageParser};
use tracing::debug;

/// Threading-relevant headers, ids without angle brackets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    /// Oldest first, as they appear in the header.
    pub references: Vec<String>,
    pub subject: Option<String>,
}

impl MessageHeaders {
    /// Root of the conversation according to `References`.
    pub fn root_reference(&self) -> Option<&str> {
        self.references.first().map(String::as_str)
    }
}

/// Parse a raw header block. Total: malformed input gives empty headers.
pub fn parse_headers(raw: &str) -> MessageHeaders {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return MessageHeaders::default();
    }

    if trimmed.starts_with('{') {
        if let Some(headers) = parse_json_headers(trimmed) {
            return headers;
        }
        debug!("Header block looked like JSON but did not parse; trying RFC 5322");
    }

    parse_rfc5322_headers(raw)
}

fn parse_rfc5322_headers(raw: &str) -> MessageHeaders {
    // mail-parser expects the header block to be terminated by a blank line.
    let mut block = raw.trim_start().to_string();
    if !block.ends_with("\n\n") && !block.ends_with("\r\n\r\n") {
        block.push_str("\r\n\r\n");
    }

    let Some(message) = MessageParser::default().parse_headers(block.as_bytes()) else {
        debug!("Header block could not be parsed");
        return MessageHeaders::default();
    };

    MessageHeaders {
        message_id: message.message_id().and_then(normalize_id),
        in_reply_to: id_list(message.in_reply_to()).into_iter().next(),
        references: id_list(message.references()),
        subject: message
            .subject()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    }
}

fn id_list(value: &HeaderValue<'_>) -> Vec<String> {
    let raw: Vec<&Cow<'_, str>> = match value {
        HeaderValue::Text(text) => vec![text],
        HeaderValue::TextList(list) => list.iter().collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .flat_map(|item| item.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter_map(|id| normalize_id(&id))
        .collect()
}

fn parse_json_headers(raw: &str) -> Option<MessageHeaders> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    let lookup = |name: &str| -> Option<&str> {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
    };

    let ids = |name: &str| -> Vec<String> {
        lookup(name)
            .map(|v| v.split_whitespace().filter_map(normalize_id).collect())
            .unwrap_or_default()
    };

    Some(MessageHeaders {
        message_id: lookup("Message-ID").and_then(normalize_id),
        in_reply_to: ids("In-Reply-To").into_iter().next(),
        references: ids("References"),
        subject: lookup("Subject")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    })
}

/// Strip whitespace and angle brackets; `None` if nothing is left.
pub fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|ch| matches!(ch, '<' | '>' | ','));
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY_HEADERS: &str = "Received: by 5.6.7.8 with HTTP; Mon, 05 Aug 2024 11:00:00 -0400\r\n\
        Date: Mon, 05 Aug 2024 11:00:00 -0400\r\n\
        Message-ID: <traveler.reply1.ghi@example.com>\r\n\
        In-Reply-To: <agent.lakeeola.reply1.def@yourdomain.com>\r\n\
        References: <orlando.request.abc@example.com> <agent.lakeeola.reply1.def@yourdomain.com>\r\n\
        From: Traveler <traveler@example.com>\r\n\
        To: Travel Agent <travel-agent@yourdomain.com>\r\n\
        Subject: Re: Orlando Day Trip - Lake Eola Ideas?\r\n\
        Content-Type: text/plain; charset=\"UTF-8\"\r\n\
        \r\n";

    #[test]
    fn parses_threading_headers() {
        let headers = parse_headers(REPLY_HEADERS);
        assert_eq!(
            headers.message_id.as_deref(),
            Some("traveler.reply1.ghi@example.com")
        );
        assert_eq!(
            headers.in_reply_to.as_deref(),
            Some("agent.lakeeola.reply1.def@yourdomain.com")
        );
        assert_eq!(
            headers.references,
            vec![
                "orlando.request.abc@example.com".to_string(),
                "agent.lakeeola.reply1.def@yourdomain.com".to_string(),
            ]
        );
        assert_eq!(
            headers.root_reference(),
            Some("orlando.request.abc@example.com")
        );
        assert_eq!(
            headers.subject.as_deref(),
            Some("Re: Orlando Day Trip - Lake Eola Ideas?")
        );
    }

    #[test]
    fn accepts_bare_newlines_without_terminator() {
        let headers = parse_headers("Message-ID: <abc@example.com>\nSubject: Hello");
        assert_eq!(headers.message_id.as_deref(), Some("abc@example.com"));
        assert_eq!(headers.subject.as_deref(), Some("Hello"));
        assert!(headers.references.is_empty());
    }

    #[test]
    fn empty_block_gives_empty_headers() {
        assert_eq!(parse_headers(""), MessageHeaders::default());
        assert_eq!(parse_headers("   \r\n"), MessageHeaders::default());
    }

    #[test]
    fn garbage_never_panics() {
        for raw in ["{not json", "::::\n:::", "\u{0000}\u{0001}", "Message-ID:", "{\"a\": 1"] {
            let headers = parse_headers(raw);
            assert!(headers.references.is_empty());
        }
    }

    #[test]
    fn parses_json_header_objects() {
        let raw = r#"{"message-id": "<json.id@example.com>", "References": "<root@example.com> <mid@example.com>", "subject": "Re: Hi"}"#;
        let headers = parse_headers(raw);
        assert_eq!(headers.message_id.as_deref(), Some("json.id@example.com"));
        assert_eq!(headers.root_reference(), Some("root@example.com"));
        assert_eq!(headers.subject.as_deref(), Some("Re: Hi"));
        assert!(headers.in_reply_to.is_none());
    }

    #[test]
    fn normalize_id_strips_brackets() {
        assert_eq!(normalize_id(" <a@b> ").as_deref(), Some("a@b"));
        assert_eq!(normalize_id("<>"), None);
        assert_eq!(normalize_id(""), None);
    }
}
