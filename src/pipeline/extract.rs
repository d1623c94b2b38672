//! Reply extraction: split the newest reply from quoted history and derive
//! a thread identifier.
//!
//! History boundaries are an ordered list of [`BoundaryKind`]s. The body is
//! scanned top to bottom and, at each line, the kinds are tried in list
//! order. The first line any kind matches is where history begins;
//! everything above it is the reply.
//!
//! Pure string parsing. No I/O, no failure modes.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::headers::{MessageHeaders, parse_headers};
use super::sanitize::{MAX_LINE_CHARS, sanitize_line};
use super::types::{Envelope, ExtractedReply, ThreadSource};

/// Hex chars kept from the SHA-256 digest of hashed thread ids.
const THREAD_HASH_HEX_LEN: usize = 16;

/// "On <date>, <person> wrote:" and its localized variants.
static ATTRIBUTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:On\s.+\swrote|Am\s.+\sschrieb(?:\s.*)?|Le\s.+\sa\s+écrit|El\s.+\sescribió|Op\s.+\sschreef(?:\s.*)?)\s*:\s*$",
    )
    .unwrap()
});

/// Start of an attribution line that the client may have wrapped.
static ATTRIBUTION_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:On|Am|Le|El|Op)\s").unwrap());

static ORIGINAL_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*-{2,}\s*(?:Original Message|Ursprüngliche Nachricht|Message d'origine|Mensaje original)\s*-{2,}\s*$",
    )
    .unwrap()
});

static FORWARDED_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:-{2,}\s*Forwarded message\s*-{2,}|Begin forwarded message:)\s*$")
        .unwrap()
});

static OUTLOOK_FROM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\*?(?:From|Von|De)\s*:\*?\s+\S").unwrap());

static OUTLOOK_SENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\*?(?:Sent|Date|Gesendet|Envoyé|Enviado)\s*:\*?\s+\S").unwrap()
});

static OUTLOOK_RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*_{20,}\s*$").unwrap());

/// Bracketed ticket token in a subject, e.g. `[#1234]` or `[TICKET-42]`.
static SUBJECT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(#?[A-Za-z0-9][A-Za-z0-9_.:#\-]{0,63})\]").unwrap());

/// One reply/forward prefix, e.g. `Re:`, `FWD:`, `AW:`, `Re[2]:`.
static SUBJECT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:re|fwd?|aw|wg|sv|vs|antw|tr|rif|enc|res)\s*(?:\[\d+\])?\s*:\s*")
        .unwrap()
});

/// Kinds of line that mark the start of quoted or forwarded history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    /// Line beginning with `>`.
    QuoteMarker,
    /// "On <date>, <person> wrote:" (and localized forms), possibly wrapped
    /// over two lines.
    Attribution,
    /// `-----Original Message-----`
    OriginalMessage,
    /// `---------- Forwarded message ---------` / `Begin forwarded message:`
    ForwardedMessage,
    /// Outlook's quoted header block: `From:` followed by `Sent:`/`Date:`.
    OutlookHeader,
    /// Outlook's underscore rule above the quoted header block.
    OutlookRule,
    /// The `-- ` signature separator.
    SignatureDelimiter,
}

impl BoundaryKind {
    /// All kinds in default priority order.
    pub const DEFAULT_ORDER: [BoundaryKind; 7] = [
        Self::QuoteMarker,
        Self::Attribution,
        Self::OriginalMessage,
        Self::ForwardedMessage,
        Self::OutlookHeader,
        Self::OutlookRule,
        Self::SignatureDelimiter,
    ];

    /// Does this boundary start at `lines[idx]`? Returns the number of lines
    /// it spans.
    pub fn matches(&self, lines: &[&str], idx: usize) -> Option<usize> {
        let line = *lines.get(idx)?;
        match self {
            Self::QuoteMarker => line.trim_start().starts_with('>').then_some(1),
            Self::Attribution => {
                if is_attribution(line, quote_follows(lines, idx + 1)) {
                    return Some(1);
                }
                // Gmail wraps long attributions: "On ..., Alice <\nalice@x> wrote:"
                let next = lines.get(idx + 1)?;
                if ATTRIBUTION_START.is_match(line) && !next.trim().is_empty() {
                    let joined = format!("{} {}", line.trim_end(), next.trim_start());
                    return is_attribution(&joined, quote_follows(lines, idx + 2)).then_some(2);
                }
                None
            }
            Self::OriginalMessage => ORIGINAL_MESSAGE.is_match(line).then_some(1),
            Self::ForwardedMessage => FORWARDED_MESSAGE.is_match(line).then_some(1),
            Self::OutlookHeader => {
                if !OUTLOOK_FROM.is_match(line) {
                    return None;
                }
                lines
                    .iter()
                    .skip(idx + 1)
                    .take(2)
                    .any(|l| OUTLOOK_SENT.is_match(l))
                    .then_some(1)
            }
            Self::OutlookRule => OUTLOOK_RULE.is_match(line).then_some(1),
            Self::SignatureDelimiter => (line.trim_end() == "--").then_some(1),
        }
    }
}

/// Attribution lines carry a date or an address, or sit directly above
/// quoted text; "On the other hand, Bob wrote:" in running prose does not.
fn is_attribution(line: &str, quote_follows: bool) -> bool {
    ATTRIBUTION.is_match(line)
        && (quote_follows || line.chars().any(|c| c.is_ascii_digit() || c == '@'))
}

/// Is the next non-blank line at or after `from` a `>` quote?
fn quote_follows(lines: &[&str], from: usize) -> bool {
    lines
        .iter()
        .skip(from)
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim_start().starts_with('>'))
}

/// Where quoted history starts in a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub kind: BoundaryKind,
    /// Zero-based line index.
    pub line: usize,
}

/// Splits email bodies at the first history boundary.
#[derive(Debug, Clone)]
pub struct ReplyExtractor {
    boundaries: Vec<BoundaryKind>,
}

impl Default for ReplyExtractor {
    fn default() -> Self {
        Self::new(BoundaryKind::DEFAULT_ORDER.to_vec())
    }
}

impl ReplyExtractor {
    /// Extractor trying `boundaries` in the given order.
    pub fn new(boundaries: Vec<BoundaryKind>) -> Self {
        Self { boundaries }
    }

    pub fn boundaries(&self) -> &[BoundaryKind] {
        &self.boundaries
    }

    /// First boundary kind (in list order) matching at `idx`.
    fn boundary_at(&self, lines: &[&str], idx: usize) -> Option<(BoundaryKind, usize)> {
        self.boundaries
            .iter()
            .find_map(|kind| kind.matches(lines, idx).map(|span| (*kind, span)))
    }

    /// First line where quoted history begins.
    pub fn find_boundary(&self, body: &str) -> Option<Boundary> {
        let lines: Vec<&str> = body.lines().collect();
        (0..lines.len()).find_map(|idx| {
            self.boundary_at(&lines, idx)
                .map(|(kind, _)| Boundary { kind, line: idx })
        })
    }

    /// Newest reply content of `body`.
    ///
    /// No boundary means the whole body is the reply. If the text above the
    /// first boundary is blank (bottom-posting), the reply is the unquoted
    /// text that follows the quoted block.
    pub fn reply_text(&self, body: &str) -> String {
        let lines: Vec<&str> = body.lines().collect();
        let Some(boundary) = self.find_boundary(body) else {
            return body.trim().to_string();
        };

        let head = lines[..boundary.line].join("\n");
        let head = head.trim();
        if !head.is_empty() {
            return head.to_string();
        }

        self.unquoted_after(&lines, boundary.line)
    }

    /// Lines from `start` on with quote markers and attributions dropped,
    /// stopping at any other boundary.
    fn unquoted_after(&self, lines: &[&str], start: usize) -> String {
        let mut kept = Vec::new();
        let mut idx = start;
        while idx < lines.len() {
            match self.boundary_at(lines, idx) {
                Some((BoundaryKind::QuoteMarker | BoundaryKind::Attribution, span)) => {
                    idx += span;
                }
                Some(_) => break,
                None => {
                    kept.push(lines[idx]);
                    idx += 1;
                }
            }
        }
        kept.join("\n").trim().to_string()
    }

    /// Reply text plus thread identifier for one email.
    pub fn extract(&self, raw_body: &str, headers: &str, envelope: &Envelope) -> ExtractedReply {
        let parsed = parse_headers(headers);
        let (thread_id, thread_source) = derive_thread_id(&parsed, envelope);
        ExtractedReply {
            reply_text: self.reply_text(raw_body),
            thread_id,
            thread_source,
        }
    }
}

static DEFAULT_EXTRACTOR: LazyLock<ReplyExtractor> = LazyLock::new(ReplyExtractor::default);

/// [`ReplyExtractor::extract`] with the default boundary order.
pub fn extract_reply(raw_body: &str, headers: &str, envelope: &Envelope) -> ExtractedReply {
    DEFAULT_EXTRACTOR.extract(raw_body, headers, envelope)
}

// ── Thread identification ───────────────────────────────────────────

/// Derive a stable thread id, strongest signal first:
///
/// 1. root of `References`
/// 2. bracketed ticket token in the subject, scoped to the participants
/// 3. `In-Reply-To`
/// 4. the message's own `Message-ID`
/// 5. hash of the normalized subject and participants
/// 6. hash of the participants
pub fn derive_thread_id(headers: &MessageHeaders, envelope: &Envelope) -> (String, ThreadSource) {
    let subject = if envelope.subject.trim().is_empty() {
        headers
            .subject
            .as_deref()
            .map(|s| sanitize_line(s, MAX_LINE_CHARS))
            .unwrap_or_default()
    } else {
        envelope.subject.clone()
    };

    if let Some(root) = headers.root_reference() {
        return (root.to_string(), ThreadSource::References);
    }

    let (a, b) = participant_pair(&envelope.sender, &envelope.recipient);
    // Tokens like "[Q3]" are not unique across mailboxes
    if let Some(token) = subject_token(&subject) {
        let digest = short_hash(&["ticket", &token, &a, &b]);
        return (format!("ticket-{digest}"), ThreadSource::SubjectToken);
    }
    if let Some(parent) = headers.in_reply_to.as_deref() {
        return (parent.to_string(), ThreadSource::InReplyTo);
    }
    if let Some(own) = headers.message_id.as_deref() {
        return (own.to_string(), ThreadSource::MessageId);
    }

    let normalized = normalize_subject(&subject).to_lowercase();
    if !normalized.is_empty() {
        let digest = short_hash(&["subject", &normalized, &a, &b]);
        return (format!("subject-{digest}"), ThreadSource::SubjectHash);
    }

    let digest = short_hash(&["participants", &a, &b]);
    (format!("participants-{digest}"), ThreadSource::Participants)
}

/// Strip reply/forward prefixes (repeatedly) and collapse whitespace.
///
/// `"Re: Fwd: RE:  Project   Update"` → `"Project Update"`.
pub fn normalize_subject(subject: &str) -> String {
    let mut rest = subject.trim();
    while let Some(m) = SUBJECT_PREFIX.find(rest) {
        rest = &rest[m.end()..];
    }
    rest.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ticket token from a subject. Must contain a digit so tags like
/// `[EXTERNAL]` are not mistaken for ticket references.
pub fn subject_token(subject: &str) -> Option<String> {
    SUBJECT_TOKEN
        .captures_iter(subject)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|token| token.chars().any(|c| c.is_ascii_digit()))
        .map(|token| token.trim_start_matches('#').to_ascii_lowercase())
}

/// Bare, lowercased address: `"Alice <Alice@Example.com>"` → `alice@example.com`.
pub fn bare_address(raw: &str) -> String {
    let inner = match (raw.rfind('<'), raw.rfind('>')) {
        (Some(open), Some(close)) if open < close => &raw[open + 1..close],
        _ => raw,
    };
    inner.trim().to_lowercase()
}

/// Unordered participant pair, so both directions of a conversation agree.
fn participant_pair(sender: &str, recipient: &str) -> (String, String) {
    let a = bare_address(sender);
    let b = bare_address(recipient);
    if a <= b { (a, b) } else { (b, a) }
}

fn short_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hex::encode(hasher.finalize());
    digest[..THREAD_HASH_HEX_LEN].to_string()
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
