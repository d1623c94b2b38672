//! Text sanitizer: control-character stripping, NFC normalization, truncation.
//!
//! Both entry points are total and idempotent: running them twice gives the
//! same string as running them once.

use unicode_normalization::UnicodeNormalization;

/// Default character budget for a reply body.
pub const DEFAULT_MAX_BODY_CHARS: usize = 15_000;

/// Character budget for single-line fields (addresses, subject).
pub const MAX_LINE_CHARS: usize = 998;

/// Appended when text is cut; counted inside the budget.
pub const TRUNCATION_MARKER: &str = "... (truncated)";

/// Clean free text for downstream use.
///
/// 1. `\r\n` and lone `\r` become `\n`
/// 2. control characters other than `\n` / `\t` are dropped, as is the BOM
/// 3. NFC normalization
/// 4. truncation to `max_chars` characters
pub fn sanitize(text: &str, max_chars: usize) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                stripped.push('\n');
            }
            '\n' | '\t' => stripped.push(ch),
            '\u{FEFF}' => {}
            c if c.is_control() => {}
            c => stripped.push(c),
        }
    }

    // Normalize after stripping so removed characters cannot leave behind
    // an uncomposed sequence.
    let normalized: String = stripped.nfc().collect();
    truncate_chars(normalized, max_chars)
}

/// Clean a single-line field: [`sanitize`], then collapse every whitespace
/// run (newlines included) into one space and trim.
pub fn sanitize_line(text: &str, max_chars: usize) -> String {
    let cleaned = sanitize(text, usize::MAX);
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    // A hard cut can land right after a space.
    truncate_chars(collapsed, max_chars).trim_end().to_string()
}

/// Cut `text` to at most `max_chars` chars, ending with [`TRUNCATION_MARKER`]
/// when there is room for it.
fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }

    let mut cut: String = text.chars().take(max_chars - marker_len).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}
