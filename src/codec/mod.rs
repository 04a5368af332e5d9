//! Conversation document codec.
//!
//! A document is a YAML header followed by one block per message:
//!
//! ```text
//! ---
//! conversationID: abc123
//! model: claude-sonnet-4-5
//! title: "Hello"
//! created: 2026-10-17T10:00:00.000Z
//! lastModified: 2026-10-17T10:00:00.000Z
//! tags:
//!   - "ai-chat"
//! ---
//!
//! USER: <!-- 2026-10-17T10:00:00.000Z -->
//! Hello
//!
//! ASSISTANT: <!-- 2026-10-17T10:00:05.000Z -->
//! Hi!
//!
//! ```
//!
//! Two older block grammars are still decoded, see [`legacy`].

pub mod decoder;
pub mod encoder;
pub mod header;
pub mod legacy;
pub mod timestamp;

pub use decoder::{BodyFormat, Decoded, DocumentDecoder, decode_conversation};
pub use encoder::{DocumentEncoder, EncodeOptions};
pub use header::{DocumentHeader, HeaderSyntax, peek_identity};

use std::sync::OnceLock;

use regex::Regex;

const ESCAPE: char = '\\';

/// `USER: <!-- <timestamp> -->`
pub(crate) fn role_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(USER|ASSISTANT): <!-- (.*?) -->\s*$").expect("valid role marker regex")
    })
}

/// A role marker preceded by any number of escape characters.
fn escapable_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\\*(USER|ASSISTANT): <!-- .*? -->\s*$").expect("valid escapable line regex")
    })
}

/// Prefix content lines that would read as role markers with one escape.
pub(crate) fn escape_content(content: &str) -> String {
    if !content.contains("<!--") {
        return content.to_string();
    }
    content
        .split('\n')
        .map(|line| {
            if escapable_line_regex().is_match(line) {
                format!("{}{}", ESCAPE, line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inverse of [`escape_content`] for a single line.
pub(crate) fn unescape_line(line: &str) -> &str {
    match line.strip_prefix(ESCAPE) {
        Some(rest) if escapable_line_regex().is_match(rest) => rest,
        _ => line,
    }
}
