//! Document text to conversation.
//!
//! Decoding never fails: missing or malformed parts degrade to defaults and
//! are reported through [`Decoded`] and `warn!` logs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::header::{DocumentHeader, HeaderSyntax, split_document};
use super::timestamp::{self, parse_timestamp};
use super::{legacy, role_marker_regex, unescape_line};
use crate::types::{Conversation, ConversationId, Message, MessageId, Role, StoredTempImage};

/// Body grammar detected in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    /// `USER: <!-- timestamp -->` role markers.
    Current,
    /// `---`-delimited blocks with `Sender:`/`Time:`/`Content:` labels.
    LegacySections,
    /// `##`/`###` heading blocks with bold labels.
    LegacyHeadings,
    /// No recognizable messages.
    Empty,
}

impl BodyFormat {
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::LegacySections | Self::LegacyHeadings)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedMessage {
    pub role: Role,
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub conversation: Conversation,
    pub format: BodyFormat,
    /// A recognized header with an identity was present.
    pub header_ok: bool,
    /// Some part of the document needed a fallback (line-scanned header,
    /// derived identity or timestamps).
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentDecoder;

impl DocumentDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, text: &str) -> Decoded {
        let (header, syntax, body) = read_header(text);
        let mut used_fallback = syntax == Some(HeaderSyntax::LineScan);

        let (format, parsed) = parse_body(body);
        tracing::debug!(format = ?format, messages = parsed.len(), "Decoded document body");

        let header = header.unwrap_or_default();
        let created = header
            .created
            .or_else(|| parsed.iter().find_map(|m| m.timestamp))
            .unwrap_or_else(|| {
                used_fallback = true;
                timestamp::now_millis()
            });

        let mut conversation = Conversation::with_id(ConversationId::default()).with_created_at(created);
        conversation.last_mode = header.last_mode.clone();
        conversation.messages = parsed
            .into_iter()
            .enumerate()
            .filter_map(|(index, m)| build_message(index, m, created, &header.temp_images))
            .collect();

        let header_ok = header.conversation_id.is_some();
        match &header.conversation_id {
            Some(id) => conversation.id = id.clone(),
            None if conversation.is_empty() => {
                used_fallback = true;
                conversation.id = ConversationId::generate();
            }
            None => {
                used_fallback = true;
                conversation.ensure_id();
            }
        }
        if !header_ok {
            tracing::warn!(id = %conversation.id, "Document header missing identity, using fallback");
        }

        let newest_message = conversation.messages.iter().map(|m| m.timestamp).max();
        conversation.last_updated = header
            .last_modified
            .into_iter()
            .chain(newest_message)
            .chain(std::iter::once(created))
            .max()
            .unwrap_or(created);

        match header.title.filter(|t| !t.trim().is_empty()) {
            Some(title) => conversation.title = title,
            None => conversation.refresh_title(),
        }

        Decoded {
            conversation,
            format,
            header_ok,
            used_fallback,
        }
    }
}

/// Decode and keep only the conversation.
pub fn decode_conversation(text: &str) -> Conversation {
    DocumentDecoder.decode(text).conversation
}

fn read_header(text: &str) -> (Option<DocumentHeader>, Option<HeaderSyntax>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (block, body) = split_document(text);
    let Some(block) = block else {
        return (None, None, text);
    };
    let (header, syntax) = DocumentHeader::parse(block);
    if header.is_recognized() {
        (Some(header), Some(syntax), body)
    } else {
        // Legacy section bodies also open with `---`.
        (None, None, text)
    }
}

fn parse_body(body: &str) -> (BodyFormat, Vec<ParsedMessage>) {
    if body.lines().any(|line| role_marker_regex().is_match(line)) {
        return (BodyFormat::Current, parse_current(body));
    }
    match legacy::detect(body) {
        Some(format) => (format, legacy::parse(body, format)),
        None => (BodyFormat::Empty, Vec::new()),
    }
}

fn parse_current(body: &str) -> Vec<ParsedMessage> {
    let mut messages = Vec::new();
    let mut current: Option<(Role, Option<DateTime<Utc>>, Vec<&str>)> = None;

    for line in body.lines() {
        if let Some(caps) = role_marker_regex().captures(line) {
            if let Some((role, timestamp, lines)) = current.take() {
                messages.push(finish_current(role, timestamp, &lines));
            }
            let role = Role::from_marker(&caps[1]).unwrap_or(Role::User);
            let raw_timestamp = &caps[2];
            let timestamp = parse_timestamp(raw_timestamp);
            if timestamp.is_none() {
                tracing::warn!(timestamp = %raw_timestamp, "Unparsable message timestamp");
            }
            current = Some((role, timestamp, Vec::new()));
        } else if let Some((_, _, lines)) = current.as_mut() {
            lines.push(unescape_line(line));
        }
    }
    if let Some((role, timestamp, lines)) = current.take() {
        messages.push(finish_current(role, timestamp, &lines));
    }
    messages
}

fn finish_current(role: Role, timestamp: Option<DateTime<Utc>>, lines: &[&str]) -> ParsedMessage {
    ParsedMessage {
        role,
        timestamp,
        content: lines.join("\n").trim_end().to_string(),
    }
}

fn build_message(
    index: usize,
    parsed: ParsedMessage,
    created: DateTime<Utc>,
    table: &BTreeMap<String, StoredTempImage>,
) -> Option<Message> {
    if parsed.content.trim().is_empty() {
        return None;
    }
    let timestamp = parsed.timestamp.unwrap_or(created);
    let mut message = Message::new(parsed.role, parsed.content)
        .with_timestamp(timestamp)
        .with_id(MessageId::positional(index, &timestamp));
    for token in message.placeholder_tokens() {
        if let Some(image) = table.get(&token) {
            message.temp_images.insert(token, image.clone());
        }
    }
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageSource;

    const CURRENT: &str = "\
---
conversationID: abc123
model: claude-sonnet-4-5
title: \"Greeting\"
created: 2026-10-17T10:00:00.000Z
lastModified: 2026-10-17T10:05:00.000Z
lastMode: \"chat\"
tags:
  - \"ai-chat\"
tempImages:
  tok1: \"{\\\"encodedBytes\\\":\\\"AAAA\\\",\\\"source\\\":\\\"screenshot\\\",\\\"fileName\\\":\\\"s.png\\\"}\"
  unused: \"AAAA\"
---

USER: <!-- 2026-10-17T10:00:01.000Z -->
[!TempImg tok1]

Hello


ASSISTANT: <!-- 2026-10-17T10:00:02.000Z -->
Hi!
\\USER: <!-- quoted -->

USER: <!-- 2026-10-17T10:00:03.000Z -->

";

    #[test]
    fn test_decode_current() {
        let decoded = DocumentDecoder::new().decode(CURRENT);
        let conv = &decoded.conversation;

        assert_eq!(decoded.format, BodyFormat::Current);
        assert!(decoded.header_ok);
        assert!(!decoded.used_fallback);
        assert_eq!(conv.id.as_str(), "abc123");
        assert_eq!(conv.title, "Greeting");
        assert_eq!(conv.last_mode.as_deref(), Some("chat"));
        assert_eq!(conv.messages.len(), 2);

        let first = &conv.messages[0];
        assert_eq!(first.role, Role::User);
        assert_eq!(first.content, "[!TempImg tok1]\n\nHello");
        assert_eq!(first.temp_images.len(), 1);
        assert_eq!(
            first.temp_images["tok1"].to_transient("tok1").source,
            ImageSource::Screenshot
        );

        let second = &conv.messages[1];
        assert_eq!(second.content, "Hi!\nUSER: <!-- quoted -->");
        assert!(second.temp_images.is_empty());
    }

    #[test]
    fn test_message_ids_stable_across_loads() {
        let first = DocumentDecoder::new().decode(CURRENT).conversation;
        let second = DocumentDecoder::new().decode(CURRENT).conversation;

        let ids = |c: &Conversation| c.messages.iter().map(|m| m.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_ne!(first.messages[0].id, first.messages[1].id);
    }

    #[test]
    fn test_missing_header_derives_identity() {
        let text = "USER: <!-- 2026-10-17T10:00:01.000Z -->\nHello\n";
        let decoded = DocumentDecoder::new().decode(text);

        assert!(!decoded.header_ok);
        assert!(decoded.used_fallback);
        assert_eq!(decoded.conversation.messages.len(), 1);
        assert!(decoded.conversation.id.as_str().starts_with("20261017100001-"));
        assert_eq!(decoded.conversation.title, "Hello");
    }

    #[test]
    fn test_empty_document() {
        let decoded = DocumentDecoder::new().decode("");
        assert_eq!(decoded.format, BodyFormat::Empty);
        assert!(decoded.conversation.is_empty());
        assert!(!decoded.conversation.id.is_empty());
    }

    #[test]
    fn test_bad_message_timestamp_uses_created() {
        let text = "---\nconversationID: x1\ncreated: 2026-10-17T10:00:00.000Z\n---\n\nUSER: <!-- not a date -->\nHi\n";
        let conv = decode_conversation(text);
        assert_eq!(conv.messages[0].timestamp, conv.created_at);
    }

    #[test]
    fn test_legacy_sections_without_header() {
        let text = "---\nSender: User\nTime: 2024/01/02 03:04:05\nContent: Hello\n---\nSender: Assistant\nContent: Hi\n---\n";
        let decoded = DocumentDecoder::new().decode(text);
        assert_eq!(decoded.format, BodyFormat::LegacySections);
        assert_eq!(decoded.conversation.messages.len(), 2);
        assert_eq!(
            decoded.conversation.messages[1].timestamp,
            decoded.conversation.created_at
        );
    }

    #[test]
    fn test_garbage_degrades() {
        let decoded = DocumentDecoder::new().decode("---\n: : :\n---\nrandom words\n");
        assert_eq!(decoded.format, BodyFormat::Empty);
        assert!(decoded.conversation.is_empty());
    }
}
