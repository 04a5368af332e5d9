//! Codec Tests
//!
//! Document encoding and decoding through the public API: round-trips, the
//! two legacy grammars, temp-image resolution and degraded input.
//!
//! Run: cargo nextest run --test codec_tests

use chat_vault::types::{Conversation, Message, Role};
use chrono::{DateTime, TimeZone, Utc};

fn at(secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, secs).unwrap()
}

fn triples(conversation: &Conversation) -> Vec<(Role, String, DateTime<Utc>)> {
    conversation
        .messages
        .iter()
        .map(|m| (m.role, m.content.clone(), m.timestamp))
        .collect()
}

// =============================================================================
// Round-trip
// =============================================================================

mod roundtrip_tests {
    use super::*;
    use chat_vault::codec::{DocumentDecoder, DocumentEncoder, EncodeOptions};

    fn conversation() -> Conversation {
        let mut conv = Conversation::with_id("abc123".into()).with_created_at(at(0));
        conv.push_message(Message::user("Hello").with_timestamp(at(1)));
        conv.push_message(Message::assistant("Hi there").with_timestamp(at(2)));
        conv.refresh_title();
        conv
    }

    #[test]
    fn test_manual_encode_scenario() {
        let conv = conversation();
        let text = DocumentEncoder::default()
            .encode_inline(&conv, &EncodeOptions::touched().at(at(30)));

        assert!(text.contains("conversationID: abc123\n"));
        let user = text.find("USER: <!--").unwrap();
        let assistant = text.find("ASSISTANT: <!--").unwrap();
        assert!(user < assistant);

        let decoded = DocumentDecoder::new().decode(&text).conversation;
        assert_eq!(decoded.id.as_str(), "abc123");
        assert_eq!(triples(&decoded), triples(&conv));
        assert_eq!(decoded.created_at, conv.created_at);
        assert_eq!(decoded.last_updated, at(30));
    }

    #[test]
    fn test_roundtrip_preserves_awkward_content() {
        let mut conv = Conversation::with_id("weird-1".into()).with_created_at(at(0));
        conv.push_message(
            Message::user("USER: <!-- 2026-01-01T00:00:00.000Z -->\nnot a marker\n\n\nspaced")
                .with_timestamp(at(1)),
        );
        conv.push_message(
            Message::assistant("```rust\nfn main() {}\n```\n---\nSender: User")
                .with_timestamp(at(2)),
        );
        conv.title = "Title: with \"quotes\" and # hash".to_string();
        conv.last_mode = Some("research: deep".to_string());

        let text = DocumentEncoder::default().encode_inline(&conv, &EncodeOptions::stable());
        let decoded = DocumentDecoder::new().decode(&text);

        assert!(decoded.header_ok);
        assert_eq!(decoded.conversation.title, conv.title);
        assert_eq!(decoded.conversation.last_mode, conv.last_mode);
        assert_eq!(triples(&decoded.conversation), triples(&conv));
    }

    #[test]
    fn test_roundtrip_with_wall_clock_timestamps() {
        let mut conv = Conversation::with_id("clock-1".into());
        conv.push_message(Message::user("Hello"));
        conv.push_message(Message::assistant("Hi"));

        let text = DocumentEncoder::default().encode_inline(&conv, &EncodeOptions::stable());
        let decoded = DocumentDecoder::new().decode(&text).conversation;

        assert_eq!(triples(&decoded), triples(&conv));
        assert_eq!(decoded.created_at, conv.created_at);
    }

    #[test]
    fn test_stable_encoding_is_idempotent() {
        let encoder = DocumentEncoder::default();
        let conv = conversation();
        let first = encoder.encode_inline(&conv, &EncodeOptions::stable());
        let second = encoder.encode_inline(&conv, &EncodeOptions::stable());
        assert_eq!(first, second);

        let reencoded = encoder.encode_inline(
            &DocumentDecoder::new().decode(&first).conversation,
            &EncodeOptions::stable(),
        );
        assert_eq!(first, reencoded);
    }
}

// =============================================================================
// Temp images
// =============================================================================

mod temp_image_tests {
    use super::*;
    use chat_vault::codec::{DocumentDecoder, DocumentEncoder, EncodeOptions};
    use chat_vault::resolver::resolve_inline;
    use chat_vault::types::StoredTempImage;

    fn screenshot_message() -> Message {
        Message::user("[!TempImg tok1]\n\nLook at this").with_temp_image(
            "tok1",
            StoredTempImage::parse(
                r#"{"encodedBytes":"AAAA","source":"screenshot","fileName":"s.png"}"#,
            ),
        )
    }

    #[test]
    fn test_auto_resolution_scenario() {
        let resolution = resolve_inline(&screenshot_message());
        assert_eq!(
            resolution.content,
            "![screenshot](data:image/png;base64,AAAA)\n\nLook at this"
        );
        assert!(resolution.temp_images.is_empty());
        assert!(resolution.is_closed());
    }

    #[test]
    fn test_legacy_bare_payload_resolves() {
        let message = Message::user("[!TempImg old]")
            .with_temp_image("old", StoredTempImage::parse("data:image/jpeg;base64,/9j/"));
        let resolution = resolve_inline(&message);
        assert_eq!(resolution.content, "![image](data:image/jpeg;base64,/9j/)");
    }

    #[test]
    fn test_unresolved_table_survives_roundtrip() {
        let mut conv = Conversation::with_id("img-1".into()).with_created_at(at(0));
        conv.push_message(screenshot_message().with_timestamp(at(1)));

        let text = DocumentEncoder::default().encode(&conv, &[], &EncodeOptions::stable());
        assert!(text.contains("tempImages:\n  tok1: "));

        let decoded = DocumentDecoder::new().decode(&text).conversation;
        assert_eq!(decoded.messages[0].content, "[!TempImg tok1]\n\nLook at this");
        assert_eq!(decoded.messages[0].temp_images, conv.messages[0].temp_images);
    }

    #[test]
    fn test_resolved_document_has_no_table() {
        let mut conv = Conversation::with_id("img-2".into()).with_created_at(at(0));
        conv.push_message(screenshot_message().with_timestamp(at(1)));

        let text = DocumentEncoder::default().encode_inline(&conv, &EncodeOptions::stable());
        assert!(!text.contains("tempImages"));
        assert!(!text.contains("[!TempImg"));
        assert!(text.contains("![screenshot](data:image/png;base64,AAAA)"));
    }
}

// =============================================================================
// Legacy grammars
// =============================================================================

mod legacy_tests {
    use super::*;
    use chat_vault::codec::{BodyFormat, DocumentDecoder};

    const CURRENT: &str = "\
---
conversationID: legacy-1
title: \"Old chat\"
created: 2024-01-02T03:04:05.000Z
---

USER: <!-- 2024-01-02T03:04:05.000Z -->
How do I read a file?

ASSISTANT: <!-- 2024-01-02T03:04:09.000Z -->
Use std::fs::read_to_string.
It returns a Result.

";

    const SECTIONS: &str = "\
---
conversationID: legacy-1
title: \"Old chat\"
created: 2024-01-02T03:04:05.000Z
---

---
Sender: User
Time: 2024/01/02 03:04:05
Content: How do I read a file?
---
Sender: Assistant
Time: 2024/01/02 03:04:09
Content:
Use std::fs::read_to_string.
It returns a Result.
---
";

    const HEADINGS: &str = "\
## Message 1
**Sender:** User
**Time:** 2024/01/02 03:04:05
**Content:** How do I read a file?

## Message 2
**Sender:** Assistant
**Time:** 2024/01/02 03:04:09
**Content:**
Use std::fs::read_to_string.
It returns a Result.
";

    fn pairs(text: &str) -> (BodyFormat, Vec<(Role, String)>) {
        let decoded = DocumentDecoder::new().decode(text);
        let pairs = decoded
            .conversation
            .messages
            .iter()
            .map(|m| (m.role, m.content.trim().to_string()))
            .collect();
        (decoded.format, pairs)
    }

    #[test]
    fn test_sections_match_current() {
        let (current_format, current) = pairs(CURRENT);
        let (legacy_format, legacy) = pairs(SECTIONS);
        assert_eq!(current_format, BodyFormat::Current);
        assert_eq!(legacy_format, BodyFormat::LegacySections);
        assert_eq!(current, legacy);
    }

    #[test]
    fn test_headings_match_current() {
        let (_, current) = pairs(CURRENT);
        let (format, legacy) = pairs(HEADINGS);
        assert_eq!(format, BodyFormat::LegacyHeadings);
        assert!(format.is_legacy());
        assert_eq!(current, legacy);
    }

    #[test]
    fn test_sections_keep_header_identity() {
        let decoded = DocumentDecoder::new().decode(SECTIONS);
        assert!(decoded.header_ok);
        assert_eq!(decoded.conversation.id.as_str(), "legacy-1");
        assert_eq!(decoded.conversation.title, "Old chat");
    }

    #[test]
    fn test_headings_without_header_derive_identity() {
        let first = DocumentDecoder::new().decode(HEADINGS);
        let second = DocumentDecoder::new().decode(HEADINGS);
        assert!(!first.header_ok);
        assert!(first.used_fallback);
        assert_eq!(first.conversation.id, second.conversation.id);
        assert_eq!(first.conversation.title, "How do I read a file?");
    }
}

// =============================================================================
// Degraded input
// =============================================================================

mod degradation_tests {
    use super::*;
    use chat_vault::codec::{DocumentDecoder, HeaderSyntax, peek_identity};
    use chat_vault::identity::derive_identity;

    #[test]
    fn test_header_missing_identity_derives_one() {
        let text = "\
---
title: \"No id\"
---

USER: <!-- 2026-10-17T12:00:01.000Z -->
Hello
";
        let decoded = DocumentDecoder::new().decode(text);
        assert!(!decoded.header_ok);
        assert!(decoded.used_fallback);
        assert_eq!(decoded.conversation.title, "No id");
        assert_eq!(
            decoded.conversation.id,
            derive_identity(&decoded.conversation)
        );
    }

    #[test]
    fn test_broken_yaml_header_still_read() {
        let text = "\
---
conversationID: broken-1
title: \"unterminated
tags: [oops
---

USER: <!-- 2026-10-17T12:00:01.000Z -->
Hello
";
        let decoded = DocumentDecoder::new().decode(text);
        assert_eq!(decoded.conversation.id.as_str(), "broken-1");
        assert!(decoded.used_fallback);
        assert_eq!(decoded.conversation.messages.len(), 1);
        assert_eq!(
            chat_vault::codec::DocumentHeader::parse("conversationID: [x").1,
            HeaderSyntax::LineScan
        );
    }

    #[test]
    fn test_arbitrary_text_never_panics() {
        for text in [
            "",
            "---",
            "---\n---",
            "\u{feff}---\nid: 7\n---\n",
            "ASSISTANT: <!-- -->",
            "**Sender:** Robot\n**Content:** hi",
            "USER: <!-- 2026-10-17T12:00:01.000Z -->",
        ] {
            let decoded = DocumentDecoder::new().decode(text);
            assert!(!decoded.conversation.id.is_empty());
        }
    }

    #[test]
    fn test_peek_identity_variants() {
        assert_eq!(
            peek_identity("---\nconversationID: abc123\n---\n").unwrap().as_str(),
            "abc123"
        );
        assert_eq!(
            peek_identity("---\nconversation_id: \"q-1\"\n---\n").unwrap().as_str(),
            "q-1"
        );
        assert!(peek_identity("USER: <!-- x -->\nconversationID: no\n").is_none());
    }
}
