//! Conversation to document text.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::escape_content;
use super::header::DocumentHeader;
use super::timestamp::format_iso;
use crate::config::VaultSettings;
use crate::resolver::{Resolution, resolve_inline};
use crate::types::{Conversation, StoredTempImage, markers};

#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Stamp `lastModified` with `now`; otherwise it mirrors `created`.
    pub update_timestamp: bool,
    /// Clock override for deterministic output.
    pub now: Option<DateTime<Utc>>,
}

impl EncodeOptions {
    pub fn stable() -> Self {
        Self::default()
    }

    pub fn touched() -> Self {
        Self {
            update_timestamp: true,
            now: None,
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

#[derive(Debug, Clone)]
pub struct DocumentEncoder {
    model: String,
    tags: Vec<String>,
}

impl DocumentEncoder {
    pub fn new(model: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            model: model.into(),
            tags,
        }
    }

    pub fn from_settings(settings: &VaultSettings) -> Self {
        Self::new(settings.model.clone(), settings.tags.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Encode with `resolved[i]` standing in for message `i`. Messages without
    /// a resolution are written as they are, placeholders and table included.
    pub fn encode(
        &self,
        conversation: &Conversation,
        resolved: &[Resolution],
        options: &EncodeOptions,
    ) -> String {
        let mut blocks = String::new();
        let mut temp_images: BTreeMap<String, StoredTempImage> = BTreeMap::new();

        for (index, message) in conversation.messages.iter().enumerate() {
            let fallback;
            let resolution = match resolved.get(index) {
                Some(resolution) => resolution,
                None => {
                    fallback = Resolution::unchanged(message);
                    &fallback
                }
            };

            let content = resolution.content.trim_end();
            if content.trim().is_empty() {
                continue;
            }

            for token in markers::placeholder_tokens(content) {
                if let Some(image) = resolution.temp_images.get(&token) {
                    temp_images.insert(token, image.clone());
                }
            }

            blocks.push_str(message.role.marker());
            blocks.push_str(": <!-- ");
            blocks.push_str(&format_iso(&message.timestamp));
            blocks.push_str(" -->\n");
            blocks.push_str(&escape_content(content));
            blocks.push_str("\n\n");
        }

        let last_modified = if options.update_timestamp {
            options.now.unwrap_or_else(Utc::now)
        } else {
            conversation.created_at
        };

        let header = DocumentHeader {
            conversation_id: Some(conversation.id.clone()),
            model: Some(self.model.clone()),
            title: Some(conversation.title.clone()),
            created: Some(conversation.created_at),
            last_modified: Some(last_modified),
            last_mode: conversation.last_mode.clone(),
            tags: self.tags.clone(),
            temp_images,
        };

        let mut out = header.render();
        out.push('\n');
        out.push_str(&blocks);
        out
    }

    /// Encode with every image inlined as a data URI.
    pub fn encode_inline(&self, conversation: &Conversation, options: &EncodeOptions) -> String {
        let resolved: Vec<Resolution> = conversation.messages.iter().map(resolve_inline).collect();
        self.encode(conversation, &resolved, options)
    }
}

impl Default for DocumentEncoder {
    fn default() -> Self {
        Self::from_settings(&VaultSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageSource, Message, TransientImage};
    use chrono::TimeZone;

    fn fixed(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, secs).unwrap()
    }

    fn sample() -> Conversation {
        let mut conv = Conversation::with_id("abc123".into()).with_created_at(fixed(0));
        conv.push_message(Message::user("Hello").with_timestamp(fixed(1)));
        conv.push_message(Message::assistant("Hi there!\n\n").with_timestamp(fixed(2)));
        conv.title = "Hello".to_string();
        conv
    }

    #[test]
    fn test_encode_layout() {
        let encoder = DocumentEncoder::new("claude-sonnet-4-5", vec!["ai-chat".into()]);
        let text = encoder.encode_inline(&sample(), &EncodeOptions::stable());

        let expected = concat!(
            "---\n",
            "conversationID: abc123\n",
            "model: claude-sonnet-4-5\n",
            "title: \"Hello\"\n",
            "created: 2026-10-17T10:00:00.000Z\n",
            "lastModified: 2026-10-17T10:00:00.000Z\n",
            "tags:\n",
            "  - \"ai-chat\"\n",
            "---\n",
            "\n",
            "USER: <!-- 2026-10-17T10:00:01.000Z -->\n",
            "Hello\n",
            "\n",
            "ASSISTANT: <!-- 2026-10-17T10:00:02.000Z -->\n",
            "Hi there!\n",
            "\n",
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_update_timestamp() {
        let encoder = DocumentEncoder::default();
        let text = encoder.encode_inline(&sample(), &EncodeOptions::touched().at(fixed(30)));
        assert!(text.contains("lastModified: 2026-10-17T10:00:30.000Z\n"));
    }

    #[test]
    fn test_deterministic() {
        let encoder = DocumentEncoder::default();
        let conv = sample();
        assert_eq!(
            encoder.encode_inline(&conv, &EncodeOptions::stable()),
            encoder.encode_inline(&conv, &EncodeOptions::stable())
        );
    }

    #[test]
    fn test_blank_messages_skipped() {
        let encoder = DocumentEncoder::default();
        let mut conv = sample();
        conv.push_message(Message::assistant("   \n"));
        let text = encoder.encode_inline(&conv, &EncodeOptions::stable());
        assert_eq!(text.matches("ASSISTANT: <!--").count(), 1);
    }

    #[test]
    fn test_unresolved_table_written() {
        let encoder = DocumentEncoder::default();
        let mut conv = sample();
        let mut msg = Message::user("see image").with_timestamp(fixed(3));
        let token = msg.attach_image(TransientImage::new("AAAA", ImageSource::Screenshot, "s.png"));
        conv.push_message(msg);

        let text = encoder.encode(&conv, &[], &EncodeOptions::stable());
        assert!(text.contains("tempImages:\n"));
        assert!(text.contains(&format!("  {}: \"{{", token)));
        assert!(text.contains(&format!("[!TempImg {}]", token)));

        let inline = encoder.encode_inline(&conv, &EncodeOptions::stable());
        assert!(!inline.contains("tempImages"));
        assert!(inline.contains("![screenshot](data:image/png;base64,AAAA)\n\nsee image"));
    }

    #[test]
    fn test_marker_lines_in_content_are_escaped() {
        let encoder = DocumentEncoder::default();
        let mut conv = sample();
        conv.push_message(
            Message::user("quoted:\nASSISTANT: <!-- fake -->").with_timestamp(fixed(4)),
        );
        let text = encoder.encode_inline(&conv, &EncodeOptions::stable());
        assert!(text.contains("quoted:\n\\ASSISTANT: <!-- fake -->\n"));
    }
}
