//! The conversation aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ConversationId, MessageId};
use crate::codec::timestamp;
use super::message::{Message, Role};

pub const DEFAULT_TITLE: &str = "New conversation";
const TITLE_MAX_CHARS: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub last_mode: Option<String>,
}

impl Conversation {
    /// A conversation without identity; one is derived on first save.
    pub fn new() -> Self {
        Self::with_id(ConversationId::default())
    }

    pub fn with_id(id: ConversationId) -> Self {
        let now = timestamp::now_millis();
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::with_capacity(32),
            created_at: now,
            last_updated: now,
            last_mode: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        let created_at = timestamp::to_millis(created_at);
        self.created_at = created_at;
        self.last_updated = created_at;
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.last_mode = Some(mode.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
        self.touch();
    }

    pub fn remove_message(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| &m.id == id)?;
        let removed = self.messages.remove(index);
        self.touch();
        Some(removed)
    }

    pub fn edit_message(&mut self, id: &MessageId, content: impl Into<String>) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) else {
            return false;
        };
        message.content = content.into();
        let tokens = message.placeholder_tokens();
        message.temp_images.retain(|token, _| tokens.contains(token));
        self.touch();
        true
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Assign a derived identity if none was given. Existing ids never change.
    pub fn ensure_id(&mut self) -> &ConversationId {
        if self.id.is_empty() {
            self.id = crate::identity::derive_identity(self);
        }
        &self.id
    }

    /// Recompute the title from the first user message with text.
    pub fn refresh_title(&mut self) {
        self.title = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .find_map(|m| title_from(&m.plain_text()))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    }

    pub fn has_unresolved_images(&self) -> bool {
        self.messages.iter().any(Message::has_unresolved_images)
    }

    fn touch(&mut self) {
        let now = timestamp::now_millis();
        if now > self.last_updated {
            self.last_updated = now;
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

fn title_from(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return Some(collapsed);
    }
    let truncated: String = collapsed.chars().take(TITLE_MAX_CHARS).collect();
    Some(format!("{}...", truncated.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_advances_last_updated() {
        let created = timestamp::now_millis() - chrono::Duration::hours(1);
        let mut conv = Conversation::with_id("abc".into()).with_created_at(created);
        conv.push_message(Message::user("Hello"));

        assert_eq!(conv.created_at, created);
        assert!(conv.last_updated > created);
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_remove_and_edit_message() {
        let mut conv = Conversation::new();
        let first = Message::user("one");
        let first_id = first.id.clone();
        conv.push_message(first);
        conv.push_message(Message::assistant("two"));

        assert!(conv.edit_message(&first_id, "uno"));
        assert_eq!(conv.messages[0].content, "uno");
        assert!(conv.remove_message(&first_id).is_some());
        assert_eq!(conv.messages[0].content, "two");
        assert!(!conv.edit_message(&first_id, "gone"));
    }

    #[test]
    fn test_edit_drops_unreferenced_temp_images() {
        let mut conv = Conversation::new();
        let mut msg = Message::user("hi");
        msg.attach_image(crate::types::TransientImage::new(
            "AAAA",
            crate::types::ImageSource::Image,
            "a.png",
        ));
        let id = msg.id.clone();
        conv.push_message(msg);

        conv.edit_message(&id, "no image anymore");
        assert!(conv.messages[0].temp_images.is_empty());
    }

    #[test]
    fn test_ensure_id_is_stable() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("Hello"));
        let id = conv.ensure_id().clone();
        assert!(!id.is_empty());
        assert_eq!(conv.ensure_id(), &id);

        let mut assigned = Conversation::with_id("given".into());
        assigned.push_message(Message::user("Hello"));
        assert_eq!(assigned.ensure_id().as_str(), "given");
    }

    #[test]
    fn test_refresh_title() {
        let mut conv = Conversation::new();
        conv.push_message(Message::assistant("Welcome"));
        conv.push_message(Message::user(
            "![screenshot](a.png)\n\n  Why does   my build fail?\nsecond line",
        ));
        conv.refresh_title();
        assert_eq!(conv.title, "Why does my build fail?");
    }

    #[test]
    fn test_refresh_title_truncates() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("x".repeat(80)));
        conv.refresh_title();
        assert_eq!(conv.title, format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn test_refresh_title_default() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("[!TempImg only]"));
        conv.refresh_title();
        assert_eq!(conv.title, DEFAULT_TITLE);
    }
}
