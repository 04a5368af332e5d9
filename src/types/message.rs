//! Conversation messages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::MessageId;
use crate::codec::timestamp;
use super::image::{StoredTempImage, TransientImage};
use super::markers;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl Role {
    /// Label used by role-marker lines in documents.
    pub fn marker(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "USER" => Some(Role::User),
            "ASSISTANT" => Some(Role::Assistant),
            _ => None,
        }
    }

    /// Sender names found in older documents.
    pub fn from_sender(sender: &str) -> Option<Self> {
        let sender = sender.trim().trim_matches('*').trim().to_ascii_lowercase();
        match sender.as_str() {
            "user" | "you" | "me" | "human" => Some(Role::User),
            "assistant" | "ai" | "bot" | "claude" | "model" | "gpt" | "chatgpt" => {
                Some(Role::Assistant)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single turn. `content` may embed resolved image markup and unresolved
/// `[!TempImg <token>]` placeholders backed by `temp_images`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub temp_images: BTreeMap<String, StoredTempImage>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp: timestamp::now_millis(),
            temp_images: BTreeMap::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp::to_millis(timestamp);
        self
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    /// Register a temp image under an explicit token without touching `content`.
    pub fn with_temp_image(mut self, token: impl Into<String>, image: StoredTempImage) -> Self {
        self.temp_images.insert(token.into(), image);
        self
    }

    /// Append a placeholder for `image` and keep its payload until resolution.
    pub fn attach_image(&mut self, image: TransientImage) -> String {
        let token = format!("img-{}", Uuid::new_v4().simple());
        let marker = markers::placeholder(&token);
        if self.content.is_empty() {
            self.content = marker;
        } else {
            self.content = format!("{}\n\n{}", marker, self.content);
        }
        self.temp_images
            .insert(token.clone(), StoredTempImage::Structured(image));
        token
    }

    pub fn placeholder_tokens(&self) -> Vec<String> {
        markers::placeholder_tokens(&self.content)
    }

    pub fn has_unresolved_images(&self) -> bool {
        !self.temp_images.is_empty() || markers::has_placeholders(&self.content)
    }

    /// Placeholders in `content` with no backing payload.
    pub fn orphan_tokens(&self) -> Vec<String> {
        self.placeholder_tokens()
            .into_iter()
            .filter(|t| !self.temp_images.contains_key(t))
            .collect()
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Text without image markers, for titles and previews.
    pub fn plain_text(&self) -> String {
        markers::strip_markers(&self.content)
    }
}
