//! Vault settings: where documents and images go, and header defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::provider::{ConfigProvider, ConfigProviderExt};
use super::validator::{ConfigValidator, ValueType};
use super::{ConfigError, ConfigResult};
use crate::store::path;

pub const KEY_CONVERSATIONS_FOLDER: &str = "conversations.folder";
pub const KEY_IMAGES_FOLDER: &str = "images.folder";
pub const KEY_SCREENSHOTS_FOLDER: &str = "images.screenshots_folder";
pub const KEY_EXTERNAL_FOLDER: &str = "images.external_folder";
pub const KEY_MODEL: &str = "model";
pub const KEY_TAGS: &str = "tags";
pub const KEY_AUTOSAVE_INTERVAL: &str = "autosave.interval_secs";

const FOLDER_KEYS: [&str; 4] = [
    KEY_CONVERSATIONS_FOLDER,
    KEY_IMAGES_FOLDER,
    KEY_SCREENSHOTS_FOLDER,
    KEY_EXTERNAL_FOLDER,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultSettings {
    pub conversations_folder: String,
    pub images_folder: String,
    pub screenshots_folder: String,
    pub external_images_folder: String,
    /// Model tag written to every header.
    pub model: String,
    /// Static tags written to every header.
    pub tags: Vec<String>,
    pub autosave_interval_secs: u64,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            conversations_folder: "AI Chats".to_string(),
            images_folder: "AI Chats/images".to_string(),
            screenshots_folder: "AI Chats/screenshots".to_string(),
            external_images_folder: "AI Chats/external".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            tags: vec!["ai-chat".to_string()],
            autosave_interval_secs: 30,
        }
    }
}

impl VaultSettings {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    /// Read every known key from `provider`, keeping defaults for absent ones.
    pub async fn load<P: ConfigProvider + ?Sized>(provider: &P) -> ConfigResult<Self> {
        let mut settings = Self::default();

        if let Some(v) = provider.get::<String>(KEY_CONVERSATIONS_FOLDER).await? {
            settings.conversations_folder = v;
        }
        if let Some(v) = provider.get::<String>(KEY_IMAGES_FOLDER).await? {
            settings.images_folder = v;
        }
        if let Some(v) = provider.get::<String>(KEY_SCREENSHOTS_FOLDER).await? {
            settings.screenshots_folder = v;
        }
        if let Some(v) = provider.get::<String>(KEY_EXTERNAL_FOLDER).await? {
            settings.external_images_folder = v;
        }
        if let Some(v) = provider.get::<String>(KEY_MODEL).await? {
            settings.model = v;
        }
        if let Some(raw) = provider.get_raw(KEY_TAGS).await? {
            settings.tags = parse_tags(&raw);
        }
        if let Some(v) = provider.get::<u64>(KEY_AUTOSAVE_INTERVAL).await? {
            settings.autosave_interval_secs = v;
        }

        settings.normalize_folders()?;
        settings.validate()?;
        tracing::debug!(
            conversations = %settings.conversations_folder,
            model = %settings.model,
            "Loaded vault settings"
        );
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut validator = ConfigValidator::new()
            .expect_type(KEY_TAGS, ValueType::Array)
            .expect_range(KEY_AUTOSAVE_INTERVAL, 1..=3600)
            .custom(KEY_MODEL, non_empty_string);
        for key in FOLDER_KEYS {
            validator = validator.require(key).custom(key, non_empty_string);
        }
        validator.validate(&self.to_document())
    }

    /// The settings as a nested document addressed by the `KEY_*` paths.
    pub fn to_document(&self) -> Value {
        json!({
            "conversations": { "folder": self.conversations_folder },
            "images": {
                "folder": self.images_folder,
                "screenshots_folder": self.screenshots_folder,
                "external_folder": self.external_images_folder,
            },
            "model": self.model,
            "tags": self.tags,
            "autosave": { "interval_secs": self.autosave_interval_secs },
        })
    }

    fn normalize_folders(&mut self) -> ConfigResult<()> {
        let folders = [
            (KEY_CONVERSATIONS_FOLDER, &mut self.conversations_folder),
            (KEY_IMAGES_FOLDER, &mut self.images_folder),
            (KEY_SCREENSHOTS_FOLDER, &mut self.screenshots_folder),
            (KEY_EXTERNAL_FOLDER, &mut self.external_images_folder),
        ];
        for (key, folder) in folders {
            *folder = path::normalize(folder).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}

fn non_empty_string(value: &Value) -> Result<(), String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err("must be a non-empty string".to_string()),
    }
}

/// JSON array, or a comma-separated list.
fn parse_tags(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(tags) => tags,
        Err(_) => raw
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompositeConfigProvider, MemoryConfigProvider};

    #[test]
    fn test_defaults_are_valid() {
        let settings = VaultSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.autosave_interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_empty_provider_gives_defaults() {
        let settings = VaultSettings::load(&MemoryConfigProvider::new()).await.unwrap();
        assert_eq!(settings, VaultSettings::default());
    }

    #[tokio::test]
    async fn test_load_overrides() {
        let provider = CompositeConfigProvider::new()
            .provider(Box::new(
                MemoryConfigProvider::named("user")
                    .value(KEY_CONVERSATIONS_FOLDER, "/Chats/")
                    .value(KEY_TAGS, "ai, work")
                    .value(KEY_AUTOSAVE_INTERVAL, "5"),
            ))
            .provider(Box::new(
                MemoryConfigProvider::named("team")
                    .value(KEY_MODEL, "\"claude-opus\"")
                    .value(KEY_AUTOSAVE_INTERVAL, "600"),
            ));

        let settings = VaultSettings::load(&provider).await.unwrap();
        assert_eq!(settings.conversations_folder, "Chats");
        assert_eq!(settings.tags, vec!["ai", "work"]);
        assert_eq!(settings.model, "claude-opus");
        assert_eq!(settings.autosave_interval_secs, 5);
        assert_eq!(settings.images_folder, "AI Chats/images");
    }

    #[tokio::test]
    async fn test_load_rejects_out_of_range_interval() {
        let provider = MemoryConfigProvider::new().value(KEY_AUTOSAVE_INTERVAL, "0");
        let err = VaultSettings::load(&provider).await.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationErrors(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_escaping_folder() {
        let provider = MemoryConfigProvider::new().value(KEY_IMAGES_FOLDER, "../outside");
        let err = VaultSettings::load(&provider).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_load_rejects_empty_folder() {
        let provider = MemoryConfigProvider::new().value(KEY_CONVERSATIONS_FOLDER, "/");
        assert!(VaultSettings::load(&provider).await.is_err());
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("[\"a\",\"b\"]"), vec!["a", "b"]);
        assert_eq!(parse_tags("a, ,b"), vec!["a", "b"]);
    }
}
