//! In-memory provider for tests and code-defined settings.

use std::collections::HashMap;

use super::ConfigResult;
use super::provider::ConfigProvider;

#[derive(Debug, Clone)]
pub struct MemoryConfigProvider {
    data: HashMap<String, String>,
    name: String,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::from_data(name, HashMap::new())
    }

    pub fn from_data(name: impl Into<String>, data: HashMap<String, String>) -> Self {
        Self {
            data,
            name: name.into(),
        }
    }

    /// Builder-style initial value.
    pub fn value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl Default for MemoryConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConfigProvider for MemoryConfigProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        Ok(self.data.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::provider::ConfigProviderExt;

    #[tokio::test]
    async fn test_memory_provider_basic() {
        let provider = MemoryConfigProvider::new().value("model", "claude-opus");

        assert_eq!(
            provider.get_raw("model").await.unwrap(),
            Some("claude-opus".to_string())
        );
        assert_eq!(provider.get_raw("missing").await.unwrap(), None);
        assert_eq!(provider.name(), "memory");
    }

    #[tokio::test]
    async fn test_memory_provider_typed() {
        let provider = MemoryConfigProvider::new()
            .value("autosave.interval_secs", "45")
            .value("tags", r#"["ai-chat","work"]"#);

        let interval: Option<u64> = provider.get("autosave.interval_secs").await.unwrap();
        let tags: Option<Vec<String>> = provider.get("tags").await.unwrap();
        assert_eq!(interval, Some(45));
        assert_eq!(tags, Some(vec!["ai-chat".to_string(), "work".to_string()]));
    }

    #[tokio::test]
    async fn test_typed_get_accepts_bare_strings() {
        let provider = MemoryConfigProvider::new()
            .value("model", "claude-opus")
            .value("autosave.interval_secs", "soon");
        let model: Option<String> = provider.get("model").await.unwrap();
        assert_eq!(model.as_deref(), Some("claude-opus"));

        let bad: crate::config::ConfigResult<Option<u64>> =
            provider.get("autosave.interval_secs").await;
        assert!(bad.is_err());
    }
}
