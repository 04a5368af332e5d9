//! Configuration provider trait.

use serde::de::DeserializeOwned;

use super::{ConfigError, ConfigResult};

/// A source of raw string settings keyed by dot paths (`images.folder`).
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>>;
}

/// Typed access on top of [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    /// Values are read as JSON; a bare string that is not valid JSON is
    /// retried as a JSON string so `CHAT_VAULT_MODEL=claude-opus` works.
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = ConfigResult<Option<T>>> + Send
    where
        Self: Sync,
    {
        async move {
            let Some(raw) = self.get_raw(key).await? else {
                return Ok(None);
            };
            let parsed = serde_json::from_str::<T>(&raw)
                .or_else(|_| serde_json::from_value::<T>(serde_json::Value::String(raw.clone())))
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
            Ok(Some(parsed))
        }
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}
