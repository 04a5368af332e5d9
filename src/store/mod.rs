//! Document store backends.
//!
//! The store is the only I/O surface of the crate. Paths are vault-relative,
//! `/`-separated strings; every write is create-or-overwrite.

mod fs;
mod memory;
pub mod path;

pub use fs::FsStore;
pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Storage error at {path}: {message}")]
    Backend { path: String, message: String },
}

impl StoreError {
    pub fn path(&self) -> &str {
        match self {
            StoreError::NotFound { path }
            | StoreError::Io { path, .. }
            | StoreError::Backend { path, .. } => path,
            StoreError::InvalidPath(path) => path,
        }
    }

    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound { path }
        } else {
            StoreError::Io { path, source }
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Document store collaborator consumed by the codec layer.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    async fn exists(&self, path: &str) -> bool;

    async fn create_directory(&self, path: &str) -> StoreResult<()>;

    async fn read_text(&self, path: &str) -> StoreResult<String>;

    async fn read_binary(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Create or overwrite.
    async fn write_text(&self, path: &str, text: &str) -> StoreResult<()>;

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Markdown documents under `scope`, recursively, sorted.
    async fn list_text_files(&self, scope: &str) -> StoreResult<Vec<String>>;

    async fn modified_time(&self, path: &str) -> StoreResult<DateTime<Utc>>;
}

#[async_trait::async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn exists(&self, path: &str) -> bool {
        (**self).exists(path).await
    }

    async fn create_directory(&self, path: &str) -> StoreResult<()> {
        (**self).create_directory(path).await
    }

    async fn read_text(&self, path: &str) -> StoreResult<String> {
        (**self).read_text(path).await
    }

    async fn read_binary(&self, path: &str) -> StoreResult<Vec<u8>> {
        (**self).read_binary(path).await
    }

    async fn write_text(&self, path: &str, text: &str) -> StoreResult<()> {
        (**self).write_text(path, text).await
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        (**self).write_binary(path, bytes).await
    }

    async fn list_text_files(&self, scope: &str) -> StoreResult<Vec<String>> {
        (**self).list_text_files(scope).await
    }

    async fn modified_time(&self, path: &str) -> StoreResult<DateTime<Utc>> {
        (**self).modified_time(path).await
    }
}

/// Create `folder` (and parents, backend permitting) when missing.
pub async fn ensure_directory<S: DocumentStore + ?Sized>(store: &S, folder: &str) -> StoreResult<()> {
    if folder.is_empty() || store.exists(folder).await {
        return Ok(());
    }
    store.create_directory(folder).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound {
            path: "AI Chats/a.md".to_string(),
        };
        assert!(err.to_string().contains("AI Chats/a.md"));
        assert_eq!(err.path(), "AI Chats/a.md");
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = StoreError::io(
            "x.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = StoreError::io(
            "x.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
