//! Filesystem-backed document store rooted at a vault directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::path;
use super::{DocumentStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> StoreResult<(String, PathBuf)> {
        let normalized = path::normalize(relative)?;
        let mut full = self.root.clone();
        for part in normalized.split('/').filter(|p| !p.is_empty()) {
            full.push(part);
        }
        Ok((normalized, full))
    }

    async fn ensure_parent(&self, relative: &str, full: &Path) -> StoreResult<()> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(relative, e))?;
        }
        Ok(())
    }
}

fn list_markdown_sync(root: &Path, scope_dir: &Path) -> StoreResult<Vec<String>> {
    let pattern = format!(
        "{}/**/*.md",
        glob::Pattern::escape(&scope_dir.to_string_lossy())
    );
    let entries = glob::glob(&pattern).map_err(|e| StoreError::Backend {
        path: scope_dir.display().to_string(),
        message: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(file) if file.is_file() => {
                let Ok(relative) = file.strip_prefix(root) else {
                    continue;
                };
                let joined = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                paths.push(joined);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    path = %e.path().display(),
                    error = %e.error(),
                    "Skipping unreadable entry while listing documents"
                );
            }
        }
    }
    paths.sort();
    Ok(paths)
}

#[async_trait::async_trait]
impl DocumentStore for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok((_, full)) => tokio::fs::try_exists(full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn create_directory(&self, path: &str) -> StoreResult<()> {
        let (relative, full) = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| StoreError::io(relative, e))
    }

    async fn read_text(&self, path: &str) -> StoreResult<String> {
        let (relative, full) = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| StoreError::io(relative, e))
    }

    async fn read_binary(&self, path: &str) -> StoreResult<Vec<u8>> {
        let (relative, full) = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .map_err(|e| StoreError::io(relative, e))
    }

    async fn write_text(&self, path: &str, text: &str) -> StoreResult<()> {
        self.write_binary(path, text.as_bytes()).await
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        let (relative, full) = self.resolve(path)?;
        if relative.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        self.ensure_parent(&relative, &full).await?;
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| StoreError::io(relative, e))
    }

    async fn list_text_files(&self, scope: &str) -> StoreResult<Vec<String>> {
        let (_, scope_dir) = self.resolve(scope)?;
        if !tokio::fs::try_exists(&scope_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_markdown_sync(&root, &scope_dir))
            .await
            .map_err(|e| StoreError::Backend {
                path: scope.to_string(),
                message: format!("Task join error: {}", e),
            })?
    }

    async fn modified_time(&self, path: &str) -> StoreResult<DateTime<Utc>> {
        let (relative, full) = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&full)
            .await
            .map_err(|e| StoreError::io(relative.clone(), e))?;
        let modified = metadata
            .modified()
            .map_err(|e| StoreError::io(relative, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store.write_text("AI Chats/a.md", "hello").await.unwrap();
        assert!(dir.path().join("AI Chats").join("a.md").exists());
        assert_eq!(store.read_text("AI Chats/a.md").await.unwrap(), "hello");
        assert!(store.exists("AI Chats").await);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store.read_text("nope.md").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_text_files() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.write_text("AI Chats/b.md", "").await.unwrap();
        store.write_text("AI Chats/nested/a.md", "").await.unwrap();
        store.write_binary("AI Chats/images/x.png", &[0]).await.unwrap();
        store.write_text("Other/c.md", "").await.unwrap();

        let listed = store.list_text_files("AI Chats").await.unwrap();
        assert_eq!(listed, vec!["AI Chats/b.md", "AI Chats/nested/a.md"]);
        assert!(store.list_text_files("Missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_root_with_glob_metacharacters() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("vault [draft]");
        let store = FsStore::new(&root);
        store.write_text("chats/a.md", "").await.unwrap();

        assert_eq!(store.list_text_files("chats").await.unwrap(), vec!["chats/a.md"]);
    }

    #[tokio::test]
    async fn test_modified_time() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.write_text("a.md", "x").await.unwrap();
        let modified = store.modified_time("a.md").await.unwrap();
        assert!(modified <= Utc::now() + chrono::Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_rejects_escape() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(store.write_text("../x.md", "").await.is_err());
        assert!(!store.exists("../x.md").await);
    }
}
