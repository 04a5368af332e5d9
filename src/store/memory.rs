//! In-memory document store (for testing and embedding).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::path::{self, is_within};
use super::{DocumentStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Entry {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone)]
struct StoredFile {
    entry: Entry,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<String, StoredFile>,
    directories: BTreeSet<String>,
}

/// Document store held entirely in memory. Modification times are settable so
/// tests can drive identity tie-breaks deterministically.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files (text and binary).
    pub async fn count(&self) -> usize {
        self.inner.read().await.files.len()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.files.clear();
        inner.directories.clear();
    }

    pub async fn set_modified(&self, path: &str, modified: DateTime<Utc>) -> StoreResult<()> {
        let path = path::normalize(path)?;
        let mut inner = self.inner.write().await;
        match inner.files.get_mut(&path) {
            Some(file) => {
                file.modified = modified;
                Ok(())
            }
            None => Err(StoreError::NotFound { path }),
        }
    }

    async fn put(&self, path: &str, entry: Entry) -> StoreResult<()> {
        let path = path::normalize(path)?;
        if path.is_empty() {
            return Err(StoreError::InvalidPath(path));
        }
        let mut inner = self.inner.write().await;
        if inner.directories.contains(&path) {
            return Err(StoreError::Backend {
                path,
                message: "is a directory".to_string(),
            });
        }
        add_parents(&mut inner.directories, &path);
        inner.files.insert(
            path,
            StoredFile {
                entry,
                modified: Utc::now(),
            },
        );
        Ok(())
    }
}

fn add_parents(directories: &mut BTreeSet<String>, path: &str) {
    let mut dir = path::parent(path);
    while !dir.is_empty() {
        directories.insert(dir.to_string());
        dir = path::parent(dir);
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, path: &str) -> bool {
        let Ok(path) = path::normalize(path) else {
            return false;
        };
        let inner = self.inner.read().await;
        inner.files.contains_key(&path) || inner.directories.contains(&path)
    }

    async fn create_directory(&self, path: &str) -> StoreResult<()> {
        let path = path::normalize(path)?;
        let mut inner = self.inner.write().await;
        if inner.files.contains_key(&path) {
            return Err(StoreError::Backend {
                path,
                message: "a file exists at this path".to_string(),
            });
        }
        add_parents(&mut inner.directories, &path);
        if !path.is_empty() {
            inner.directories.insert(path);
        }
        Ok(())
    }

    async fn read_text(&self, path: &str) -> StoreResult<String> {
        let path = path::normalize(path)?;
        let inner = self.inner.read().await;
        match inner.files.get(&path).map(|f| &f.entry) {
            Some(Entry::Text(text)) => Ok(text.clone()),
            Some(Entry::Binary(bytes)) => {
                String::from_utf8(bytes.clone()).map_err(|e| StoreError::Backend {
                    path,
                    message: e.to_string(),
                })
            }
            None => Err(StoreError::NotFound { path }),
        }
    }

    async fn write_text(&self, path: &str, text: &str) -> StoreResult<()> {
        self.put(path, Entry::Text(text.to_string())).await
    }

    async fn read_binary(&self, path: &str) -> StoreResult<Vec<u8>> {
        let path = path::normalize(path)?;
        let inner = self.inner.read().await;
        match inner.files.get(&path).map(|f| &f.entry) {
            Some(Entry::Binary(bytes)) => Ok(bytes.clone()),
            Some(Entry::Text(text)) => Ok(text.as_bytes().to_vec()),
            None => Err(StoreError::NotFound { path }),
        }
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> StoreResult<()> {
        self.put(path, Entry::Binary(bytes.to_vec())).await
    }

    async fn list_text_files(&self, scope: &str) -> StoreResult<Vec<String>> {
        let scope = path::normalize(scope)?;
        let inner = self.inner.read().await;
        let mut paths: Vec<String> = inner
            .files
            .keys()
            .filter(|p| p.ends_with(".md") && is_within(p, &scope))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn modified_time(&self, path: &str) -> StoreResult<DateTime<Utc>> {
        let path = path::normalize(path)?;
        let inner = self.inner.read().await;
        inner
            .files
            .get(&path)
            .map(|f| f.modified)
            .ok_or(StoreError::NotFound { path })
    }
}
