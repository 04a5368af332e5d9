//! Temporary image resolution.
//!
//! Messages carry `[!TempImg <token>]` placeholders backed by transient image
//! payloads. Before a message is written, each placeholder is replaced either
//! by an inline data-URI marker ([`SaveMode::Auto`]) or by a marker pointing
//! at an image file written to the store ([`SaveMode::Manual`]).
//!
//! Resolution is all-or-nothing per message: when any image of a message
//! cannot be materialized, the message keeps its placeholders and its table
//! so the next save can retry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::VaultSettings;
use crate::store::{DocumentStore, ensure_directory, path};
use crate::types::markers;
use crate::types::{ImageSource, MaterializedImage, Message, StoredTempImage, TransientImage};
use crate::{Error, Result};

const MAX_NAME_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Inline images as data URIs; no store access.
    #[default]
    Auto,
    /// Write images to the store and reference them by path.
    Manual,
}

/// Outcome of resolving one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub content: String,
    /// Entries still referenced by placeholders in `content`.
    pub temp_images: BTreeMap<String, StoredTempImage>,
    /// Store paths written during this resolution.
    pub materialized: Vec<String>,
    pub failed: bool,
}

impl Resolution {
    /// The message as-is, with unreferenced table entries dropped.
    pub fn unchanged(message: &Message) -> Self {
        let tokens = message.placeholder_tokens();
        Self {
            content: message.content.clone(),
            temp_images: message
                .temp_images
                .iter()
                .filter(|(token, _)| tokens.contains(token))
                .map(|(token, image)| (token.clone(), image.clone()))
                .collect(),
            materialized: Vec::new(),
            failed: false,
        }
    }

    fn failed(message: &Message) -> Self {
        Self {
            failed: true,
            ..Self::unchanged(message)
        }
    }

    /// No placeholder and no table entry remain.
    pub fn is_closed(&self) -> bool {
        self.temp_images.is_empty() && !markers::has_placeholders(&self.content)
    }
}

/// Destination folders by image provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFolders {
    pub images: String,
    pub screenshots: String,
    pub external: String,
}

impl ImageFolders {
    pub fn from_settings(settings: &VaultSettings) -> Self {
        Self {
            images: settings.images_folder.clone(),
            screenshots: settings.screenshots_folder.clone(),
            external: settings.external_images_folder.clone(),
        }
    }

    /// Folder for `source`, or `None` when the image already lives in the vault.
    pub fn folder_for(&self, source: ImageSource, conversation_id: &str) -> Option<String> {
        match source {
            ImageSource::Screenshot => Some(self.screenshots.clone()),
            ImageSource::External => Some(self.external.clone()),
            ImageSource::Vault => None,
            ImageSource::Image => {
                let sub = path::sanitize_file_name(conversation_id);
                if sub.is_empty() {
                    Some(self.images.clone())
                } else {
                    Some(path::join(&self.images, &sub))
                }
            }
        }
    }
}

impl Default for ImageFolders {
    fn default() -> Self {
        Self::from_settings(&VaultSettings::default())
    }
}

/// Replace every backed placeholder with an inline data-URI marker.
pub fn resolve_inline(message: &Message) -> Resolution {
    let mut content = message.content.clone();
    for token in message.placeholder_tokens() {
        match message.temp_images.get(&token) {
            Some(stored) => {
                let markup = stored.to_transient(&token).markup();
                content = content.replace(&markers::placeholder(&token), &markup);
            }
            None => {
                tracing::warn!(token = %token, "Placeholder has no image payload, leaving it in place");
            }
        }
    }
    Resolution {
        content,
        temp_images: BTreeMap::new(),
        materialized: Vec::new(),
        failed: false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TempImageResolver {
    folders: ImageFolders,
}

impl TempImageResolver {
    pub fn new(folders: ImageFolders) -> Self {
        Self { folders }
    }

    pub fn from_settings(settings: &VaultSettings) -> Self {
        Self::new(ImageFolders::from_settings(settings))
    }

    pub fn folders(&self) -> &ImageFolders {
        &self.folders
    }

    pub async fn resolve<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        conversation_id: &str,
        message: &Message,
        mode: SaveMode,
    ) -> Resolution {
        match mode {
            SaveMode::Auto => resolve_inline(message),
            SaveMode::Manual => self.materialize(store, conversation_id, message).await,
        }
    }

    /// Write every backed placeholder's image to the store.
    pub async fn materialize<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        conversation_id: &str,
        message: &Message,
    ) -> Resolution {
        let tokens = message.placeholder_tokens();
        if tokens.iter().all(|t| !message.temp_images.contains_key(t)) {
            for token in &tokens {
                tracing::warn!(token = %token, "Placeholder has no image payload, leaving it in place");
            }
            return Resolution::unchanged(message);
        }

        let mut content = message.content.clone();
        let mut written = Vec::new();
        for token in &tokens {
            let Some(stored) = message.temp_images.get(token) else {
                tracing::warn!(token = %token, "Placeholder has no image payload, leaving it in place");
                continue;
            };
            let image = stored.to_transient(token);
            match self.write_image(store, conversation_id, token, &image).await {
                Ok((reference, path)) => {
                    content = content.replace(&markers::placeholder(token), &reference.markup());
                    written.extend(path);
                }
                Err(e) => {
                    tracing::warn!(
                        token = %token,
                        error = %e,
                        "Image materialization failed, keeping placeholders for retry"
                    );
                    return Resolution::failed(message);
                }
            }
        }

        Resolution {
            content,
            temp_images: BTreeMap::new(),
            materialized: written,
            failed: false,
        }
    }

    async fn write_image<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        conversation_id: &str,
        token: &str,
        image: &TransientImage,
    ) -> Result<(MaterializedImage, Option<String>)> {
        let Some(folder) = self.folders.folder_for(image.source, conversation_id) else {
            let existing = path::normalize(&image.file_name)?;
            if existing.is_empty() {
                return Err(Error::Resolution {
                    token: token.to_string(),
                    message: "vault image without a path".to_string(),
                });
            }
            return Ok((MaterializedImage::new(existing, image.source), None));
        };

        let bytes = image.decode_bytes().map_err(|e| Error::Resolution {
            token: token.to_string(),
            message: format!("invalid base64 payload: {}", e),
        })?;

        ensure_directory(store, &folder).await?;
        let name = file_name_for(image, token);
        let destination = available_path(store, &folder, &name, &bytes)
            .await
            .ok_or_else(|| Error::Resolution {
                token: token.to_string(),
                message: format!("no free file name for {} in {}", name, folder),
            })?;
        match destination {
            Destination::Existing(ref path) => {
                tracing::debug!(token = %token, path = %path, "Image already stored, reusing it");
            }
            Destination::Free(ref path) => {
                store.write_binary(path, &bytes).await?;
                tracing::debug!(token = %token, path = %path, "Materialized image");
            }
        }
        let destination = destination.into_path();
        Ok((
            MaterializedImage::new(destination.clone(), image.source),
            Some(destination),
        ))
    }
}

fn file_name_for(image: &TransientImage, token: &str) -> String {
    let sanitized = path::sanitize_file_name(&image.file_name);
    let base = if sanitized.is_empty() {
        format!("{}-{}", image.source.as_str(), token)
    } else {
        sanitized
    };
    match path::split_extension(&base) {
        (_, Some(_)) => base,
        (stem, None) => format!("{}.{}", stem, image.extension()),
    }
}

enum Destination {
    /// A file with the same bytes is already there.
    Existing(String),
    Free(String),
}

impl Destination {
    fn into_path(self) -> String {
        match self {
            Destination::Existing(path) | Destination::Free(path) => path,
        }
    }
}

/// First unused name in `folder`, or an occupied one holding exactly `bytes`.
/// Reusing identical files keeps retries after a partial failure from piling
/// up numbered copies.
async fn available_path<S: DocumentStore + ?Sized>(
    store: &S,
    folder: &str,
    name: &str,
    bytes: &[u8],
) -> Option<Destination> {
    let (stem, ext) = path::split_extension(name);
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = match (n, ext) {
            (0, _) => path::join(folder, name),
            (_, Some(ext)) => path::join(folder, &format!("{}-{}.{}", stem, n, ext)),
            (_, None) => path::join(folder, &format!("{}-{}", stem, n)),
        };
        if !store.exists(&candidate).await {
            return Some(Destination::Free(candidate));
        }
        if store
            .read_binary(&candidate)
            .await
            .is_ok_and(|existing| existing == bytes)
        {
            return Some(Destination::Existing(candidate));
        }
    }
    None
}
