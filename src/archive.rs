//! Save and load orchestration over a [`DocumentStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::Instrument;

use crate::codec::{Decoded, DocumentDecoder, DocumentEncoder, EncodeOptions};
use crate::config::VaultSettings;
use crate::identity::{IdentityMatch, find_by_identity};
use crate::observability::{ArchiveMetrics, ArchiveSpans};
use crate::resolver::{Resolution, SaveMode, TempImageResolver};
use crate::store::{DocumentStore, ensure_directory, path};
use crate::types::{Conversation, ConversationId};
use crate::Result;

const MAX_PATH_ATTEMPTS: usize = 1000;

/// How a conversation is saved.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub mode: SaveMode,
    /// Stamp `lastModified` with the current time.
    pub update_timestamp: bool,
    /// Write here instead of locating the document by identity.
    pub known_path: Option<String>,
    /// Clock override for deterministic output.
    pub now: Option<DateTime<Utc>>,
}

impl SaveOptions {
    /// Inline images, keep `lastModified` stable.
    pub fn auto() -> Self {
        Self::default()
    }

    /// Materialize images and stamp `lastModified`.
    pub fn manual() -> Self {
        Self {
            mode: SaveMode::Manual,
            update_timestamp: true,
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.known_path = Some(path.into());
        self
    }

    pub fn with_update_timestamp(mut self, update: bool) -> Self {
        self.update_timestamp = update;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            update_timestamp: self.update_timestamp,
            now: self.now,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub path: String,
    pub document: String,
    /// Image files written by this save.
    pub materialized: Vec<String>,
    /// Placeholders left unresolved (failed or orphaned).
    pub unresolved_images: usize,
    /// Other documents carrying the same identity.
    pub conflicts: Vec<String>,
    /// The document did not exist before this save.
    pub created: bool,
}

impl SaveReport {
    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

struct Placement {
    path: String,
    conflicts: Vec<String>,
    created: bool,
}

pub struct ConversationArchive<S: DocumentStore> {
    store: Arc<S>,
    settings: VaultSettings,
    resolver: TempImageResolver,
    encoder: DocumentEncoder,
    decoder: DocumentDecoder,
    spans: ArchiveSpans,
    metrics: Arc<ArchiveMetrics>,
}

impl<S: DocumentStore> ConversationArchive<S> {
    pub fn new(store: Arc<S>, settings: VaultSettings) -> Self {
        let spans = ArchiveSpans::new(store.name());
        Self {
            resolver: TempImageResolver::from_settings(&settings),
            encoder: DocumentEncoder::from_settings(&settings),
            decoder: DocumentDecoder::new(),
            spans,
            metrics: Arc::new(ArchiveMetrics::new()),
            store,
            settings,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ArchiveMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<ArchiveMetrics> {
        &self.metrics
    }

    /// Resolve images and encode. Assigns an identity when missing.
    ///
    /// In manual mode successfully materialized messages are rewritten to
    /// reference their stored images, so later saves reuse the same paths.
    pub async fn encode(
        &self,
        conversation: &mut Conversation,
        mode: SaveMode,
        options: &EncodeOptions,
    ) -> String {
        conversation.ensure_id();
        let resolutions = self.resolve(conversation, mode).await;
        if mode == SaveMode::Manual {
            apply_resolutions(conversation, &resolutions);
        }

        let _span = self
            .spans
            .encode_span(conversation.id.as_str(), conversation.len())
            .entered();
        self.encoder.encode(conversation, &resolutions, options)
    }

    async fn resolve(&self, conversation: &Conversation, mode: SaveMode) -> Vec<Resolution> {
        let mut resolutions = Vec::with_capacity(conversation.len());
        for message in &conversation.messages {
            let resolution = self
                .resolver
                .resolve(self.store.as_ref(), conversation.id.as_str(), message, mode)
                .await;
            self.metrics
                .images_materialized
                .add(resolution.materialized.len() as u64);
            if resolution.failed {
                self.metrics.resolution_failures.inc();
            }
            resolutions.push(resolution);
        }
        resolutions
    }

    /// Resolve, encode and write `conversation`.
    pub async fn save(
        &self,
        conversation: &mut Conversation,
        options: SaveOptions,
    ) -> Result<SaveReport> {
        conversation.ensure_id();
        let save_span = self.spans.save_span(conversation.id.as_str(), options.mode);
        let span = save_span.span().clone();

        let result = async {
            let resolutions = self.resolve(conversation, options.mode).await;
            if options.mode == SaveMode::Manual {
                apply_resolutions(conversation, &resolutions);
            }
            let document = {
                let _enc = self
                    .spans
                    .encode_span(conversation.id.as_str(), conversation.len())
                    .entered();
                self.encoder
                    .encode(conversation, &resolutions, &options.encode_options())
            };

            let mut report = self
                .save_encoded(conversation, document, options.known_path.as_deref())
                .await?;
            report.materialized = resolutions
                .iter()
                .flat_map(|r| r.materialized.iter().cloned())
                .collect();
            report.unresolved_images = resolutions
                .iter()
                .map(|r| crate::types::markers::placeholder_tokens(&r.content).len())
                .sum();
            Ok::<_, crate::Error>(report)
        }
        .instrument(span)
        .await;

        match &result {
            Ok(report) => {
                save_span.record_outcome(
                    &report.path,
                    report.materialized.len(),
                    report.unresolved_images,
                );
                let elapsed = save_span.finish();
                self.metrics.save_latency_ms.observe(elapsed);
                tracing::debug!(path = %report.path, created = report.created, "Saved conversation");
            }
            Err(e) => {
                let elapsed = save_span.finish();
                self.metrics.record_save(false, elapsed);
                tracing::warn!(id = %conversation.id, error = %e, "Saving conversation failed");
            }
        }
        result
    }

    /// Write an already encoded document for `conversation`.
    pub async fn save_encoded(
        &self,
        conversation: &Conversation,
        document: String,
        known_path: Option<&str>,
    ) -> Result<SaveReport> {
        let placement = self.place(conversation, known_path).await?;
        ensure_directory(self.store.as_ref(), path::parent(&placement.path)).await?;
        self.store.write_text(&placement.path, &document).await?;
        self.metrics.documents_written.inc();

        Ok(SaveReport {
            path: placement.path,
            document,
            materialized: Vec::new(),
            unresolved_images: 0,
            conflicts: placement.conflicts,
            created: placement.created,
        })
    }

    async fn place(&self, conversation: &Conversation, known_path: Option<&str>) -> Result<Placement> {
        if let Some(known) = known_path {
            let known = path::normalize(known)?;
            let created = !self.store.exists(&known).await;
            return Ok(Placement {
                path: known,
                conflicts: Vec::new(),
                created,
            });
        }

        if let Some(found) = self.locate(&conversation.id).await? {
            return Ok(Placement {
                path: found.path,
                conflicts: found.conflicts,
                created: false,
            });
        }

        Ok(Placement {
            path: self.allocate_path(conversation).await?,
            conflicts: Vec::new(),
            created: true,
        })
    }

    /// `"<created> <title>.md"` in the conversations folder, numbered on collision.
    async fn allocate_path(&self, conversation: &Conversation) -> Result<String> {
        let stamp = conversation.created_at.format("%Y-%m-%d %H%M%S").to_string();
        let title = path::sanitize_file_name(&conversation.title);
        let base = if title.is_empty() {
            stamp
        } else {
            format!("{} {}", stamp, title)
        };
        let folder = &self.settings.conversations_folder;

        let candidate = path::join(folder, &format!("{}.md", base));
        if !self.store.exists(&candidate).await {
            return Ok(candidate);
        }
        for n in 1..MAX_PATH_ATTEMPTS {
            let candidate = path::join(folder, &format!("{} {}.md", base, n));
            if !self.store.exists(&candidate).await {
                return Ok(candidate);
            }
        }
        Err(crate::Error::Store {
            path: path::join(folder, &base),
            message: "no free document name".to_string(),
        })
    }

    /// The document carrying `identity` in the conversations folder.
    pub async fn locate(&self, identity: &ConversationId) -> Result<Option<IdentityMatch>> {
        let span = self.spans.lookup_span(identity.as_str());
        let found = find_by_identity(
            self.store.as_ref(),
            identity,
            &self.settings.conversations_folder,
        )
        .instrument(span.clone())
        .await?;
        if let Some(found) = &found {
            span.record("conflicts", found.conflicts.len() as u64);
            if found.has_conflict() {
                self.metrics.identity_conflicts.inc();
            }
        }
        Ok(found)
    }

    pub async fn load_document(&self, path: &str) -> Result<Decoded> {
        let text = self.store.read_text(path).await?;
        let span = self.spans.decode_span(path);
        let _entered = span.enter();
        let decoded = self.decoder.decode(&text);
        span.record("format", tracing::field::debug(decoded.format));
        span.record("fallback", decoded.used_fallback);
        if decoded.used_fallback {
            self.metrics.decode_fallbacks.inc();
        }
        Ok(decoded)
    }

    pub async fn load(&self, path: &str) -> Result<Conversation> {
        Ok(self.load_document(path).await?.conversation)
    }

    /// Conversation documents, sorted by path.
    pub async fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_text_files(&self.settings.conversations_folder)
            .await?)
    }
}

fn apply_resolutions(conversation: &mut Conversation, resolutions: &[Resolution]) {
    for (message, resolution) in conversation.messages.iter_mut().zip(resolutions) {
        if resolution.failed {
            continue;
        }
        message.content = resolution.content.clone();
        message.temp_images = resolution.temp_images.clone();
    }
}
