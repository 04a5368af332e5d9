//! # chat-vault
//!
//! Persist multi-modal AI conversations as human-readable markdown documents
//! and read them back.
//!
//! A document is a YAML header followed by role-marked message blocks. Images
//! are either inlined as data URIs (auto-save) or written next to the
//! conversation and referenced by path (manual save). Documents written by
//! older releases, using `**Sender:**` style sections, are still read.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chat_vault::{ConversationArchive, FsStore, Message, SaveOptions, VaultSettings};
//! use chat_vault::types::Conversation;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_vault::Error> {
//!     let store = Arc::new(FsStore::new("./vault"));
//!     let archive = ConversationArchive::new(store, VaultSettings::default());
//!
//!     let mut conversation = Conversation::new();
//!     conversation.push_message(Message::user("What is a borrow checker?"));
//!     conversation.refresh_title();
//!
//!     let report = archive.save(&mut conversation, SaveOptions::manual()).await?;
//!     let restored = archive.load(&report.path).await?;
//!     assert_eq!(restored.id, conversation.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Auto-save
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chat_vault::{AutoSaver, ConversationArchive, MemoryStore, VaultSettings, spawn_autosave};
//! use chat_vault::types::Conversation;
//! use tokio::sync::{Mutex, RwLock};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), chat_vault::Error> {
//! let archive = ConversationArchive::new(Arc::new(MemoryStore::new()), VaultSettings::default());
//! let saver = Arc::new(Mutex::new(AutoSaver::new(Arc::new(archive))));
//! let conversation = Arc::new(RwLock::new(Conversation::new()));
//! let cancel = CancellationToken::new();
//!
//! let handle = spawn_autosave(saver, conversation, cancel.clone());
//! cancel.cancel();
//! handle.await.map_err(std::io::Error::other)??;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod archive;
pub mod autosave;
pub mod codec;
pub mod config;
pub mod identity;
pub mod observability;
pub mod prelude;
pub mod resolver;
pub mod store;
pub mod types;

pub use archive::{ConversationArchive, SaveOptions, SaveReport};
pub use autosave::{ArmedState, AutoSaveState, AutoSaver, TickOutcome, spawn_autosave};
pub use codec::{
    BodyFormat, Decoded, DocumentDecoder, DocumentEncoder, DocumentHeader, EncodeOptions,
    decode_conversation, peek_identity,
};
pub use config::{ConfigBuilder, ConfigError, ConfigProvider, ConfigProviderExt, VaultSettings};
pub use identity::{IdentityMatch, derive_identity, find_by_identity};
pub use observability::{ArchiveMetrics, ArchiveSpans, MetricsSummary};
pub use resolver::{ImageFolders, Resolution, SaveMode, TempImageResolver, resolve_inline};
pub use store::{DocumentStore, FsStore, MemoryStore, StoreError, StoreResult};
pub use types::{
    Conversation, ConversationId, ImageSource, Message, MessageId, Role, StoredTempImage,
    TransientImage,
};

/// Error type for chat-vault operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The document store failed.
    #[error("Store error at '{path}': {message}")]
    Store { path: String, message: String },

    /// File system operation outside the store failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A temp image could not be materialized.
    #[error("Image '{token}' could not be resolved: {message}")]
    Resolution { token: String, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Store reads and writes; may succeed on a later attempt
    Storage,
    /// Malformed document content
    Format,
    /// Image materialization
    Resolution,
    Configuration,
    /// IO and serialization errors outside the store
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Store { .. } => ErrorCategory::Storage,
            Error::Parse(_) => ErrorCategory::Format,
            Error::Resolution { .. } => ErrorCategory::Resolution,
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Internal,
        }
    }

    /// Store failures are retried by the next save or auto-save tick.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Storage
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    /// Store path involved, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Store { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<store::StoreError> for Error {
    fn from(err: store::StoreError) -> Self {
        let path = err.path().to_string();
        let message = match &err {
            store::StoreError::Io { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        Error::Store { path, message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
