//! Prelude module for convenient imports.
//!
//! ```rust
//! use chat_vault::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::Result;
pub use crate::types::{Conversation, ConversationId, ImageSource, Message, Role, TransientImage};

// Store
pub use crate::store::{DocumentStore, FsStore, MemoryStore};

// Archive
pub use crate::archive::{ConversationArchive, SaveOptions, SaveReport};
pub use crate::autosave::{AutoSaver, TickOutcome, spawn_autosave};
pub use crate::resolver::SaveMode;

// Codec
pub use crate::codec::{DocumentDecoder, DocumentEncoder, EncodeOptions, decode_conversation};

// Configuration
pub use crate::config::{ConfigBuilder, VaultSettings};
