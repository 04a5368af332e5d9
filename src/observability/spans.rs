//! Structured spans for codec and archive operations.

use std::time::Instant;

use tracing::{Level, Span, field, span};

use crate::resolver::SaveMode;

/// Span factory carrying the vault name into every span.
#[derive(Debug, Clone)]
pub struct ArchiveSpans {
    vault: String,
}

impl ArchiveSpans {
    pub fn new(vault: impl Into<String>) -> Self {
        Self {
            vault: vault.into(),
        }
    }

    pub fn save_span(&self, conversation_id: &str, mode: SaveMode) -> SaveSpan {
        SaveSpan::new(span!(
            Level::INFO,
            "archive.save",
            vault = %self.vault,
            conversation_id = conversation_id,
            mode = ?mode,
            path = field::Empty,
            images_materialized = field::Empty,
            unresolved_images = field::Empty,
            duration_ms = field::Empty,
        ))
    }

    pub fn encode_span(&self, conversation_id: &str, messages: usize) -> Span {
        span!(
            Level::DEBUG,
            "codec.encode",
            vault = %self.vault,
            conversation_id = conversation_id,
            messages = messages,
        )
    }

    pub fn decode_span(&self, path: &str) -> Span {
        span!(
            Level::DEBUG,
            "codec.decode",
            vault = %self.vault,
            path = path,
            format = field::Empty,
            fallback = field::Empty,
        )
    }

    pub fn lookup_span(&self, conversation_id: &str) -> Span {
        span!(
            Level::DEBUG,
            "identity.lookup",
            vault = %self.vault,
            conversation_id = conversation_id,
            conflicts = field::Empty,
        )
    }
}

/// A save span that records its outcome and duration on finish.
pub struct SaveSpan {
    span: Span,
    start: Instant,
}

impl SaveSpan {
    fn new(span: Span) -> Self {
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn record_outcome(&self, path: &str, materialized: usize, unresolved: usize) {
        self.span.record("path", path);
        self.span.record("images_materialized", materialized as u64);
        self.span.record("unresolved_images", unresolved as u64);
    }

    /// Elapsed milliseconds, also recorded on the span.
    pub fn finish(self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        self.span.record("duration_ms", elapsed);
        elapsed
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
