//! Conversation identity derivation and lookup.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::codec::peek_identity;
use crate::store::{DocumentStore, StoreResult};
use crate::types::{Conversation, ConversationId};

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
const SAMPLED_MESSAGES: usize = 3;
const SAMPLED_CHARS: usize = 100;

fn fnv1a(bytes: &[u8], mut hash: u32) -> u32 {
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Content-derived identity: `<first timestamp %Y%m%d%H%M%S>-<fnv1a hex>`.
///
/// Uses the first message's timestamp (or `created_at` when there are no
/// messages) and hashes the role and leading text of the first few messages.
/// Image markers are ignored so resolving images does not change the result.
pub fn derive_identity(conversation: &Conversation) -> ConversationId {
    let anchor = conversation
        .messages
        .first()
        .map(|m| m.timestamp)
        .unwrap_or(conversation.created_at);

    let mut hash = FNV_OFFSET;
    for message in conversation.messages.iter().take(SAMPLED_MESSAGES) {
        let text = message.plain_text();
        let sample: String = text.trim().chars().take(SAMPLED_CHARS).collect();
        hash = fnv1a(message.role.marker().as_bytes(), hash);
        hash = fnv1a(b":", hash);
        hash = fnv1a(sample.as_bytes(), hash);
        hash = fnv1a(b"\n", hash);
    }

    ConversationId::new(format!("{}-{:08x}", anchor.format("%Y%m%d%H%M%S"), hash))
}

/// A document carrying the looked-up identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMatch {
    pub path: String,
    pub modified: DateTime<Utc>,
    /// Other documents with the same identity, not chosen.
    pub conflicts: Vec<String>,
}

impl IdentityMatch {
    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Newest modification time first; equal times fall back to path order.
fn newest_first(a: &(String, DateTime<Utc>), b: &(String, DateTime<Utc>)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Find the document under `scope` whose header carries `identity`.
///
/// Unreadable documents are skipped. When several documents match, the most
/// recently modified one wins and the rest are reported as conflicts.
pub async fn find_by_identity<S: DocumentStore + ?Sized>(
    store: &S,
    identity: &ConversationId,
    scope: &str,
) -> StoreResult<Option<IdentityMatch>> {
    let mut candidates: Vec<(String, DateTime<Utc>)> = Vec::new();

    for path in store.list_text_files(scope).await? {
        let text = match store.read_text(&path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Skipping unreadable document");
                continue;
            }
        };
        if peek_identity(&text).as_ref() != Some(identity) {
            continue;
        }
        match store.modified_time(&path).await {
            Ok(modified) => candidates.push((path, modified)),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Skipping document without modification time");
            }
        }
    }

    candidates.sort_by(newest_first);
    let mut candidates = candidates.into_iter();
    let Some((path, modified)) = candidates.next() else {
        return Ok(None);
    };
    let conflicts: Vec<String> = candidates.map(|(p, _)| p).collect();

    if !conflicts.is_empty() {
        tracing::warn!(
            identity = %identity,
            chosen = %path,
            conflicts = ?conflicts,
            "Multiple documents share one conversation identity"
        );
    }

    Ok(Some(IdentityMatch {
        path,
        modified,
        conflicts,
    }))
}
