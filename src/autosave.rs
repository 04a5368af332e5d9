//! Periodic auto-save with byte-level change detection.
//!
//! [`AutoSaver`] is an explicit idle/armed state machine. While armed for a
//! conversation, each [`tick`](AutoSaver::tick) re-encodes it in auto mode
//! without touching `lastModified` and writes only when the encoding differs
//! from the last one written.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::archive::{ConversationArchive, SaveReport};
use crate::codec::EncodeOptions;
use crate::resolver::SaveMode;
use crate::store::DocumentStore;
use crate::types::{Conversation, ConversationId};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedState {
    pub conversation_id: ConversationId,
    /// Last encoding written for this conversation.
    pub baseline: Option<String>,
    pub document_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AutoSaveState {
    #[default]
    Idle,
    Armed(ArmedState),
}

impl AutoSaveState {
    pub fn is_armed(&self) -> bool {
        matches!(self, AutoSaveState::Armed(_))
    }

    pub fn armed_for(&self, id: &ConversationId) -> bool {
        matches!(self, AutoSaveState::Armed(armed) if &armed.conversation_id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    /// Encoding matched the baseline; nothing written.
    Unchanged,
    Saved { path: String },
    IdentityMismatch {
        armed: ConversationId,
        current: ConversationId,
    },
}

pub struct AutoSaver<S: DocumentStore> {
    archive: Arc<ConversationArchive<S>>,
    state: AutoSaveState,
    interval: Duration,
}

impl<S: DocumentStore> AutoSaver<S> {
    pub fn new(archive: Arc<ConversationArchive<S>>) -> Self {
        let interval = archive.settings().autosave_interval();
        Self {
            archive,
            state: AutoSaveState::Idle,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn archive(&self) -> &Arc<ConversationArchive<S>> {
        &self.archive
    }

    pub fn state(&self) -> &AutoSaveState {
        &self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state.is_armed()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm for a non-empty conversation; disarm once it becomes empty.
    ///
    /// A different conversation re-arms the saver without a final save of the
    /// previous one; use [`switch_to`](Self::switch_to) when that save matters.
    pub fn observe(&mut self, conversation: &mut Conversation) -> &AutoSaveState {
        if conversation.is_empty() {
            if self.state.is_armed() {
                tracing::debug!(id = %conversation.id, "Conversation emptied, auto-save idle");
                self.state = AutoSaveState::Idle;
            }
            return &self.state;
        }

        let id = conversation.ensure_id().clone();
        if let AutoSaveState::Armed(armed) = &self.state
            && armed.conversation_id != id
        {
            tracing::debug!(from = %armed.conversation_id, to = %id, "Auto-save re-armed");
            self.state = AutoSaveState::Idle;
        }
        if !self.state.is_armed() {
            tracing::debug!(id = %id, "Auto-save armed");
            self.state = AutoSaveState::Armed(ArmedState {
                conversation_id: id,
                baseline: None,
                document_path: None,
            });
        }
        &self.state
    }

    /// Write the conversation if its encoding changed since the last write.
    ///
    /// On a store error the baseline is kept, so the next tick retries.
    pub async fn tick(&mut self, conversation: &mut Conversation) -> Result<TickOutcome> {
        let AutoSaveState::Armed(armed) = &mut self.state else {
            return Ok(TickOutcome::Idle);
        };
        if conversation.id != armed.conversation_id {
            tracing::warn!(
                armed = %armed.conversation_id,
                current = %conversation.id,
                "Auto-save armed for another conversation, skipping"
            );
            return Ok(TickOutcome::IdentityMismatch {
                armed: armed.conversation_id.clone(),
                current: conversation.id.clone(),
            });
        }

        let document = self
            .archive
            .encode(conversation, SaveMode::Auto, &EncodeOptions::stable())
            .await;
        if armed.baseline.as_deref() == Some(document.as_str()) {
            self.archive.metrics().autosave_ticks_skipped.inc();
            return Ok(TickOutcome::Unchanged);
        }

        let report = self
            .archive
            .save_encoded(conversation, document, armed.document_path.as_deref())
            .await?;
        tracing::debug!(path = %report.path, "Auto-saved conversation");
        armed.document_path = Some(report.path.clone());
        armed.baseline = Some(report.document);
        Ok(TickOutcome::Saved { path: report.path })
    }

    /// Write unconditionally, arming for `conversation` first when needed.
    pub async fn save_now(&mut self, conversation: &mut Conversation) -> Result<Option<SaveReport>> {
        self.observe(conversation);
        let AutoSaveState::Armed(armed) = &mut self.state else {
            return Ok(None);
        };
        if armed.conversation_id != conversation.id {
            return Ok(None);
        }

        let document = self
            .archive
            .encode(conversation, SaveMode::Auto, &EncodeOptions::stable())
            .await;
        let report = self
            .archive
            .save_encoded(conversation, document, armed.document_path.as_deref())
            .await?;
        armed.document_path = Some(report.path.clone());
        armed.baseline = Some(report.document.clone());
        Ok(Some(report))
    }

    /// Final save of `outgoing`, then arm for `incoming`.
    ///
    /// When the final save fails the saver stays armed for `outgoing`.
    pub async fn switch_to(
        &mut self,
        outgoing: &mut Conversation,
        incoming: &mut Conversation,
    ) -> Result<Option<SaveReport>> {
        let report = if self.state.armed_for(&outgoing.id) {
            self.save_now(outgoing).await?
        } else {
            None
        };
        self.disarm();
        self.observe(incoming);
        Ok(report)
    }

    /// Final save, then idle. The saver is idle afterwards even on error.
    pub async fn close(&mut self, conversation: &mut Conversation) -> Result<Option<SaveReport>> {
        let result = if self.state.armed_for(&conversation.id) || !self.state.is_armed() {
            self.save_now(conversation).await
        } else {
            Ok(None)
        };
        self.disarm();
        result
    }

    pub fn disarm(&mut self) {
        if self.state.is_armed() {
            tracing::debug!("Auto-save disarmed");
        }
        self.state = AutoSaveState::Idle;
    }

    /// Follow a save made outside the saver so later ticks write to the same document.
    pub fn record_manual_save(&mut self, conversation: &Conversation, report: &SaveReport) {
        if let AutoSaveState::Armed(armed) = &mut self.state
            && armed.conversation_id == conversation.id
        {
            armed.document_path = Some(report.path.clone());
            armed.baseline = None;
        }
    }
}

/// Run auto-save ticks until `cancel` fires, then perform the final save.
///
/// Each tick snapshots the shared conversation; a derived identity is written
/// back so the caller sees the same id the documents carry. When another
/// conversation is swapped in, the last snapshot of the outgoing one gets its
/// final save before the saver follows the new one.
pub fn spawn_autosave<S>(
    saver: Arc<Mutex<AutoSaver<S>>>,
    conversation: Arc<RwLock<Conversation>>,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>>
where
    S: DocumentStore + 'static,
{
    tokio::spawn(async move {
        let period = saver.lock().await.interval();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut previous: Option<Conversation> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let mut current = snapshot(&conversation).await;
                    let mut saver = saver.lock().await;
                    let switched = follow(&mut saver, &mut previous, &mut current).await;
                    let closed = saver.close(&mut current).await;
                    tracing::debug!(ok = switched.is_ok() && closed.is_ok(), "Auto-save stopped");
                    return switched.and(closed).map(|_| ());
                }
                _ = ticker.tick() => {
                    let mut current = snapshot(&conversation).await;
                    let mut saver = saver.lock().await;
                    if let Err(e) = follow(&mut saver, &mut previous, &mut current).await {
                        tracing::warn!(error = %e, "Final save of outgoing conversation failed, retrying on next tick");
                        continue;
                    }
                    if let Err(e) = saver.tick(&mut current).await {
                        tracing::warn!(error = %e, "Auto-save tick failed, retrying on next tick");
                    }
                    previous = Some(current);
                }
            }
        }
    })
}

/// Track the current conversation, switching over when its identity changed.
///
/// `previous` is kept when the outgoing save fails so the switch is retried.
async fn follow<S: DocumentStore>(
    saver: &mut AutoSaver<S>,
    previous: &mut Option<Conversation>,
    current: &mut Conversation,
) -> Result<()> {
    match previous.as_mut() {
        Some(outgoing) if outgoing.id != current.id && saver.state().armed_for(&outgoing.id) => {
            saver.switch_to(outgoing, current).await?;
        }
        _ => {
            saver.observe(current);
        }
    }
    Ok(())
}

async fn snapshot(conversation: &RwLock<Conversation>) -> Conversation {
    let mut conversation = conversation.write().await;
    if !conversation.is_empty() {
        conversation.ensure_id();
    }
    conversation.clone()
}
