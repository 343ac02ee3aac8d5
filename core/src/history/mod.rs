//! Durable history: one append-only record stream per task, written by a
//! dedicated task so session mutation never blocks on storage.
//!
//! Writes flow recorder → bounded channel → writer task → [`MessageStore`].
//! The recorder assigns each envelope its sequence number and timestamp
//! synchronously, inside the session lock, so stored order can always be
//! reconstructed even when the backing store interleaves writers.

mod hydrate;
mod policy;

pub(crate) use hydrate::parse_envelopes;
pub(crate) use hydrate::replay;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tether_protocol::FeedItemId;
use tether_protocol::SessionId;
use tether_protocol::SessionKey;
use tether_protocol::TaskId;
use tether_protocol::TerminalId;
use tether_protocol::ToolCallId;
use tether_protocol::persistence::PERSISTENCE_SCHEMA_VERSION;
use tether_protocol::persistence::PersistedEnvelope;
use tether_protocol::persistence::PersistedItem;
use tether_protocol::plan::Plan;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::warn;

use crate::config::Limits;
use crate::feed::MessageItem;
use crate::storage::MessageStore;
use crate::tool_calls::ToolCallRecord;

/// Records queued ahead of the writer before new ones are dropped.
const HISTORY_CHANNEL_CAPACITY: usize = 256;

/// Conversation key under which a task's records are stored. Sessions for
/// the same task share it across backends and restarts.
pub(crate) fn conversation_id_for(task_id: &TaskId) -> String {
    format!("task:{task_id}")
}

pub(crate) enum HistoryCmd {
    Append {
        conversation_id: String,
        envelope: PersistedEnvelope,
    },
    /// Resolves once every previously queued append has been handed to the
    /// store.
    Flush {
        ack: oneshot::Sender<()>,
    },
}

/// Spawns the writer task shared by every session of one store. Must be
/// called from within a Tokio runtime.
pub(crate) fn spawn_history_writer(storage: Arc<dyn MessageStore>) -> mpsc::Sender<HistoryCmd> {
    let (tx, mut rx) = mpsc::channel::<HistoryCmd>(HISTORY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                HistoryCmd::Append {
                    conversation_id,
                    envelope,
                } => {
                    let record = match serde_json::to_value(&envelope) {
                        Ok(record) => record,
                        Err(err) => {
                            warn!("failed to encode history envelope: {err}");
                            continue;
                        }
                    };
                    if let Err(err) = storage.append(&conversation_id, record).await {
                        warn!(conversation = %conversation_id, "history append failed: {err}");
                    }
                }
                HistoryCmd::Flush { ack } => {
                    let _ = ack.send(());
                }
            }
        }
    });
    tx
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HydrationPhase {
    NotStarted,
    InProgress,
    Done,
}

/// Per-session front end of the history stream: decides what gets written,
/// stamps envelopes, and remembers what was already saved so nothing is
/// written twice.
pub(crate) struct HistoryRecorder {
    tx: mpsc::Sender<HistoryCmd>,
    conversation_id: String,
    key: SessionKey,
    pub(crate) session_id: Option<SessionId>,
    pub(crate) hydration: HydrationPhase,
    next_seq: u64,
    saved: HashSet<String>,
}

impl HistoryRecorder {
    pub(crate) fn new(key: SessionKey, tx: mpsc::Sender<HistoryCmd>) -> Self {
        Self {
            tx,
            conversation_id: conversation_id_for(&key.task_id),
            key,
            session_id: None,
            hydration: HydrationPhase::NotStarted,
            next_seq: 1,
            saved: HashSet::new(),
        }
    }

    pub(crate) fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Writes a finalized message. Streaming messages and repeats are
    /// ignored, so callers can record unconditionally at finalization.
    pub(crate) fn record_message(&mut self, item: &MessageItem, limits: &Limits) {
        if item.streaming {
            return;
        }
        if !self.saved.insert(message_key(&item.id)) {
            return;
        }
        let envelope = self.envelope(
            item.id.clone(),
            PersistedItem::Message(policy::persisted_message(item, limits)),
        );
        self.enqueue(envelope);
    }

    /// Writes a tool call once it has reached a terminal status; earlier
    /// states never touch the store.
    pub(crate) fn record_tool_call(
        &mut self,
        feed_item_id: FeedItemId,
        record: &ToolCallRecord,
        terminals: &HashMap<TerminalId, String>,
        limits: &Limits,
    ) {
        if !record.status.is_terminal() {
            return;
        }
        if !self.saved.insert(tool_key(&record.id)) {
            return;
        }
        let envelope = self.envelope(
            feed_item_id,
            PersistedItem::ToolCall(policy::persisted_tool_call(record, terminals, limits)),
        );
        self.enqueue(envelope);
    }

    /// Writes a plan snapshot. Plans are repeat-written on every non-empty
    /// replacement; hydration keeps only the last one.
    pub(crate) fn record_plan(&mut self, feed_item_id: FeedItemId, plan: &Plan) {
        if plan.is_empty() {
            return;
        }
        let envelope = self.envelope(feed_item_id, PersistedItem::Plan(plan.clone()));
        self.enqueue(envelope);
    }

    pub(crate) fn is_saved_message(&self, id: &FeedItemId) -> bool {
        self.saved.contains(&message_key(id))
    }

    pub(crate) fn is_saved_tool(&self, id: &ToolCallId) -> bool {
        self.saved.contains(&tool_key(id))
    }

    /// Folds a hydrated envelope into the dedupe set and advances the
    /// sequence counter past it, so new records sort after everything read
    /// back from the store.
    pub(crate) fn seed_hydrated(&mut self, envelope: &PersistedEnvelope) {
        match &envelope.item {
            PersistedItem::Message(_) => {
                self.saved.insert(message_key(&envelope.feed_item_id));
            }
            PersistedItem::ToolCall(tool) => {
                self.saved.insert(tool_key(&tool.id));
            }
            PersistedItem::Plan(_) => {}
        }
        self.next_seq = self.next_seq.max(envelope.seq + 1);
    }

    fn envelope(&mut self, feed_item_id: FeedItemId, item: PersistedItem) -> PersistedEnvelope {
        let seq = self.next_seq;
        self.next_seq += 1;
        PersistedEnvelope {
            schema_version: PERSISTENCE_SCHEMA_VERSION,
            seq,
            created_at_ms: Utc::now().timestamp_millis(),
            feed_item_id,
            task_id: self.key.task_id.clone(),
            backend_id: self.key.backend_id.clone(),
            session_id: self.session_id.clone(),
            item,
        }
    }

    fn enqueue(&self, envelope: PersistedEnvelope) {
        let cmd = HistoryCmd::Append {
            conversation_id: self.conversation_id.clone(),
            envelope,
        };
        // try_send: a stalled store must not stall session mutation. The
        // record is lost, which hydration tolerates.
        if self.tx.try_send(cmd).is_err() {
            warn!(
                conversation = %self.conversation_id,
                "history channel full or closed; dropping record"
            );
        }
    }
}

fn message_key(id: &FeedItemId) -> String {
    format!("msg:{id}")
}

fn tool_key(id: &ToolCallId) -> String {
    format!("tool:{id}")
}
