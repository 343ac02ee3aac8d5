//! Envelope format for durable session history.
//!
//! Each finalized feed item is stored as one self-describing envelope so a
//! session can be rebuilt later from the raw record list alone. Envelopes
//! carry their own ordering metadata: a per-session sequence number assigned
//! when the item is first enqueued, plus a wall-clock timestamp used as a
//! tie-breaker when sequence numbers are missing or collide (e.g. records
//! written by different incarnations of the client).

use serde::Deserialize;
use serde::Serialize;

use crate::BackendId;
use crate::ContentBlock;
use crate::FeedItemId;
use crate::SessionId;
use crate::TaskId;
use crate::TerminalId;
use crate::ToolCallId;
use crate::content::MessageRole;
use crate::content::MessageVariant;
use crate::plan::Plan;
use crate::tool_calls::ToolCallContent;
use crate::tool_calls::ToolCallStatus;
use crate::tool_calls::ToolKind;

/// Bump when the envelope layout changes incompatibly. Records with a
/// different version are skipped on hydration, not migrated.
pub const PERSISTENCE_SCHEMA_VERSION: u32 = 1;

/// A message reduced to its storable form: sanitized blocks plus a derived
/// plain-text rendering for consumers that only want a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<MessageVariant>,
    pub text: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

/// Tail of one sub-terminal buffer captured when its tool call was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalTail {
    pub terminal_id: TerminalId,
    pub tail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedToolCall {
    pub id: ToolCallId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub kind: ToolKind,
    #[serde(default)]
    pub status: ToolCallStatus,
    #[serde(default)]
    pub content: Vec<ToolCallContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terminal_tails: Vec<TerminalTail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistedItem {
    Message(PersistedMessage),
    ToolCall(PersistedToolCall),
    Plan(Plan),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEnvelope {
    pub schema_version: u32,
    /// Strictly increasing within one client incarnation of a session;
    /// absent (zero) only in records written before sequencing existed.
    #[serde(default)]
    pub seq: u64,
    /// Milliseconds since the Unix epoch, captured when the item was first
    /// referenced for persistence.
    pub created_at_ms: i64,
    pub feed_item_id: FeedItemId,
    pub task_id: TaskId,
    pub backend_id: BackendId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub item: PersistedItem,
}

impl PersistedEnvelope {
    /// Ordering key for hydration: sequence first, wall clock as the
    /// tie-breaker.
    pub fn sort_key(&self) -> (u64, i64) {
        (self.seq, self.created_at_ms)
    }
}
