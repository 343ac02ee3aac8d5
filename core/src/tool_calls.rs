//! Accumulates multi-event tool-call lifecycles into single records.

use tracing::debug;

use tether_protocol::TerminalId;
use tether_protocol::ToolCallId;
use tether_protocol::tool_calls::ToolCall;
use tether_protocol::tool_calls::ToolCallContent;
use tether_protocol::tool_calls::ToolCallStatus;
use tether_protocol::tool_calls::ToolCallUpdateFields;
use tether_protocol::tool_calls::ToolKind;

use crate::config::Limits;
use crate::diff::compute_diff;

/// One tool call as accumulated from its creation event and every update
/// seen since.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: ToolCallId,
    pub title: String,
    pub kind: ToolKind,
    pub status: ToolCallStatus,
    pub content: Vec<ToolCallContent>,
    /// Raw tool input rendered for display; structured values arrive as
    /// JSON and are pretty-printed once, at ingest.
    pub raw_input: Option<String>,
    pub raw_output: Option<String>,
}

/// What applying an event to the tool table changed, so the caller can
/// append feed items and trigger persistence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MergeEffect {
    pub created: bool,
    /// The call reached a terminal status for the first time.
    pub newly_terminal: bool,
}

impl ToolCallRecord {
    pub(crate) fn from_event(call: ToolCall, limits: &Limits) -> (Self, MergeEffect) {
        let mut record = Self {
            id: call.id,
            title: call.title,
            kind: call.kind,
            status: call.status,
            content: call.content,
            raw_input: call.raw_input.map(render_raw),
            raw_output: call.raw_output.map(render_raw),
        };
        resolve_diff_previews(&mut record.content, limits);
        let effect = MergeEffect {
            created: true,
            newly_terminal: record.status.is_terminal(),
        };
        (record, effect)
    }

    /// Empty pending record standing in for a call whose create event was
    /// never seen.
    pub(crate) fn placeholder(id: ToolCallId) -> Self {
        Self {
            id,
            title: String::new(),
            kind: ToolKind::Other,
            status: ToolCallStatus::Pending,
            content: Vec::new(),
            raw_input: None,
            raw_output: None,
        }
    }

    /// Applies the populated fields of an update. Content entries append;
    /// scalar fields overwrite; status only ever moves forward.
    pub(crate) fn apply(&mut self, fields: ToolCallUpdateFields, limits: &Limits) -> MergeEffect {
        let ToolCallUpdateFields {
            title,
            kind,
            status,
            content,
            raw_input,
            raw_output,
        } = fields;
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(kind) = kind {
            self.kind = kind;
        }
        if let Some(mut content) = content {
            resolve_diff_previews(&mut content, limits);
            self.content.extend(content);
        }
        if let Some(raw_input) = raw_input {
            self.raw_input = Some(render_raw(raw_input));
        }
        if let Some(raw_output) = raw_output {
            self.raw_output = Some(render_raw(raw_output));
        }
        let newly_terminal = match status {
            Some(status) => self.advance_status(status),
            None => false,
        };
        MergeEffect {
            created: false,
            newly_terminal,
        }
    }

    fn advance_status(&mut self, next: ToolCallStatus) -> bool {
        if self.status.is_terminal() {
            if next != self.status {
                debug!(
                    call = %self.id,
                    current = %self.status,
                    requested = %next,
                    "ignoring status update for finished tool call"
                );
            }
            return false;
        }
        if next.rank() < self.status.rank() {
            debug!(
                call = %self.id,
                current = %self.status,
                requested = %next,
                "ignoring tool call status regression"
            );
            return false;
        }
        self.status = next;
        next.is_terminal()
    }

    /// Locally forces a non-terminal call to `Cancelled`, the one permitted
    /// write into a terminal state. Returns false when already terminal.
    pub(crate) fn force_cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ToolCallStatus::Cancelled;
        true
    }

    /// Terminal ids referenced by this call's content entries.
    pub(crate) fn terminal_ids(&self) -> impl Iterator<Item = &TerminalId> {
        self.content.iter().filter_map(|entry| match entry {
            ToolCallContent::Terminal { terminal_id } => Some(terminal_id),
            _ => None,
        })
    }
}

/// Fills in the computed preview for every diff entry that arrived without
/// one. Entries with neither a preview nor an after-text are left alone.
fn resolve_diff_previews(content: &mut [ToolCallContent], limits: &Limits) {
    for entry in content {
        let ToolCallContent::Diff { diff } = entry else {
            continue;
        };
        if diff.preview.is_some() {
            continue;
        }
        match &diff.new_text {
            Some(new_text) => {
                let old_text = diff.old_text.as_deref().unwrap_or("");
                diff.preview = Some(compute_diff(old_text, new_text, limits));
            }
            None => debug!(path = %diff.path.display(), "diff content without text or preview"),
        }
    }
}

fn render_raw(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        other => serde_json::to_string_pretty(&other).unwrap_or_default(),
    }
}
