//! Typed events a backend delivers over the transport, and the streaming
//! updates nested inside them.
//!
//! Every enum here is a serde tagged union so a transport can decode the
//! wire form directly. Payloads live in dedicated structs so call sites can
//! pass them around without destructuring the enum.

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

use crate::ContentBlock;
use crate::PermissionRequestId;
use crate::SessionId;
use crate::TerminalId;
use crate::config_types::ConfigOption;
use crate::config_types::ModelInfo;
use crate::config_types::SessionInfo;
use crate::plan::Plan;
use crate::tool_calls::ToolCall;
use crate::tool_calls::ToolCallUpdate;

/// Why a prompt run stopped. `EndTurn` is the unremarkable default; every
/// other reason is surfaced to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
    MaxTurnRequests,
    Refusal,
    Cancelled,
    #[serde(other)]
    Other,
}

impl StopReason {
    pub fn is_end_turn(self) -> bool {
        matches!(self, StopReason::EndTurn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    AllowOnce,
    AllowAlways,
    RejectOnce,
    RejectAlways,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOption {
    pub id: String,
    pub label: String,
    pub kind: PermissionOptionKind,
}

/// A backend asking the user to approve or reject an action before the tool
/// call in question proceeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: PermissionRequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallUpdate>,
    #[serde(default)]
    pub options: Vec<PermissionOption>,
}

/// The user's answer to a [`PermissionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionOutcome {
    Selected { option_id: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageChunkUpdate {
    pub content: ContentBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOptionUpdate {
    #[serde(default)]
    pub options: Vec<ConfigOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_model: Option<String>,
}

/// One `session_update` notification inside a running prompt.
///
/// Chunk variants stream partial message content; their non-chunk
/// counterparts deliver a message that is already complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "session_update", rename_all = "snake_case")]
pub enum StreamUpdate {
    AgentMessageChunk(MessageChunkUpdate),
    UserMessageChunk(MessageChunkUpdate),
    ThoughtMessageChunk(MessageChunkUpdate),
    AgentMessage(MessageUpdate),
    UserMessage(MessageUpdate),
    ThoughtMessage(MessageUpdate),
    Plan(Plan),
    ToolCall(ToolCall),
    ToolCallUpdate(ToolCallUpdate),
    ConfigOptionUpdate(ConfigOptionUpdate),
    ModelUpdate(ModelUpdate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartedEvent {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub info: SessionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdateEvent {
    pub update: StreamUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequestEvent {
    #[serde(flatten)]
    pub request: PermissionRequest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEndEvent {
    #[serde(default)]
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOutputEvent {
    pub terminal_id: TerminalId,
    pub chunk: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionErrorEvent {
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExitEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

/// Any event a backend can deliver for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted(SessionStartedEvent),
    SessionUpdate(SessionUpdateEvent),
    PermissionRequest(PermissionRequestEvent),
    PromptEnd(PromptEndEvent),
    TerminalOutput(TerminalOutputEvent),
    SessionError(SessionErrorEvent),
    SessionExit(SessionExitEvent),
}
