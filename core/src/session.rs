//! Immutable per-session state snapshots.
//!
//! [`SessionState`] is a plain value: the store clones the current snapshot,
//! applies one mutation, and republishes the whole thing. Consumers holding
//! an `Arc<SessionState>` therefore never observe a half-applied update,
//! and pointer identity tells them whether anything changed.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use tether_protocol::PermissionRequestId;
use tether_protocol::SessionId;
use tether_protocol::SessionKey;
use tether_protocol::TerminalId;
use tether_protocol::ToolCallId;
use tether_protocol::config_types::ConfigOption;
use tether_protocol::config_types::ModelInfo;
use tether_protocol::config_types::PromptCapabilities;
use tether_protocol::config_types::SessionMode;
use tether_protocol::events::PermissionRequest;
use tether_protocol::events::SessionStartedEvent;
use tether_protocol::plan::Plan;

use crate::feed::FeedItem;
use crate::tool_calls::ToolCallRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLifecycle {
    /// Registered but never started.
    Idle,
    /// A transport start call is in flight.
    Starting,
    Ready,
    /// Startup failed or the backend reported a fatal error.
    Error(String),
    /// The backend went away. Carries the session error shown to the
    /// user: an error reported before the exit if there was one,
    /// otherwise a stock message.
    Exited(String),
}

impl SessionLifecycle {
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionLifecycle::Ready)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub key: SessionKey,
    pub lifecycle: SessionLifecycle,
    pub session_id: Option<SessionId>,
    /// Ordered conversation items; see the merge rules in [`crate::feed`].
    pub feed: Vec<FeedItem>,
    pub tool_calls: HashMap<ToolCallId, ToolCallRecord>,
    /// Latest plan seen, replaced wholesale on every plan update.
    pub plan: Option<Plan>,
    /// Live output per sub-terminal, appended as chunks arrive.
    pub terminals: HashMap<TerminalId, String>,
    pub models: Vec<ModelInfo>,
    pub current_model: Option<String>,
    pub modes: Vec<SessionMode>,
    pub current_mode: Option<String>,
    pub config_options: Vec<ConfigOption>,
    pub capabilities: PromptCapabilities,
    /// Permission requests awaiting an answer, in arrival order.
    pub pending_permissions: Vec<PermissionRequest>,
    /// True from prompt dispatch until the run finishes or is cancelled.
    pub running: bool,
    pub run_started_at: Option<Instant>,
    /// Total time spent in prompt runs over the life of this state.
    pub elapsed: Duration,
}

impl SessionState {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            lifecycle: SessionLifecycle::Idle,
            session_id: None,
            feed: Vec::new(),
            tool_calls: HashMap::new(),
            plan: None,
            terminals: HashMap::new(),
            models: Vec::new(),
            current_model: None,
            modes: Vec::new(),
            current_mode: None,
            config_options: Vec::new(),
            capabilities: PromptCapabilities::default(),
            pending_permissions: Vec::new(),
            running: false,
            run_started_at: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn tool_call(&self, id: &ToolCallId) -> Option<&ToolCallRecord> {
        self.tool_calls.get(id)
    }

    pub fn pending_permission(&self, id: &PermissionRequestId) -> Option<&PermissionRequest> {
        self.pending_permissions.iter().find(|req| &req.id == id)
    }

    /// Adopts everything a start (or `session_started` event) advertises.
    pub(crate) fn apply_started(&mut self, started: &SessionStartedEvent) {
        self.lifecycle = SessionLifecycle::Ready;
        self.session_id = Some(started.session_id.clone());
        self.capabilities = started.info.capabilities;
        self.models = started.info.models.clone();
        self.current_model = started.info.current_model.clone();
        self.modes = started.info.modes.clone();
        self.current_mode = started.info.current_mode.clone();
        self.config_options = started.info.config_options.clone();
    }
}
