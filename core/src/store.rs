//! The session registry and its mutation loop.
//!
//! One [`SessionStore`] owns every session the process knows about, keyed
//! by (task, backend). All mutation funnels through a single
//! clone-apply-publish path: take the registry lock, clone the current
//! [`SessionState`], apply one change, publish the new snapshot on the
//! session's watch channel. The lock is a std mutex and is never held
//! across an await; transport calls happen strictly before or after a
//! mutation, never inside one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use tether_protocol::ContentBlock;
use tether_protocol::FeedItemId;
use tether_protocol::MessageRole;
use tether_protocol::MessageVariant;
use tether_protocol::PermissionRequestId;
use tether_protocol::SessionId;
use tether_protocol::SessionKey;
use tether_protocol::ToolCallId;
use tether_protocol::config_types::StartupContext;
use tether_protocol::events::PermissionOutcome;
use tether_protocol::events::SessionEvent;
use tether_protocol::events::StopReason;
use tether_protocol::events::StreamUpdate;
use tether_protocol::plan::Plan;
use tether_protocol::tool_calls::ToolCall;
use tether_protocol::tool_calls::ToolCallUpdate;
use tether_protocol::tool_calls::ToolCallUpdateFields;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

use crate::config::Limits;
use crate::error::Result;
use crate::error::TetherErr;
use crate::feed;
use crate::feed::FeedItem;
use crate::feed::MessageItem;
use crate::feed::PermissionFeedItem;
use crate::feed::PlanFeedItem;
use crate::feed::ToolFeedItem;
use crate::history;
use crate::history::HistoryCmd;
use crate::history::HistoryRecorder;
use crate::history::HydrationPhase;
use crate::session::SessionLifecycle;
use crate::session::SessionState;
use crate::storage::MessageStore;
use crate::tool_calls::ToolCallRecord;
use crate::transport::AgentTransport;

struct SessionEntry {
    state: Arc<SessionState>,
    tx: watch::Sender<Arc<SessionState>>,
    recorder: HistoryRecorder,
    /// Context from the last explicit ensure, reused by auto-ensures.
    startup: StartupContext,
}

impl SessionEntry {
    fn new(key: SessionKey, history_tx: mpsc::Sender<HistoryCmd>) -> Self {
        let state = Arc::new(SessionState::new(key.clone()));
        let (tx, _rx) = watch::channel(state.clone());
        Self {
            state,
            tx,
            recorder: HistoryRecorder::new(key, history_tx),
            startup: StartupContext::default(),
        }
    }

    fn publish(&mut self, state: SessionState) {
        let state = Arc::new(state);
        self.state = state.clone();
        self.tx.send_replace(state);
    }
}

/// What `ensure_session` decided under the lock.
enum Claim {
    Ready(SessionId),
    Wait(watch::Receiver<Arc<SessionState>>),
    Start,
}

pub struct SessionStore {
    transport: Arc<dyn AgentTransport>,
    storage: Arc<dyn MessageStore>,
    limits: Limits,
    sessions: Mutex<HashMap<SessionKey, SessionEntry>>,
    history_tx: mpsc::Sender<HistoryCmd>,
}

impl SessionStore {
    /// Builds a store over the given transport and message store. Spawns
    /// the history writer task, so this must run inside a Tokio runtime.
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        storage: Arc<dyn MessageStore>,
        limits: Limits,
    ) -> Self {
        let history_tx = history::spawn_history_writer(storage.clone());
        Self {
            transport,
            storage,
            limits,
            sessions: Mutex::new(HashMap::new()),
            history_tx,
        }
    }

    /// Returns the live session for `key`, starting one if needed.
    ///
    /// Concurrent callers for the same key coalesce onto a single transport
    /// start; losers wait on the state stream for the winner's outcome. A
    /// failed start leaves the session in `Error` and a later call retries.
    pub async fn ensure_session(&self, key: &SessionKey, ctx: &StartupContext) -> Result<SessionId> {
        let claim = {
            let mut sessions = self.sessions();
            let entry = self.entry_or_default(&mut sessions, key);
            match (&entry.state.lifecycle, &entry.state.session_id) {
                (SessionLifecycle::Ready, Some(id)) => Claim::Ready(id.clone()),
                (SessionLifecycle::Starting, _) => Claim::Wait(entry.tx.subscribe()),
                _ => {
                    entry.startup = ctx.clone();
                    let mut state = (*entry.state).clone();
                    state.lifecycle = SessionLifecycle::Starting;
                    entry.publish(state);
                    Claim::Start
                }
            }
        };
        match claim {
            Claim::Ready(id) => Ok(id),
            Claim::Wait(rx) => self.await_started(rx).await,
            Claim::Start => self.start_session(key, ctx).await,
        }
    }

    async fn await_started(&self, mut rx: watch::Receiver<Arc<SessionState>>) -> Result<SessionId> {
        loop {
            let outcome = {
                let state = rx.borrow_and_update();
                match (&state.lifecycle, &state.session_id) {
                    (SessionLifecycle::Ready, Some(id)) => Some(Ok(id.clone())),
                    (SessionLifecycle::Error(message), _) => {
                        Some(Err(TetherErr::SessionStart(message.clone())))
                    }
                    // Idle after `Starting` means someone disposed the
                    // session while the start was in flight.
                    (SessionLifecycle::Exited(_) | SessionLifecycle::Idle, _) => {
                        Some(Err(TetherErr::SessionTerminated))
                    }
                    _ => None,
                }
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Err(TetherErr::SessionTerminated);
            }
        }
    }

    async fn start_session(&self, key: &SessionKey, ctx: &StartupContext) -> Result<SessionId> {
        match self.transport.start(key, ctx).await {
            Ok(started) => {
                let session_id = started.session_id.clone();
                let adopted = self.mutate(key, |state, recorder, _| {
                    // Back at Idle means a dispose won the race; do not
                    // resurrect the session it tore down.
                    if state.lifecycle == SessionLifecycle::Idle {
                        return false;
                    }
                    state.apply_started(&started);
                    recorder.session_id = Some(started.session_id.clone());
                    true
                });
                if adopted != Some(true) {
                    if let Err(err) = self.transport.dispose(&session_id).await {
                        debug!(session = %session_id, "dispose of orphaned session failed: {err}");
                    }
                    return Err(TetherErr::SessionTerminated);
                }
                Ok(session_id)
            }
            Err(err) => {
                let message = err.to_string();
                self.mutate(key, |state, _, _| {
                    state.lifecycle = SessionLifecycle::Error(message.clone());
                });
                Err(TetherErr::SessionStart(message))
            }
        }
    }

    /// Sends one prompt turn and resolves with the backend's stop reason.
    ///
    /// `display` is what lands on the feed as the user's message (persisted
    /// immediately); `wire` is what the backend receives. A prompt with no
    /// real content is rejected before any state changes.
    pub async fn send_prompt(
        &self,
        key: &SessionKey,
        display: Vec<ContentBlock>,
        wire: Vec<ContentBlock>,
    ) -> Result<StopReason> {
        if is_blank(&wire) {
            return Err(TetherErr::EmptyPrompt);
        }
        let ctx = {
            let sessions = self.sessions();
            sessions
                .get(key)
                .map(|entry| entry.startup.clone())
                .unwrap_or_default()
        };
        let session_id = self.ensure_session(key, &ctx).await?;
        self.mutate(key, |state, recorder, limits| {
            let item = MessageItem::complete(MessageRole::User, None, display);
            recorder.record_message(&item, limits);
            state.feed.push(FeedItem::Message(item));
            state.running = true;
            state.run_started_at = Some(Instant::now());
        });
        match self.transport.prompt(&session_id, wire).await {
            Ok(stop) => {
                self.finish_run(key, stop);
                Ok(stop)
            }
            Err(err) => {
                self.mutate(key, |state, _, _| {
                    halt_run(state);
                });
                Err(TetherErr::PromptDispatch(err.to_string()))
            }
        }
    }

    /// Stops the current run.
    ///
    /// Local state settles first, because the backend may never answer:
    /// live tool calls force-cancel (and persist), pending permissions
    /// resolve as cancelled, the running flag clears. The transport cancel
    /// and permission responses are best-effort afterwards.
    pub async fn cancel(&self, key: &SessionKey) -> Result<()> {
        let settled = self.mutate(key, |state, recorder, limits| {
            let dropped = settle_abandoned(state, recorder, limits);
            (state.session_id.clone(), dropped)
        });
        let Some((Some(session_id), dropped)) = settled else {
            return Ok(());
        };
        for request_id in dropped {
            if let Err(err) = self
                .transport
                .respond_permission(&session_id, &request_id, PermissionOutcome::Cancelled)
                .await
            {
                debug!(request = %request_id, "permission cancel not delivered: {err}");
            }
        }
        if let Err(err) = self.transport.cancel(&session_id).await {
            warn!(session = %session_id, "cancel request failed: {err}");
        }
        Ok(())
    }

    /// Releases the backend session and parks the entry back at `Idle`.
    ///
    /// In-flight work settles first so nothing durable is lost: streaming
    /// messages finalize (and persist), live tool calls force-cancel (and
    /// persist), pending permissions drop. The feed itself survives for a
    /// later `restart`. Queued history flushes before the backend dispose,
    /// which is best-effort. Unknown keys are a no-op.
    pub async fn dispose(&self, key: &SessionKey) -> Result<()> {
        let parked = self.mutate(key, |state, recorder, limits| {
            finalize_streaming(state, recorder, limits);
            settle_abandoned(state, recorder, limits);
            state.lifecycle = SessionLifecycle::Idle;
            state.session_id.take()
        });
        let Some(session_id) = parked else {
            return Ok(());
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .history_tx
            .send(HistoryCmd::Flush { ack: ack_tx })
            .await
            .is_ok()
        {
            let _ = ack_rx.await;
        }
        if let Some(session_id) = session_id {
            if let Err(err) = self.transport.dispose(&session_id).await {
                debug!(session = %session_id, "backend dispose failed: {err}");
            }
        }
        Ok(())
    }

    /// Disposes any existing session for `key`, starts a fresh one, and
    /// replays durable history into it.
    pub async fn restart(&self, key: &SessionKey, ctx: &StartupContext) -> Result<SessionId> {
        self.dispose(key).await?;
        let session_id = self.ensure_session(key, ctx).await?;
        self.hydrate(key).await?;
        Ok(session_id)
    }

    /// Resolves one pending permission request and forwards the outcome to
    /// the backend. Unknown request ids are a no-op.
    pub async fn respond_permission(
        &self,
        key: &SessionKey,
        request_id: &PermissionRequestId,
        outcome: PermissionOutcome,
    ) -> Result<()> {
        let resolved = self.mutate(key, |state, _, _| {
            let before = state.pending_permissions.len();
            state
                .pending_permissions
                .retain(|request| &request.id != request_id);
            if state.pending_permissions.len() == before {
                debug!(request = %request_id, "response for unknown permission request");
                return None;
            }
            state.feed.retain(|item| {
                !matches!(item, FeedItem::Permission(p) if &p.request_id == request_id)
            });
            state.session_id.clone()
        });
        let Some(Some(session_id)) = resolved else {
            return Ok(());
        };
        if let Err(err) = self
            .transport
            .respond_permission(&session_id, request_id, outcome)
            .await
        {
            warn!(request = %request_id, "permission response not delivered: {err}");
        }
        Ok(())
    }

    /// Selects a model. With `optimistic` the local value changes first and
    /// survives a transport failure (the next model update reconciles);
    /// otherwise it changes only once the backend accepts.
    pub async fn set_model(&self, key: &SessionKey, model_id: &str, optimistic: bool) -> Result<()> {
        let session_id = self.live_session_id(key)?;
        if optimistic {
            self.mutate(key, |state, _, _| {
                state.current_model = Some(model_id.to_string());
            });
        }
        self.transport.set_model(&session_id, model_id).await?;
        if !optimistic {
            self.mutate(key, |state, _, _| {
                state.current_model = Some(model_id.to_string());
            });
        }
        Ok(())
    }

    /// Sets one config option to `value`; see [`Self::set_model`] for the
    /// optimistic contract.
    pub async fn set_config_option(
        &self,
        key: &SessionKey,
        option_id: &str,
        value: &str,
        optimistic: bool,
    ) -> Result<()> {
        let session_id = self.live_session_id(key)?;
        if optimistic {
            self.mutate(key, |state, _, _| {
                set_option_value(state, option_id, value);
            });
        }
        self.transport
            .set_config_option(&session_id, option_id, value)
            .await?;
        if !optimistic {
            self.mutate(key, |state, _, _| {
                set_option_value(state, option_id, value);
            });
        }
        Ok(())
    }

    /// Switches the session mode; see [`Self::set_model`] for the
    /// optimistic contract.
    pub async fn set_mode(&self, key: &SessionKey, mode_id: &str, optimistic: bool) -> Result<()> {
        let session_id = self.live_session_id(key)?;
        if optimistic {
            self.mutate(key, |state, _, _| {
                state.current_mode = Some(mode_id.to_string());
            });
        }
        self.transport.set_mode(&session_id, mode_id).await?;
        if !optimistic {
            self.mutate(key, |state, _, _| {
                state.current_mode = Some(mode_id.to_string());
            });
        }
        Ok(())
    }

    /// Subscribes to state snapshots for `key`, registering an idle session
    /// if none exists. The receiver sees the current snapshot immediately;
    /// dropping it unsubscribes.
    pub fn subscribe(&self, key: &SessionKey) -> watch::Receiver<Arc<SessionState>> {
        let mut sessions = self.sessions();
        self.entry_or_default(&mut sessions, key).tx.subscribe()
    }

    /// Current snapshot for `key`, registering an idle session if none
    /// exists. The returned `Arc` is the same pointer until the next
    /// mutation, so consumers can cheaply detect change.
    pub fn snapshot(&self, key: &SessionKey) -> Arc<SessionState> {
        let mut sessions = self.sessions();
        self.entry_or_default(&mut sessions, key).state.clone()
    }

    /// Keys of every registered session, in no particular order.
    pub fn list_sessions(&self) -> Vec<SessionKey> {
        self.sessions().keys().cloned().collect()
    }

    /// Single ingestion point for backend events. Callers must deliver one
    /// session's events in order. Events for unknown keys are dropped.
    pub fn handle_event(&self, key: &SessionKey, event: SessionEvent) {
        if !self.sessions().contains_key(key) {
            debug!(key = %key, "dropping event for unknown session");
            return;
        }
        match event {
            SessionEvent::SessionStarted(started) => {
                self.mutate(key, |state, recorder, _| {
                    state.apply_started(&started);
                    recorder.session_id = Some(started.session_id.clone());
                });
            }
            SessionEvent::SessionUpdate(event) => self.apply_update(key, event.update),
            SessionEvent::PermissionRequest(event) => {
                self.mutate(key, |state, recorder, limits| {
                    let request = event.request;
                    if let Some(tool_update) = request.tool_call.clone() {
                        upsert_tool_call(state, recorder, limits, tool_update);
                    }
                    state.feed.push(FeedItem::Permission(PermissionFeedItem {
                        id: FeedItemId::generate(),
                        request_id: request.id.clone(),
                    }));
                    state.pending_permissions.push(request);
                });
            }
            SessionEvent::PromptEnd(event) => self.finish_run(key, event.stop_reason),
            SessionEvent::TerminalOutput(output) => {
                self.mutate(key, |state, _, _| {
                    state
                        .terminals
                        .entry(output.terminal_id)
                        .or_default()
                        .push_str(&output.chunk);
                });
            }
            SessionEvent::SessionError(error) => {
                self.mutate(key, |state, _, _| {
                    warn!(key = %state.key, "session error: {}", error.message);
                    state.lifecycle = SessionLifecycle::Error(error.message.clone());
                });
            }
            SessionEvent::SessionExit(exit) => {
                self.mutate(key, |state, recorder, limits| {
                    debug!(key = %state.key, code = ?exit.code, "session exited");
                    settle_abandoned(state, recorder, limits);
                    // Keep the termination reason when one was already
                    // reported; otherwise surface a stock message.
                    let reason = match &state.lifecycle {
                        SessionLifecycle::Error(message) => message.clone(),
                        _ => "Session ended unexpectedly".to_string(),
                    };
                    state.lifecycle = SessionLifecycle::Exited(reason);
                });
            }
        }
    }

    /// Replays stored history for `key`'s task into the session. Repeated
    /// and concurrent calls are no-ops once hydration is under way; a load
    /// failure resets the claim so the caller may retry.
    pub async fn hydrate(&self, key: &SessionKey) -> Result<()> {
        let conversation_id = {
            let mut sessions = self.sessions();
            let entry = self.entry_or_default(&mut sessions, key);
            if entry.recorder.hydration != HydrationPhase::NotStarted {
                return Ok(());
            }
            entry.recorder.hydration = HydrationPhase::InProgress;
            entry.recorder.conversation_id().to_string()
        };
        let records = match self.storage.load(&conversation_id).await {
            Ok(records) => records,
            Err(err) => {
                self.mutate(key, |_, recorder, _| {
                    recorder.hydration = HydrationPhase::NotStarted;
                });
                return Err(err.into());
            }
        };
        let envelopes = history::parse_envelopes(records);
        self.mutate(key, |state, recorder, _| {
            history::replay(state, recorder, envelopes);
            recorder.hydration = HydrationPhase::Done;
        });
        Ok(())
    }

    fn apply_update(&self, key: &SessionKey, update: StreamUpdate) {
        self.mutate(key, |state, recorder, limits| match update {
            StreamUpdate::AgentMessageChunk(chunk) => {
                feed::absorb_chunk(&mut state.feed, MessageRole::Assistant, None, chunk.content);
            }
            StreamUpdate::UserMessageChunk(chunk) => {
                feed::absorb_chunk(&mut state.feed, MessageRole::User, None, chunk.content);
            }
            StreamUpdate::ThoughtMessageChunk(chunk) => {
                feed::absorb_chunk(
                    &mut state.feed,
                    MessageRole::Assistant,
                    Some(MessageVariant::Thought),
                    chunk.content,
                );
            }
            StreamUpdate::AgentMessage(message) => {
                complete_message(state, recorder, limits, MessageRole::Assistant, None, message.content);
            }
            StreamUpdate::UserMessage(message) => {
                complete_message(state, recorder, limits, MessageRole::User, None, message.content);
            }
            StreamUpdate::ThoughtMessage(message) => {
                complete_message(
                    state,
                    recorder,
                    limits,
                    MessageRole::Assistant,
                    Some(MessageVariant::Thought),
                    message.content,
                );
            }
            StreamUpdate::Plan(plan) => apply_plan(state, recorder, plan),
            StreamUpdate::ToolCall(call) => ingest_tool_call(state, recorder, limits, call),
            StreamUpdate::ToolCallUpdate(update) => {
                upsert_tool_call(state, recorder, limits, update);
            }
            StreamUpdate::ConfigOptionUpdate(update) => {
                if update.options.is_empty() {
                    debug!("ignoring empty config option update");
                } else {
                    state.config_options = update.options;
                }
            }
            StreamUpdate::ModelUpdate(update) => {
                if !update.models.is_empty() {
                    state.models = update.models;
                }
                if let Some(current) = update.current_model {
                    state.current_model = Some(current);
                }
            }
        });
    }

    /// Ends the current run exactly once: folds the run's duration into the
    /// session total, stamps it on the closing assistant message, finalizes
    /// (and persists) still-streaming messages, and surfaces any
    /// non-default stop reason as a system notice. Safe to call again when
    /// the transport resolution and the prompt-end event both arrive.
    fn finish_run(&self, key: &SessionKey, stop: StopReason) {
        self.mutate(key, |state, recorder, limits| {
            let was_running = state.running;
            let run_elapsed = halt_run(state);
            if was_running && let Some(run_elapsed) = run_elapsed {
                stamp_elapsed(state, run_elapsed);
            }
            finalize_streaming(state, recorder, limits);
            if was_running && !stop.is_end_turn() {
                let notice = MessageItem::complete(
                    MessageRole::Assistant,
                    Some(MessageVariant::System),
                    vec![ContentBlock::text(format!("Run stopped: {stop}"))],
                );
                recorder.record_message(&notice, limits);
                state.feed.push(FeedItem::Message(notice));
            }
        });
    }

    fn live_session_id(&self, key: &SessionKey) -> Result<SessionId> {
        let sessions = self.sessions();
        let entry = sessions.get(key).ok_or(TetherErr::SessionTerminated)?;
        match (&entry.state.lifecycle, &entry.state.session_id) {
            (SessionLifecycle::Ready, Some(id)) => Ok(id.clone()),
            _ => Err(TetherErr::SessionTerminated),
        }
    }

    /// Clone-mutate-publish around one entry; `None` when the key is
    /// unknown.
    fn mutate<R>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut SessionState, &mut HistoryRecorder, &Limits) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions();
        let entry = sessions.get_mut(key)?;
        let mut state = (*entry.state).clone();
        let result = f(&mut state, &mut entry.recorder, &self.limits);
        entry.publish(state);
        Some(result)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_or_default<'a>(
        &self,
        sessions: &'a mut HashMap<SessionKey, SessionEntry>,
        key: &SessionKey,
    ) -> &'a mut SessionEntry {
        sessions
            .entry(key.clone())
            .or_insert_with(|| SessionEntry::new(key.clone(), self.history_tx.clone()))
    }
}

/// True when no block carries real content.
fn is_blank(blocks: &[ContentBlock]) -> bool {
    blocks.iter().all(|block| match block {
        ContentBlock::Text { text } => text.trim().is_empty(),
        _ => false,
    })
}

/// Clears the running flag, folding any in-flight run time into the session
/// total. Returns this run's duration when one was in flight.
fn halt_run(state: &mut SessionState) -> Option<Duration> {
    state.running = false;
    let run = state.run_started_at.take().map(|started| started.elapsed());
    if let Some(run) = run {
        state.elapsed += run;
    }
    run
}

/// Stamps the run duration on the closing assistant message: the most
/// recent plain (non-thought, non-system) assistant item not yet stamped.
fn stamp_elapsed(state: &mut SessionState, run: Duration) {
    let closing = state.feed.iter_mut().rev().find_map(|item| match item {
        FeedItem::Message(message)
            if message.role == MessageRole::Assistant && message.variant.is_none() =>
        {
            Some(message)
        }
        _ => None,
    });
    if let Some(message) = closing
        && message.elapsed.is_none()
    {
        message.elapsed = Some(run);
    }
}

fn finalize_streaming(state: &mut SessionState, recorder: &mut HistoryRecorder, limits: &Limits) {
    for item in &mut state.feed {
        if let FeedItem::Message(message) = item
            && message.streaming
        {
            message.streaming = false;
            recorder.record_message(message, limits);
        }
    }
}

/// Settles state when the run can no longer finish normally (cancel or
/// backend exit): force-cancels live tool calls (persisting them), drops
/// pending permissions and their feed entries, clears the running flag.
/// Returns the dropped permission request ids.
fn settle_abandoned(
    state: &mut SessionState,
    recorder: &mut HistoryRecorder,
    limits: &Limits,
) -> Vec<PermissionRequestId> {
    halt_run(state);
    let SessionState {
        feed,
        tool_calls,
        terminals,
        pending_permissions,
        ..
    } = state;
    for record in tool_calls.values_mut() {
        if record.force_cancel()
            && let Some(feed_id) = feed::tool_feed_id(feed, &record.id)
        {
            recorder.record_tool_call(feed_id, record, terminals, limits);
        }
    }
    let dropped: Vec<PermissionRequestId> = pending_permissions
        .drain(..)
        .map(|request| request.id)
        .collect();
    feed.retain(|item| !matches!(item, FeedItem::Permission(_)));
    dropped
}

/// Updates one config option's value in place. Unknown ids are logged and
/// left for the next config option update to reconcile.
fn set_option_value(state: &mut SessionState, option_id: &str, value: &str) {
    match state
        .config_options
        .iter_mut()
        .find(|option| option.id == option_id)
    {
        Some(option) => option.value = Some(value.to_string()),
        None => debug!(option = %option_id, "set for unknown config option"),
    }
}

fn complete_message(
    state: &mut SessionState,
    recorder: &mut HistoryRecorder,
    limits: &Limits,
    role: MessageRole,
    variant: Option<MessageVariant>,
    content: Vec<ContentBlock>,
) {
    let item = MessageItem::complete(role, variant, content);
    recorder.record_message(&item, limits);
    state.feed.push(FeedItem::Message(item));
}

fn apply_plan(state: &mut SessionState, recorder: &mut HistoryRecorder, plan: Plan) {
    if !plan.is_empty() && !feed::has_plan_item(&state.feed) {
        state.feed.push(FeedItem::Plan(PlanFeedItem {
            id: FeedItemId::generate(),
        }));
    }
    if !plan.is_empty()
        && let Some(feed_id) = feed::plan_feed_id(&state.feed)
    {
        recorder.record_plan(feed_id, &plan);
    }
    state.plan = Some(plan);
}

fn ingest_tool_call(
    state: &mut SessionState,
    recorder: &mut HistoryRecorder,
    limits: &Limits,
    call: ToolCall,
) {
    if state.tool_calls.contains_key(&call.id) {
        debug!(call = %call.id, "repeated tool call create; treating as update");
        let update = ToolCallUpdate {
            id: call.id.clone(),
            fields: ToolCallUpdateFields {
                title: Some(call.title),
                kind: Some(call.kind),
                status: Some(call.status),
                content: if call.content.is_empty() {
                    None
                } else {
                    Some(call.content)
                },
                raw_input: call.raw_input,
                raw_output: call.raw_output,
            },
        };
        upsert_tool_call(state, recorder, limits, update);
        return;
    }
    let (record, effect) = ToolCallRecord::from_event(call, limits);
    let id = record.id.clone();
    state.tool_calls.insert(id.clone(), record);
    state.feed.push(FeedItem::Tool(ToolFeedItem {
        id: FeedItemId::generate(),
        call_id: id.clone(),
    }));
    if effect.newly_terminal {
        persist_tool(state, recorder, limits, &id);
    }
}

fn upsert_tool_call(
    state: &mut SessionState,
    recorder: &mut HistoryRecorder,
    limits: &Limits,
    update: ToolCallUpdate,
) {
    let ToolCallUpdate { id, fields } = update;
    if !state.tool_calls.contains_key(&id) {
        // Updates may race ahead of their create; tolerate it.
        debug!(call = %id, "update for a tool call never created; starting one");
        state
            .tool_calls
            .insert(id.clone(), ToolCallRecord::placeholder(id.clone()));
        state.feed.push(FeedItem::Tool(ToolFeedItem {
            id: FeedItemId::generate(),
            call_id: id.clone(),
        }));
    }
    let Some(record) = state.tool_calls.get_mut(&id) else {
        return;
    };
    let effect = record.apply(fields, limits);
    if effect.newly_terminal {
        persist_tool(state, recorder, limits, &id);
    }
}

fn persist_tool(
    state: &SessionState,
    recorder: &mut HistoryRecorder,
    limits: &Limits,
    id: &ToolCallId,
) {
    let Some(record) = state.tool_calls.get(id) else {
        return;
    };
    let Some(feed_id) = feed::tool_feed_id(&state.feed, id) else {
        return;
    };
    recorder.record_tool_call(feed_id, record, &state.terminals, limits);
}
