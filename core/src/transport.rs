//! The seam between the session store and whatever actually speaks to an
//! agent backend (a subprocess, a socket, an in-process fake in tests).
//!
//! The store calls down through [`AgentTransport`]; the transport delivers
//! everything coming back up by feeding session events into
//! [`crate::store::SessionStore::handle_event`].

use async_trait::async_trait;
use thiserror::Error;

use tether_protocol::ContentBlock;
use tether_protocol::PermissionRequestId;
use tether_protocol::SessionId;
use tether_protocol::SessionKey;
use tether_protocol::config_types::StartupContext;
use tether_protocol::events::PermissionOutcome;
use tether_protocol::events::SessionStartedEvent;
use tether_protocol::events::StopReason;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Starts (or attaches to) a session for `key` and returns what the
    /// backend advertises about it.
    async fn start(
        &self,
        key: &SessionKey,
        ctx: &StartupContext,
    ) -> TransportResult<SessionStartedEvent>;

    /// Dispatches one prompt turn and resolves when the run ends.
    async fn prompt(
        &self,
        session_id: &SessionId,
        blocks: Vec<ContentBlock>,
    ) -> TransportResult<StopReason>;

    /// Asks the backend to stop the current run. Events may keep arriving
    /// after this resolves.
    async fn cancel(&self, session_id: &SessionId) -> TransportResult<()>;

    /// Releases backend resources for the session.
    async fn dispose(&self, session_id: &SessionId) -> TransportResult<()>;

    async fn respond_permission(
        &self,
        session_id: &SessionId,
        request_id: &PermissionRequestId,
        outcome: PermissionOutcome,
    ) -> TransportResult<()>;

    async fn set_model(&self, session_id: &SessionId, model_id: &str) -> TransportResult<()>;

    async fn set_config_option(
        &self,
        session_id: &SessionId,
        option_id: &str,
        value: &str,
    ) -> TransportResult<()>;

    async fn set_mode(&self, session_id: &SessionId, mode_id: &str) -> TransportResult<()>;
}
