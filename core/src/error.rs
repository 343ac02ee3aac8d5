use thiserror::Error;

use crate::storage::StorageError;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, TetherErr>;

#[derive(Debug, Error)]
pub enum TetherErr {
    /// The transport failed to start a session; the session's lifecycle has
    /// been moved to `Error`.
    #[error("session start failed: {0}")]
    SessionStart(String),

    /// A prompt was rejected before dispatch because it carried no content.
    #[error("prompt rejected: no content")]
    EmptyPrompt,

    /// The transport prompt call failed; the session's running flag has
    /// been cleared.
    #[error("prompt dispatch failed: {0}")]
    PromptDispatch(String),

    /// The operation needs a live session and there is none.
    #[error("session is not live")]
    SessionTerminated,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
