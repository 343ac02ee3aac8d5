//! Root of the `tether-core` library.
//!
//! Client-side management of turn-based streaming agent sessions: one
//! [`store::SessionStore`] owns every session for the process, rebuilds each
//! session's feed from transport events, tracks tool-call lifecycles, and
//! records finalized items to a pluggable durable store so a session can be
//! rehydrated after a restart.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod diff;
pub mod error;
pub mod feed;
mod history;
pub mod session;
pub mod storage;
pub mod store;
pub mod tool_calls;
pub mod transport;

pub use config::Limits;
pub use error::Result;
pub use error::TetherErr;
pub use store::SessionStore;
