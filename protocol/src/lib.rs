//! Wire-level data model shared by the session manager and its transports.
//!
//! Everything in this crate is plain serde data: the typed events a backend
//! delivers over the transport, the content blocks that make up messages,
//! tool-call shapes, plans, permission requests, and the envelope format
//! used for durable history. No I/O happens here.

mod content;
mod ids;
pub mod config_types;
pub mod diff;
pub mod events;
pub mod persistence;
pub mod plan;
pub mod tool_calls;

pub use content::ContentBlock;
pub use content::MessageRole;
pub use content::MessageVariant;
pub use ids::BackendId;
pub use ids::FeedItemId;
pub use ids::PermissionRequestId;
pub use ids::SessionId;
pub use ids::SessionKey;
pub use ids::TaskId;
pub use ids::TerminalId;
pub use ids::ToolCallId;
