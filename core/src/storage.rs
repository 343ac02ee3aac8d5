//! Pluggable durable storage for session history.
//!
//! The store only ever appends self-describing JSON records and reads them
//! all back; ordering, schema, and dedupe live in [`crate::history`], so a
//! backing implementation can be as dumb as a JSONL file or a single KV
//! table.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends one record under `conversation_id`. Records are opaque to the
    /// store and must come back from `load` in insertion order per writer.
    async fn append(&self, conversation_id: &str, record: Value) -> StorageResult<()>;

    /// Returns every record ever appended under `conversation_id`.
    async fn load(&self, conversation_id: &str) -> StorageResult<Vec<Value>>;
}
