use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifies the local unit of work a session belongs to.
    TaskId
);
string_id!(
    /// Identifies the remote agent backend a session runs against.
    BackendId
);
string_id!(
    /// Backend-assigned id for one live session.
    SessionId
);
string_id!(
    /// Backend-assigned id for one tool call.
    ToolCallId
);
string_id!(
    /// Identifies a sub-terminal owned by a tool call.
    TerminalId
);
string_id!(
    /// Identifies one permission request awaiting an answer.
    PermissionRequestId
);
string_id!(
    /// Client-assigned id for one feed item, unique within a session.
    FeedItemId
);

impl FeedItemId {
    /// Mints a fresh id for a locally created feed item.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Registry key for one session: which task, against which backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub task_id: TaskId,
    pub backend_id: BackendId,
}

impl SessionKey {
    pub fn new(task_id: impl Into<TaskId>, backend_id: impl Into<BackendId>) -> Self {
        Self {
            task_id: task_id.into(),
            backend_id: backend_id.into(),
        }
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.task_id, self.backend_id)
    }
}
