use serde::Deserialize;
use serde::Serialize;

/// One block of message or tool-call content.
///
/// Text and resource references are kept verbatim in session state; binary
/// payloads (image/audio) are carried on the wire but reduced to
/// placeholders before anything is written to durable history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    Audio {
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    /// An embedded resource: a reference plus an optional inline excerpt.
    Resource {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// A reference to a resource without any inline content.
    ResourceLink {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Returns the inline text of this block, if it carries any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Resource { text, .. } => text.as_deref(),
            _ => None,
        }
    }

    /// A short bracketed label standing in for non-text content.
    pub fn placeholder_label(&self) -> String {
        match self {
            ContentBlock::Text { .. } => "[text]".to_string(),
            ContentBlock::Image { .. } => "[image]".to_string(),
            ContentBlock::Audio { .. } => "[audio]".to_string(),
            ContentBlock::Resource { uri, .. } | ContentBlock::ResourceLink { uri, .. } => {
                format!("[resource: {uri}]")
            }
        }
    }
}

/// Message author on the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Distinguishes ordinary messages from reasoning output and locally
/// synthesized notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageVariant {
    Thought,
    System,
}
