use serde::Deserialize;
use serde::Serialize;

/// Line text intended to read as "content elided here" in a rendered diff.
pub const ELISION_MARKER: &str = "⋯";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Context,
    Add,
    Del,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

impl DiffLine {
    pub fn context(text: impl Into<String>) -> Self {
        Self {
            kind: DiffLineKind::Context,
            text: text.into(),
        }
    }

    pub fn add(text: impl Into<String>) -> Self {
        Self {
            kind: DiffLineKind::Add,
            text: text.into(),
        }
    }

    pub fn del(text: impl Into<String>) -> Self {
        Self {
            kind: DiffLineKind::Del,
            text: text.into(),
        }
    }

    pub fn elision() -> Self {
        Self::context(ELISION_MARKER)
    }
}

/// A bounded, render-ready line diff.
///
/// `additions` and `deletions` always count the full change, even when the
/// line list was trimmed (`truncated`) to fit the preview budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPreview {
    pub lines: Vec<DiffLine>,
    pub additions: usize,
    pub deletions: usize,
    pub truncated: bool,
}
