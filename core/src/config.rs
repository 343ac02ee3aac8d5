/// Numeric ceilings applied to diff previews and durable history.
///
/// All text ceilings are counted in characters, not bytes, so truncation can
/// never split a multi-byte code point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Longest text block stored in a persisted item.
    pub max_text_chars: usize,
    /// Longest inline excerpt kept on a persisted resource block.
    pub max_resource_chars: usize,
    /// Longest raw tool input/output display string stored.
    pub max_raw_chars: usize,
    /// Most content blocks stored per item; overflow collapses into a
    /// trailing placeholder block.
    pub max_blocks_per_item: usize,
    /// Lines of a live sub-terminal buffer captured when its tool call is
    /// persisted.
    pub terminal_tail_lines: usize,
    /// Context lines kept around each change region when a diff is trimmed.
    pub diff_context_lines: usize,
    /// Hard cap on the number of lines in a diff preview.
    pub diff_max_preview_lines: usize,
    /// Combined input size above which diff alignment falls back to the
    /// common prefix/suffix heuristic.
    pub full_alignment_max_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_text_chars: 10_000,
            max_resource_chars: 2_048,
            max_raw_chars: 4_096,
            max_blocks_per_item: 64,
            terminal_tail_lines: 200,
            diff_context_lines: 3,
            diff_max_preview_lines: 100,
            full_alignment_max_bytes: 256 * 1024,
        }
    }
}
