//! What may enter durable history, and in what shape.
//!
//! Sanitization is lossy on purpose: binary payloads become placeholders,
//! oversized text is cut at a character ceiling, and diff entries keep only
//! their bounded preview. Hydration must never depend on anything a
//! sanitizer removes.

use std::collections::HashMap;

use tether_protocol::ContentBlock;
use tether_protocol::TerminalId;
use tether_protocol::persistence::PersistedMessage;
use tether_protocol::persistence::PersistedToolCall;
use tether_protocol::persistence::TerminalTail;
use tether_protocol::tool_calls::DiffContent;
use tether_protocol::tool_calls::ToolCallContent;

use crate::config::Limits;
use crate::feed::MessageItem;
use crate::tool_calls::ToolCallRecord;

/// Cuts `text` after `max` characters. Operates on characters, never bytes,
/// so multi-byte code points survive intact.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Last `max` lines of a live terminal buffer.
pub(crate) fn tail_lines(text: &str, max: usize) -> String {
    let total = text.lines().count();
    if total <= max {
        return text.to_string();
    }
    let lines: Vec<&str> = text.lines().skip(total - max).collect();
    lines.join("\n")
}

fn sanitize_block(block: &ContentBlock, limits: &Limits) -> ContentBlock {
    match block {
        ContentBlock::Text { text } => ContentBlock::Text {
            text: truncate_chars(text, limits.max_text_chars),
        },
        ContentBlock::Image { .. } => ContentBlock::text("[image]"),
        ContentBlock::Audio { .. } => ContentBlock::text("[audio]"),
        ContentBlock::Resource {
            uri,
            mime_type,
            text,
        } => ContentBlock::Resource {
            uri: uri.clone(),
            mime_type: mime_type.clone(),
            text: text
                .as_deref()
                .map(|t| truncate_chars(t, limits.max_resource_chars)),
        },
        ContentBlock::ResourceLink { .. } => block.clone(),
    }
}

/// Sanitizes a block list and bounds its length; overflow collapses into a
/// trailing placeholder so the stored count never exceeds the ceiling.
pub(crate) fn sanitize_blocks(blocks: &[ContentBlock], limits: &Limits) -> Vec<ContentBlock> {
    let max = limits.max_blocks_per_item;
    if blocks.len() <= max {
        return blocks.iter().map(|b| sanitize_block(b, limits)).collect();
    }
    let keep = max.saturating_sub(1);
    let mut out: Vec<ContentBlock> = blocks[..keep]
        .iter()
        .map(|b| sanitize_block(b, limits))
        .collect();
    let dropped = blocks.len() - keep;
    out.push(ContentBlock::text(format!("[… {dropped} more blocks]")));
    out
}

/// Plain-text rendering of a message: its text-bearing blocks joined, or a
/// bracketed label for the leading block when there is no text at all.
pub(crate) fn derived_text(blocks: &[ContentBlock]) -> String {
    let parts: Vec<&str> = blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .filter(|text| !text.is_empty())
        .collect();
    if parts.is_empty() {
        return blocks
            .first()
            .map(ContentBlock::placeholder_label)
            .unwrap_or_default();
    }
    parts.join("\n")
}

fn sanitize_tool_content(
    content: &[ToolCallContent],
    limits: &Limits,
) -> Vec<ToolCallContent> {
    let max = limits.max_blocks_per_item;
    let keep = if content.len() > max {
        max.saturating_sub(1)
    } else {
        content.len()
    };
    let mut out: Vec<ToolCallContent> = content[..keep]
        .iter()
        .map(|entry| match entry {
            ToolCallContent::Content { content } => ToolCallContent::Content {
                content: sanitize_block(content, limits),
            },
            // The bounded preview is the storable part; the raw before/after
            // texts never reach the store.
            ToolCallContent::Diff { diff } => ToolCallContent::Diff {
                diff: DiffContent {
                    path: diff.path.clone(),
                    old_text: None,
                    new_text: None,
                    preview: diff.preview.clone(),
                },
            },
            ToolCallContent::Terminal { terminal_id } => ToolCallContent::Terminal {
                terminal_id: terminal_id.clone(),
            },
        })
        .collect();
    if content.len() > max {
        let dropped = content.len() - keep;
        out.push(ToolCallContent::Content {
            content: ContentBlock::text(format!("[… {dropped} more entries]")),
        });
    }
    out
}

pub(crate) fn persisted_message(item: &MessageItem, limits: &Limits) -> PersistedMessage {
    PersistedMessage {
        role: item.role,
        variant: item.variant,
        text: truncate_chars(&derived_text(&item.blocks), limits.max_text_chars),
        blocks: sanitize_blocks(&item.blocks, limits),
        elapsed_ms: item
            .elapsed
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
    }
}

/// Storable form of a tool call, including a bounded tail of every live
/// sub-terminal it references, captured now because the live buffers die
/// with the process.
pub(crate) fn persisted_tool_call(
    record: &ToolCallRecord,
    terminals: &HashMap<TerminalId, String>,
    limits: &Limits,
) -> PersistedToolCall {
    let terminal_tails = record
        .terminal_ids()
        .filter_map(|id| {
            terminals.get(id).map(|buffer| TerminalTail {
                terminal_id: id.clone(),
                tail: tail_lines(buffer, limits.terminal_tail_lines),
            })
        })
        .collect();
    PersistedToolCall {
        id: record.id.clone(),
        title: truncate_chars(&record.title, limits.max_text_chars),
        kind: record.kind,
        status: record.status,
        content: sanitize_tool_content(&record.content, limits),
        raw_input: record
            .raw_input
            .as_deref()
            .map(|raw| truncate_chars(raw, limits.max_raw_chars)),
        raw_output: record
            .raw_output
            .as_deref()
            .map(|raw| truncate_chars(raw, limits.max_raw_chars)),
        terminal_tails,
    }
}
