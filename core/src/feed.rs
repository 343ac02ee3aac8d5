//! The ordered conversation feed and the merge rules that build it from
//! streaming updates.
//!
//! The feed is append-only: items are never reordered, streaming messages
//! are mutated in place until finalized, and only resolved permission
//! entries are ever removed.

use std::time::Duration;

use tether_protocol::ContentBlock;
use tether_protocol::FeedItemId;
use tether_protocol::MessageRole;
use tether_protocol::MessageVariant;
use tether_protocol::PermissionRequestId;
use tether_protocol::ToolCallId;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageItem {
    pub id: FeedItemId,
    pub role: MessageRole,
    pub variant: Option<MessageVariant>,
    pub blocks: Vec<ContentBlock>,
    /// True while chunks for this message are still arriving. Streaming
    /// messages are never persisted.
    pub streaming: bool,
    /// Duration of the prompt run that produced this message, stamped at
    /// finalization on the run's closing assistant message.
    pub elapsed: Option<Duration>,
}

impl MessageItem {
    pub fn streaming(role: MessageRole, variant: Option<MessageVariant>, first: ContentBlock) -> Self {
        Self {
            id: FeedItemId::generate(),
            role,
            variant,
            blocks: vec![first],
            streaming: true,
            elapsed: None,
        }
    }

    pub fn complete(
        role: MessageRole,
        variant: Option<MessageVariant>,
        blocks: Vec<ContentBlock>,
    ) -> Self {
        Self {
            id: FeedItemId::generate(),
            role,
            variant,
            blocks,
            streaming: false,
            elapsed: None,
        }
    }
}

/// Position of one tool call on the feed; the record itself lives in the
/// session's tool table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFeedItem {
    pub id: FeedItemId,
    pub call_id: ToolCallId,
}

/// Position of the session's (single) plan entry on the feed; the plan
/// itself lives on the session and is replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanFeedItem {
    pub id: FeedItemId,
}

/// Position of one unresolved permission request; removed on resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionFeedItem {
    pub id: FeedItemId,
    pub request_id: PermissionRequestId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Message(MessageItem),
    Tool(ToolFeedItem),
    Plan(PlanFeedItem),
    Permission(PermissionFeedItem),
}

/// Folds one streamed chunk into the feed.
///
/// A chunk extends the last feed item when that item is a still-streaming
/// message with the same role and variant; anything else starts a new
/// streaming message. Consecutive text blocks concatenate in place.
pub(crate) fn absorb_chunk(
    feed: &mut Vec<FeedItem>,
    role: MessageRole,
    variant: Option<MessageVariant>,
    block: ContentBlock,
) {
    if let Some(FeedItem::Message(last)) = feed.last_mut()
        && last.streaming
        && last.role == role
        && last.variant == variant
    {
        push_block(&mut last.blocks, block);
        return;
    }
    feed.push(FeedItem::Message(MessageItem::streaming(role, variant, block)));
}

pub(crate) fn push_block(blocks: &mut Vec<ContentBlock>, block: ContentBlock) {
    if let (Some(ContentBlock::Text { text: tail }), ContentBlock::Text { text }) =
        (blocks.last_mut(), &block)
    {
        tail.push_str(text);
        return;
    }
    blocks.push(block);
}

/// Feed id of the entry referencing `call_id`, if the call is on the feed.
pub(crate) fn tool_feed_id(feed: &[FeedItem], call_id: &ToolCallId) -> Option<FeedItemId> {
    feed.iter().find_map(|item| match item {
        FeedItem::Tool(tool) if &tool.call_id == call_id => Some(tool.id.clone()),
        _ => None,
    })
}

pub(crate) fn has_plan_item(feed: &[FeedItem]) -> bool {
    feed.iter().any(|item| matches!(item, FeedItem::Plan(_)))
}

/// Feed id of the session's plan entry, if one is on the feed.
pub(crate) fn plan_feed_id(feed: &[FeedItem]) -> Option<FeedItemId> {
    feed.iter().find_map(|item| match item {
        FeedItem::Plan(plan) => Some(plan.id.clone()),
        _ => None,
    })
}
