//! Rebuilding session state from stored history.
//!
//! Replay is tolerant by construction: records that fail to decode or carry
//! an unknown schema version are skipped, never fatal, and replayed items
//! slot in ahead of anything the live session has already produced.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use tether_protocol::ToolCallId;
use tether_protocol::persistence::PERSISTENCE_SCHEMA_VERSION;
use tether_protocol::persistence::PersistedEnvelope;
use tether_protocol::persistence::PersistedItem;
use tether_protocol::persistence::PersistedToolCall;
use tether_protocol::plan::Plan;
use tracing::debug;

use crate::feed::FeedItem;
use crate::feed::MessageItem;
use crate::feed::PlanFeedItem;
use crate::feed::ToolFeedItem;
use crate::feed::has_plan_item;
use crate::history::HistoryRecorder;
use crate::session::SessionState;
use crate::tool_calls::ToolCallRecord;

/// Decodes raw store records into envelopes, dropping whatever does not
/// parse, and returns them in replay order: sequence number first, stored
/// timestamp as the tiebreak for legacy records without one.
pub(crate) fn parse_envelopes(records: Vec<Value>) -> Vec<PersistedEnvelope> {
    let mut envelopes: Vec<PersistedEnvelope> = records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<PersistedEnvelope>(record) {
            Ok(envelope) if envelope.schema_version == PERSISTENCE_SCHEMA_VERSION => {
                Some(envelope)
            }
            Ok(envelope) => {
                debug!(
                    version = envelope.schema_version,
                    "skipping history record with unknown schema version"
                );
                None
            }
            Err(err) => {
                debug!("skipping undecodable history record: {err}");
                None
            }
        })
        .collect();
    envelopes.sort_by_key(PersistedEnvelope::sort_key);
    envelopes
}

/// Replays sorted envelopes into `state`.
///
/// Replayed items form a prefix ahead of live feed items. Anything the live
/// session already knows wins: persisted-this-process messages and known
/// tool ids are skipped, a live plan is kept over the stored one, and live
/// terminal buffers are not clobbered by stored tails. Every envelope still
/// seeds the recorder so rewrites are suppressed and new sequence numbers
/// start past the stored maximum.
pub(crate) fn replay(
    state: &mut SessionState,
    recorder: &mut HistoryRecorder,
    envelopes: Vec<PersistedEnvelope>,
) {
    let mut prefix: Vec<FeedItem> = Vec::new();
    let mut replayed_tools: HashSet<ToolCallId> = HashSet::new();
    let mut latest_plan: Option<Plan> = None;
    let mut plan_on_feed = has_plan_item(&state.feed);

    for envelope in envelopes {
        let live_duplicate = match &envelope.item {
            PersistedItem::Message(_) => recorder.is_saved_message(&envelope.feed_item_id),
            PersistedItem::ToolCall(tool) => {
                state.tool_calls.contains_key(&tool.id) && !replayed_tools.contains(&tool.id)
            }
            PersistedItem::Plan(_) => false,
        };
        recorder.seed_hydrated(&envelope);
        if live_duplicate {
            continue;
        }

        let PersistedEnvelope {
            feed_item_id, item, ..
        } = envelope;
        match item {
            PersistedItem::Message(message) => {
                prefix.push(FeedItem::Message(MessageItem {
                    id: feed_item_id,
                    role: message.role,
                    variant: message.variant,
                    blocks: message.blocks,
                    streaming: false,
                    elapsed: message.elapsed_ms.map(Duration::from_millis),
                }));
            }
            PersistedItem::ToolCall(tool) => {
                let PersistedToolCall {
                    id,
                    title,
                    kind,
                    status,
                    content,
                    raw_input,
                    raw_output,
                    terminal_tails,
                } = tool;
                for tail in terminal_tails {
                    state.terminals.entry(tail.terminal_id).or_insert(tail.tail);
                }
                // Later envelopes for the same call overwrite the record but
                // keep the feed position of the first appearance.
                if replayed_tools.insert(id.clone()) {
                    prefix.push(FeedItem::Tool(ToolFeedItem {
                        id: feed_item_id,
                        call_id: id.clone(),
                    }));
                }
                state.tool_calls.insert(
                    id.clone(),
                    ToolCallRecord {
                        id,
                        title,
                        kind,
                        status,
                        content,
                        raw_input,
                        raw_output,
                    },
                );
            }
            PersistedItem::Plan(plan) => {
                if plan.is_empty() {
                    continue;
                }
                if !plan_on_feed {
                    prefix.push(FeedItem::Plan(PlanFeedItem { id: feed_item_id }));
                    plan_on_feed = true;
                }
                latest_plan = Some(plan);
            }
        }
    }

    if state.plan.is_none() {
        state.plan = latest_plan;
    }
    if !prefix.is_empty() {
        let live = std::mem::take(&mut state.feed);
        prefix.extend(live);
        state.feed = prefix;
    }
}
