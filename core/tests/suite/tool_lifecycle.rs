//! Tool call tracking through streamed create/update events.

use core_test_support::harness;
use core_test_support::key;
use core_test_support::update_event;
use pretty_assertions::assert_eq;
use serde_json::json;
use tether_core::feed::FeedItem;
use tether_protocol::ContentBlock;
use tether_protocol::ToolCallId;
use tether_protocol::events::SessionEvent;
use tether_protocol::events::StreamUpdate;
use tether_protocol::tool_calls::ToolCall;
use tether_protocol::tool_calls::ToolCallContent;
use tether_protocol::tool_calls::ToolCallStatus;
use tether_protocol::tool_calls::ToolCallUpdate;
use tether_protocol::tool_calls::ToolCallUpdateFields;
use tether_protocol::tool_calls::ToolKind;

fn create(id: &str, title: &str, status: ToolCallStatus) -> SessionEvent {
    update_event(StreamUpdate::ToolCall(ToolCall {
        id: ToolCallId::from(id),
        title: title.to_string(),
        kind: ToolKind::Execute,
        status,
        content: Vec::new(),
        raw_input: Some(json!({"command": ["rg", "absorb"]})),
        raw_output: None,
    }))
}

fn update(id: &str, fields: ToolCallUpdateFields) -> SessionEvent {
    update_event(StreamUpdate::ToolCallUpdate(ToolCallUpdate {
        id: ToolCallId::from(id),
        fields,
    }))
}

fn tool_feed_items(feed: &[FeedItem]) -> usize {
    feed.iter()
        .filter(|item| matches!(item, FeedItem::Tool(_)))
        .count()
}

#[tokio::test]
async fn a_call_flows_from_pending_to_completed() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store
        .handle_event(&k, create("call-1", "search the tree", ToolCallStatus::Pending));
    h.store.handle_event(
        &k,
        update(
            "call-1",
            ToolCallUpdateFields {
                status: Some(ToolCallStatus::InProgress),
                content: Some(vec![ToolCallContent::Content {
                    content: ContentBlock::text("3 matches"),
                }]),
                ..ToolCallUpdateFields::default()
            },
        ),
    );
    h.store.handle_event(
        &k,
        update(
            "call-1",
            ToolCallUpdateFields {
                status: Some(ToolCallStatus::Completed),
                raw_output: Some(json!({"exit_code": 0})),
                ..ToolCallUpdateFields::default()
            },
        ),
    );

    let state = h.store.snapshot(&k);
    let record = state.tool_call(&ToolCallId::from("call-1")).unwrap();
    assert_eq!(record.status, ToolCallStatus::Completed);
    assert_eq!(record.title, "search the tree");
    assert_eq!(record.content.len(), 1);
    // Structured raw payloads are rendered as pretty JSON strings.
    assert!(record.raw_input.as_ref().unwrap().contains("\"command\""));
    assert!(record.raw_output.as_ref().unwrap().contains("exit_code"));
    assert_eq!(tool_feed_items(&state.feed), 1);
}

#[tokio::test]
async fn status_never_moves_backwards() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store
        .handle_event(&k, create("call-1", "edit", ToolCallStatus::Completed));
    h.store.handle_event(
        &k,
        update(
            "call-1",
            ToolCallUpdateFields {
                status: Some(ToolCallStatus::InProgress),
                ..ToolCallUpdateFields::default()
            },
        ),
    );

    let state = h.store.snapshot(&k);
    assert_eq!(
        state.tool_call(&ToolCallId::from("call-1")).unwrap().status,
        ToolCallStatus::Completed
    );
}

#[tokio::test]
async fn an_update_ahead_of_its_create_makes_a_placeholder() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store.handle_event(
        &k,
        update(
            "early",
            ToolCallUpdateFields {
                title: Some("arrived first".to_string()),
                status: Some(ToolCallStatus::InProgress),
                ..ToolCallUpdateFields::default()
            },
        ),
    );

    let state = h.store.snapshot(&k);
    let record = state.tool_call(&ToolCallId::from("early")).unwrap();
    assert_eq!(record.title, "arrived first");
    assert_eq!(record.status, ToolCallStatus::InProgress);
    assert_eq!(tool_feed_items(&state.feed), 1);

    // The late create refines the record instead of duplicating it.
    h.store
        .handle_event(&k, create("early", "real title", ToolCallStatus::InProgress));
    let state = h.store.snapshot(&k);
    assert_eq!(
        state.tool_call(&ToolCallId::from("early")).unwrap().title,
        "real title"
    );
    assert_eq!(tool_feed_items(&state.feed), 1);
}

#[tokio::test]
async fn repeated_creates_keep_one_feed_entry() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store
        .handle_event(&k, create("call-1", "first", ToolCallStatus::Pending));
    h.store
        .handle_event(&k, create("call-1", "second", ToolCallStatus::InProgress));

    let state = h.store.snapshot(&k);
    assert_eq!(tool_feed_items(&state.feed), 1);
    let record = state.tool_call(&ToolCallId::from("call-1")).unwrap();
    assert_eq!(record.title, "second");
    assert_eq!(record.status, ToolCallStatus::InProgress);
}
