//! Rebuilding sessions from stored history across process boundaries.

use assert_matches::assert_matches;
use core_test_support::TransportCall;
use core_test_support::agent_chunk;
use core_test_support::agent_message;
use core_test_support::harness;
use core_test_support::key;
use core_test_support::message_texts;
use core_test_support::update_event;
use core_test_support::wait_for_records;
use core_test_support::wait_for_state;
use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;
use tether_core::Limits;
use tether_core::SessionStore;
use tether_core::TetherErr;
use tether_core::session::SessionLifecycle;
use tether_protocol::ContentBlock;
use tether_protocol::SessionId;
use tether_protocol::ToolCallId;
use tether_protocol::config_types::StartupContext;
use tether_protocol::events::SessionEvent;
use tether_protocol::events::StreamUpdate;
use tether_protocol::persistence::PersistedEnvelope;
use tether_protocol::tool_calls::ToolCall;
use tether_protocol::tool_calls::ToolCallStatus;
use tether_protocol::tool_calls::ToolKind;

fn text(body: &str) -> Vec<ContentBlock> {
    vec![ContentBlock::text(body)]
}

fn finished_tool(id: &str) -> SessionEvent {
    update_event(StreamUpdate::ToolCall(ToolCall {
        id: ToolCallId::from(id),
        title: "run tests".to_string(),
        kind: ToolKind::Execute,
        status: ToolCallStatus::Completed,
        content: Vec::new(),
        raw_input: None,
        raw_output: None,
    }))
}

/// A message record as an earlier process would have written it.
fn stored_message(seq: u64, body: &str) -> Value {
    json!({
        "schema_version": 1,
        "seq": seq,
        "created_at_ms": 1_000 + seq,
        "feed_item_id": format!("restored-{seq}"),
        "task_id": "t1",
        "backend_id": "b1",
        "item": {
            "type": "message",
            "role": "user",
            "text": body,
            "blocks": [{"type": "text", "text": body}],
        },
    })
}

#[tokio::test]
async fn a_new_process_rebuilds_the_feed_from_history() {
    let h = harness();
    let k = key("t1", "b1");
    let gate = h.backend.hold_prompts();

    let prompt = h.store.send_prompt(&k, text("go"), text("go"));
    let driver = async {
        let mut rx = h.store.subscribe(&k);
        wait_for_state(&mut rx, |state| state.running).await;
        h.store.handle_event(&k, finished_tool("call-1"));
        h.store.handle_event(&k, agent_chunk("done"));
        gate.notify_one();
    };
    let (stop, ()) = tokio::join!(prompt, driver);
    stop.unwrap();
    h.store.dispose(&k).await.unwrap();

    // A fresh store over the same storage, as if the process restarted.
    let store = SessionStore::new(h.backend.clone(), h.storage.clone(), Limits::default());
    store.hydrate(&k).await.unwrap();

    let state = store.snapshot(&k);
    assert_eq!(state.lifecycle, SessionLifecycle::Idle);
    assert_eq!(
        message_texts(&state),
        vec!["go".to_string(), "done".to_string()]
    );
    assert_eq!(
        state.tool_call(&ToolCallId::from("call-1")).unwrap().status,
        ToolCallStatus::Completed
    );
}

#[tokio::test]
async fn hydration_runs_once_even_when_racing() {
    let h = harness();
    let k = key("t1", "b1");
    h.storage
        .seed("task:t1", vec![stored_message(1, "from before")]);

    let (a, b) = tokio::join!(h.store.hydrate(&k), h.store.hydrate(&k));
    a.unwrap();
    b.unwrap();
    h.store.hydrate(&k).await.unwrap();

    let state = h.store.snapshot(&k);
    assert_eq!(message_texts(&state), vec!["from before".to_string()]);
}

#[tokio::test]
async fn unreadable_records_are_skipped() {
    let h = harness();
    let k = key("t1", "b1");
    let mut wrong_version = stored_message(2, "from the future");
    wrong_version["schema_version"] = json!(999);
    h.storage.seed(
        "task:t1",
        vec![
            json!("not an object"),
            wrong_version,
            stored_message(1, "still good"),
        ],
    );

    h.store.hydrate(&k).await.unwrap();

    let state = h.store.snapshot(&k);
    assert_eq!(message_texts(&state), vec!["still good".to_string()]);
}

#[tokio::test]
async fn new_records_sequence_after_hydrated_history() {
    let h = harness();
    let k = key("t1", "b1");
    h.storage
        .seed("task:t1", vec![stored_message(41, "from before")]);
    h.store.hydrate(&k).await.unwrap();

    h.store.send_prompt(&k, text("next"), text("next")).await.unwrap();

    let records = wait_for_records(&h.storage, "task:t1", 2).await;
    let fresh: PersistedEnvelope = serde_json::from_value(records[1].clone()).unwrap();
    assert_eq!(fresh.seq, 42);
}

#[tokio::test]
async fn a_failed_load_resets_the_claim() {
    let h = harness();
    let k = key("t1", "b1");
    h.storage
        .seed("task:t1", vec![stored_message(1, "from before")]);
    h.storage.fail_next_loads(1);

    let result = h.store.hydrate(&k).await;
    assert_matches!(result, Err(TetherErr::Storage(_)));

    h.store.hydrate(&k).await.unwrap();
    let state = h.store.snapshot(&k);
    assert_eq!(message_texts(&state), vec!["from before".to_string()]);
}

#[tokio::test]
async fn restart_carries_history_onto_the_fresh_session() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.send_prompt(&k, text("go"), text("go")).await.unwrap();
    h.store.handle_event(&k, agent_message("done"));

    let id = h.store.restart(&k, &StartupContext::default()).await.unwrap();
    assert_eq!(id, SessionId::from("session-2"));

    let state = h.store.snapshot(&k);
    assert_eq!(state.lifecycle, SessionLifecycle::Ready);
    assert_eq!(state.session_id, Some(SessionId::from("session-2")));
    assert_eq!(
        message_texts(&state),
        vec!["go".to_string(), "done".to_string()]
    );
    assert!(h
        .backend
        .calls()
        .contains(&TransportCall::Dispose(SessionId::from("session-1"))));
}
