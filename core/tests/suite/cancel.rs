//! Cancellation: local state settles even when the backend never answers.

use core_test_support::TransportCall;
use core_test_support::harness;
use core_test_support::key;
use core_test_support::update_event;
use core_test_support::wait_for_records;
use core_test_support::wait_for_state;
use pretty_assertions::assert_eq;
use tether_core::feed::FeedItem;
use tether_core::session::SessionLifecycle;
use tether_protocol::ContentBlock;
use tether_protocol::PermissionRequestId;
use tether_protocol::SessionId;
use tether_protocol::ToolCallId;
use tether_protocol::config_types::StartupContext;
use tether_protocol::events::PermissionOutcome;
use tether_protocol::events::PermissionRequest;
use tether_protocol::events::PermissionRequestEvent;
use tether_protocol::events::SessionEvent;
use tether_protocol::events::SessionExitEvent;
use tether_protocol::events::StopReason;
use tether_protocol::events::StreamUpdate;
use tether_protocol::persistence::PersistedEnvelope;
use tether_protocol::persistence::PersistedItem;
use tether_protocol::tool_calls::ToolCall;
use tether_protocol::tool_calls::ToolCallStatus;
use tether_protocol::tool_calls::ToolKind;

fn running_tool(id: &str) -> SessionEvent {
    update_event(StreamUpdate::ToolCall(ToolCall {
        id: ToolCallId::from(id),
        title: "apply patch".to_string(),
        kind: ToolKind::Edit,
        status: ToolCallStatus::InProgress,
        content: Vec::new(),
        raw_input: None,
        raw_output: None,
    }))
}

fn permission_request(id: &str) -> SessionEvent {
    SessionEvent::PermissionRequest(PermissionRequestEvent {
        request: PermissionRequest {
            id: PermissionRequestId::from(id),
            tool_call: None,
            options: Vec::new(),
        },
    })
}

#[tokio::test]
async fn cancel_settles_local_state_before_the_backend_answers() {
    let h = harness();
    let k = key("t1", "b1");
    let gate = h.backend.hold_prompts();
    h.backend.queue_prompt_result(Ok(StopReason::Cancelled));

    let prompt = h.store.send_prompt(
        &k,
        vec![ContentBlock::text("go")],
        vec![ContentBlock::text("go")],
    );
    let driver = async {
        let mut rx = h.store.subscribe(&k);
        wait_for_state(&mut rx, |state| state.running).await;
        h.store.handle_event(&k, running_tool("call-1"));
        h.store.handle_event(&k, permission_request("perm-1"));
        h.store.cancel(&k).await.unwrap();
        gate.notify_one();
    };
    let (stop, ()) = tokio::join!(prompt, driver);
    assert_eq!(stop.unwrap(), StopReason::Cancelled);

    let state = h.store.snapshot(&k);
    assert!(!state.running);
    assert_eq!(
        state.tool_call(&ToolCallId::from("call-1")).unwrap().status,
        ToolCallStatus::Cancelled
    );
    assert_eq!(state.pending_permissions, Vec::new());
    assert!(!state
        .feed
        .iter()
        .any(|item| matches!(item, FeedItem::Permission(_))));

    let calls = h.backend.calls();
    assert!(calls.contains(&TransportCall::Cancel(SessionId::from("session-1"))));
    assert!(calls.contains(&TransportCall::RespondPermission(
        SessionId::from("session-1"),
        PermissionRequestId::from("perm-1"),
        PermissionOutcome::Cancelled,
    )));

    // The force-cancelled call made it to durable history.
    let records = wait_for_records(&h.storage, "task:t1", 2).await;
    let stored: PersistedEnvelope = serde_json::from_value(records[1].clone()).unwrap();
    let PersistedItem::ToolCall(tool) = &stored.item else {
        panic!("expected a tool call record, got {:?}", stored.item);
    };
    assert_eq!(tool.id, ToolCallId::from("call-1"));
    assert_eq!(tool.status, ToolCallStatus::Cancelled);
}

#[tokio::test]
async fn cancel_without_a_session_is_a_no_op() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.cancel(&k).await.unwrap();

    // Registered but never started: still nothing to tell the backend.
    h.store.snapshot(&k);
    h.store.cancel(&k).await.unwrap();
    assert_eq!(h.backend.calls(), Vec::new());
}

#[tokio::test]
async fn a_backend_exit_settles_whatever_was_in_flight() {
    let h = harness();
    let k = key("t1", "b1");
    h.store
        .ensure_session(&k, &StartupContext::default())
        .await
        .unwrap();
    h.store.handle_event(&k, running_tool("call-1"));
    h.store.handle_event(&k, permission_request("perm-1"));
    h.store
        .handle_event(&k, SessionEvent::SessionExit(SessionExitEvent { code: Some(0) }));

    let state = h.store.snapshot(&k);
    // No error preceded the exit, so a stock reason is surfaced.
    assert_eq!(
        state.lifecycle,
        SessionLifecycle::Exited("Session ended unexpectedly".to_string())
    );
    assert!(!state.running);
    assert_eq!(
        state.tool_call(&ToolCallId::from("call-1")).unwrap().status,
        ToolCallStatus::Cancelled
    );
    assert_eq!(state.pending_permissions, Vec::new());
}
