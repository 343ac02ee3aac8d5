//! Feed reconstruction from streamed events: chunk merging, finalization,
//! stop notices, terminal buffers.

use core_test_support::agent_chunk;
use core_test_support::agent_message;
use core_test_support::harness;
use core_test_support::key;
use core_test_support::message_texts;
use core_test_support::prompt_end;
use core_test_support::thought_chunk;
use core_test_support::user_chunk;
use core_test_support::wait_for_state;
use pretty_assertions::assert_eq;
use tether_core::feed::FeedItem;
use tether_core::session::SessionLifecycle;
use tether_protocol::ContentBlock;
use tether_protocol::MessageRole;
use tether_protocol::MessageVariant;
use tether_protocol::TerminalId;
use tether_protocol::events::SessionErrorEvent;
use tether_protocol::events::SessionEvent;
use tether_protocol::events::SessionExitEvent;
use tether_protocol::events::StopReason;
use tether_protocol::events::TerminalOutputEvent;

#[tokio::test]
async fn chunks_stream_into_one_message_until_the_role_changes() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k); // registers the session

    h.store.handle_event(&k, agent_chunk("Hel"));
    h.store.handle_event(&k, agent_chunk("lo"));
    h.store.handle_event(&k, user_chunk("typed meanwhile"));
    h.store.handle_event(&k, agent_chunk(" again"));

    let state = h.store.snapshot(&k);
    assert_eq!(
        message_texts(&state),
        vec!["Hello", "typed meanwhile", " again"]
    );
}

#[tokio::test]
async fn thought_streams_never_merge_with_answers() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store.handle_event(&k, thought_chunk("pondering"));
    h.store.handle_event(&k, agent_chunk("answer"));
    h.store.handle_event(&k, thought_chunk(" more"));

    let state = h.store.snapshot(&k);
    assert_eq!(message_texts(&state), vec!["pondering", "answer", " more"]);
    let FeedItem::Message(first) = &state.feed[0] else {
        panic!("expected message, got {:?}", state.feed[0]);
    };
    assert_eq!(first.role, MessageRole::Assistant);
    assert_eq!(first.variant, Some(MessageVariant::Thought));
}

#[tokio::test]
async fn complete_messages_start_their_own_feed_item() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store.handle_event(&k, agent_chunk("streaming"));
    h.store.handle_event(&k, agent_message("already complete"));

    let state = h.store.snapshot(&k);
    assert_eq!(message_texts(&state), vec!["streaming", "already complete"]);
    let FeedItem::Message(streamed) = &state.feed[0] else {
        panic!("expected message");
    };
    assert!(streamed.streaming);
    let FeedItem::Message(complete) = &state.feed[1] else {
        panic!("expected message");
    };
    assert!(!complete.streaming);
}

#[tokio::test]
async fn prompt_end_finalizes_streaming_messages() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store.handle_event(&k, agent_chunk("partial"));
    h.store.handle_event(&k, prompt_end(StopReason::EndTurn));

    let state = h.store.snapshot(&k);
    assert_eq!(message_texts(&state), vec!["partial"]);
    let FeedItem::Message(message) = &state.feed[0] else {
        panic!("expected message");
    };
    assert!(!message.streaming);
}

#[tokio::test]
async fn a_truncated_run_leaves_a_system_notice() {
    let h = harness();
    let k = key("t1", "b1");
    h.backend.queue_prompt_result(Ok(StopReason::MaxTokens));

    let stop = h
        .store
        .send_prompt(
            &k,
            vec![ContentBlock::text("go")],
            vec![ContentBlock::text("go")],
        )
        .await
        .unwrap();

    assert_eq!(stop, StopReason::MaxTokens);
    let state = h.store.snapshot(&k);
    assert_eq!(message_texts(&state), vec!["go", "Run stopped: max_tokens"]);
    let Some(FeedItem::Message(notice)) = state.feed.last() else {
        panic!("expected a notice message");
    };
    assert_eq!(notice.role, MessageRole::Assistant);
    assert_eq!(notice.variant, Some(MessageVariant::System));
}

#[tokio::test]
async fn a_prompt_end_without_a_live_run_adds_no_notice() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store.handle_event(&k, prompt_end(StopReason::Cancelled));

    assert!(message_texts(&h.store.snapshot(&k)).is_empty());
}

#[tokio::test]
async fn the_run_duration_lands_on_the_closing_answer() {
    let h = harness();
    let k = key("t1", "b1");
    let gate = h.backend.hold_prompts();

    let (result, ()) = tokio::join!(
        h.store.send_prompt(
            &k,
            vec![ContentBlock::text("question")],
            vec![ContentBlock::text("question")],
        ),
        async {
            let mut rx = h.store.subscribe(&k);
            wait_for_state(&mut rx, |state| state.running).await;
            h.store.handle_event(&k, agent_chunk("the answer"));
            gate.notify_one();
        }
    );
    result.unwrap();

    let state = h.store.snapshot(&k);
    assert!(!state.running);
    assert!(state.elapsed > std::time::Duration::ZERO);
    let FeedItem::Message(answer) = &state.feed[1] else {
        panic!("expected the answer message");
    };
    assert!(!answer.streaming);
    assert!(answer.elapsed.is_some());
}

#[tokio::test]
async fn terminal_output_appends_per_terminal() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    for (terminal, chunk) in [("term-a", "one\n"), ("term-a", "two\n"), ("term-b", "other")] {
        h.store.handle_event(
            &k,
            SessionEvent::TerminalOutput(TerminalOutputEvent {
                terminal_id: TerminalId::from(terminal),
                chunk: chunk.to_string(),
            }),
        );
    }

    let state = h.store.snapshot(&k);
    assert_eq!(state.terminals[&TerminalId::from("term-a")], "one\ntwo\n");
    assert_eq!(state.terminals[&TerminalId::from("term-b")], "other");
}

#[tokio::test]
async fn errors_and_exits_move_the_lifecycle() {
    let h = harness();
    let k = key("t1", "b1");
    h.store.snapshot(&k);

    h.store.handle_event(
        &k,
        SessionEvent::SessionError(SessionErrorEvent {
            message: "backend crashed".to_string(),
        }),
    );
    assert_eq!(
        h.store.snapshot(&k).lifecycle,
        SessionLifecycle::Error("backend crashed".to_string())
    );

    // The exit keeps the reported reason instead of erasing it.
    h.store.handle_event(
        &k,
        SessionEvent::SessionExit(SessionExitEvent { code: Some(1) }),
    );
    assert_eq!(
        h.store.snapshot(&k).lifecycle,
        SessionLifecycle::Exited("backend crashed".to_string())
    );
}

#[tokio::test]
async fn events_for_unknown_sessions_are_dropped() {
    let h = harness();
    let known = key("t1", "b1");
    let unknown = key("ghost", "b1");
    h.store.snapshot(&known);

    h.store.handle_event(&unknown, agent_chunk("lost"));

    assert_eq!(h.store.list_sessions(), vec![known]);
}
