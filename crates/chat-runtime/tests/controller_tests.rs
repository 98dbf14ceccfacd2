//! Integration tests for the session controller.
//!
//! Validates:
//! - Event ordering: Partials in engine order, exactly one Final, always last
//! - Streaming and final-only modes see the same final result
//! - Cancellation stops the engine after the current increment
//! - Interrupts never leak into a later session
//! - Engine failures carry the session id and still release resources
//! - Session ids are distinct and increasing, including under concurrency

use chat_engine::{DialogueTurn, SamplingParams};
use chat_runtime::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixture {
    engine: Arc<MockEngine>,
    controller: SessionController,
    log: MemorySessionLog,
}

fn fixture(engine: MockEngine) -> Fixture {
    let engine = Arc::new(engine);
    let log = MemorySessionLog::new();
    let controller = SessionController::new(engine.clone()).with_log(Arc::new(log.clone()));
    Fixture {
        engine,
        controller,
        log,
    }
}

fn scripted(pieces: &[&str]) -> MockEngine {
    MockEngine::new().with_script(pieces.iter().copied())
}

fn partial_texts(events: &[StreamEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Partial { text } => Some(text.clone()),
            StreamEvent::Final { .. } => None,
        })
        .collect()
}

fn count_finals(events: &[StreamEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Final { .. }))
        .count()
}

// ---------------------------------------------------------------------------
// Event Ordering
// ---------------------------------------------------------------------------

#[test]
fn streaming_emits_partials_then_one_final() {
    let f = fixture(scripted(&["a", "b", "c"]));
    let run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    let events: Vec<StreamEvent> = run.map(|e| e.unwrap()).collect();

    assert_eq!(partial_texts(&events), vec!["a", "ab", "abc"]);
    assert_eq!(count_finals(&events), 1);
    assert!(matches!(events.last(), Some(StreamEvent::Final { .. })));
}

#[test]
fn final_carries_last_increment() {
    let f = fixture(scripted(&["Hel", "lo"]));
    let history = vec![DialogueTurn::new("Hi", "Hello")];
    let request = GenerationRequest::new("again").with_history(history.clone());
    let events: Vec<StreamEvent> = f
        .controller
        .run_session(request, ResponseMode::Streaming)
        .unwrap()
        .map(|e| e.unwrap())
        .collect();

    match events.last().unwrap() {
        StreamEvent::Final { text, history: h } => {
            assert_eq!(text, "Hello");
            assert_eq!(h.len(), 2);
            assert_eq!(h[0], history[0]);
            assert_eq!(h[1], DialogueTurn::new("again", "Hello"));
        }
        other => panic!("expected Final, got {other:?}"),
    }
}

#[test]
fn final_only_mode_emits_single_event() {
    let f = fixture(scripted(&["x", "y", "z"]));
    let events: Vec<StreamEvent> = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
        .unwrap()
        .map(|e| e.unwrap())
        .collect();

    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Final { text, .. } if text == "xyz"));
    // The engine still ran the whole loop.
    assert_eq!(f.engine.produced_count(), 3);
}

#[test]
fn both_modes_agree_on_final() {
    let streaming = fixture(MockEngine::new());
    let final_only = fixture(MockEngine::new());
    let request = GenerationRequest::new("how are you").with_answer_prefix("Well,");

    let a = streaming
        .controller
        .run_session(request.clone(), ResponseMode::Streaming)
        .unwrap()
        .into_final()
        .unwrap();
    let b = final_only
        .controller
        .run_session(request, ResponseMode::FinalOnly)
        .unwrap()
        .into_final()
        .unwrap();
    assert_eq!(a, b);
    assert!(a.0.starts_with("Well,You said:"));
}

#[test]
fn iterator_is_fused_after_final() {
    let f = fixture(scripted(&["a"]));
    let mut run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    assert!(run.next().is_some());
    assert!(run.next().is_some());
    assert!(run.next().is_none());
    assert!(run.next().is_none());
}

#[test]
fn engine_with_no_output_still_emits_final() {
    // A budget the prompt alone exhausts leaves the engine no room.
    let f = fixture(scripted(&["never"]));
    let history = vec![DialogueTurn::new("old", "turn")];
    let request = GenerationRequest::new("q")
        .with_history(history.clone())
        .with_max_length(1);
    let events: Vec<StreamEvent> = f
        .controller
        .run_session(request, ResponseMode::Streaming)
        .unwrap()
        .map(|e| e.unwrap())
        .collect();

    assert_eq!(
        events,
        vec![StreamEvent::Final {
            text: String::new(),
            history,
        }]
    );
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn interrupt_after_k_increments_finalizes_increment_k() {
    let f = fixture(scripted(&["1", "2", "3", "4", "5", "6"]));
    let mut run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();

    let k = 3;
    for _ in 0..k {
        assert!(matches!(run.next(), Some(Ok(StreamEvent::Partial { .. }))));
    }
    assert_eq!(f.controller.request_interrupt(), 1);

    match run.next() {
        Some(Ok(StreamEvent::Final { text, history })) => {
            assert_eq!(text, "123");
            assert_eq!(history.last().unwrap().response(), "123");
        }
        other => panic!("expected Final, got {other:?}"),
    }
    assert!(run.next().is_none());
    // Increment k + 1 was never requested.
    assert_eq!(f.engine.produced_count(), k);
}

#[test]
fn interrupt_is_logged_and_output_still_recorded() {
    let f = fixture(scripted(&["a", "b"]));
    let mut run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    let id = run.session_id();
    run.next();
    f.controller.request_interrupt();
    run.next();

    assert_eq!(f.log.outputs_for(id), vec!["a".to_string()]);
    assert!(f
        .log
        .records()
        .contains(&LogRecord::Interrupted { sessions: 1 }));
}

#[test]
fn interrupt_before_session_does_not_leak() {
    let f = fixture(scripted(&["a", "b"]));
    // Nothing running: acknowledged, affects nobody.
    assert_eq!(f.controller.request_interrupt(), 0);

    let (text, _) = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap()
        .into_final()
        .unwrap();
    assert_eq!(text, "ab");
}

#[test]
fn interrupt_of_previous_session_does_not_abort_next() {
    let f = fixture(scripted(&["a", "b", "c"]));
    let mut first = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    first.next();
    f.controller.request_interrupt();
    f.controller.request_interrupt();
    assert!(matches!(first.next(), Some(Ok(StreamEvent::Final { .. }))));
    drop(first);

    let (text, _) = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
        .unwrap()
        .into_final()
        .unwrap();
    assert_eq!(text, "abc");
}

#[test]
fn targeted_interrupt_spares_other_sessions() {
    let engine = Arc::new(scripted(&["a", "b", "c"]));
    let controller = SessionController::new(engine.clone()).with_max_sessions(2);

    let mut one = controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    let mut two = controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    one.next();
    two.next();

    assert!(controller.interrupt_session(two.session_id()));
    assert!(matches!(two.next(), Some(Ok(StreamEvent::Final { text, .. })) if text == "a"));

    let rest: Vec<StreamEvent> = one.map(|e| e.unwrap()).collect();
    assert_eq!(partial_texts(&rest), vec!["ab", "abc"]);
}

#[test]
fn cancellation_in_final_only_mode() {
    let f = fixture(scripted(&["a", "b", "c", "d"]).with_delay(Duration::from_millis(50)));
    let run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
        .unwrap();
    let token = run.cancellation_token();

    let worker = std::thread::spawn(move || run.into_final());
    std::thread::sleep(Duration::from_millis(75));
    f.controller.request_interrupt();
    let (text, _) = worker.join().unwrap().unwrap();

    assert!(token.is_cancelled());
    assert!(text.len() < 4, "generation was not cut short: {text:?}");
}

// ---------------------------------------------------------------------------
// Resource Reclamation
// ---------------------------------------------------------------------------

#[test]
fn resources_released_once_on_completion() {
    let f = fixture(scripted(&["a", "b"]));
    let run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    assert_eq!(f.controller.active_sessions(), 1);
    assert_eq!(f.controller.available_slots(), 0);

    let _ = run.into_final().unwrap();
    assert_eq!(f.engine.release_count(), 1);
    assert_eq!(f.controller.active_sessions(), 0);
    assert_eq!(f.controller.available_slots(), 1);
}

#[test]
fn resources_released_when_consumer_drops_early() {
    let f = fixture(scripted(&["a", "b", "c"]));
    let mut run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    let id = run.session_id();
    let token = run.cancellation_token();
    run.next();
    drop(run);

    assert!(token.is_cancelled());
    assert_eq!(f.engine.release_count(), 1);
    assert_eq!(f.controller.available_slots(), 1);
    assert!(f.log.outputs_for(id).is_empty());
}

#[test]
fn abandoned_run_stops_without_output() {
    let pieces = vec!["x"; 40];
    let f = fixture(scripted(&pieces).with_delay(Duration::from_millis(25)));
    let history = vec![DialogueTurn::new("Hi", "Hello")];
    let run = f
        .controller
        .run_session(
            GenerationRequest::new("q").with_history(history.clone()),
            ResponseMode::FinalOnly,
        )
        .unwrap();
    let id = run.session_id();
    let abandon = run.abandon_on_drop();

    let worker = std::thread::spawn(move || run.into_final());
    std::thread::sleep(Duration::from_millis(60));
    drop(abandon);
    let (text, returned_history) = worker.join().unwrap().unwrap();

    assert_eq!(text, "");
    assert_eq!(returned_history, history);
    assert!(f.engine.produced_count() < 40);
    assert!(f.log.outputs_for(id).is_empty());
    assert_eq!(f.engine.release_count(), 1);
    assert_eq!(f.controller.available_slots(), 1);
    assert_eq!(f.controller.active_sessions(), 0);
}

#[test]
fn disarmed_abandon_guard_lets_run_finish() {
    let f = fixture(scripted(&["a", "b"]));
    let run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
        .unwrap();
    let id = run.session_id();
    let _ = run.abandon_on_drop().disarm();

    let (text, _) = run.into_final().unwrap();
    assert_eq!(text, "ab");
    assert_eq!(f.log.outputs_for(id), vec!["ab".to_string()]);
}

#[test]
fn into_final_after_drain_returns_request_history() {
    let f = fixture(scripted(&["a"]));
    let history = vec![DialogueTurn::new("Hi", "Hello")];
    let mut run = f
        .controller
        .run_session(
            GenerationRequest::new("q").with_history(history.clone()),
            ResponseMode::Streaming,
        )
        .unwrap();
    run.by_ref().for_each(drop);

    assert_eq!(run.into_final().unwrap(), (String::new(), history));
}

#[test]
fn engine_failure_mid_stream() {
    let f = fixture(scripted(&["a", "b", "c"]).failing_after(2));
    let run = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    let id = run.session_id();
    let results: Vec<Result<StreamEvent>> = run.collect();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    match &results[2] {
        Err(ChatError::GenerationEngine { session_id, .. }) => assert_eq!(*session_id, id),
        other => panic!("expected engine error, got {other:?}"),
    }
    assert_eq!(f.engine.release_count(), 1);
    assert_eq!(f.controller.active_sessions(), 0);
    assert!(f.log.records().iter().any(|r| matches!(
        r,
        LogRecord::Error { session_id: Some(s), .. } if *s == id
    )));
    assert!(f.log.outputs_for(id).is_empty());
}

#[test]
fn engine_failure_in_final_only_mode_surfaces_error() {
    let f = fixture(scripted(&["a", "b"]).failing_after(1));
    let err = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
        .unwrap()
        .into_final()
        .unwrap_err();
    assert!(matches!(err, ChatError::GenerationEngine { .. }));
    assert_eq!(err.session_id().map(SessionId::get), Some(1));
}

#[test]
fn engine_failure_on_start() {
    let f = fixture(MockEngine::new().failing_on_start());
    let err = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .err()
        .unwrap();

    assert!(matches!(err, ChatError::GenerationEngine { .. }));
    assert!(err.to_string().starts_with("session 1: generation failed"));
    assert_eq!(f.engine.release_count(), 1);
    assert_eq!(f.controller.active_sessions(), 0);
    assert_eq!(f.controller.available_slots(), 1);
}

// ---------------------------------------------------------------------------
// Session Ids & Slots
// ---------------------------------------------------------------------------

#[test]
fn sequential_sessions_get_increasing_ids() {
    let f = fixture(scripted(&["a"]));
    let ids: Vec<u64> = (0..5)
        .map(|_| {
            let run = f
                .controller
                .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
                .unwrap();
            let id = run.session_id().get();
            let _ = run.into_final().unwrap();
            id
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn busy_rejection_allocates_no_id() {
    let f = fixture(scripted(&["a"]));
    let first = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();

    let err = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::Busy(1)));
    drop(first);

    let next = f
        .controller
        .run_session(GenerationRequest::new("q"), ResponseMode::Streaming)
        .unwrap();
    assert_eq!(next.session_id().get(), 2);
}

#[test]
fn concurrent_sessions_get_distinct_ids() {
    let engine = Arc::new(scripted(&["a", "b"]));
    let controller = Arc::new(SessionController::new(engine).with_max_sessions(64));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let controller = Arc::clone(&controller);
            std::thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..8 {
                    let run = controller
                        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
                        .unwrap();
                    ids.push(run.session_id());
                    let _ = run.into_final().unwrap();
                }
                ids
            })
        })
        .collect();

    let mut all = HashSet::new();
    for h in handles {
        let ids = h.join().unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        all.extend(ids);
    }
    assert_eq!(all.len(), 64);
}

#[test]
fn shared_counter_spans_controllers() {
    let counter = Arc::new(SessionCounter::new());
    let a = SessionController::new(Arc::new(scripted(&["a"]))).with_counter(counter.clone());
    let b = SessionController::new(Arc::new(scripted(&["b"]))).with_counter(counter.clone());

    let first = a
        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
        .unwrap();
    let second = b
        .run_session(GenerationRequest::new("q"), ResponseMode::FinalOnly)
        .unwrap();
    assert!(first.session_id() < second.session_id());
    assert_eq!(counter.issued(), 2);
}

// ---------------------------------------------------------------------------
// Budgeting & Audit Trail
// ---------------------------------------------------------------------------

#[test]
fn trim_history_uses_engine_tokenizer() {
    let f = fixture(MockEngine::new());
    let history = vec![
        DialogueTurn::new("one two three", "four five"),
        DialogueTurn::new("six", "seven"),
    ];
    // query = 2 tokens, "sixseven" = 1, "one two threefour five" = 4
    let request = GenerationRequest::new("hello there")
        .with_history(history.clone())
        .with_max_length(5);
    let trimmed = f.controller.trim_history(request).unwrap();
    assert_eq!(trimmed.history(), &history[1..].to_vec());

    let err = f
        .controller
        .trim_history(GenerationRequest::new("a b c d e").with_max_length(5))
        .unwrap_err();
    assert!(matches!(err, ChatError::QueryTooLarge { .. }));
}

#[test]
fn max_length_is_clamped() {
    let request = GenerationRequest::new("q").with_max_length(1_000_000);
    assert_eq!(request.max_length(), MAX_LENGTH);
    assert_eq!(GenerationRequest::new("q").with_max_length(64).max_length(), 64);
}

#[test]
fn inputs_then_output_are_logged() {
    let f = fixture(scripted(&["ok"]));
    let request = GenerationRequest::new("q")
        .with_answer_prefix("A: ")
        .with_max_length(512)
        .with_sampling(SamplingParams {
            top_p: 0.9,
            temperature: 0.5,
        });
    let run = f
        .controller
        .run_session(request, ResponseMode::FinalOnly)
        .unwrap();
    let id = run.session_id();
    let _ = run.into_final().unwrap();

    let records = f.log.records();
    assert_eq!(records.len(), 2);
    match &records[0] {
        LogRecord::Inputs(inputs) => {
            assert_eq!(inputs.session_id, id);
            assert_eq!(inputs.answer_prefix, "A: ");
            assert_eq!(inputs.max_length, 512);
            assert_eq!(inputs.top_p, 0.9);
        }
        other => panic!("expected Inputs, got {other:?}"),
    }
    assert_eq!(
        records[1],
        LogRecord::Output {
            session_id: id,
            response: "A: ok".to_string()
        }
    );
}
