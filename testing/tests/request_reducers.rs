//! Orchestrator and status reducers tested in isolation.
//!
//! Reducer outputs are checked with `ReducerTest`; attempt streams are
//! drained with `collect_actions` against a `MockTransport`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_request_core::composition::{combine_reducers, CombinedReducer};
use composable_request_core::environment::TransportEnvironment;
use composable_request_core::error::{HttpError, TransportError};
use composable_request_core::event::{HttpEvent, HttpFinish, HttpPayload, Step};
use composable_request_core::orchestrator::{
    ContinuationContext, ContinuationStream, RequestOrchestrator, RequestOrchestratorBuilder,
};
use composable_request_core::reducer::Reducer;
use composable_request_core::status::{KeyedStatusReducer, RequestStatus, SingleStatusReducer, StatusMap};
use composable_request_core::transport::{HttpResponse, Method};
use composable_request_runtime::Store;
use composable_request_testing::{assertions, collect_actions, MockTransport, ReducerTest};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::assert_ok;

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Params {
    id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Body {
    foo: u32,
}

type Event = HttpEvent<Params, Body>;
type Orchestrator = RequestOrchestrator<RequestStatus, Event, Params, Body, TransportEnvironment>;

fn own_status(status: &RequestStatus, _payload: &HttpPayload<Params, Body>) -> Option<RequestStatus> {
    Some(status.clone())
}

fn orchestrator(path: &str) -> RequestOrchestratorBuilder<RequestStatus, Event, Params, Body, TransportEnvironment> {
    RequestOrchestrator::post("TYPE", path, own_status)
}

fn env(transport: &Arc<MockTransport>) -> TransportEnvironment {
    TransportEnvironment::new(transport.clone())
}

fn intent(id: &str) -> Event {
    HttpEvent::intent("TYPE", Params { id: id.into() }, Body { foo: 1 })
}

fn payload(id: &str) -> HttpPayload<Params, Body> {
    intent(id).payload().clone()
}

/// Every event one Intent produces: Start, continuation events, Finish
async fn attempt(orchestrator: &Orchestrator, transport: &Arc<MockTransport>, action: Event) -> Vec<Event> {
    let mut state = RequestStatus::resolved();
    collect_actions(orchestrator.reduce(&mut state, action, &env(transport))).await
}

fn type_names(events: &[Event]) -> Vec<String> {
    events.iter().map(HttpEvent::type_name).collect()
}

// ============================================================================
// Orchestrator effects
// ============================================================================

#[test]
fn test_accepted_intent_dispatches_start_then_streams_attempt() {
    let transport = Arc::new(MockTransport::with_status(200));

    ReducerTest::new(orchestrator("https://x/:id").build())
        .with_env(env(&transport))
        .given_state(RequestStatus::resolved())
        .when_action(intent("7"))
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 2);
            assertions::assert_dispatches_first(effects, |start| {
                start.step() == Step::Start && start.payload() == &payload("7")
            });
            assertions::assert_has_stream_effect(effects);
        })
        .then_state(|status| assert_eq!(status, &RequestStatus::resolved()))
        .run();

    // The request is only sent once the attempt stream runs.
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_pending_status_drops_intent() {
    let transport = Arc::new(MockTransport::with_status(200));

    ReducerTest::new(orchestrator("https://x/:id").build())
        .with_env(env(&transport))
        .given_state(RequestStatus::pending())
        .when_action(intent("7"))
        .then_effects(assertions::assert_no_effects)
        .then_state(|status| assert!(status.is_pending()))
        .run();
}

#[test]
fn test_other_event_types_and_steps_are_ignored() {
    let transport = Arc::new(MockTransport::with_status(200));

    ReducerTest::new(orchestrator("https://x/:id").build())
        .with_env(env(&transport))
        .given_state(RequestStatus::resolved())
        .when_action(HttpEvent::intent("OTHER", Params { id: "1".into() }, Body { foo: 1 }))
        .then_effects(assertions::assert_no_effects)
        .run();

    ReducerTest::new(orchestrator("https://x/:id").build())
        .with_env(env(&transport))
        .given_state(RequestStatus::resolved())
        .when_action(HttpEvent::start("TYPE", payload("1")))
        .then_effects(|effects| assert!(assertions::dispatched(effects).is_empty()))
        .then_effects(assertions::assert_no_effects)
        .run();
}

// ============================================================================
// Attempts
// ============================================================================

#[tokio::test]
async fn test_attempt_sends_request_and_finishes() {
    let transport = Arc::new(MockTransport::with_status(200));
    let events = attempt(&orchestrator("https://x/:id").build(), &transport, intent("7")).await;

    assert_eq!(type_names(&events), vec!["TYPE/START", "TYPE/FINISH"]);
    assert!(!events[1].is_error());

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, "https://x/7");
    assert_eq!(calls[0].method, Method::Post);
    assert_eq!(calls[0].body.as_deref(), Some(r#"{"foo":1}"#));
    assert_eq!(calls[0].header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_error_status_yields_fail() {
    let transport = Arc::new(MockTransport::with_status(404));
    let events = attempt(&orchestrator("https://x/:id").build(), &transport, intent("7")).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[1].error().and_then(HttpError::status_code), Some(404));
    assert_eq!(
        serde_json::to_value(&events[1]).ok().map(|v| v["error"].clone()),
        Some(json!(true))
    );
}

#[tokio::test]
async fn test_template_failure_is_reported_without_request() {
    let transport = Arc::new(MockTransport::with_status(200));
    let events = attempt(&orchestrator("https://x/:missing").build(), &transport, intent("7")).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].step(), Step::Start);
    let error = events[1].error().unwrap();
    assert!(matches!(error, HttpError::Transport { .. }));
    assert!(error.cause().is_some());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_abort_is_classified() {
    let transport = Arc::new(MockTransport::failing(TransportError::Aborted));
    let events = attempt(&orchestrator("https://x/").build(), &transport, intent("7")).await;

    assert_eq!(events[1].error(), Some(&HttpError::Abort));
}

#[tokio::test]
async fn test_extra_headers_and_no_body_for_unit_request() {
    let transport = Arc::new(MockTransport::with_status(200));
    let ping = RequestOrchestrator::<RequestStatus, HttpEvent<(), ()>, (), (), TransportEnvironment>::get(
        "PING",
        "https://x/ping",
        |s: &RequestStatus, _p: &HttpPayload<(), ()>| Some(s.clone()),
    )
    .header("Authorization", "Bearer token")
    .build();

    let mut state = RequestStatus::resolved();
    let events = collect_actions(ping.reduce(&mut state, HttpEvent::intent("PING", (), ()), &env(&transport))).await;

    assert_eq!(events.len(), 2);
    let calls = transport.calls();
    assert_eq!(calls[0].method, Method::Get);
    assert_eq!(calls[0].body, None);
    assert_eq!(calls[0].header("authorization"), Some("Bearer token"));
}

// ============================================================================
// Continuations
// ============================================================================

#[tokio::test]
async fn test_continuation_events_precede_finish() {
    let transport = Arc::new(MockTransport::with_response(HttpResponse::new(201).with_body("created")));
    let orchestrator = orchestrator("https://x/:id")
        .continuation(|ctx: ContinuationContext<Params, Body>| -> ContinuationStream<Event> {
            assert_eq!(ctx.response.text(), "created");
            let echo = HttpEvent::intent("ECHO", ctx.params, ctx.request);
            Box::pin(futures::stream::iter(vec![Ok(echo)]))
        })
        .build();

    let events = attempt(&orchestrator, &transport, intent("7")).await;

    assert_eq!(type_names(&events), vec!["TYPE/START", "ECHO", "TYPE/FINISH"]);
    assert!(!events[2].is_error());
}

#[tokio::test]
async fn test_continuation_failure_becomes_fail_without_retraction() {
    let transport = Arc::new(MockTransport::with_status(200));
    let orchestrator = orchestrator("https://x/:id")
        .continuation(|ctx: ContinuationContext<Params, Body>| -> ContinuationStream<Event> {
            let echo = HttpEvent::intent("ECHO", ctx.params, ctx.request);
            Box::pin(futures::stream::iter(vec![
                Ok(echo.clone()),
                Err(HttpError::transport("bad body")),
                Ok(echo),
            ]))
        })
        .build();

    let events = attempt(&orchestrator, &transport, intent("7")).await;

    assert_eq!(type_names(&events), vec!["TYPE/START", "ECHO", "TYPE/FINISH"]);
    assert!(matches!(
        &events[2],
        HttpEvent::Finish { outcome: HttpFinish::Fail { error, .. }, .. }
            if error == &HttpError::transport("bad body")
    ));
}

#[tokio::test]
async fn test_continuation_is_skipped_on_failure() {
    let transport = Arc::new(MockTransport::with_status(500));
    let orchestrator = orchestrator("https://x/:id")
        .continuation(|_ctx: ContinuationContext<Params, Body>| -> ContinuationStream<Event> {
            unreachable!("continuation must not run after a failed request")
        })
        .build();

    let events = attempt(&orchestrator, &transport, intent("7")).await;

    assert_eq!(events.len(), 2);
    assert!(events[1].is_error());
}

#[tokio::test]
async fn test_panicking_continuation_fails_the_request() {
    let transport = Arc::new(MockTransport::with_status(200));
    let orchestrator = orchestrator("https://x/:id")
        .continuation(|_ctx: ContinuationContext<Params, Body>| -> ContinuationStream<Event> {
            panic!("decoder exploded")
        })
        .build();

    let events = attempt(&orchestrator, &transport, intent("7")).await;

    assert_eq!(type_names(&events), vec!["TYPE/START", "TYPE/FINISH"]);
    let error = events[1].error().unwrap();
    assert_eq!(error.kind(), "transport");
    assert!(error.to_string().contains("decoder exploded"), "{error}");
}

#[tokio::test]
async fn test_continuation_panicking_mid_stream_keeps_earlier_events() {
    let transport = Arc::new(MockTransport::with_status(200));
    let orchestrator = orchestrator("https://x/:id")
        .continuation(|ctx: ContinuationContext<Params, Body>| -> ContinuationStream<Event> {
            let echo = HttpEvent::intent("ECHO", ctx.params, ctx.request);
            Box::pin(async_stream::stream! {
                yield Ok::<Event, HttpError>(echo);
                panic!("stream exploded");
            })
        })
        .build();

    let events = attempt(&orchestrator, &transport, intent("7")).await;

    assert_eq!(type_names(&events), vec!["TYPE/START", "ECHO", "TYPE/FINISH"]);
    assert!(events[2].error().is_some_and(|e| e.to_string().contains("stream exploded")));
}

#[tokio::test]
async fn test_panicking_continuation_leaves_key_resolved_in_store() {
    let transport = Arc::new(MockTransport::with_status(200));
    let orchestrator = orchestrator("https://x/:id")
        .continuation(|_ctx: ContinuationContext<Params, Body>| -> ContinuationStream<Event> {
            panic!("decoder exploded")
        })
        .build();
    let store = status_store(orchestrator, &transport);

    let mut handle = assert_ok!(store.send(intent("7")).await);
    assert_ok!(handle.wait_with_timeout(Duration::from_secs(2)).await);

    let status = store.state(|s| s.clone()).await;
    assert!(status.resolved);
    assert!(status.error.is_some());

    // A later Intent is accepted, not debounced.
    let mut handle = assert_ok!(store.send(intent("7")).await);
    assert_ok!(handle.wait_with_timeout(Duration::from_secs(2)).await);
    assert_eq!(transport.call_count(), 2);
}

// ============================================================================
// Status reducers
// ============================================================================

#[test]
fn test_single_status_follows_lifecycle() {
    let error = HttpError::status(HttpResponse::new(500));
    let expected = RequestStatus::failed(error.clone());

    ReducerTest::new(SingleStatusReducer::<Event, Params, Body, ()>::new("TYPE"))
        .with_env(())
        .given_state(RequestStatus::default())
        .when_action(HttpEvent::start("TYPE", payload("1")))
        .when_action(HttpEvent::fail("TYPE", payload("1"), error))
        .then_state(move |status| assert_eq!(status, &expected))
        .then_effects(assertions::assert_no_effects)
        .run();

    ReducerTest::new(SingleStatusReducer::<Event, Params, Body, ()>::new("TYPE"))
        .with_env(())
        .given_state(RequestStatus::failed(HttpError::Abort))
        .when_action(HttpEvent::start("TYPE", payload("1")))
        .then_state(|status| assert_eq!(status, &RequestStatus::pending()))
        .run();
}

#[test]
fn test_single_status_ignores_intents_and_other_types() {
    ReducerTest::new(SingleStatusReducer::<Event, Params, Body, ()>::new("TYPE"))
        .with_env(())
        .given_state(RequestStatus::pending())
        .when_action(HttpEvent::success("OTHER", payload("1")))
        .when_action(HttpEvent::success("TYPE/OTHER", payload("1")))
        .when_action(intent("1"))
        .then_state(|status| assert_eq!(status, &RequestStatus::pending()))
        .then_effects(assertions::assert_no_effects)
        .run();
}

fn key(payload: &HttpPayload<Params, Body>) -> String {
    payload.params.id.clone()
}

#[test]
fn test_keyed_status_tracks_keys_independently() {
    ReducerTest::new(KeyedStatusReducer::<Event, Params, Body, String, ()>::new("TYPE", key))
        .with_env(())
        .given_state(StatusMap::default())
        .when_action(HttpEvent::start("TYPE", payload("a")))
        .when_action(HttpEvent::start("TYPE", payload("b")))
        .when_action(HttpEvent::success("TYPE", payload("a")))
        .then_state(|statuses| {
            assert_eq!(statuses.get("a"), Some(&RequestStatus::resolved()));
            assert_eq!(statuses.get("b"), Some(&RequestStatus::pending()));
            assert_eq!(statuses.get("c"), None);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

// ============================================================================
// Delayed transport inside a store
// ============================================================================

type StatusStore = Store<RequestStatus, Event, TransportEnvironment, CombinedReducer<RequestStatus, Event, TransportEnvironment>>;

fn status_store(orchestrator: Orchestrator, transport: &Arc<MockTransport>) -> StatusStore {
    let reducer = combine_reducers(vec![
        Box::new(orchestrator),
        Box::new(SingleStatusReducer::<Event, Params, Body, TransportEnvironment>::new("TYPE")),
    ]);
    Store::new(RequestStatus::default(), reducer, env(transport))
}

#[tokio::test]
async fn test_slow_response_keeps_status_pending_until_finish() {
    let delay = Duration::from_millis(100);
    let transport = Arc::new(MockTransport::with_status(200).with_delay(delay));
    let store = status_store(orchestrator("https://x/:id").build(), &transport);

    let started = Instant::now();
    let mut handle = assert_ok!(store.send(intent("7")).await);
    assert!(store.state(RequestStatus::is_pending).await);

    assert_ok!(handle.wait_with_timeout(Duration::from_secs(2)).await);
    assert!(started.elapsed() >= delay);
    assert_eq!(store.state(|s| s.clone()).await, RequestStatus::resolved());
}
