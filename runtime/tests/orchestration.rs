//! End-to-end tests of request orchestration running inside a Store.
//!
//! Every test wires an orchestrator, a scoped status reducer and an app
//! reducer together with `combine_reducers`, answers requests from a
//! `MockTransport` and observes the broadcast events with an `EventRecorder`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_request_core::composition::{combine_reducers, scope_reducer, CombinedReducer};
use composable_request_core::effect::Effect;
use composable_request_core::environment::TransportEnvironment;
use composable_request_core::error::{HttpError, TransportError};
use composable_request_core::event::{HttpActionEnvelope, HttpEvent, HttpPayload, Step};
use composable_request_core::orchestrator::{ContinuationContext, ContinuationStream, RequestOrchestrator};
use composable_request_core::reducer::Reducer;
use composable_request_core::status::{
    select_keyed, select_single, KeyedStatusReducer, RequestStatus, SingleStatusReducer, StatusMap,
};
use composable_request_core::transport::{HttpResponse, Method};
use composable_request_core::{smallvec, SmallVec};
use composable_request_runtime::Store;
use composable_request_testing::{EventRecorder, MockTransport};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
struct UserParams {
    id: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Profile {
    foo: u32,
}

#[derive(Debug, Deserialize)]
struct SavedBody {
    revision: u32,
}

type SaveEvent = HttpEvent<UserParams, Profile>;
type PingEvent = HttpEvent<(), ()>;

#[derive(Clone, Debug, PartialEq)]
enum AppAction {
    Save(SaveEvent),
    Ping(PingEvent),
    /// Produced by the save continuation
    Saved { id: u64, revision: u32 },
}

impl HttpActionEnvelope<UserParams, Profile> for AppAction {
    fn extract(&self) -> Option<&SaveEvent> {
        match self {
            Self::Save(event) => Some(event),
            _ => None,
        }
    }

    fn embed(event: SaveEvent) -> Self {
        Self::Save(event)
    }
}

impl HttpActionEnvelope<(), ()> for AppAction {
    fn extract(&self) -> Option<&PingEvent> {
        match self {
            Self::Ping(event) => Some(event),
            _ => None,
        }
    }

    fn embed(event: PingEvent) -> Self {
        Self::Ping(event)
    }
}

#[derive(Debug, Default)]
struct AppState {
    saving: StatusMap<u64>,
    ping: RequestStatus,
    revisions: Vec<(u64, u32)>,
}

fn saving(state: &AppState) -> &StatusMap<u64> {
    &state.saving
}

fn saving_mut(state: &mut AppState) -> &mut StatusMap<u64> {
    &mut state.saving
}

fn ping(state: &AppState) -> &RequestStatus {
    &state.ping
}

fn ping_mut(state: &mut AppState) -> &mut RequestStatus {
    &mut state.ping
}

fn save_key(payload: &HttpPayload<UserParams, Profile>) -> u64 {
    payload.params.id
}

/// Decodes the saved revision from the response body
fn decode_revision(ctx: ContinuationContext<UserParams, Profile>) -> ContinuationStream<AppAction> {
    let item = ctx
        .response
        .json::<SavedBody>()
        .map(|body| AppAction::Saved {
            id: ctx.params.id,
            revision: body.revision,
        })
        .map_err(HttpError::caused_by);
    Box::pin(futures::stream::iter([item]))
}

struct AppReducer;

impl Reducer for AppReducer {
    type State = AppState;
    type Action = AppAction;
    type Environment = TransportEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if let AppAction::Saved { id, revision } = action {
            state.revisions.push((id, revision));
        }
        smallvec![Effect::None]
    }
}

type AppStore = Store<AppState, AppAction, TransportEnvironment, CombinedReducer<AppState, AppAction, TransportEnvironment>>;

fn app_reducer(decode: bool) -> CombinedReducer<AppState, AppAction, TransportEnvironment> {
    let mut save = RequestOrchestrator::<AppState, AppAction, UserParams, Profile, TransportEnvironment>::post(
        "SAVE",
        "https://x/:id",
        select_keyed(saving, save_key),
    );
    if decode {
        save = save.continuation(decode_revision);
    }

    let ping_request = RequestOrchestrator::<AppState, AppAction, (), (), TransportEnvironment>::get(
        "PING",
        "https://x/ping",
        select_single::<AppState, (), ()>(ping),
    )
    .build();

    combine_reducers(vec![
        Box::new(save.build()),
        Box::new(scope_reducer(
            KeyedStatusReducer::<AppAction, UserParams, Profile, u64, TransportEnvironment>::new("SAVE", save_key),
            saving_mut,
        )),
        Box::new(ping_request),
        Box::new(scope_reducer(
            SingleStatusReducer::<AppAction, (), (), TransportEnvironment>::new("PING"),
            ping_mut,
        )),
        Box::new(AppReducer),
    ])
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

fn app(transport: &Arc<MockTransport>, decode: bool) -> (AppStore, EventRecorder<AppAction>) {
    init_tracing();
    let env = TransportEnvironment::new(transport.clone());
    let store = Store::new(AppState::default(), app_reducer(decode), env);
    let recorder = EventRecorder::attach(&store);
    (store, recorder)
}

fn save(id: u64) -> AppAction {
    AppAction::Save(HttpEvent::intent("SAVE", UserParams { id }, Profile { foo: 1 }))
}

fn is_save_step(action: &AppAction, step: Step) -> bool {
    matches!(action, AppAction::Save(event) if event.step() == step)
}

fn finishes(events: &[AppAction]) -> Vec<&SaveEvent> {
    events
        .iter()
        .filter_map(|action| match action {
            AppAction::Save(event) if event.step() == Step::Finish => Some(event),
            _ => None,
        })
        .collect()
}

fn is_finish_for(action: &AppAction, id: u64) -> bool {
    matches!(action, AppAction::Save(event) if event.step() == Step::Finish && event.payload().params.id == id)
}

fn count_finishes(events: &[AppAction]) -> usize {
    finishes(events).len()
}

async fn status_of(store: &AppStore, id: u64) -> Option<RequestStatus> {
    store.state(|s| s.saving.get(&id).cloned()).await
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_post_with_rendered_address_and_json_body() {
    let transport = Arc::new(MockTransport::with_response(
        HttpResponse::new(200).with_body(r#"{"revision": 3}"#),
    ));
    let (store, recorder) = app(&transport, true);

    assert_ok!(store.send(save(7)).await);
    let events = assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);

    let types: Vec<String> = events
        .iter()
        .map(|action| match action {
            AppAction::Save(event) => event.type_name(),
            other => format!("{other:?}"),
        })
        .collect();
    assert_eq!(types, vec!["SAVE/START", "Saved { id: 7, revision: 3 }", "SAVE/FINISH"]);
    assert!(!finishes(&events)[0].is_error());

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].url, "https://x/7");
    assert_eq!(calls[0].method, Method::Post);
    assert_eq!(calls[0].body.as_deref(), Some(r#"{"foo":1}"#));
    assert_eq!(calls[0].header("content-type"), Some("application/json"));

    assert_eq!(store.state(|s| s.revisions.clone()).await, vec![(7, 3)]);
    assert_eq!(status_of(&store, 7).await, Some(RequestStatus::resolved()));
}

#[tokio::test]
async fn test_start_is_reduced_before_the_request_is_sent() {
    let transport = Arc::new(MockTransport::with_status(200).gated());
    let (store, recorder) = app(&transport, false);

    assert_ok!(store.send(save(7)).await);

    // Start has been reduced by the time send returns.
    assert_eq!(status_of(&store, 7).await, Some(RequestStatus::pending()));
    assert!(is_save_step(&recorder.wait_for_len(1, TIMEOUT).await.unwrap()[0], Step::Start));

    transport.release(1);
    assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);
    assert_eq!(status_of(&store, 7).await, Some(RequestStatus::resolved()));
}

#[tokio::test]
async fn test_intent_while_pending_is_dropped() {
    let transport = Arc::new(MockTransport::with_status(200).gated());
    let (store, recorder) = app(&transport, false);

    assert_ok!(store.send(save(7)).await);
    let second = assert_ok!(store.send(save(7)).await);
    assert_eq!(second.pending(), 0);

    transport.release(1);
    assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);

    // Give a stray attempt time to surface before counting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = recorder.events();
    assert_eq!(events.iter().filter(|a| is_save_step(a, Step::Start)).count(), 1);
    assert_eq!(count_finishes(&events), 1);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_intent_after_finish_starts_new_attempt() {
    let transport = Arc::new(MockTransport::with_status(200));
    let (store, recorder) = app(&transport, false);

    assert_ok!(store.send(save(7)).await);
    assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);

    assert_ok!(store.send(save(7)).await);
    assert_ok!(recorder.wait_until(|e| count_finishes(e) == 2, TIMEOUT).await);

    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observed_finish_is_already_reduced() {
    let transport = Arc::new(MockTransport::with_status(200));
    let (store, _recorder) = app(&transport, false);

    for id in 0..200 {
        for attempt in 1..=2 {
            // A dropped re-issue never finishes, so this times out.
            let finish = assert_ok!(
                store
                    .send_and_wait_for(save(id), |a| is_finish_for(a, id), TIMEOUT)
                    .await
            );
            assert!(!finishes(std::slice::from_ref(&finish))[0].is_error());
            assert_eq!(
                status_of(&store, id).await,
                Some(RequestStatus::resolved()),
                "status of {id} read stale after Finish of attempt {attempt}"
            );
        }
    }

    assert_eq!(transport.call_count(), 400);
}

#[tokio::test]
async fn test_different_keys_run_independently() {
    let transport = Arc::new(MockTransport::with_status(200).gated());
    let (store, recorder) = app(&transport, false);

    assert_ok!(store.send(save(1)).await);
    assert_ok!(store.send(save(2)).await);

    assert_eq!(status_of(&store, 1).await, Some(RequestStatus::pending()));
    assert_eq!(status_of(&store, 2).await, Some(RequestStatus::pending()));

    transport.release(2);
    let events = assert_ok!(recorder.wait_until(|e| count_finishes(e) == 2, TIMEOUT).await);

    let mut finished: Vec<u64> = finishes(&events).iter().map(|e| e.payload().params.id).collect();
    finished.sort_unstable();
    assert_eq!(finished, vec![1, 2]);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    for (status, failed) in [(200, false), (201, false), (204, false), (399, false), (400, true), (404, true), (503, true)] {
        let transport = Arc::new(MockTransport::with_status(status));
        let (store, recorder) = app(&transport, false);

        assert_ok!(store.send(save(7)).await);
        let events = assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);
        let finish = finishes(&events)[0];

        assert_eq!(finish.is_error(), failed, "status {status}");
        if failed {
            assert_eq!(finish.error().and_then(HttpError::status_code), Some(status));
            let stored = status_of(&store, 7).await.unwrap();
            assert!(stored.resolved);
            assert_eq!(stored.error.and_then(|e| e.status_code()), Some(status));
        }
    }
}

#[tokio::test]
async fn test_failure_is_cleared_by_next_start() {
    let transport = Arc::new(MockTransport::with_status(200).gated());
    transport.push_response(HttpResponse::new(500));
    let (store, recorder) = app(&transport, false);

    transport.release(1);
    assert_ok!(store.send(save(7)).await);
    assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);

    let failed = status_of(&store, 7).await.unwrap();
    assert!(failed.resolved);
    assert_eq!(failed.error.as_ref().and_then(HttpError::status_code), Some(500));

    assert_ok!(store.send(save(7)).await);
    assert_eq!(status_of(&store, 7).await, Some(RequestStatus::pending()));

    transport.release(1);
    assert_ok!(recorder.wait_until(|e| count_finishes(e) == 2, TIMEOUT).await);
    assert_eq!(status_of(&store, 7).await, Some(RequestStatus::resolved()));
}

#[tokio::test]
async fn test_transport_failure_and_abort() {
    let cases = [
        (
            TransportError::Failed("connection refused".into()),
            HttpError::transport("connection refused"),
        ),
        (TransportError::Aborted, HttpError::Abort),
    ];

    for (cause, expected) in cases {
        let transport = Arc::new(MockTransport::failing(cause));
        let (store, recorder) = app(&transport, true);

        assert_ok!(store.send(save(7)).await);
        let events = assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);

        assert_eq!(finishes(&events)[0].error(), Some(&expected));
        // The continuation only runs after a successful response.
        assert!(store.state(|s| s.revisions.is_empty()).await);
    }
}

#[tokio::test]
async fn test_continuation_error_fails_the_request() {
    let transport = Arc::new(MockTransport::with_response(
        HttpResponse::new(200).with_body("not json"),
    ));
    let (store, recorder) = app(&transport, true);

    assert_ok!(store.send(save(7)).await);
    let events = assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);

    let error = finishes(&events)[0].error().cloned();
    assert!(matches!(error, Some(HttpError::Transport { .. })));
    assert!(!events.iter().any(|a| matches!(a, AppAction::Saved { .. })));
    assert_eq!(
        status_of(&store, 7).await.and_then(|s| s.error).map(|e| e.kind()),
        Some("transport")
    );
}

#[tokio::test]
async fn test_unit_request_sends_no_body() {
    let transport = Arc::new(MockTransport::with_status(204));
    let (store, recorder) = app(&transport, false);

    assert_ok!(store.send(AppAction::Ping(HttpEvent::intent("PING", (), ()))).await);
    assert_eq!(store.state(|s| s.ping.clone()).await, RequestStatus::pending());

    let events = assert_ok!(
        recorder
            .wait_until(
                |e| e.iter().any(|a| matches!(a, AppAction::Ping(p) if p.step() == Step::Finish)),
                TIMEOUT,
            )
            .await
    );

    assert_eq!(events.len(), 2);
    let call = &transport.calls()[0];
    assert_eq!(call.url, "https://x/ping");
    assert_eq!(call.method, Method::Get);
    assert_eq!(call.body, None);
    assert_eq!(store.state(|s| s.ping.clone()).await, RequestStatus::resolved());
    // The keyed map of another request is untouched.
    assert!(store.state(|s| s.saving.is_empty()).await);
}

#[tokio::test]
async fn test_missing_path_parameter_fails_without_request() {
    #[derive(Clone, Serialize)]
    struct NoId {
        name: &'static str,
    }

    let orchestrator = RequestOrchestrator::<RequestStatus, HttpEvent<NoId, ()>, NoId, (), TransportEnvironment>::delete(
        "REMOVE",
        "https://x/:id",
        |s: &RequestStatus, _p: &HttpPayload<NoId, ()>| Some(s.clone()),
    )
    .build();
    let reducer = combine_reducers(vec![
        Box::new(orchestrator),
        Box::new(SingleStatusReducer::<_, NoId, (), TransportEnvironment>::new("REMOVE")),
    ]);

    let transport = Arc::new(MockTransport::with_status(200));
    let env = TransportEnvironment::new(transport.clone());
    let store = Store::new(RequestStatus::default(), reducer, env);

    let finish = assert_ok!(
        store
            .send_and_wait_for(
                HttpEvent::intent("REMOVE", NoId { name: "x" }, ()),
                |e| e.step() == Step::Finish,
                TIMEOUT,
            )
            .await
    );

    assert!(matches!(finish.error(), Some(HttpError::Transport { message, .. }) if message.contains("id")));
    assert_eq!(transport.call_count(), 0);
    assert!(store.state(|s| s.resolved && s.error.is_some()).await);
}

#[tokio::test]
async fn test_lifecycle_wire_format() {
    let transport = Arc::new(MockTransport::with_status(404));
    let (store, recorder) = app(&transport, false);

    assert_ok!(store.send(save(7)).await);
    let events = assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);

    let wire: Vec<serde_json::Value> = events
        .iter()
        .filter_map(|action| HttpActionEnvelope::<UserParams, Profile>::extract(action))
        .map(|event| serde_json::to_value(event).unwrap())
        .collect();

    assert_eq!(
        wire,
        vec![
            json!({
                "type": "SAVE/START",
                "payload": {"params": {"id": 7}, "request": {"foo": 1}},
            }),
            json!({
                "type": "SAVE/FINISH",
                "payload": {
                    "params": {"id": 7},
                    "request": {"foo": 1},
                    "error": {"name": "StatusError", "statusCode": 404},
                },
                "error": true,
            }),
        ]
    );
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_attempt() {
    let transport = Arc::new(MockTransport::with_status(200).gated());
    let (store, recorder) = app(&transport, false);

    assert_ok!(store.send(save(7)).await);

    let shutdown = {
        let store = store.clone();
        tokio::spawn(async move { store.shutdown(TIMEOUT).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(store.send(save(8)).await.is_err());

    transport.release(1);
    assert_ok!(shutdown.await.unwrap());

    assert_ok!(recorder.wait_until(|e| count_finishes(e) == 1, TIMEOUT).await);
    assert_eq!(status_of(&store, 7).await, Some(RequestStatus::resolved()));
    assert_eq!(status_of(&store, 8).await, None);
}
