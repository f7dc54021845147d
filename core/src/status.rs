//! Request status tracking.
//!
//! Status reducers observe Start and Finish events of one event type and
//! keep a [`RequestStatus`] per lookup key:
//!
//! - Start → `{ resolved: false }` (previous error cleared)
//! - Finish success → `{ resolved: true }`
//! - Finish fail → `{ resolved: true, error }`
//! - anything else → unchanged
//!
//! Two shapes are provided: [`SingleStatusReducer`] for requests with one
//! logical instance and [`KeyedStatusReducer`] for requests keyed by any
//! hashable value (strings, ids, tuples...).

use crate::effect::Effect;
use crate::error::HttpError;
use crate::event::{EventType, HttpActionEnvelope, HttpEvent, HttpFinish, HttpPayload};
use crate::reducer::Reducer;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Resolution status of one lookup key.
///
/// `resolved == false` means an attempt is in flight. `error` holds the
/// failure of the most recent attempt until the next Start.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestStatus {
    /// No attempt is in flight
    pub resolved: bool,
    /// Failure of the most recent attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HttpError>,
}

impl RequestStatus {
    /// No attempt in flight, no error
    #[must_use]
    pub const fn resolved() -> Self {
        Self {
            resolved: true,
            error: None,
        }
    }

    /// An attempt is in flight
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            resolved: false,
            error: None,
        }
    }

    /// The last attempt failed
    #[must_use]
    pub const fn failed(error: HttpError) -> Self {
        Self {
            resolved: true,
            error: Some(error),
        }
    }

    /// Whether an attempt is in flight
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !self.resolved
    }

    fn apply<P, Q>(&mut self, event: &HttpEvent<P, Q>) {
        match event {
            HttpEvent::Intent { .. } => {},
            HttpEvent::Start { .. } => *self = Self::pending(),
            HttpEvent::Finish {
                outcome: HttpFinish::Success { .. },
                ..
            } => *self = Self::resolved(),
            HttpEvent::Finish {
                outcome: HttpFinish::Fail { error, .. },
                ..
            } => *self = Self::failed(error.clone()),
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        Self::resolved()
    }
}

/// Statuses keyed by lookup key. An absent key has never been started.
pub type StatusMap<K> = HashMap<K, RequestStatus>;

/// Start/Finish event of `event_type` inside `action`, if any
fn lifecycle_event<'a, A, P, Q>(
    event_type: &EventType,
    action: &'a A,
) -> Option<&'a HttpEvent<P, Q>>
where
    A: HttpActionEnvelope<P, Q>,
{
    action
        .extract()
        .filter(|event| event.event_type() == event_type)
        .filter(|event| !matches!(event, HttpEvent::Intent { .. }))
}

/// Status reducer for a request with a single logical instance.
///
/// State is one [`RequestStatus`]; its initial value is resolved.
pub struct SingleStatusReducer<A, P, Q, E> {
    event_type: EventType,
    _marker: PhantomData<fn() -> (A, P, Q, E)>,
}

impl<A, P, Q, E> SingleStatusReducer<A, P, Q, E> {
    /// Track the events of `event_type`
    pub fn new(event_type: impl Into<EventType>) -> Self {
        Self {
            event_type: event_type.into(),
            _marker: PhantomData,
        }
    }

    /// The tracked event type
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }
}

impl<A, P, Q, E> Reducer for SingleStatusReducer<A, P, Q, E>
where
    A: HttpActionEnvelope<P, Q>,
{
    type State = RequestStatus;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if let Some(event) = lifecycle_event(&self.event_type, &action) {
            state.apply(event);
        }
        smallvec![Effect::None]
    }
}

impl<A, P, Q, E> Clone for SingleStatusReducer<A, P, Q, E> {
    fn clone(&self) -> Self {
        Self::new(self.event_type.clone())
    }
}

impl<A, P, Q, E> fmt::Debug for SingleStatusReducer<A, P, Q, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleStatusReducer")
            .field("event_type", &self.event_type)
            .finish()
    }
}

/// Status reducer for a request with one status per lookup key.
///
/// The key function derives the lookup key from the event payload; use
/// `String` keys for named resources and integer keys for indexed ones.
pub struct KeyedStatusReducer<A, P, Q, K, E> {
    event_type: EventType,
    key: fn(&HttpPayload<P, Q>) -> K,
    _marker: PhantomData<fn() -> (A, E)>,
}

impl<A, P, Q, K, E> KeyedStatusReducer<A, P, Q, K, E> {
    /// Track the events of `event_type`, keyed by `key`
    pub fn new(event_type: impl Into<EventType>, key: fn(&HttpPayload<P, Q>) -> K) -> Self {
        Self {
            event_type: event_type.into(),
            key,
            _marker: PhantomData,
        }
    }

    /// The tracked event type
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Lookup key of a payload
    pub fn key_of(&self, payload: &HttpPayload<P, Q>) -> K {
        (self.key)(payload)
    }
}

impl<A, P, Q, K, E> Reducer for KeyedStatusReducer<A, P, Q, K, E>
where
    A: HttpActionEnvelope<P, Q>,
    K: Eq + Hash,
{
    type State = StatusMap<K>;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if let Some(event) = lifecycle_event(&self.event_type, &action) {
            state
                .entry((self.key)(event.payload()))
                .or_default()
                .apply(event);
        }
        smallvec![Effect::None]
    }
}

impl<A, P, Q, K, E> Clone for KeyedStatusReducer<A, P, Q, K, E> {
    fn clone(&self) -> Self {
        Self::new(self.event_type.clone(), self.key)
    }
}

impl<A, P, Q, K, E> fmt::Debug for KeyedStatusReducer<A, P, Q, K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStatusReducer")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

/// Selector for a single status stored in the application state.
pub fn select_single<S, P, Q>(
    get: fn(&S) -> &RequestStatus,
) -> impl Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static
where
    S: 'static,
    P: 'static,
    Q: 'static,
{
    move |state: &S, _payload: &HttpPayload<P, Q>| Some(get(state).clone())
}

/// Selector for a keyed status map stored in the application state.
///
/// An absent key selects `None`, which the orchestrator treats as resolved.
pub fn select_keyed<S, P, Q, K>(
    get: fn(&S) -> &StatusMap<K>,
    key: fn(&HttpPayload<P, Q>) -> K,
) -> impl Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static
where
    S: 'static,
    P: 'static,
    Q: 'static,
    K: Eq + Hash + 'static,
{
    move |state: &S, payload: &HttpPayload<P, Q>| get(state).get(&key(payload)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::HttpResponse;

    type Event = HttpEvent<u64, ()>;

    fn payload(id: u64) -> HttpPayload<u64, ()> {
        HttpPayload::new(id, ())
    }

    #[test]
    fn status_serializes_error_only_when_failed() {
        assert_eq!(
            serde_json::to_value(RequestStatus::pending()).ok(),
            Some(serde_json::json!({"resolved": false}))
        );
        let failed = RequestStatus::failed(HttpError::status(HttpResponse::new(503)));
        assert_eq!(
            serde_json::to_value(failed).ok(),
            Some(serde_json::json!({"resolved": true, "error": {"name": "StatusError", "statusCode": 503}}))
        );
    }

    #[test]
    fn keyed_reducer_exposes_its_key() {
        let reducer = KeyedStatusReducer::<Event, u64, (), u64, ()>::new("TYPE", |p| p.params * 10);
        assert_eq!(reducer.key_of(&payload(5)), 50);
        assert_eq!(reducer.event_type().as_str(), "TYPE");
    }

    #[test]
    fn selectors_read_state() {
        struct App {
            one: RequestStatus,
            many: StatusMap<u64>,
        }
        let mut app = App {
            one: RequestStatus::pending(),
            many: StatusMap::default(),
        };
        app.many.insert(1, RequestStatus::pending());

        let one = select_single::<App, u64, ()>(|s| &s.one);
        assert_eq!(one(&app, &payload(9)), Some(RequestStatus::pending()));

        let many = select_keyed::<App, u64, (), u64>(|s| &s.many, |p| p.params);
        assert_eq!(many(&app, &payload(1)), Some(RequestStatus::pending()));
        assert_eq!(many(&app, &payload(2)), None);
    }
}
