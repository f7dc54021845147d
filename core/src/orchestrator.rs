//! The request orchestrator.
//!
//! A [`RequestOrchestrator`] is a reducer bound to one event type. For every
//! Intent of that type it:
//!
//! 1. reads the request status through its selector,
//! 2. drops the Intent if an attempt for that key is still unresolved,
//! 3. otherwise returns `Effect::Dispatch(Start)` followed by an
//!    `Effect::Stream` that performs the attempt.
//!
//! The attempt stream resolves the address, calls the transport, classifies
//! the outcome, forwards the continuation's events on success and ends with
//! exactly one Finish event.
//!
//! Because `Dispatch` is reduced before the store releases its lock, the
//! status reducer has marked the key pending before any later Intent for
//! that key can be reduced: the debounce check and the Start transition are
//! one atomic step. Attempts for different keys run as independent tasks.

use crate::effect::{Effect, EffectStream};
use crate::environment::RequestEnvironment;
use crate::error::HttpError;
use crate::event::{EventType, HttpActionEnvelope, HttpEvent, HttpPayload};
use crate::path::PathTemplate;
use crate::reducer::Reducer;
use crate::status::RequestStatus;
use crate::transport::{classify_outcome, HttpRequest, HttpResponse, Method, Transport};
use async_stream::stream;
use futures::{FutureExt, Stream, StreamExt};
use serde::Serialize;
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Reads the status of the key an Intent targets. `None` counts as resolved.
pub type StatusSelector<S, P, Q> =
    Arc<dyn Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync>;

/// Events produced by a continuation; an `Err` item fails the request.
pub type ContinuationStream<A> = Pin<Box<dyn Stream<Item = Result<A, HttpError>> + Send>>;

/// Logic run between a successful response and the Finish event.
pub type Continuation<P, Q, A> =
    Arc<dyn Fn(ContinuationContext<P, Q>) -> ContinuationStream<A> + Send + Sync>;

/// Input handed to a continuation.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuationContext<P, Q> {
    /// Parameters of the Intent
    pub params: P,
    /// Body of the Intent
    pub request: Q,
    /// The successful response
    pub response: HttpResponse,
}

/// Header sent with every orchestrated request.
const JSON_CONTENT_TYPE: (&str, &str) = ("Content-Type", "application/json");

/// Orchestrates the lifecycle of one configured request.
///
/// # Type Parameters
///
/// - `S`: Application state the selector reads
/// - `A`: Application action embedding [`HttpEvent<P, Q>`]
/// - `P`: Path parameters
/// - `Q`: Request body
/// - `E`: Environment providing the transport
///
/// # Example
///
/// ```ignore
/// let orchestrator = RequestOrchestrator::post(
///     "TODOS/CREATE",
///     "https://api.example.com/lists/:list/todos",
///     select_keyed(|s: &AppState| &s.creating, |p: &HttpPayload<ListParams, NewTodo>| p.params.list),
/// )
/// .continuation(|ctx| {
///     Box::pin(futures::stream::iter([ctx
///         .response
///         .json::<Todo>()
///         .map(AppAction::TodoCreated)
///         .map_err(HttpError::caused_by)]))
/// })
/// .build();
/// ```
pub struct RequestOrchestrator<S, A, P, Q, E> {
    event_type: EventType,
    method: Method,
    template: Arc<PathTemplate>,
    headers: Arc<[(String, String)]>,
    selector: StatusSelector<S, P, Q>,
    continuation: Option<Continuation<P, Q, A>>,
    _environment: PhantomData<fn(&E)>,
}

impl<S, A, P, Q, E> RequestOrchestrator<S, A, P, Q, E> {
    /// Start configuring an orchestrator
    ///
    /// The path template is compiled here, once.
    pub fn builder<F>(
        event_type: impl Into<EventType>,
        method: Method,
        path: &str,
        selector: F,
    ) -> RequestOrchestratorBuilder<S, A, P, Q, E>
    where
        F: Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static,
    {
        RequestOrchestratorBuilder {
            event_type: event_type.into(),
            method,
            template: PathTemplate::compile(path),
            headers: vec![(JSON_CONTENT_TYPE.0.to_string(), JSON_CONTENT_TYPE.1.to_string())],
            selector: Arc::new(selector),
            continuation: None,
            _environment: PhantomData,
        }
    }

    /// Configure a `GET` request
    pub fn get<F>(
        event_type: impl Into<EventType>,
        path: &str,
        selector: F,
    ) -> RequestOrchestratorBuilder<S, A, P, Q, E>
    where
        F: Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static,
    {
        Self::builder(event_type, Method::Get, path, selector)
    }

    /// Configure a `PUT` request
    pub fn put<F>(
        event_type: impl Into<EventType>,
        path: &str,
        selector: F,
    ) -> RequestOrchestratorBuilder<S, A, P, Q, E>
    where
        F: Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static,
    {
        Self::builder(event_type, Method::Put, path, selector)
    }

    /// Configure a `POST` request
    pub fn post<F>(
        event_type: impl Into<EventType>,
        path: &str,
        selector: F,
    ) -> RequestOrchestratorBuilder<S, A, P, Q, E>
    where
        F: Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static,
    {
        Self::builder(event_type, Method::Post, path, selector)
    }

    /// Configure a `DELETE` request
    pub fn delete<F>(
        event_type: impl Into<EventType>,
        path: &str,
        selector: F,
    ) -> RequestOrchestratorBuilder<S, A, P, Q, E>
    where
        F: Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static,
    {
        Self::builder(event_type, Method::Delete, path, selector)
    }

    /// Configure a `PATCH` request
    pub fn patch<F>(
        event_type: impl Into<EventType>,
        path: &str,
        selector: F,
    ) -> RequestOrchestratorBuilder<S, A, P, Q, E>
    where
        F: Fn(&S, &HttpPayload<P, Q>) -> Option<RequestStatus> + Send + Sync + 'static,
    {
        Self::builder(event_type, Method::Patch, path, selector)
    }

    /// The event type this orchestrator reacts to
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// The configured method
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The compiled path template
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }
}

/// Builder for [`RequestOrchestrator`].
pub struct RequestOrchestratorBuilder<S, A, P, Q, E> {
    event_type: EventType,
    method: Method,
    template: PathTemplate,
    headers: Vec<(String, String)>,
    selector: StatusSelector<S, P, Q>,
    continuation: Option<Continuation<P, Q, A>>,
    _environment: PhantomData<fn(&E)>,
}

impl<S, A, P, Q, E> RequestOrchestratorBuilder<S, A, P, Q, E> {
    /// Run `continuation` after a successful response, before Finish
    ///
    /// Every `Ok` item is forwarded as an event in order. The first `Err`
    /// item stops the continuation and becomes the error of the Fail event;
    /// items already forwarded stay forwarded.
    #[must_use]
    pub fn continuation<F>(mut self, continuation: F) -> Self
    where
        F: Fn(ContinuationContext<P, Q>) -> ContinuationStream<A> + Send + Sync + 'static,
    {
        self.continuation = Some(Arc::new(continuation));
        self
    }

    /// Send an additional header with every request
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Finish configuration
    #[must_use]
    pub fn build(self) -> RequestOrchestrator<S, A, P, Q, E> {
        RequestOrchestrator {
            event_type: self.event_type,
            method: self.method,
            template: Arc::new(self.template),
            headers: self.headers.into(),
            selector: self.selector,
            continuation: self.continuation,
            _environment: PhantomData,
        }
    }
}

impl<S, A, P, Q, E> RequestOrchestrator<S, A, P, Q, E>
where
    A: HttpActionEnvelope<P, Q> + Send + 'static,
    P: Serialize + Clone + Send + Sync + 'static,
    Q: Serialize + Clone + Send + Sync + 'static,
{
    /// One attempt: request, classification, continuation, Finish
    fn attempt(&self, payload: HttpPayload<P, Q>, transport: Arc<dyn Transport>) -> EffectStream<A> {
        let event_type = self.event_type.clone();
        let method = self.method;
        let template = Arc::clone(&self.template);
        let headers = Arc::clone(&self.headers);
        let continuation = self.continuation.clone();

        Box::pin(stream! {
            let started = Instant::now();
            let outcome = perform(&template, method, &headers, &payload, transport.as_ref()).await;

            let failure = match outcome {
                Err(error) => Some(error),
                Ok(response) => match continuation {
                    None => None,
                    Some(continuation) => {
                        let context = ContinuationContext {
                            params: payload.params.clone(),
                            request: payload.request.clone(),
                            response,
                        };
                        match std::panic::catch_unwind(AssertUnwindSafe(move || continuation(context))) {
                            Err(panic) => Some(continuation_panicked(&event_type, panic.as_ref())),
                            Ok(mut events) => {
                                let mut failure = None;
                                loop {
                                    match AssertUnwindSafe(events.next()).catch_unwind().await {
                                        Ok(Some(Ok(event))) => yield event,
                                        Ok(Some(Err(error))) => {
                                            failure = Some(error);
                                            break;
                                        },
                                        Ok(None) => break,
                                        Err(panic) => {
                                            failure = Some(continuation_panicked(&event_type, panic.as_ref()));
                                            break;
                                        },
                                    }
                                }
                                failure
                            },
                        }
                    },
                },
            };

            let elapsed = started.elapsed().as_secs_f64();
            metrics::histogram!("orchestrator.request.duration_seconds", "event_type" => event_type.to_string())
                .record(elapsed);

            let finish = match failure {
                None => {
                    tracing::info!(event_type = %event_type, elapsed_secs = elapsed, "Request succeeded");
                    metrics::counter!("orchestrator.requests.succeeded", "event_type" => event_type.to_string())
                        .increment(1);
                    HttpEvent::success(event_type, payload)
                },
                Some(error) => {
                    tracing::warn!(event_type = %event_type, error = %error, "Request failed");
                    metrics::counter!(
                        "orchestrator.requests.failed",
                        "event_type" => event_type.to_string(),
                        "kind" => error.kind()
                    )
                    .increment(1);
                    HttpEvent::fail(event_type, payload, error)
                },
            };

            yield A::embed(finish);
        })
    }
}

/// A panic inside a continuation fails the attempt instead of ending it
fn continuation_panicked(event_type: &EventType, panic: &(dyn Any + Send)) -> HttpError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(event_type = %event_type, panic = %message, "Continuation panicked");
    HttpError::transport(format!("continuation panicked: {message}"))
}

/// Resolve, send and classify one request
async fn perform<P, Q>(
    template: &PathTemplate,
    method: Method,
    headers: &[(String, String)],
    payload: &HttpPayload<P, Q>,
    transport: &dyn Transport,
) -> Result<HttpResponse, HttpError>
where
    P: Serialize,
    Q: Serialize,
{
    let url = template.render_params(&payload.params)?;
    let body = serialize_body(&payload.request)?;

    tracing::debug!(%method, url = %url, has_body = body.is_some(), "Sending request");

    let request = HttpRequest {
        url,
        method,
        headers: headers.to_vec(),
        body,
    };
    classify_outcome(transport.perform(request).await)
}

/// JSON body text, or `None` when the request serializes to `null`
fn serialize_body<Q: Serialize>(request: &Q) -> Result<Option<String>, HttpError> {
    let value = serde_json::to_value(request).map_err(HttpError::caused_by)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(value.to_string()))
}

impl<S, A, P, Q, E> Reducer for RequestOrchestrator<S, A, P, Q, E>
where
    A: HttpActionEnvelope<P, Q> + Send + 'static,
    P: Serialize + Clone + Send + Sync + 'static,
    Q: Serialize + Clone + Send + Sync + 'static,
    E: RequestEnvironment,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let Some(HttpEvent::Intent { event_type, payload }) = action.extract() else {
            return smallvec![Effect::None];
        };
        if *event_type != self.event_type {
            return smallvec![Effect::None];
        }

        if (self.selector)(state, payload).is_some_and(|status| status.is_pending()) {
            tracing::debug!(event_type = %self.event_type, "Attempt in flight, intent dropped");
            metrics::counter!("orchestrator.intents.debounced", "event_type" => self.event_type.to_string())
                .increment(1);
            return smallvec![Effect::None];
        }

        tracing::debug!(event_type = %self.event_type, "Intent accepted");
        metrics::counter!("orchestrator.intents.accepted", "event_type" => self.event_type.to_string())
            .increment(1);

        let payload = payload.clone();
        let start = A::embed(HttpEvent::start(self.event_type.clone(), payload.clone()));

        smallvec![
            Effect::Dispatch(Box::new(start)),
            Effect::Stream(self.attempt(payload, env.transport())),
        ]
    }
}

impl<S, A, P, Q, E> Clone for RequestOrchestrator<S, A, P, Q, E> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type.clone(),
            method: self.method,
            template: Arc::clone(&self.template),
            headers: Arc::clone(&self.headers),
            selector: Arc::clone(&self.selector),
            continuation: self.continuation.clone(),
            _environment: PhantomData,
        }
    }
}

impl<S, A, P, Q, E> fmt::Debug for RequestOrchestrator<S, A, P, Q, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("event_type", &self.event_type)
            .field("method", &self.method)
            .field("template", &self.template.as_str())
            .field("continuation", &self.continuation.is_some())
            .finish_non_exhaustive()
    }
}
