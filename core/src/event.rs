//! The event model of one configured request.
//!
//! For an event type `T` there are three event shapes:
//!
//! | Step   | Type name   | Produced by     |
//! |--------|-------------|-----------------|
//! | Intent | `T`         | application     |
//! | Start  | `T/START`   | orchestrator    |
//! | Finish | `T/FINISH`  | orchestrator    |
//!
//! Finish is either Success or Fail; on the wire the Fail variant carries
//! `"error": true` and its payload carries the [`HttpError`].

use crate::error::HttpError;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

const START_SUFFIX: &str = "/START";
const FINISH_SUFFIX: &str = "/FINISH";

/// Base name of a configured request.
///
/// Cheap to clone; derived names are `T/START` and `T/FINISH`.
///
/// # Examples
///
/// ```
/// use composable_request_core::event::{EventType, Step};
///
/// let users = EventType::new("USERS");
/// assert_eq!(users.start(), "USERS/START");
/// assert_eq!(users.step_of("USERS/FINISH"), Some(Step::Finish));
/// assert_eq!(users.step_of("ALL_USERS/FINISH"), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventType(Arc<str>);

impl EventType {
    /// Create an event type from its base name
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Base name, the type of Intent events
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Type name of Start events
    #[must_use]
    pub fn start(&self) -> String {
        format!("{}{START_SUFFIX}", self.0)
    }

    /// Type name of Finish events
    #[must_use]
    pub fn finish(&self) -> String {
        format!("{}{FINISH_SUFFIX}", self.0)
    }

    /// Which step a type name denotes for this event type, if any
    ///
    /// Matching is exact: a type name that merely contains this base name
    /// belongs to another request.
    #[must_use]
    pub fn step_of(&self, type_name: &str) -> Option<Step> {
        let rest = type_name.strip_prefix(self.as_str())?;
        match rest {
            "" => Some(Step::Intent),
            START_SUFFIX => Some(Step::Start),
            FINISH_SUFFIX => Some(Step::Finish),
            _ => None,
        }
    }

    /// Full type name for a step
    #[must_use]
    pub fn type_name(&self, step: Step) -> String {
        match step {
            Step::Intent => self.as_str().to_string(),
            Step::Start => self.start(),
            Step::Finish => self.finish(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Lifecycle step of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Caller trigger
    Intent,
    /// Attempt started
    Start,
    /// Attempt finished
    Finish,
}

/// Parameters and request body of one request.
///
/// `params` feed the path template and the lookup key; `request` is sent as
/// the JSON body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HttpPayload<P, Q> {
    /// Path parameters
    pub params: P,
    /// Request body
    pub request: Q,
}

impl<P, Q> HttpPayload<P, Q> {
    /// Create a payload
    pub const fn new(params: P, request: Q) -> Self {
        Self { params, request }
    }
}

/// Outcome carried by a Finish event.
#[derive(Clone, Debug, PartialEq)]
pub enum HttpFinish<P, Q> {
    /// The request (and its continuation) succeeded
    Success {
        /// Payload of the Intent
        payload: HttpPayload<P, Q>,
    },
    /// The request failed
    Fail {
        /// Payload of the Intent
        payload: HttpPayload<P, Q>,
        /// Classified failure
        error: HttpError,
    },
}

impl<P, Q> HttpFinish<P, Q> {
    /// Payload of the Intent this attempt belongs to
    pub const fn payload(&self) -> &HttpPayload<P, Q> {
        match self {
            Self::Success { payload } | Self::Fail { payload, .. } => payload,
        }
    }

    /// The failure, if any
    pub const fn error(&self) -> Option<&HttpError> {
        match self {
            Self::Success { .. } => None,
            Self::Fail { error, .. } => Some(error),
        }
    }

    /// Whether this is the Fail variant
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }
}

/// One event of a configured request's lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum HttpEvent<P, Q> {
    /// Request a new attempt
    Intent {
        /// Request this event belongs to
        event_type: EventType,
        /// Parameters and body
        payload: HttpPayload<P, Q>,
    },
    /// An attempt has begun
    Start {
        /// Request this event belongs to
        event_type: EventType,
        /// Parameters and body, unchanged from the Intent
        payload: HttpPayload<P, Q>,
    },
    /// An attempt has ended
    Finish {
        /// Request this event belongs to
        event_type: EventType,
        /// Success or failure
        outcome: HttpFinish<P, Q>,
    },
}

impl<P, Q> HttpEvent<P, Q> {
    /// Build an Intent
    pub fn intent(event_type: impl Into<EventType>, params: P, request: Q) -> Self {
        Self::Intent {
            event_type: event_type.into(),
            payload: HttpPayload::new(params, request),
        }
    }

    /// Build a Start
    pub fn start(event_type: impl Into<EventType>, payload: HttpPayload<P, Q>) -> Self {
        Self::Start {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Build a Success Finish
    pub fn success(event_type: impl Into<EventType>, payload: HttpPayload<P, Q>) -> Self {
        Self::Finish {
            event_type: event_type.into(),
            outcome: HttpFinish::Success { payload },
        }
    }

    /// Build a Fail Finish
    pub fn fail(
        event_type: impl Into<EventType>,
        payload: HttpPayload<P, Q>,
        error: HttpError,
    ) -> Self {
        Self::Finish {
            event_type: event_type.into(),
            outcome: HttpFinish::Fail { payload, error },
        }
    }

    /// Request this event belongs to
    pub const fn event_type(&self) -> &EventType {
        match self {
            Self::Intent { event_type, .. }
            | Self::Start { event_type, .. }
            | Self::Finish { event_type, .. } => event_type,
        }
    }

    /// Lifecycle step
    pub const fn step(&self) -> Step {
        match self {
            Self::Intent { .. } => Step::Intent,
            Self::Start { .. } => Step::Start,
            Self::Finish { .. } => Step::Finish,
        }
    }

    /// Wire type name (`T`, `T/START` or `T/FINISH`)
    pub fn type_name(&self) -> String {
        self.event_type().type_name(self.step())
    }

    /// Parameters and body
    pub const fn payload(&self) -> &HttpPayload<P, Q> {
        match self {
            Self::Intent { payload, .. } | Self::Start { payload, .. } => payload,
            Self::Finish { outcome, .. } => outcome.payload(),
        }
    }

    /// The failure of a Fail Finish
    pub const fn error(&self) -> Option<&HttpError> {
        match self {
            Self::Finish { outcome, .. } => outcome.error(),
            _ => None,
        }
    }

    /// Whether this is a Fail Finish
    pub const fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

impl<P, Q> Serialize for HttpEvent<P, Q>
where
    P: Serialize,
    Q: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let error = self.error();
        let mut map = serializer.serialize_map(Some(if error.is_some() { 3 } else { 2 }))?;
        map.serialize_entry("type", &self.type_name())?;
        match error {
            None => map.serialize_entry("payload", self.payload())?,
            Some(error) => {
                map.serialize_entry(
                    "payload",
                    &FailPayload {
                        payload: self.payload(),
                        error,
                    },
                )?;
                map.serialize_entry("error", &true)?;
            },
        }
        map.end()
    }
}

struct FailPayload<'a, P, Q> {
    payload: &'a HttpPayload<P, Q>,
    error: &'a HttpError,
}

impl<P, Q> Serialize for FailPayload<'_, P, Q>
where
    P: Serialize,
    Q: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FailPayload", 3)?;
        state.serialize_field("params", &self.payload.params)?;
        state.serialize_field("request", &self.payload.request)?;
        state.serialize_field("error", self.error)?;
        state.end()
    }
}

/// How an application action embeds the events of one request.
///
/// Applications usually wrap several requests in one action enum:
///
/// ```ignore
/// enum AppAction {
///     Users(HttpEvent<UserParams, ()>),
///     Rename(HttpEvent<UserParams, Rename>),
/// }
///
/// impl HttpActionEnvelope<UserParams, ()> for AppAction {
///     fn extract(&self) -> Option<&HttpEvent<UserParams, ()>> {
///         match self {
///             Self::Users(event) => Some(event),
///             _ => None,
///         }
///     }
///
///     fn embed(event: HttpEvent<UserParams, ()>) -> Self {
///         Self::Users(event)
///     }
/// }
/// ```
///
/// Events are additionally matched on their [`EventType`], so several
/// requests may share the same parameter and body types.
pub trait HttpActionEnvelope<P, Q>: Sized {
    /// The request event inside this action, if there is one
    fn extract(&self) -> Option<&HttpEvent<P, Q>>;

    /// Wrap a request event into an action
    fn embed(event: HttpEvent<P, Q>) -> Self;
}

impl<P, Q> HttpActionEnvelope<P, Q> for HttpEvent<P, Q> {
    fn extract(&self) -> Option<&HttpEvent<P, Q>> {
        Some(self)
    }

    fn embed(event: HttpEvent<P, Q>) -> Self {
        event
    }
}

/// Builds Intent events for one event type.
///
/// # Examples
///
/// ```
/// use composable_request_core::event::{HttpActionCreator, Step};
///
/// let fetch = HttpActionCreator::<u32, ()>::new("USERS");
/// let intent = fetch.create(7, ());
/// assert_eq!(intent.step(), Step::Intent);
/// assert_eq!(intent.type_name(), "USERS");
/// ```
pub struct HttpActionCreator<P, Q> {
    event_type: EventType,
    _marker: PhantomData<fn(P, Q)>,
}

impl<P, Q> HttpActionCreator<P, Q> {
    /// Create a creator bound to an event type
    pub fn new(event_type: impl Into<EventType>) -> Self {
        Self {
            event_type: event_type.into(),
            _marker: PhantomData,
        }
    }

    /// The bound event type
    pub const fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Build an Intent from parameters and body
    pub fn create(&self, params: P, request: Q) -> HttpEvent<P, Q> {
        self.create_with(HttpPayload::new(params, request))
    }

    /// Build an Intent from a payload
    pub fn create_with(&self, payload: HttpPayload<P, Q>) -> HttpEvent<P, Q> {
        HttpEvent::Intent {
            event_type: self.event_type.clone(),
            payload,
        }
    }
}

impl<P, Q> Clone for HttpActionCreator<P, Q> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type.clone(),
            _marker: PhantomData,
        }
    }
}

impl<P, Q> fmt::Debug for HttpActionCreator<P, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpActionCreator")
            .field("event_type", &self.event_type)
            .finish()
    }
}
