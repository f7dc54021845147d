//! # User Directory
//!
//! A small directory client built from three orchestrated requests:
//!
//! | Event type     | Request                  | Status            |
//! |----------------|--------------------------|-------------------|
//! | `FETCH_USERS`  | `GET  {base}/users`      | single            |
//! | `FETCH_USER`   | `GET  {base}/users/:id`  | keyed by user id  |
//! | `RENAME_USER`  | `PATCH {base}/users/:id` | keyed by user id  |
//!
//! Fetch continuations decode the response body into `UsersLoaded` and
//! `UserLoaded` actions, which [`DirectoryReducer`] stores.
//!
//! ## Example
//!
//! ```no_run
//! use composable_request_core::environment::TransportEnvironment;
//! use composable_request_http::ReqwestTransport;
//! use composable_request_runtime::Store;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use user_directory::{directory_reducer, fetch_users, DirectoryAction, DirectoryState};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let env = TransportEnvironment::new(Arc::new(ReqwestTransport::from_env()?));
//! let store = Store::new(
//!     DirectoryState::default(),
//!     directory_reducer("https://jsonplaceholder.typicode.com"),
//!     env,
//! );
//!
//! store
//!     .send_and_wait_for(fetch_users(), |a| a.is_finish_of("FETCH_USERS"), Duration::from_secs(10))
//!     .await?;
//! let count = store.state(|s| s.users.len()).await;
//! # Ok(())
//! # }
//! ```

use composable_request_core::composition::{combine_reducers, scope_reducer, CombinedReducer};
use composable_request_core::effect::Effect;
use composable_request_core::environment::TransportEnvironment;
use composable_request_core::error::HttpError;
use composable_request_core::event::{EventType, HttpActionCreator, HttpActionEnvelope, HttpEvent, HttpPayload, Step};
use composable_request_core::orchestrator::{ContinuationContext, ContinuationStream, RequestOrchestrator};
use composable_request_core::reducer::Reducer;
use composable_request_core::status::{
    select_keyed, select_single, KeyedStatusReducer, RequestStatus, SingleStatusReducer, StatusMap,
};
use composable_request_core::{smallvec, SmallVec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event type of the listing request
pub const FETCH_USERS: &str = "FETCH_USERS";
/// Event type of the single user request
pub const FETCH_USER: &str = "FETCH_USER";
/// Event type of the rename request
pub const RENAME_USER: &str = "RENAME_USER";

/// A directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Contact address
    #[serde(default)]
    pub email: String,
}

/// Path parameters addressing one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserId {
    /// User id
    pub id: u64,
}

/// Body of a rename request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    /// New display name
    pub name: String,
}

/// Directory actions
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryAction {
    /// Lifecycle of the listing request
    FetchUsers(HttpEvent<(), ()>),
    /// Lifecycle of a single user request
    FetchUser(HttpEvent<UserId, ()>),
    /// Lifecycle of a rename request
    RenameUser(HttpEvent<UserId, Rename>),
    /// The listing was decoded
    UsersLoaded(Vec<User>),
    /// One user was decoded
    UserLoaded(User),
}

impl DirectoryAction {
    /// Event type and step of a lifecycle action
    #[must_use]
    pub fn lifecycle(&self) -> Option<(&EventType, Step)> {
        match self {
            Self::FetchUsers(event) => Some((event.event_type(), event.step())),
            Self::FetchUser(event) => Some((event.event_type(), event.step())),
            Self::RenameUser(event) => Some((event.event_type(), event.step())),
            Self::UsersLoaded(_) | Self::UserLoaded(_) => None,
        }
    }

    /// Whether this is the Finish event of `event_type`
    #[must_use]
    pub fn is_finish_of(&self, event_type: &str) -> bool {
        self.lifecycle()
            .is_some_and(|(ty, step)| ty.as_str() == event_type && step == Step::Finish)
    }

    /// The failure carried by a Fail event
    #[must_use]
    pub fn error(&self) -> Option<&HttpError> {
        match self {
            Self::FetchUsers(event) => event.error(),
            Self::FetchUser(event) => event.error(),
            Self::RenameUser(event) => event.error(),
            Self::UsersLoaded(_) | Self::UserLoaded(_) => None,
        }
    }
}

macro_rules! envelope {
    ($variant:ident, $params:ty, $request:ty) => {
        impl HttpActionEnvelope<$params, $request> for DirectoryAction {
            fn extract(&self) -> Option<&HttpEvent<$params, $request>> {
                match self {
                    Self::$variant(event) => Some(event),
                    _ => None,
                }
            }

            fn embed(event: HttpEvent<$params, $request>) -> Self {
                Self::$variant(event)
            }
        }
    };
}

envelope!(FetchUsers, (), ());
envelope!(FetchUser, UserId, ());
envelope!(RenameUser, UserId, Rename);

/// Directory state
#[derive(Debug, Clone, Default)]
pub struct DirectoryState {
    /// Known users by id
    pub users: BTreeMap<u64, User>,
    /// Status of the listing request
    pub listing: RequestStatus,
    /// Status of single user requests
    pub fetching: StatusMap<u64>,
    /// Status of rename requests
    pub renaming: StatusMap<u64>,
}

/// Stores decoded users
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryReducer;

impl Reducer for DirectoryReducer {
    type State = DirectoryState;
    type Action = DirectoryAction;
    type Environment = TransportEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            DirectoryAction::UsersLoaded(users) => {
                state.users = users.into_iter().map(|user| (user.id, user)).collect();
            },
            DirectoryAction::UserLoaded(user) => {
                state.users.insert(user.id, user);
            },
            _ => {},
        }
        smallvec![Effect::None]
    }
}

/// Intent listing every user
#[must_use]
pub fn fetch_users() -> DirectoryAction {
    DirectoryAction::FetchUsers(HttpActionCreator::new(FETCH_USERS).create((), ()))
}

/// Intent fetching one user
#[must_use]
pub fn fetch_user(id: u64) -> DirectoryAction {
    DirectoryAction::FetchUser(HttpActionCreator::new(FETCH_USER).create(UserId { id }, ()))
}

/// Intent renaming one user
#[must_use]
pub fn rename_user(id: u64, name: impl Into<String>) -> DirectoryAction {
    DirectoryAction::RenameUser(
        HttpActionCreator::new(RENAME_USER).create(UserId { id }, Rename { name: name.into() }),
    )
}

/// The combined reducer of the directory, requests sent to `base_url`
#[must_use]
pub fn directory_reducer(base_url: &str) -> CombinedReducer<DirectoryState, DirectoryAction, TransportEnvironment> {
    let base = base_url.trim_end_matches('/');

    let list = RequestOrchestrator::<DirectoryState, DirectoryAction, (), (), TransportEnvironment>::get(
        FETCH_USERS,
        &format!("{base}/users"),
        select_single::<DirectoryState, (), ()>(listing),
    )
    .continuation(decode_users)
    .build();

    let fetch = RequestOrchestrator::<DirectoryState, DirectoryAction, UserId, (), TransportEnvironment>::get(
        FETCH_USER,
        &format!("{base}/users/:id"),
        select_keyed(fetching, user_key::<()>),
    )
    .continuation(decode_user)
    .build();

    let rename = RequestOrchestrator::<DirectoryState, DirectoryAction, UserId, Rename, TransportEnvironment>::patch(
        RENAME_USER,
        &format!("{base}/users/:id"),
        select_keyed(renaming, user_key::<Rename>),
    )
    .header("Accept", "application/json")
    .build();

    combine_reducers(vec![
        Box::new(list),
        Box::new(scope_reducer(
            SingleStatusReducer::<DirectoryAction, (), (), TransportEnvironment>::new(FETCH_USERS),
            listing_mut,
        )),
        Box::new(fetch),
        Box::new(scope_reducer(
            KeyedStatusReducer::<DirectoryAction, UserId, (), u64, TransportEnvironment>::new(FETCH_USER, user_key),
            fetching_mut,
        )),
        Box::new(rename),
        Box::new(scope_reducer(
            KeyedStatusReducer::<DirectoryAction, UserId, Rename, u64, TransportEnvironment>::new(RENAME_USER, user_key),
            renaming_mut,
        )),
        Box::new(DirectoryReducer),
    ])
}

fn user_key<Q>(payload: &HttpPayload<UserId, Q>) -> u64 {
    payload.params.id
}

fn listing(state: &DirectoryState) -> &RequestStatus {
    &state.listing
}

fn listing_mut(state: &mut DirectoryState) -> &mut RequestStatus {
    &mut state.listing
}

fn fetching(state: &DirectoryState) -> &StatusMap<u64> {
    &state.fetching
}

fn fetching_mut(state: &mut DirectoryState) -> &mut StatusMap<u64> {
    &mut state.fetching
}

fn renaming(state: &DirectoryState) -> &StatusMap<u64> {
    &state.renaming
}

fn renaming_mut(state: &mut DirectoryState) -> &mut StatusMap<u64> {
    &mut state.renaming
}

fn decode_users(ctx: ContinuationContext<(), ()>) -> ContinuationStream<DirectoryAction> {
    let item = ctx
        .response
        .json::<Vec<User>>()
        .map(DirectoryAction::UsersLoaded)
        .map_err(HttpError::caused_by);
    Box::pin(futures::stream::iter([item]))
}

fn decode_user(ctx: ContinuationContext<UserId, ()>) -> ContinuationStream<DirectoryAction> {
    let item = ctx
        .response
        .json::<User>()
        .map(DirectoryAction::UserLoaded)
        .map_err(HttpError::caused_by);
    Box::pin(futures::stream::iter([item]))
}
