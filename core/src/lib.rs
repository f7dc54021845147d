//! # Composable Request Core
//!
//! Core traits and types for orchestrating declarative HTTP requests.
//!
//! A request is described once (event type, method, path template, status
//! selector, optional continuation) and driven entirely by events:
//!
//! ```text
//! Intent ──► RequestOrchestrator ──(debounced?)──► drop
//!                   │
//!                   ├─► Start   (dispatched inside the same store step)
//!                   ├─► Transport::perform ─► classify
//!                   ├─► continuation events (success only)
//!                   └─► Finish  (Success | Fail)
//! ```
//!
//! Status reducers observe Start/Finish and keep a `RequestStatus` per lookup
//! key; the orchestrator reads that status through its selector to drop
//! Intents for keys that already have an attempt in flight.
//!
//! ## Core Concepts
//!
//! - **State**: Application state, including request statuses
//! - **Action**: Every input to a reducer, including [`event::HttpEvent`]s
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies, most importantly the [`transport::Transport`]
//!
//! ## Example
//!
//! ```ignore
//! use composable_request_core::prelude::*;
//!
//! let users = EventType::new("USERS/FETCH");
//! let orchestrator = RequestOrchestrator::get(
//!     users.clone(),
//!     "https://api.example.com/users/:id",
//!     select_keyed(|s: &AppState| &s.users, |p: &HttpPayload<UserParams, ()>| p.params.id),
//! )
//! .build();
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

pub mod composition;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod path;
pub mod status;
pub mod transport;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all decision logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CounterReducer {
    ///     type State = CounterState;
    ///     type Action = CounterAction;
    ///     type Environment = ();
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut CounterState,
    ///         action: CounterAction,
    ///         _env: &(),
    ///     ) -> SmallVec<[Effect<CounterAction>; 4]> {
    ///         match action {
    ///             CounterAction::Increment => state.count += 1,
    ///         }
    ///         smallvec![Effect::None]
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Inspects the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use futures::{Stream, StreamExt};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    /// Boxed future produced by [`Effect::Future`]
    pub type EffectFuture<Action> = Pin<Box<dyn Future<Output = Option<Action>> + Send>>;

    /// Boxed stream produced by [`Effect::Stream`]
    pub type EffectStream<Action> = Pin<Box<dyn Stream<Item = Action> + Send>>;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Reduce an action immediately, inside the store step that produced it
        ///
        /// The runtime reduces the boxed action before releasing the state lock,
        /// so no other action can observe state between the producing action and
        /// this one. The action is also broadcast to observers.
        Dispatch(Box<Action>),

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(EffectFuture<Action>),

        /// Async sequence of actions
        ///
        /// Each item is broadcast and fully reduced before the next one is polled,
        /// so items reach the reducer in stream order.
        Stream(EffectStream<Action>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Dispatch(action) => {
                    f.debug_tuple("Effect::Dispatch").field(action).finish()
                },
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Check whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }

        /// Lift an effect into a parent action type
        ///
        /// Used when a child reducer's effects must be returned from a parent
        /// reducer whose action type wraps the child's.
        #[must_use]
        pub fn map<B, F>(self, f: F) -> Effect<B>
        where
            Action: Send + 'static,
            B: Send + 'static,
            F: Fn(Action) -> B + Send + Sync + 'static,
        {
            self.map_shared(Arc::new(f))
        }

        fn map_shared<B>(self, f: Arc<dyn Fn(Action) -> B + Send + Sync>) -> Effect<B>
        where
            Action: Send + 'static,
            B: Send + 'static,
        {
            match self {
                Effect::None => Effect::None,
                Effect::Dispatch(action) => Effect::Dispatch(Box::new(f(*action))),
                Effect::Parallel(effects) => Effect::Parallel(
                    effects
                        .into_iter()
                        .map(|e| e.map_shared(Arc::clone(&f)))
                        .collect(),
                ),
                Effect::Sequential(effects) => Effect::Sequential(
                    effects
                        .into_iter()
                        .map(|e| e.map_shared(Arc::clone(&f)))
                        .collect(),
                ),
                Effect::Delay { duration, action } => Effect::Delay {
                    duration,
                    action: Box::new(f(*action)),
                },
                Effect::Future(fut) => Effect::Future(Box::pin(async move { fut.await.map(|a| f(a)) })),
                Effect::Stream(stream) => Effect::Stream(Box::pin(stream.map(move |a| f(a)))),
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use crate::transport::Transport;
    use std::sync::Arc;

    /// Environment required by [`RequestOrchestrator`](crate::orchestrator::RequestOrchestrator)
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - real network
    /// struct AppEnvironment { http: Arc<ReqwestTransport> }
    /// impl RequestEnvironment for AppEnvironment {
    ///     fn transport(&self) -> Arc<dyn Transport> {
    ///         self.http.clone()
    ///     }
    /// }
    ///
    /// // Test - scripted responses
    /// let env = TransportEnvironment::new(Arc::new(MockTransport::with_status(200)));
    /// ```
    pub trait RequestEnvironment: Send + Sync {
        /// The capability used to perform network calls
        fn transport(&self) -> Arc<dyn Transport>;
    }

    /// Environment that only carries a transport
    #[derive(Clone)]
    pub struct TransportEnvironment {
        transport: Arc<dyn Transport>,
    }

    impl TransportEnvironment {
        /// Create an environment around the given transport
        #[must_use]
        pub fn new(transport: Arc<dyn Transport>) -> Self {
            Self { transport }
        }
    }

    impl RequestEnvironment for TransportEnvironment {
        fn transport(&self) -> Arc<dyn Transport> {
            Arc::clone(&self.transport)
        }
    }

    impl std::fmt::Debug for TransportEnvironment {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TransportEnvironment").finish_non_exhaustive()
        }
    }
}

/// Commonly used items in one import
pub mod prelude {
    pub use crate::composition::{combine_reducers, scope_reducer};
    pub use crate::effect::Effect;
    pub use crate::environment::{RequestEnvironment, TransportEnvironment};
    pub use crate::error::{HttpError, TemplateError, TransportError};
    pub use crate::event::{
        EventType, HttpActionCreator, HttpActionEnvelope, HttpEvent, HttpFinish, HttpPayload,
        Step,
    };
    pub use crate::orchestrator::{ContinuationContext, RequestOrchestrator};
    pub use crate::path::PathTemplate;
    pub use crate::reducer::Reducer;
    pub use crate::status::{
        select_keyed, select_single, KeyedStatusReducer, RequestStatus, SingleStatusReducer,
        StatusMap,
    };
    pub use crate::transport::{HttpRequest, HttpResponse, Method, Transport};
    pub use smallvec::{smallvec, SmallVec};
}
