//! # Composable Request Testing
//!
//! Testing utilities for applications built on the request orchestrator.
//!
//! This crate provides:
//! - [`MockTransport`]: scripted responses, recorded requests, optional gating
//! - [`EventRecorder`]: collects every action a store broadcasts
//! - [`ReducerTest`]: Given-When-Then reducer tests and effect assertions
//!
//! ## Example
//!
//! ```ignore
//! use composable_request_testing::{EventRecorder, MockTransport};
//!
//! #[tokio::test]
//! async fn fetch_user() {
//!     let transport = Arc::new(MockTransport::with_status(200));
//!     let env = TransportEnvironment::new(transport.clone());
//!     let store = Store::new(AppState::default(), app_reducer(), env);
//!     let recorder = EventRecorder::attach(&store);
//!
//!     store.send(fetch.create(UserParams { id: 7 }, ())).await?;
//!
//!     let events = recorder.wait_for_len(2, Duration::from_secs(1)).await?;
//!     assert_eq!(transport.calls()[0].url, "https://api.example.com/users/7");
//! }
//! ```


pub use reducer_test::{assertions, collect_actions, ReducerTest};

/// Mock implementations of Environment capabilities.
pub mod mocks {
    use composable_request_core::error::TransportError;
    use composable_request_core::transport::{HttpRequest, HttpResponse, Transport, TransportFuture};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    type Outcome = Result<HttpResponse, TransportError>;

    /// Transport that answers from a script instead of the network
    ///
    /// Scripted outcomes are consumed in order; once the script is empty
    /// every request gets the fallback outcome. Every request is recorded.
    ///
    /// A gated transport holds each request until [`MockTransport::release`]
    /// lets it through, which makes "attempt in flight" states deterministic.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_request_testing::MockTransport;
    /// use composable_request_core::transport::HttpResponse;
    ///
    /// let transport = MockTransport::with_status(200);
    /// transport.push_response(HttpResponse::new(404));
    /// assert_eq!(transport.call_count(), 0);
    /// ```
    pub struct MockTransport {
        script: Mutex<VecDeque<Outcome>>,
        fallback: Outcome,
        calls: Mutex<Vec<HttpRequest>>,
        delay: Option<Duration>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockTransport {
        /// Answer every request with `response`
        #[must_use]
        pub fn with_response(response: HttpResponse) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Ok(response),
                calls: Mutex::new(Vec::new()),
                delay: None,
                gate: None,
            }
        }

        /// Answer every request with an empty response of `status`
        #[must_use]
        pub fn with_status(status: u16) -> Self {
            Self::with_response(HttpResponse::new(status))
        }

        /// Fail every request with `error`
        #[must_use]
        pub fn failing(error: TransportError) -> Self {
            Self {
                fallback: Err(error),
                ..Self::with_status(200)
            }
        }

        /// Wait `delay` before answering
        #[must_use]
        pub const fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Hold every request until it is released
        #[must_use]
        pub fn gated(mut self) -> Self {
            self.gate = Some(Arc::new(Semaphore::new(0)));
            self
        }

        /// Let `count` held requests through (no-op when not gated)
        pub fn release(&self, count: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(count);
            }
        }

        /// Queue a response for the next unscripted request
        pub fn push_response(&self, response: HttpResponse) {
            lock(&self.script).push_back(Ok(response));
        }

        /// Queue a transport failure for the next unscripted request
        pub fn push_error(&self, error: TransportError) {
            lock(&self.script).push_back(Err(error));
        }

        /// Every request received so far, in arrival order
        #[must_use]
        pub fn calls(&self) -> Vec<HttpRequest> {
            lock(&self.calls).clone()
        }

        /// Number of requests received so far
        #[must_use]
        pub fn call_count(&self) -> usize {
            lock(&self.calls).len()
        }

        fn next_outcome(&self) -> Outcome {
            lock(&self.script)
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    impl Transport for MockTransport {
        fn perform(&self, request: HttpRequest) -> TransportFuture<'_> {
            tracing::debug!(method = %request.method, url = %request.url, "MockTransport received request");
            lock(&self.calls).push(request);
            let outcome = self.next_outcome();
            let delay = self.delay;
            let gate = self.gate.clone();

            Box::pin(async move {
                if let Some(gate) = gate {
                    match gate.acquire().await {
                        Ok(permit) => permit.forget(),
                        Err(_) => return Err(TransportError::Aborted),
                    }
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                outcome
            })
        }
    }

    impl std::fmt::Debug for MockTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockTransport")
                .field("calls", &self.call_count())
                .field("delay", &self.delay)
                .field("gated", &self.gate.is_some())
                .finish_non_exhaustive()
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observation helpers for running stores.
pub mod recorder {
    use composable_request_core::reducer::Reducer;
    use composable_request_runtime::{Store, StoreError};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::{broadcast, Notify};
    use tokio::task::JoinHandle;

    /// Records every action broadcast by a store
    ///
    /// Attach before sending so nothing is missed. The background task ends
    /// when the recorder is dropped or the store's channel closes.
    pub struct EventRecorder<A> {
        events: Arc<Mutex<Vec<A>>>,
        notify: Arc<Notify>,
        task: JoinHandle<()>,
    }

    impl<A> EventRecorder<A>
    where
        A: Clone + Send + 'static,
    {
        /// Record from a broadcast receiver
        #[must_use]
        pub fn new(mut rx: broadcast::Receiver<A>) -> Self {
            let events = Arc::new(Mutex::new(Vec::new()));
            let notify = Arc::new(Notify::new());

            let task = {
                let events = Arc::clone(&events);
                let notify = Arc::clone(&notify);
                tokio::spawn(async move {
                    loop {
                        match rx.recv().await {
                            Ok(action) => {
                                events
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .push(action);
                                notify.notify_waiters();
                            },
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!(skipped, "EventRecorder lagged");
                            },
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                })
            };

            Self { events, notify, task }
        }

        /// Record every action broadcast by `store`
        #[must_use]
        pub fn attach<S, E, R>(store: &Store<S, A, E, R>) -> Self
        where
            R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
            S: Send + Sync + 'static,
            E: Send + Sync + 'static,
        {
            Self::new(store.subscribe_actions())
        }

        /// Actions recorded so far
        #[must_use]
        pub fn events(&self) -> Vec<A> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Wait until `condition` holds for the recorded actions
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if the condition does not hold in time.
        pub async fn wait_until<F>(&self, condition: F, timeout: Duration) -> Result<Vec<A>, StoreError>
        where
            F: Fn(&[A]) -> bool,
        {
            tokio::time::timeout(timeout, async {
                loop {
                    let notified = self.notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    let events = self.events();
                    if condition(&events) {
                        return events;
                    }
                    notified.await;
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)
        }

        /// Wait until at least `len` actions were recorded
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if fewer actions arrive in time.
        pub async fn wait_for_len(&self, len: usize, timeout: Duration) -> Result<Vec<A>, StoreError> {
            self.wait_until(|events| events.len() >= len, timeout).await
        }
    }

    impl<A> Drop for EventRecorder<A> {
        fn drop(&mut self) {
            self.task.abort();
        }
    }
}

pub use mocks::MockTransport;
pub use recorder::EventRecorder;
