//! Prometheus metrics for observability and monitoring.
//!
//! Metrics are recorded with the `metrics` facade by:
//! - the Store (actions, reducer timing, effect execution, shutdown)
//! - the request orchestrator (accepted/debounced intents, outcomes, latency)
//!
//! Nothing is recorded until a recorder is installed. [`MetricsRecorder`]
//! installs the Prometheus recorder and renders the exposition text; serving
//! that text over HTTP is left to the application.
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_request_runtime::metrics::MetricsRecorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut recorder = MetricsRecorder::new();
//! recorder.install()?;
//!
//! if let Some(text) = recorder.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installs the Prometheus recorder and renders what it collected.
#[derive(Default)]
pub struct MetricsRecorder {
    handle: Option<PrometheusHandle>,
}

impl MetricsRecorder {
    /// Create a recorder that is not installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this logs
    /// a warning and leaves [`MetricsRecorder::handle`] empty.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this recorder was not the one installed.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Store
    describe_counter!("store.actions.total", "Total number of actions reduced by the store");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent reducing one action and its dispatches"
    );
    describe_histogram!("store.effects.count", "Effects spawned per reduced action");
    describe_counter!("store.effects.executed", "Effects executed, labelled by effect type");
    describe_counter!("store.stream.items", "Actions produced by stream effects");
    describe_counter!("store.shutdown.initiated", "Graceful shutdowns started");
    describe_counter!("store.shutdown.completed", "Graceful shutdowns completed in time");
    describe_counter!("store.shutdown.timeout", "Graceful shutdowns that timed out");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );

    // Orchestrator
    describe_counter!(
        "orchestrator.intents.accepted",
        "Intents that started a new attempt, labelled by event type"
    );
    describe_counter!(
        "orchestrator.intents.debounced",
        "Intents dropped because an attempt for the same key was in flight"
    );
    describe_counter!("orchestrator.requests.succeeded", "Attempts that finished successfully");
    describe_counter!(
        "orchestrator.requests.failed",
        "Attempts that failed, labelled by event type and error kind"
    );
    describe_histogram!(
        "orchestrator.request.duration_seconds",
        "Time from Start to Finish of one attempt"
    );
}
