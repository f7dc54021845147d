//! User directory binary
//!
//! Lists users, fetches one (twice, the second Intent is debounced) and
//! renames it against a JSON API.
//!
//! ```text
//! DIRECTORY_URL=https://jsonplaceholder.typicode.com cargo run -p user-directory
//! ```

use anyhow::Context;
use composable_request_core::environment::TransportEnvironment;
use composable_request_http::ReqwestTransport;
use composable_request_runtime::metrics::MetricsRecorder;
use composable_request_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_directory::{
    directory_reducer, fetch_user, fetch_users, rename_user, DirectoryState, FETCH_USER, FETCH_USERS,
    RENAME_USER,
};

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
const WAIT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "user_directory=debug,composable_request_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsRecorder::new();
    metrics.install()?;

    let base_url = std::env::var("DIRECTORY_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let transport = ReqwestTransport::from_env().context("configuring HTTP transport")?;
    let env = TransportEnvironment::new(Arc::new(transport));
    let store = Store::new(DirectoryState::default(), directory_reducer(&base_url), env);

    tracing::info!(%base_url, "User directory started");

    let finish = store
        .send_and_wait_for(fetch_users(), |a| a.is_finish_of(FETCH_USERS), WAIT)
        .await?;
    match finish.error() {
        Some(error) => println!("Listing failed: {error}"),
        None => println!("Listed {} users", store.state(|s| s.users.len()).await),
    }

    // The second Intent arrives while the first attempt is in flight.
    let _ = store.send(fetch_user(1)).await?;
    let finish = store
        .send_and_wait_for(fetch_user(1), |a| a.is_finish_of(FETCH_USER), WAIT)
        .await?;
    if let Some(user) = store.state(|s| s.users.get(&1).cloned()).await {
        println!("User 1: {} <{}> (failed: {})", user.name, user.email, finish.error().is_some());
    }

    let finish = store
        .send_and_wait_for(rename_user(1, "Ada Lovelace"), |a| a.is_finish_of(RENAME_USER), WAIT)
        .await?;
    match finish.error() {
        Some(error) => println!("Rename failed: {error}"),
        None => println!("Renamed user 1"),
    }

    if let Some(text) = metrics.render() {
        println!("\n{text}");
    }

    store.graceful_shutdown().await?;
    Ok(())
}
