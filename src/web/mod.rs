mod routes;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::Dispatcher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Bind the configured address and run until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails to bind or crashes.
pub async fn serve(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let host = state.config.web_host.clone();
    let port = state.config.web_port;

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind web server to {host}:{port}"))?;

    serve_on(listener, state, shutdown).await
}

/// Run the server on an already bound listener.
///
/// Once `shutdown` is cancelled, in-flight requests get `config.shutdown_grace`
/// to finish before the server returns anyway.
///
/// # Errors
///
/// Returns an error if the server crashes.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<()> {
    let grace = state.config.shutdown_grace;
    let app = create_app(state);

    info!(addr = %listener.local_addr()?, "Starting HTTP web server");

    let token = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .into_future();

    tokio::select! {
        result = server => result.context("Web server error")?,
        () = drain_deadline(&shutdown, grace) => {
            warn!(
                grace_secs = grace.as_secs(),
                "In-flight requests still running after shutdown grace period, closing"
            );
        }
    }

    Ok(())
}

async fn drain_deadline(shutdown: &CancellationToken, grace: Duration) {
    shutdown.cancelled().await;
    tokio::time::sleep(grace).await;
}

/// Create the main application router.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
