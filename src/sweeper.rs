//! Background retention sweep of stored media.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::storage::MediaStore;

/// Run a single sweep, logging the outcome. Returns the number of files deleted.
pub async fn sweep_once(store: &MediaStore) -> Option<usize> {
    match store.sweep().await {
        Ok(deleted) => {
            tracing::info!(
                deleted,
                dir = %store.root().display(),
                "Retention sweep removed stored media"
            );
            Some(deleted)
        }
        Err(e) => {
            tracing::error!(dir = %store.root().display(), "Retention sweep failed: {e}");
            None
        }
    }
}

/// Run the sweeper.
/// This task sweeps immediately on start, then at the configured interval.
/// It respects the cancellation token for graceful shutdown.
pub async fn run_sweeper(store: MediaStore, interval: Duration, shutdown: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        dir = %store.root().display(),
        "Starting retention sweeper"
    );

    // Run immediately on startup
    sweep_once(&store).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // Skip the first immediate tick (we already swept)

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_once(&store).await;
            }
            () = shutdown.cancelled() => {
                tracing::info!("Retention sweeper shutting down");
                break;
            }
        }
    }
}
