use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_relay::config::Config;
use media_relay::dispatcher::Dispatcher;
use media_relay::fetcher::{build_http_client, GoogleDriveFetcher, TikTokPageFetcher, YtDlp};
use media_relay::platforms::IdentifierExtractor;
use media_relay::storage::MediaStore;
use media_relay::sweeper;
use media_relay::web::{self, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    info!("Starting media-relay");

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(storage_dir = %config.storage_dir.display(), "Configuration loaded");

    if config.accept_invalid_certs {
        warn!("ACCEPT_INVALID_CERTS is enabled: outbound TLS certificates will not be verified");
    }

    // Ensure storage directory exists
    let store = MediaStore::new(config.storage_dir.clone());
    store.ensure_dir().await.with_context(|| {
        format!(
            "Failed to create storage directory: {}",
            config.storage_dir.display()
        )
    })?;
    match store.remove_stale_staging().await {
        Ok(0) => {}
        Ok(removed) => info!(removed, "Removed leftover staging directories"),
        Err(e) => warn!("Failed to clean up staging directories: {e}"),
    }

    // Collaborators
    let client = build_http_client(&config)?;
    let ytdlp = YtDlp::from_config(&config);
    if !ytdlp.is_available().await {
        warn!(path = %config.yt_dlp_path, "yt-dlp not found - platform downloads will fail");
    }

    let mut dispatcher = Dispatcher::new(
        IdentifierExtractor::new(client.clone(), config.resolve_timeout),
        store.clone(),
        Arc::new(GoogleDriveFetcher::new(client.clone())),
        Arc::new(ytdlp),
    )
    .with_download_timeout(config.download_timeout);
    if config.tiktok_fallback_enabled {
        dispatcher = dispatcher.with_tiktok_fallback(Arc::new(TikTokPageFetcher::new(client)));
    }

    let shutdown = CancellationToken::new();

    // Start retention sweeper in background
    let sweeper_handle = if config.sweep_enabled {
        let interval = config.sweep_interval;
        let token = shutdown.clone();
        Some(tokio::spawn(sweeper::run_sweeper(store, interval, token)))
    } else {
        info!("Retention sweeper disabled");
        None
    };

    // Start web server in background
    let shutdown_grace = config.shutdown_grace;
    let state = AppState {
        config: Arc::new(config),
        dispatcher: Arc::new(dispatcher),
    };
    let web_token = shutdown.clone();
    let mut web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(state, web_token.clone()).await {
            error!("Web server error: {e:#}");
            web_token.cancel();
        }
    });

    // Wait for shutdown signal (or the server dying)
    tokio::select! {
        () = shutdown_signal() => {},
        () = shutdown.cancelled() => {},
    }

    info!("Shutting down...");
    shutdown.cancel();

    // serve() bounds its own drain; this is the backstop if it does not return.
    match tokio::time::timeout(shutdown_grace + Duration::from_secs(5), &mut web_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Web server task ended abnormally: {e}"),
        Err(_) => {
            warn!("Web server did not stop in time, aborting");
            web_handle.abort();
        }
    }
    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            warn!("Sweeper task ended abnormally: {e}");
        }
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,media_relay=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
