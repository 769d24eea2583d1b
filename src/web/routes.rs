use axum::body::Body;
use axum::extract::{Host, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use super::AppState;
use crate::dispatcher::{DispatchError, DownloadOutcome};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/download", get(download))
        .route("/get_file/:filename", get(get_file))
        .route("/clean", get(clean))
        .route("/health", get(health))
}

#[derive(Debug, Default, Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<usize>,
}

impl ApiResponse {
    fn failure(status: StatusCode, message: impl Into<String>) -> Response {
        (
            status,
            Json(Self {
                success: false,
                message: message.into(),
                ..Self::default()
            }),
        )
            .into_response()
    }
}

// ========== Download ==========

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    url: Option<String>,
}

async fn download(
    State(state): State<AppState>,
    host: Option<Host>,
    headers: HeaderMap,
    Query(params): Query<DownloadParams>,
) -> Response {
    let url = params.url.unwrap_or_default();

    match state.dispatcher.dispatch(&url).await {
        Ok(outcome) => {
            let base = base_url(&state, host, &headers);
            download_success(&outcome, &base)
        }
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                tracing::error!(url = %url, "Download request failed: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            };
            ApiResponse::failure(status, failure_message(&e))
        }
    }
}

fn download_success(outcome: &DownloadOutcome, base: &str) -> Response {
    let message = match (&outcome.title, outcome.cached) {
        (Some(title), _) => title.clone(),
        (None, true) => "File already downloaded".to_string(),
        (None, false) => "File downloaded successfully".to_string(),
    };

    Json(ApiResponse {
        success: true,
        message,
        file_url: Some(outcome.file_url(base)),
        thumbnail: outcome.thumbnail.clone(),
        deleted: None,
    })
    .into_response()
}

fn failure_message(e: &DispatchError) -> String {
    match e {
        DispatchError::MissingUrl => "Missing url parameter".to_string(),
        DispatchError::UnsupportedPlatform => "This platform is not supported".to_string(),
        DispatchError::NoIdentifier { platform } => {
            format!("Could not extract an identifier from the {platform} link")
        }
        DispatchError::DownloadFailed { reason, .. } => format!("Download failed: {reason}"),
        DispatchError::Storage(_) => "Download failed: storage error".to_string(),
    }
}

/// Base URL for generated file links.
///
/// A configured public base wins; otherwise the request's own host is used,
/// honoring `X-Forwarded-Proto` from a reverse proxy.
fn base_url(state: &AppState, host: Option<Host>, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.public_base_url {
        return base.clone();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|v| matches!(*v, "http" | "https"))
        .unwrap_or("http");
    let host = host.map_or_else(
        || format!("{}:{}", state.config.web_host, state.config.web_port),
        |Host(h)| h,
    );

    format!("{scheme}://{host}")
}

// ========== File Server ==========

async fn get_file(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    let not_found = || ApiResponse::failure(StatusCode::NOT_FOUND, "File not found");

    let Some(path) = state.dispatcher.store().resolve(&filename) else {
        tracing::warn!(filename = %filename, "Rejected file name");
        return not_found();
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return not_found(),
        Err(e) => {
            tracing::error!(path = %path.display(), "Failed to open stored file: {e}");
            return ApiResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
        }
    };

    let len = match file.metadata().await {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return not_found(),
        Err(e) => {
            tracing::error!(path = %path.display(), "Failed to stat stored file: {e}");
            return ApiResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
        }
    };

    let mime_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename.replace('"', "_")),
            ),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

// ========== Maintenance ==========

async fn clean(State(state): State<AppState>) -> Response {
    let store = state.dispatcher.store();

    match store.sweep().await {
        Ok(deleted) => {
            tracing::info!(deleted, "Manual clean removed stored media");
            Json(ApiResponse {
                success: true,
                message: format!(
                    "Deleted {deleted} .mp4 files from {}",
                    store.root().display()
                ),
                deleted: Some(deleted),
                ..ApiResponse::default()
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("Manual clean failed: {e}");
            ApiResponse::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to delete files: {e}"),
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "media relay is running",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
