//! External collaborators that actually move bytes.
//!
//! The dispatcher only knows the two traits below; the concrete fetchers wrap
//! Google Drive's download endpoint, the `yt-dlp` binary and TikTok's web page.

mod drive;
mod tiktok;
mod ytdlp;

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::constants::DESKTOP_USER_AGENT;

pub use drive::GoogleDriveFetcher;
pub use tiktok::TikTokPageFetcher;
pub use ytdlp::YtDlp;

/// Metadata reported by a media extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// Downloads a file from a cloud-storage direct-download URL.
#[async_trait]
pub trait CloudFileFetcher: Send + Sync {
    /// Write the file behind `download_url` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file could not be fetched or written.
    async fn fetch(&self, download_url: &str, dest: &Path) -> Result<()>;
}

/// Fetches (and if needed remuxes) a video from a platform page URL.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Download the video behind `url` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction fails. A failing extractor may still
    /// have left a usable file at `dest`.
    async fn extract(&self, url: &str, dest: &Path) -> Result<MediaMetadata>;
}

/// Build the outbound HTTP client shared by every collaborator.
///
/// Certificate verification is only relaxed when the configuration says so.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(DESKTOP_USER_AGENT)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .cookie_store(true)
        .build()
        .context("Failed to build HTTP client")
}

/// Stream a response body into a new file at `dest`. Returns bytes written.
async fn stream_to_file(response: reqwest::Response, dest: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("Failed to create {}", dest.display()))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read response body")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

/// Whether a response carries an HTML document rather than a file.
fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"))
}
