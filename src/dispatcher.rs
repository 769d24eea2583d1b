//! Download Dispatcher: route a URL to a collaborator and store the result.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::DRIVE_DOWNLOAD_BASE;
use crate::fetcher::{CloudFileFetcher, MediaExtractor, MediaMetadata};
use crate::identifier::MediaIdentifier;
use crate::locks::IdentifierLocks;
use crate::platforms::{IdentifierExtractor, Platform, PlatformRegistry, PLATFORMS};
use crate::storage::{MediaStore, StagingDir};

/// Why a dispatch did not produce a stored file.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("missing url parameter")]
    MissingUrl,
    #[error("unsupported platform")]
    UnsupportedPlatform,
    #[error("could not extract an identifier from the {platform} link")]
    NoIdentifier { platform: &'static str },
    #[error("download failed for {identifier}: {reason}")]
    DownloadFailed {
        identifier: MediaIdentifier,
        reason: String,
    },
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl DispatchError {
    /// Whether the caller sent something unusable (as opposed to a server-side failure).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingUrl | Self::UnsupportedPlatform | Self::NoIdentifier { .. }
        )
    }
}

/// A stored file ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub identifier: MediaIdentifier,
    pub platform: Platform,
    pub file_name: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    /// The file already existed and no collaborator was invoked.
    pub cached: bool,
}

impl DownloadOutcome {
    /// Public URL of the stored file under `base_url`.
    #[must_use]
    pub fn file_url(&self, base_url: &str) -> String {
        format!("{}/get_file/{}", base_url.trim_end_matches('/'), self.file_name)
    }
}

/// Routes download requests and owns the per-identifier locks.
pub struct Dispatcher {
    registry: &'static PlatformRegistry,
    extractor: IdentifierExtractor,
    store: MediaStore,
    locks: IdentifierLocks,
    cloud: Arc<dyn CloudFileFetcher>,
    media: Arc<dyn MediaExtractor>,
    tiktok_fallback: Option<Arc<dyn MediaExtractor>>,
    download_timeout: Option<Duration>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        extractor: IdentifierExtractor,
        store: MediaStore,
        cloud: Arc<dyn CloudFileFetcher>,
        media: Arc<dyn MediaExtractor>,
    ) -> Self {
        Self {
            registry: &PLATFORMS,
            extractor,
            store,
            locks: IdentifierLocks::new(),
            cloud,
            media,
            tiktok_fallback: None,
            download_timeout: None,
        }
    }

    /// Extractor to try once when the primary one fails on a TikTok URL.
    #[must_use]
    pub fn with_tiktok_fallback(mut self, fallback: Arc<dyn MediaExtractor>) -> Self {
        self.tiktok_fallback = Some(fallback);
        self
    }

    /// Upper bound on each collaborator call.
    #[must_use]
    pub fn with_download_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.download_timeout = timeout;
        self
    }

    #[must_use]
    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    /// Download `url` unless a file for its identifier is already stored.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] describing why no file is available.
    pub async fn dispatch(&self, url: &str) -> Result<DownloadOutcome, DispatchError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DispatchError::MissingUrl);
        }

        let platform = self
            .registry
            .find_platform(url)
            .ok_or(DispatchError::UnsupportedPlatform)?;

        let identifier = match self.extractor.extract(url, platform).await {
            Some(id) => id,
            None if platform.uses_media_extractor() => {
                let id = MediaIdentifier::from_timestamp();
                debug!(url = %url, identifier = %id, "No identifier in URL, using timestamp");
                id
            }
            None => {
                return Err(DispatchError::NoIdentifier {
                    platform: platform.id(),
                })
            }
        };

        let _guard = self.locks.acquire(&identifier).await;

        let file_name = identifier.file_name();
        if self.store.contains(&identifier).await {
            info!(identifier = %identifier, platform = platform.id(), "Already downloaded");
            return Ok(DownloadOutcome {
                identifier,
                platform,
                file_name,
                title: None,
                thumbnail: None,
                cached: true,
            });
        }

        let staging = self.store.staging()?;
        let metadata = if platform.uses_media_extractor() {
            self.run_media_extractor(url, &identifier, &staging).await
        } else {
            self.run_cloud_fetcher(&identifier, &staging).await
        };

        let Some(produced) = staging.produced_file(&identifier).await else {
            let reason = metadata
                .err()
                .map_or_else(|| "no file was produced".to_string(), |e| format!("{e:#}"));
            warn!(identifier = %identifier, platform = platform.id(), reason = %reason, "Download failed");
            return Err(DispatchError::DownloadFailed { identifier, reason });
        };

        self.store.commit(&produced, &identifier).await?;
        info!(identifier = %identifier, platform = platform.id(), "Download complete");

        let metadata = metadata.unwrap_or_default();
        Ok(DownloadOutcome {
            identifier,
            platform,
            file_name,
            title: metadata.title.filter(|t| !t.is_empty()),
            thumbnail: metadata.thumbnail.filter(|t| !t.is_empty()),
            cached: false,
        })
    }

    async fn run_cloud_fetcher(
        &self,
        identifier: &MediaIdentifier,
        staging: &StagingDir,
    ) -> Result<MediaMetadata> {
        let download_url = format!("{DRIVE_DOWNLOAD_BASE}?id={identifier}&export=download");
        let dest = staging.path_for(identifier);
        self.bounded(self.cloud.fetch(&download_url, &dest)).await?;
        Ok(MediaMetadata::default())
    }

    async fn run_media_extractor(
        &self,
        url: &str,
        identifier: &MediaIdentifier,
        staging: &StagingDir,
    ) -> Result<MediaMetadata> {
        let dest = staging.path_for(identifier);
        let err = match self.bounded(self.media.extract(url, &dest)).await {
            Ok(metadata) => return Ok(metadata),
            Err(e) => e,
        };
        warn!(url = %url, extractor = self.media.name(), "Extraction failed: {err:#}");

        let Some(fallback) = self
            .tiktok_fallback
            .as_ref()
            .filter(|_| url.to_lowercase().contains("tiktok"))
        else {
            return Err(err);
        };

        // Start the fallback from a clean slate.
        let _ = tokio::fs::remove_file(&dest).await;
        self.bounded(fallback.extract(url, &dest))
            .await
            .map_err(|fallback_err| {
                warn!(url = %url, extractor = fallback.name(), "Fallback failed: {fallback_err:#}");
                err.context(format!("fallback also failed: {fallback_err:#}"))
            })
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.download_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                anyhow::anyhow!("download timed out after {} seconds", limit.as_secs())
            })?,
            None => fut.await,
        }
    }
}
