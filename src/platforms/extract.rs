use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::Platform;
use crate::constants::DESKTOP_USER_AGENT;
use crate::identifier::MediaIdentifier;

/// Extract the file id from a Google Drive link.
///
/// Drive links come in two shapes:
/// - `https://drive.google.com/file/d/{ID}/view?usp=sharing`
/// - `https://drive.google.com/uc?id={ID}&export=download`
pub fn extract_file_id(url: &str) -> Option<MediaIdentifier> {
    let raw = if let Some((_, rest)) = url.split_once("/file/d/") {
        rest.split(['/', '?', '&', '#']).next()
    } else if let Some((_, rest)) = url.split_once("id=") {
        rest.split(['&', '#']).next()
    } else {
        None
    }?;
    MediaIdentifier::new(raw)
}

/// Run a platform's ordered patterns against `url`.
pub fn match_patterns(platform: Platform, url: &str) -> Option<MediaIdentifier> {
    platform
        .id_patterns()
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .and_then(|m| MediaIdentifier::new(m.as_str()))
}

/// Link Identifier Extractor.
///
/// Pattern matching is pure; the client is only used to resolve short links
/// whose identifier is hidden behind a redirect.
#[derive(Clone)]
pub struct IdentifierExtractor {
    client: reqwest::Client,
    resolve_timeout: Duration,
}

impl IdentifierExtractor {
    #[must_use]
    pub fn new(client: reqwest::Client, resolve_timeout: Duration) -> Self {
        Self {
            client,
            resolve_timeout,
        }
    }

    /// Best-effort identifier for `url` on `platform`.
    pub async fn extract(&self, url: &str, platform: Platform) -> Option<MediaIdentifier> {
        if platform == Platform::GoogleDrive {
            return extract_file_id(url);
        }

        if let Some(id) = match_patterns(platform, url) {
            return Some(id);
        }

        if platform.is_short_link(url) {
            return self.resolve_and_match(url, platform).await;
        }

        None
    }

    /// Follow redirects from `url` and match the platform patterns against the final URL.
    ///
    /// Network errors are logged and treated as "no identifier".
    pub async fn resolve_and_match(&self, url: &str, platform: Platform) -> Option<MediaIdentifier> {
        match self
            .resolve_redirect(url, platform.requires_ok_on_resolve())
            .await
        {
            Ok(resolved) => {
                debug!(url = %url, resolved = %resolved, platform = platform.id(), "Resolved short link");
                match_patterns(platform, &resolved)
            }
            Err(e) => {
                warn!(url = %url, platform = platform.id(), "Short link resolution failed: {e:#}");
                None
            }
        }
    }

    async fn resolve_redirect(&self, url: &str, require_ok: bool) -> Result<String> {
        let response = self
            .client
            .head(url)
            .header(reqwest::header::USER_AGENT, DESKTOP_USER_AGENT)
            .timeout(self.resolve_timeout)
            .send()
            .await
            .context("Failed to resolve short URL")?;

        if require_ok && response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("short URL resolved with status {}", response.status());
        }

        Ok(response.url().to_string())
    }
}
