use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{MediaExtractor, MediaMetadata};
use crate::config::Config;
use crate::constants::{DESKTOP_USER_AGENT, MEDIA_EXTENSION};

/// Media extractor backed by the `yt-dlp` binary.
pub struct YtDlp {
    binary: String,
    no_check_certificates: bool,
}

impl YtDlp {
    #[must_use]
    pub fn new(binary: impl Into<String>, no_check_certificates: bool) -> Self {
        Self {
            binary: binary.into(),
            no_check_certificates,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.yt_dlp_path.clone(), config.accept_invalid_certs)
    }

    /// Command-line arguments for downloading `url` to `dest`.
    ///
    /// Always a single mp4 file: no playlist expansion, per-item errors
    /// ignored, and the info JSON printed on stdout after the download.
    #[must_use]
    pub fn build_args(&self, url: &str, dest: &Path) -> Vec<String> {
        let mut args = vec![
            "--format".to_string(),
            MEDIA_EXTENSION.to_string(),
            "--merge-output-format".to_string(),
            MEDIA_EXTENSION.to_string(),
            "--no-playlist".to_string(),
            "--ignore-errors".to_string(),
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--add-header".to_string(),
            format!("User-Agent:{DESKTOP_USER_AGENT}"),
            "--dump-json".to_string(),
            "--no-simulate".to_string(),
            "--output".to_string(),
            dest.to_string_lossy().to_string(),
        ];

        if self.no_check_certificates {
            args.push("--no-check-certificates".to_string());
        }

        // URL goes last
        args.push(url.to_string());
        args
    }

    /// Check if the binary is runnable.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(&self, url: &str, dest: &Path) -> Result<MediaMetadata> {
        let args = self.build_args(url, dest);
        debug!(url = %url, dest = %dest.display(), "Running yt-dlp");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn yt-dlp")?
            .wait_with_output()
            .await
            .context("Failed to wait for yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", stderr.trim());
        }

        let metadata = parse_metadata(&output.stdout);
        if metadata == MediaMetadata::default() {
            warn!(url = %url, "yt-dlp succeeded but printed no metadata");
        }
        Ok(metadata)
    }
}

/// Title and thumbnail from the first info JSON line yt-dlp printed.
fn parse_metadata(stdout: &[u8]) -> MediaMetadata {
    String::from_utf8_lossy(stdout)
        .lines()
        .find_map(|line| serde_json::from_str::<MediaMetadata>(line.trim()).ok())
        .unwrap_or_default()
}
