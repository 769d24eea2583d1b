use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info};

use super::{is_html, stream_to_file, MediaExtractor, MediaMetadata};
use crate::constants::DESKTOP_USER_AGENT;

/// Scripts in which TikTok embeds the page state as JSON.
const PAGE_DATA_SCRIPTS: &str = "script#__UNIVERSAL_DATA_FOR_REHYDRATION__, script#SIGI_STATE";

/// Fallback TikTok downloader that reads the video address straight from the
/// embedded page JSON.
///
/// Only used after yt-dlp failed. The body is written only when the CDN
/// answers with a video, never an HTML or JSON error page.
pub struct TikTokPageFetcher {
    client: reqwest::Client,
}

impl TikTokPageFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaExtractor for TikTokPageFetcher {
    fn name(&self) -> &'static str {
        "tiktok-page"
    }

    async fn extract(&self, url: &str, dest: &Path) -> Result<MediaMetadata> {
        info!(url = %url, "Trying TikTok page fallback");

        let page = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, DESKTOP_USER_AGENT)
            .send()
            .await
            .context("Failed to fetch TikTok page")?
            .error_for_status()
            .context("TikTok page returned an error status")?;
        let page_url = page.url().to_string();
        let html = page.text().await.context("Failed to read TikTok page")?;

        let PageVideo {
            video_url,
            title,
            cover,
        } = parse_page(&html).context("No video address found in TikTok page")?;
        let metadata = MediaMetadata {
            title,
            thumbnail: cover,
        };

        debug!(video_url = %video_url, "Found TikTok video address");

        let response = self
            .client
            .get(&video_url)
            .header(reqwest::header::USER_AGENT, DESKTOP_USER_AGENT)
            .header(reqwest::header::REFERER, page_url)
            .send()
            .await
            .context("Failed to request TikTok video")?
            .error_for_status()
            .context("TikTok video returned an error status")?;

        if is_html(&response) || !is_video(&response) {
            anyhow::bail!("TikTok video address did not return a video");
        }

        let written = stream_to_file(response, dest).await?;
        info!(bytes = written, path = %dest.display(), "TikTok page fallback downloaded video");
        Ok(metadata)
    }
}

fn is_video(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("video/") || ct.starts_with("application/octet-stream"))
}

#[derive(Debug, PartialEq, Eq)]
struct PageVideo {
    video_url: String,
    title: Option<String>,
    cover: Option<String>,
}

/// Read the video item out of the page's embedded state.
fn parse_page(html: &str) -> Option<PageVideo> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(PAGE_DATA_SCRIPTS).ok()?;

    document.select(&selector).find_map(|script| {
        let state: Value = serde_json::from_str(&script.text().collect::<String>()).ok()?;
        find_item(&state)
    })
}

/// First object (depth first) whose `video` carries a play or download address.
fn find_item(value: &Value) -> Option<PageVideo> {
    match value {
        Value::Object(map) => {
            if let Some(video) = map.get("video") {
                if let Some(video_url) = first_string(video, ["playAddr", "downloadAddr"]) {
                    return Some(PageVideo {
                        video_url,
                        title: first_string(value, ["desc"]),
                        cover: first_string(video, ["originCover", "cover"]),
                    });
                }
            }
            map.values().find_map(find_item)
        }
        Value::Array(items) => items.iter().find_map(find_item),
        _ => None,
    }
}

fn first_string<const N: usize>(value: &Value, keys: [&str; N]) -> Option<String> {
    keys.into_iter()
        .filter_map(|key| value.get(key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
