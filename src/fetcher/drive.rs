use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use super::{is_html, stream_to_file, CloudFileFetcher};

static CONFIRM_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"confirm=([0-9A-Za-z_-]+)").unwrap());

/// Google Drive direct-download fetcher.
///
/// Large files are answered with an HTML interstitial ("can't scan this file
/// for viruses") instead of the bytes; the confirmation link in that page is
/// followed once.
pub struct GoogleDriveFetcher {
    client: reqwest::Client,
}

impl GoogleDriveFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to request {url}"))?
            .error_for_status()
            .context("Drive returned an error status")
    }
}

#[async_trait]
impl CloudFileFetcher for GoogleDriveFetcher {
    async fn fetch(&self, download_url: &str, dest: &Path) -> Result<()> {
        info!(url = %download_url, "Downloading from Google Drive");

        let mut response = self.get(download_url).await?;

        if is_html(&response) {
            let page_url = response.url().clone();
            let body = response
                .text()
                .await
                .context("Failed to read Drive interstitial")?;
            let confirm_url = confirmation_url(&body, &page_url)
                .context("Drive returned an HTML page without a download link")?;

            debug!(url = %confirm_url, "Following Drive download confirmation");
            response = self.get(confirm_url.as_str()).await?;
            if is_html(&response) {
                anyhow::bail!("Drive returned an HTML page instead of the file");
            }
        }

        let written = stream_to_file(response, dest).await?;
        debug!(bytes = written, path = %dest.display(), "Drive download finished");
        Ok(())
    }
}

/// Find the URL that confirms a download from a Drive interstitial page.
///
/// Tried in order: the `download-form` with its hidden inputs, a
/// "download anyway" link, and finally a bare `confirm=` token anywhere in
/// the page (older pages put it in a script).
fn confirmation_url(html: &str, page_url: &Url) -> Option<Url> {
    let document = Html::parse_document(html);

    if let Some(url) = form_confirmation(&document, page_url) {
        return Some(url);
    }
    if let Some(url) = link_confirmation(&document, page_url) {
        return Some(url);
    }

    let token = CONFIRM_TOKEN.captures(html)?;
    let mut url = page_url.clone();
    url.query_pairs_mut().append_pair("confirm", &token[1]);
    Some(url)
}

fn form_confirmation(document: &Html, page_url: &Url) -> Option<Url> {
    let form_selector = Selector::parse("form#download-form").ok()?;
    let input_selector = Selector::parse(r#"input[type="hidden"][name]"#).ok()?;

    let form = document.select(&form_selector).next()?;
    let mut url = page_url.join(form.value().attr("action")?).ok()?;

    let inputs: Vec<ElementRef> = form.select(&input_selector).collect();
    if !inputs.is_empty() {
        let mut query = url.query_pairs_mut();
        for input in inputs {
            let element = input.value();
            if let Some(name) = element.attr("name") {
                query.append_pair(name, element.attr("value").unwrap_or_default());
            }
        }
    }

    Some(url)
}

fn link_confirmation(document: &Html, page_url: &Url) -> Option<Url> {
    let link_selector = Selector::parse(r#"a[href*="export=download"]"#).ok()?;

    document
        .select(&link_selector)
        .filter_map(|link| link.value().attr("href"))
        .find(|href| href.contains("confirm="))
        .and_then(|href| page_url.join(href).ok())
}
