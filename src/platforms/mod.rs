//! Supported source platforms and how identifiers are pulled out of their URLs.

mod extract;
mod registry;

use std::sync::LazyLock;

use regex::Regex;

pub use extract::{extract_file_id, match_patterns, IdentifierExtractor};
pub use registry::PlatformRegistry;

/// Global route table, built once.
pub static PLATFORMS: LazyLock<PlatformRegistry> = LazyLock::new(PlatformRegistry::standard);

/// A platform the relay knows how to fetch from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    GoogleDrive,
    TikTok,
    Facebook,
    YouTube,
    Instagram,
    Douyin,
    Bilibili,
    Twitter,
}

static TIKTOK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"video/(\d+)").unwrap(),
        Regex::new(r"/v/(\w+)").unwrap(),
        Regex::new(r"tiktok\.com/\w+/video/(\d+)").unwrap(),
        Regex::new(r"vm\.tiktok\.com/(\w+)").unwrap(),
        Regex::new(r"vt\.tiktok\.com/(\w+)").unwrap(),
    ]
});

static FACEBOOK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"facebook\.com/reel/(\d+)").unwrap(),
        Regex::new(r"fb\.watch/([a-zA-Z0-9_-]+)").unwrap(),
        Regex::new(r"/reel/(\d+)").unwrap(),
    ]
});

static YOUTUBE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"youtube\.com/shorts/([a-zA-Z0-9_-]+)").unwrap(),
        Regex::new(r"youtu\.be/([a-zA-Z0-9_-]+)").unwrap(),
        Regex::new(r"[?&]v=([a-zA-Z0-9_-]+)").unwrap(),
    ]
});

static INSTAGRAM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"instagram\.com/reel/([a-zA-Z0-9_-]+)").unwrap(),
        Regex::new(r"instagram\.com/p/([a-zA-Z0-9_-]+)").unwrap(),
        Regex::new(r"instagram\.com/tv/([a-zA-Z0-9_-]+)").unwrap(),
    ]
});

static DOUYIN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"douyin\.com/video/(\d+)").unwrap(),
        Regex::new(r"v\.douyin\.com/(\w+)").unwrap(),
    ]
});

static BILIBILI_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| vec![Regex::new(r"/video/([a-zA-Z0-9]+)").unwrap()]);

static TWITTER_PATTERNS: LazyLock<Vec<Regex>> =
    LazyLock::new(|| vec![Regex::new(r"/status/(\d+)").unwrap()]);

impl Platform {
    /// Short stable name, used in logs.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::GoogleDrive => "google_drive",
            Self::TikTok => "tiktok",
            Self::Facebook => "facebook",
            Self::YouTube => "youtube",
            Self::Instagram => "instagram",
            Self::Douyin => "douyin",
            Self::Bilibili => "bilibili",
            Self::Twitter => "twitter",
        }
    }

    /// Ordered identifier patterns; the first match's first capture group wins.
    ///
    /// Google Drive ids are extracted by [`extract_file_id`] instead.
    #[must_use]
    pub fn id_patterns(self) -> &'static [Regex] {
        match self {
            Self::GoogleDrive => &[],
            Self::TikTok => &TIKTOK_PATTERNS,
            Self::Facebook => &FACEBOOK_PATTERNS,
            Self::YouTube => &YOUTUBE_PATTERNS,
            Self::Instagram => &INSTAGRAM_PATTERNS,
            Self::Douyin => &DOUYIN_PATTERNS,
            Self::Bilibili => &BILIBILI_PATTERNS,
            Self::Twitter => &TWITTER_PATTERNS,
        }
    }

    /// Hosts of short links that only reveal an identifier after redirects.
    #[must_use]
    pub const fn short_link_hosts(self) -> &'static [&'static str] {
        match self {
            Self::TikTok => &["vm.tiktok.com", "vt.tiktok.com"],
            Self::Douyin => &["v.douyin.com"],
            _ => &[],
        }
    }

    /// Whether `url` is a short link that should be resolved by following redirects.
    #[must_use]
    pub fn is_short_link(self, url: &str) -> bool {
        self.short_link_hosts().iter().any(|host| url.contains(host))
    }

    /// TikTok only trusts a resolved URL when the final response was a 200.
    #[must_use]
    pub const fn requires_ok_on_resolve(self) -> bool {
        matches!(self, Self::TikTok)
    }

    /// Whether downloads go through the generic media extractor (yt-dlp).
    #[must_use]
    pub const fn uses_media_extractor(self) -> bool {
        !matches!(self, Self::GoogleDrive)
    }
}
