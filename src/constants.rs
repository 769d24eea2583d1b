//! Shared constants used across the application.

/// Desktop browser user agent sent with every outbound fetch.
///
/// Several platforms serve a stripped page (or nothing) to unknown clients, so
/// requests present themselves as a regular Chrome on Windows.
pub const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Extension of every stored media file, without the dot.
pub const MEDIA_EXTENSION: &str = "mp4";

/// Direct-download endpoint for Google Drive files.
pub const DRIVE_DOWNLOAD_BASE: &str = "https://drive.google.com/uc";
