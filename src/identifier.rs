use std::fmt;

use crate::constants::MEDIA_EXTENSION;

/// Token derived from a request URL, used as the stored file's name stem.
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so an identifier can be
/// joined onto the storage directory without escaping it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaIdentifier(String);

impl MediaIdentifier {
    /// Validate and wrap an identifier.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(raw.to_string()))
    }

    /// Identifier built from the current Unix time in seconds.
    ///
    /// Used when no identifier can be extracted from the URL.
    #[must_use]
    pub fn from_timestamp() -> Self {
        Self(chrono::Utc::now().timestamp().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the stored media file for this identifier.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{MEDIA_EXTENSION}", self.0)
    }
}

impl fmt::Display for MediaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
