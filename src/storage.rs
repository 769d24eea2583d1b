//! On-disk layout of downloaded media.
//!
//! Every stored file lives directly in the storage directory as
//! `{identifier}.mp4`. Collaborators never write there: they write into a
//! staging directory inside it, and the finished file is renamed into place.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::constants::MEDIA_EXTENSION;
use crate::identifier::MediaIdentifier;

const STAGING_PREFIX: &str = ".staging-";

/// Handle to the storage directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    /// Target path of the stored file for `id`.
    #[must_use]
    pub fn path_for(&self, id: &MediaIdentifier) -> PathBuf {
        self.root.join(id.file_name())
    }

    /// Whether a stored file already exists for `id`.
    pub async fn contains(&self, id: &MediaIdentifier) -> bool {
        tokio::fs::try_exists(self.path_for(id))
            .await
            .unwrap_or(false)
    }

    /// Map a requested file name onto a path inside the storage directory.
    ///
    /// Names with separators, parent components or a leading dot are refused,
    /// which keeps requests out of other directories and away from staging dirs.
    #[must_use]
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let valid = !filename.is_empty()
            && !filename.starts_with('.')
            && !filename.contains(['/', '\\', '\0'])
            && !filename.contains("..");
        valid.then(|| self.root.join(filename))
    }

    /// Create a fresh staging directory for one download.
    pub fn staging(&self) -> io::Result<StagingDir> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)?;
        Ok(StagingDir { dir })
    }

    /// Remove staging dirs left behind by a previous process.
    ///
    /// Only safe before any download has started. Returns how many were removed.
    pub async fn remove_stale_staging(&self) -> io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let is_staging = entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX);
            if !is_staging || !entry.file_type().await?.is_dir() {
                continue;
            }
            match tokio::fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), "Failed to remove stale staging dir: {e}"),
            }
        }

        Ok(removed)
    }

    /// Move a finished download onto the stored path for `id`.
    pub async fn commit(&self, produced: &Path, id: &MediaIdentifier) -> io::Result<PathBuf> {
        let target = self.path_for(id);
        tokio::fs::rename(produced, &target).await?;
        debug!(path = %target.display(), "Stored media file");
        Ok(target)
    }

    /// Delete every stored media file. Returns how many were removed.
    ///
    /// Only regular files directly inside the storage directory with the media
    /// extension are touched.
    pub async fn sweep(&self) -> io::Result<usize> {
        let suffix = format!(".{MEDIA_EXTENSION}");
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut deleted = 0;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if !name.to_string_lossy().ends_with(&suffix) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => deleted += 1,
                // Raced with another sweep.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(deleted)
    }
}

/// Scratch directory for a single download, removed on drop.
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path a collaborator should write `id` to.
    #[must_use]
    pub fn path_for(&self, id: &MediaIdentifier) -> PathBuf {
        self.dir.path().join(id.file_name())
    }

    /// Find the file a collaborator produced for `id`.
    ///
    /// Prefers the expected name; otherwise takes the largest `.mp4` in the
    /// staging dir (extractors sometimes add a format suffix to the name).
    /// Other containers and empty files do not count as a download.
    pub async fn produced_file(&self, id: &MediaIdentifier) -> Option<PathBuf> {
        let expected = self.path_for(id);
        if file_len(&expected).await > 0 {
            return Some(expected);
        }

        let mut entries = match tokio::fs::read_dir(self.path()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path().display(), "Failed to list staging dir: {e}");
                return None;
            }
        };

        let suffix = format!(".{MEDIA_EXTENSION}");
        let mut best: Option<(u64, PathBuf)> = None;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !entry.file_name().to_string_lossy().ends_with(&suffix) {
                continue;
            }
            let len = file_len(&path).await;
            if len > 0 && best.as_ref().map_or(true, |(size, _)| len > *size) {
                best = Some((len, path));
            }
        }

        best.map(|(_, path)| path)
    }
}

async fn file_len(path: &Path) -> u64 {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => 0,
    }
}
