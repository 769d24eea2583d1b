//! Per-identifier mutual exclusion for downloads.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::identifier::MediaIdentifier;

/// One single-permit semaphore per identifier.
///
/// The dispatcher holds a permit from the existence check until the file is
/// committed, so two first-time requests for the same identifier cannot both
/// start a download.
#[derive(Debug, Default)]
pub struct IdentifierLocks {
    semaphores: Mutex<HashMap<MediaIdentifier, Arc<Semaphore>>>,
}

impl IdentifierLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other request holds `id`, then hold it.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn acquire(&self, id: &MediaIdentifier) -> IdentifierGuard {
        let semaphore = self.get_or_create(id).await;
        // Semaphores in the map are never closed.
        let permit = semaphore
            .acquire_owned()
            .await
            .expect("Semaphore closed unexpectedly");

        IdentifierGuard { _permit: permit }
    }

    #[cfg(test)]
    async fn try_acquire(&self, id: &MediaIdentifier) -> Option<IdentifierGuard> {
        let semaphore = self.get_or_create(id).await;
        semaphore
            .try_acquire_owned()
            .ok()
            .map(|permit| IdentifierGuard { _permit: permit })
    }

    async fn get_or_create(&self, id: &MediaIdentifier) -> Arc<Semaphore> {
        let mut map = self.semaphores.lock().await;

        // Drop entries nobody is holding or waiting on. A held or awaited
        // semaphore has a clone outside the map.
        map.retain(|key, sem| key == id || Arc::strong_count(sem) > 1);

        Arc::clone(
            map.entry(id.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(1))),
        )
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.semaphores.lock().await.len()
    }
}

/// Held lock on one identifier.
#[derive(Debug)]
pub struct IdentifierGuard {
    _permit: OwnedSemaphorePermit,
}
