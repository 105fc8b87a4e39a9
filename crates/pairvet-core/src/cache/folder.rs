//! TTL-cached folder listings with name-to-id resolution.
//!
//! Item names in manifests and export links are resolved against folder
//! contents. Folder contents change rarely (new links, the occasional
//! hint blob), so listings are cached with a TTL and re-fetched through
//! the wrapped store when stale. Mutating code paths call
//! [`FolderIndex::invalidate`] so their next lookup sees their own write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::store::{BlobId, BlobStore, StoreError};

/// Name-to-id index over folder listings, TTL per folder.
pub struct FolderIndex {
    store: Arc<dyn BlobStore>,
    ttl: Duration,
    folders: Mutex<HashMap<BlobId, FolderSnapshot>>,
}

struct FolderSnapshot {
    /// All ids per name; folders may hold duplicate names.
    names: HashMap<String, Vec<BlobId>>,
    fetched_at: Instant,
}

impl FolderIndex {
    /// Creates an index fetching through `store` with the given TTL.
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            folders: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves `name` inside `folder` to the first matching id.
    ///
    /// `Ok(None)` means the folder definitely has no child of that name.
    ///
    /// # Errors
    ///
    /// Propagates listing failures from the store when no fresh snapshot
    /// exists.
    pub async fn resolve(
        &self,
        folder: &BlobId,
        name: &str,
    ) -> Result<Option<BlobId>, StoreError> {
        let ids = self.matches(folder, name).await?;
        Ok(ids.into_iter().next())
    }

    /// All ids under `folder` carrying `name`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates listing failures from the store when no fresh snapshot
    /// exists.
    pub async fn matches(&self, folder: &BlobId, name: &str) -> Result<Vec<BlobId>, StoreError> {
        if let Some(hit) = self.fresh_lookup(folder, name) {
            return Ok(hit);
        }

        let entries = self.store.list(folder).await?;
        let mut names: HashMap<String, Vec<BlobId>> = HashMap::new();
        for entry in entries {
            names.entry(entry.name).or_default().push(entry.id);
        }
        let result = names.get(name).cloned().unwrap_or_default();
        tracing::debug!(folder = %folder, names = names.len(), "refreshed folder index");
        self.lock().insert(
            folder.clone(),
            FolderSnapshot {
                names,
                fetched_at: Instant::now(),
            },
        );
        Ok(result)
    }

    /// Drops the snapshot for `folder` so the next lookup re-lists.
    pub fn invalidate(&self, folder: &BlobId) {
        self.lock().remove(folder);
    }

    fn fresh_lookup(&self, folder: &BlobId, name: &str) -> Option<Vec<BlobId>> {
        let folders = self.lock();
        let snapshot = folders.get(folder)?;
        if snapshot.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        Some(snapshot.names.get(name).cloned().unwrap_or_default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BlobId, FolderSnapshot>> {
        self.folders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
