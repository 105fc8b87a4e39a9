//! Blob text cache, the journal tier's last-good fallback.
//!
//! Populated on every successful log or manifest read and refreshed with
//! the body of every successful log write, then consulted only when a
//! read fails after exhausting retries. No TTL: log text only changes
//! through this engine's own writes or a concurrent writer, and the
//! reconcile path re-reads on every load.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::store::BlobId;

/// `BlobId -> String` cache of whole-blob text.
#[derive(Debug, Default)]
pub struct TextCache {
    entries: Mutex<HashMap<BlobId, String>>,
}

impl TextCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successfully read text for `id`, if any.
    #[must_use]
    pub fn get(&self, id: &BlobId) -> Option<String> {
        self.lock().get(id).cloned()
    }

    /// Records the text served by a successful read or the body placed by
    /// a successful write.
    pub fn put(&self, id: &BlobId, text: String) {
        self.lock().insert(id.clone(), text);
    }

    /// Drops the entry for `id`.
    pub fn invalidate(&self, id: &BlobId) {
        self.lock().remove(id);
    }

    /// Number of cached blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BlobId, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
