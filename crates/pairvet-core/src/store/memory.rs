//! In-memory blob store backing the test suite.
//!
//! Behaves like the remote: whole-object semantics, folders as listings,
//! links as pointer objects, idempotent deletes. On top of that it offers
//! a fault plan (`fail_next` / `fail_always`) and per-operation call
//! counters so retry, fallback, and idempotency paths are observable.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use super::{BlobEntry, BlobId, BlobStore, StoreError};

/// In-memory [`BlobStore`] with injectable faults.
#[derive(Default)]
pub struct InMemoryBlobStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    blobs: HashMap<BlobId, Bytes>,
    folders: HashMap<BlobId, Vec<BlobEntry>>,
    links: HashMap<BlobId, BlobId>,
    faults: HashMap<&'static str, FaultPlan>,
    op_counts: HashMap<&'static str, usize>,
    next_object: u64,
}

#[derive(Default)]
struct FaultPlan {
    queued: VecDeque<StoreError>,
    always: Option<StoreError>,
}

impl InMemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a blob with raw bytes.
    pub fn seed_blob(&self, id: impl Into<String>, bytes: impl Into<Bytes>) {
        let mut state = self.lock();
        state.blobs.insert(BlobId::new(id), bytes.into());
    }

    /// Seeds a blob with UTF-8 text.
    pub fn seed_text(&self, id: impl Into<String>, text: &str) {
        self.seed_blob(id, text.as_bytes().to_vec());
    }

    /// Registers `id` as a child of `folder` under `name` without giving
    /// it content.
    pub fn seed_folder_entry(&self, folder: impl Into<String>, name: &str, id: impl Into<String>) {
        let mut state = self.lock();
        state
            .folders
            .entry(BlobId::new(folder))
            .or_default()
            .push(BlobEntry {
                id: BlobId::new(id),
                name: name.to_string(),
            });
    }

    /// Queues one failure for the next call of `op` (`"get"`, `"put"`,
    /// `"list"`, `"create_link"`, `"create"`, `"delete"`).
    pub fn fail_next(&self, op: &'static str, error: StoreError) {
        let mut state = self.lock();
        state.faults.entry(op).or_default().queued.push_back(error);
    }

    /// Makes every call of `op` fail until [`Self::clear_faults`].
    pub fn fail_always(&self, op: &'static str, error: StoreError) {
        let mut state = self.lock();
        state.faults.entry(op).or_default().always = Some(error);
    }

    /// Drops all queued and standing faults.
    pub fn clear_faults(&self) {
        let mut state = self.lock();
        state.faults.clear();
    }

    /// Number of calls seen for `op`, faults included.
    #[must_use]
    pub fn calls(&self, op: &'static str) -> usize {
        let state = self.lock();
        state.op_counts.get(op).copied().unwrap_or(0)
    }

    /// Current UTF-8 content of a blob, if present.
    #[must_use]
    pub fn blob_text(&self, id: &str) -> Option<String> {
        let state = self.lock();
        state
            .blobs
            .get(&BlobId::new(id))
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Names currently listed under `folder`.
    #[must_use]
    pub fn folder_names(&self, folder: &str) -> Vec<String> {
        let state = self.lock();
        state
            .folders
            .get(&BlobId::new(folder))
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Target of a link object, if `id` is a link.
    #[must_use]
    pub fn link_target(&self, id: &BlobId) -> Option<BlobId> {
        let state = self.lock();
        state.links.get(id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    /// Counts the call and pops a planned fault, queued first.
    fn enter(&mut self, op: &'static str) -> Result<(), StoreError> {
        *self.op_counts.entry(op).or_insert(0) += 1;
        if let Some(plan) = self.faults.get_mut(op) {
            if let Some(error) = plan.queued.pop_front() {
                return Err(error);
            }
            if let Some(error) = &plan.always {
                return Err(error.clone());
            }
        }
        Ok(())
    }

    fn allocate(&mut self, prefix: &str) -> BlobId {
        self.next_object += 1;
        BlobId::new(format!("{prefix}-{}", self.next_object))
    }

    fn remove_everywhere(&mut self, id: &BlobId) {
        self.blobs.remove(id);
        self.links.remove(id);
        for entries in self.folders.values_mut() {
            entries.retain(|e| &e.id != id);
        }
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, id: &BlobId) -> Result<Bytes, StoreError> {
        let mut state = self.lock();
        state.enter("get")?;
        state
            .blobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.clone()))
    }

    async fn put(&self, id: &BlobId, bytes: Bytes) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.enter("put")?;
        state.blobs.insert(id.clone(), bytes);
        Ok(())
    }

    /// Unknown folders list as empty rather than erroring; tests seed
    /// entries only where contents matter.
    async fn list(&self, folder: &BlobId) -> Result<Vec<BlobEntry>, StoreError> {
        let mut state = self.lock();
        state.enter("list")?;
        Ok(state.folders.get(folder).cloned().unwrap_or_default())
    }

    async fn create_link(
        &self,
        target: &BlobId,
        name: &str,
        folder: &BlobId,
    ) -> Result<BlobId, StoreError> {
        let mut state = self.lock();
        state.enter("create_link")?;
        let id = state.allocate("link");
        state.links.insert(id.clone(), target.clone());
        state.folders.entry(folder.clone()).or_default().push(BlobEntry {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn create(
        &self,
        name: &str,
        folder: &BlobId,
        bytes: Bytes,
    ) -> Result<BlobId, StoreError> {
        let mut state = self.lock();
        state.enter("create")?;
        let id = state.allocate("obj");
        state.blobs.insert(id.clone(), bytes);
        state.folders.entry(folder.clone()).or_default().push(BlobEntry {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn delete(&self, id: &BlobId) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.enter("delete")?;
        state.remove_everywhere(id);
        Ok(())
    }
}
