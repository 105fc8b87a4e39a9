//! Resume position and progress accounting.
//!
//! The resume point is always recomputed from the reconciled state; it is
//! never cached across state changes. A small advisory hint blob (plain
//! integer text, one per category and reviewer) lets a session start where
//! the last one left off, but the hint can only move the start forward and
//! is clamped to the sequence. Logs remain the only source of truth; a
//! hint that cannot be read counts as no hint.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::FolderIndex;
use crate::model::{ItemRecord, PairKey, Reviewer};
use crate::store::{BlobId, BlobStore, StoreError};

/// Where to resume in the record sequence.
///
/// An empty sequence is its own state, not index zero; callers must not
/// treat it as a valid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// The sequence has no records.
    Empty,
    /// First record whose pair is not fully decided, or the last index
    /// when every pair is complete.
    At(usize),
}

impl ResumePoint {
    /// The index, if the sequence was non-empty.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Empty => None,
            Self::At(i) => Some(i),
        }
    }
}

/// Finds the resume point for a reviewer.
///
/// Scans in sequence order and returns the first record whose pair is not
/// in `completed`.
#[must_use]
pub fn locate(records: &[ItemRecord], completed: &HashSet<PairKey>) -> ResumePoint {
    if records.is_empty() {
        return ResumePoint::Empty;
    }
    for (index, record) in records.iter().enumerate() {
        if !completed.contains(&record.pair_key()) {
            return ResumePoint::At(index);
        }
    }
    ResumePoint::At(records.len() - 1)
}

/// Counts of fully decided pairs over the record sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    /// Records in the sequence.
    pub total: usize,
    /// Records whose pair is complete.
    pub completed: usize,
    /// Records still missing at least one verdict.
    pub pending: usize,
}

/// Summarizes completion over the record sequence.
#[must_use]
pub fn summarize(records: &[ItemRecord], completed: &HashSet<PairKey>) -> ProgressSummary {
    let done = records
        .iter()
        .filter(|record| completed.contains(&record.pair_key()))
        .count();
    ProgressSummary {
        total: records.len(),
        completed: done,
        pending: records.len() - done,
    }
}

/// Combines the advisory hint with the log-derived resume point.
///
/// The hint can only fast-forward past already-visited records and is
/// clamped to the last index.
#[must_use]
pub fn start_index(resume: ResumePoint, hint: Option<usize>, len: usize) -> ResumePoint {
    match resume {
        ResumePoint::Empty => ResumePoint::Empty,
        ResumePoint::At(index) => {
            let forwarded = hint.unwrap_or(0).max(index);
            ResumePoint::At(forwarded.min(len.saturating_sub(1)))
        }
    }
}

/// The advisory hint blob for one `(category, reviewer)`.
///
/// Created on first use with content `"0"`. Every operation here is
/// best-effort: load failures mean "no hint" and persist failures are
/// logged and swallowed. Nothing downstream may depend on the hint.
pub struct ProgressHint {
    store: Arc<dyn BlobStore>,
    folders: Arc<FolderIndex>,
    folder: BlobId,
    name: String,
}

impl ProgressHint {
    /// Binds the hint blob for `category` and `reviewer` inside `folder`.
    pub fn new(
        store: Arc<dyn BlobStore>,
        folders: Arc<FolderIndex>,
        folder: BlobId,
        category: &str,
        reviewer: &Reviewer,
    ) -> Self {
        let name = format!("progress_{category}_{}.txt", reviewer.canonical());
        Self {
            store,
            folders,
            folder,
            name,
        }
    }

    /// The hint blob's name within its folder.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads the hinted start index, creating the blob on first use.
    ///
    /// Any failure along the way reads as `None`.
    pub async fn load(&self) -> Option<usize> {
        let id = match self.ensure_blob().await {
            Ok(id) => id,
            Err(err) => {
                debug!(name = %self.name, error = %err, "progress hint unavailable");
                return None;
            }
        };
        match self.store.get(&id).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).trim().parse().ok(),
            Err(err) => {
                debug!(name = %self.name, error = %err, "progress hint unreadable");
                None
            }
        }
    }

    /// Persists `index` as the new hint. Failures are logged, never
    /// propagated.
    pub async fn persist(&self, index: usize) {
        let id = match self.ensure_blob().await {
            Ok(id) => id,
            Err(err) => {
                warn!(name = %self.name, error = %err, "could not place progress hint");
                return;
            }
        };
        let body = Bytes::from(index.to_string());
        if let Err(err) = self.store.put(&id, body).await {
            warn!(name = %self.name, error = %err, "could not persist progress hint");
        }
    }

    async fn ensure_blob(&self) -> Result<BlobId, StoreError> {
        if let Some(id) = self.folders.resolve(&self.folder, &self.name).await? {
            return Ok(id);
        }
        let id = self
            .store
            .create(&self.name, &self.folder, Bytes::from_static(b"0"))
            .await?;
        self.folders.invalidate(&self.folder);
        debug!(name = %self.name, id = %id, "created progress hint blob");
        Ok(id)
    }
}

#[cfg(test)]
mod proptest_locate;
