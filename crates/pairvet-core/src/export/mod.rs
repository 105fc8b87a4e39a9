//! Export artifact maintenance for accepted items.
//!
//! An accepted side is mirrored into its destination folder as a link
//! named after the item and pointing at the source blob. The invariant is
//! flip-safety: after any sequence of verdict flips there is exactly one
//! artifact when the side stands accepted and none when it does not,
//! regardless of what earlier sessions left behind.
//!
//! Presence is idempotent by delete-then-create: any stale artifact is
//! removed before the fresh link goes in. Absence removes both the link id
//! recorded with the previous decision and anything a name lookup still
//! finds, which also heals orphans left by an append that failed after the
//! artifact was placed.
//!
//! All maintenance runs inside the save transaction, before any log
//! append; a failure here aborts the save with no decision recorded.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::cache::FolderIndex;
use crate::model::DecisionStatus;
use crate::store::{BlobId, BlobStore, StoreError};

/// Errors from export artifact maintenance.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExportError {
    /// The accepted item has no source blob to link to.
    #[error("source item {name} not found in folder {folder}")]
    SourceMissing {
        /// Item name that failed to resolve.
        name: String,
        /// Source folder searched.
        folder: BlobId,
    },

    /// Store failure while maintaining the artifact.
    #[error("export maintenance failed: {0}")]
    Store(#[from] StoreError),
}

/// Artifact maintenance for one side of a category.
///
/// `source` holds the side's images; `dest` receives the links.
pub struct ExportIndex {
    store: Arc<dyn BlobStore>,
    folders: Arc<FolderIndex>,
    source: BlobId,
    dest: BlobId,
}

impl ExportIndex {
    /// Binds the index to a side's source and destination folders.
    pub fn new(
        store: Arc<dyn BlobStore>,
        folders: Arc<FolderIndex>,
        source: BlobId,
        dest: BlobId,
    ) -> Self {
        Self {
            store,
            folders,
            source,
            dest,
        }
    }

    /// Brings the artifact state in line with `status`.
    ///
    /// Returns the id of the link now standing, or `None` when the verdict
    /// leaves no artifact. `prev` is the link id recorded with the
    /// previous decision, if one was retained.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::SourceMissing`] before any mutation when an
    /// accepted item cannot be resolved, and [`ExportError::Store`] when
    /// the store fails mid-maintenance.
    pub async fn apply(
        &self,
        item: &str,
        status: DecisionStatus,
        prev: Option<&BlobId>,
    ) -> Result<Option<BlobId>, ExportError> {
        match status {
            DecisionStatus::Accepted => self.ensure_present(item, prev).await.map(Some),
            DecisionStatus::Rejected => {
                self.ensure_absent(item, prev).await?;
                Ok(None)
            }
        }
    }

    /// Ensures exactly one fresh link for `item` exists in the
    /// destination folder and returns its id.
    ///
    /// # Errors
    ///
    /// See [`ExportIndex::apply`].
    pub async fn ensure_present(
        &self,
        item: &str,
        prev: Option<&BlobId>,
    ) -> Result<BlobId, ExportError> {
        // Resolve before touching anything, so a missing source aborts
        // with zero mutations.
        let target = self
            .folders
            .resolve(&self.source, item)
            .await?
            .ok_or_else(|| ExportError::SourceMissing {
                name: item.to_string(),
                folder: self.source.clone(),
            })?;

        self.remove_artifacts(item, prev).await?;
        let link = self.store.create_link(&target, item, &self.dest).await?;
        self.folders.invalidate(&self.dest);
        debug!(item, link = %link, "placed export artifact");
        Ok(link)
    }

    /// Ensures no link for `item` remains in the destination folder.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Store`] when a delete fails.
    pub async fn ensure_absent(&self, item: &str, prev: Option<&BlobId>) -> Result<(), ExportError> {
        let removed = self.remove_artifacts(item, prev).await?;
        if removed > 0 {
            debug!(item, removed, "cleared export artifacts");
        }
        Ok(())
    }

    /// Deletes the recorded link id and every name match. Returns the
    /// number of delete calls that targeted something.
    async fn remove_artifacts(
        &self,
        item: &str,
        prev: Option<&BlobId>,
    ) -> Result<usize, StoreError> {
        let mut removed = 0_usize;
        if let Some(id) = prev {
            self.store.delete(id).await?;
            removed += 1;
        }
        for id in self.folders.matches(&self.dest, item).await? {
            if prev == Some(&id) {
                continue;
            }
            self.store.delete(&id).await?;
            removed += 1;
        }
        if removed > 0 {
            self.folders.invalidate(&self.dest);
        }
        Ok(removed)
    }
}
