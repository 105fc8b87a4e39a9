//! Blob store seam: the only way the engine touches remote state.
//!
//! The remote store offers whole-object read and whole-object overwrite
//! plus folder listing and link objects. There is no compare-and-swap, no
//! partial write, and no server-side query; every guarantee above this
//! seam is built in client space. The trait deliberately stays as small as
//! the remote's real capability surface and must not grow operations the
//! remote cannot honor.
//!
//! # Architecture
//!
//! ```text
//!   callers ──> RetryingStore ──> rate gate ──> attempt loop ──> BlobStore
//! ```
//!
//! [`RetryingStore`] wraps any [`BlobStore`] with the client-side survival
//! kit: a sliding-window [`RateGate`] that smooths call bursts and an
//! attempt loop with exponential backoff over transient failures.
//! [`InMemoryBlobStore`] backs the test suite with injectable faults.
//!
//! # Errors
//!
//! [`StoreError`] is the transport taxonomy. Only
//! [`StoreError::is_transient`] failures are ever retried; not-found and
//! permission failures surface immediately.

mod memory;
mod rate_limit;
mod retry;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::InMemoryBlobStore;
pub use rate_limit::RateGate;
pub use retry::RetryingStore;

/// Identifier of a blob, folder, or link object in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    /// Wraps a raw store identifier.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlobId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// One child of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// Store identifier of the child.
    pub id: BlobId,
    /// Display name of the child within the folder.
    pub name: String,
}

/// Transport-level failures from the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Timeout, server hiccup, or throttling response. The only class the
    /// retry loop acts on.
    #[error("transient store failure: {reason}")]
    Transient {
        /// Human-readable cause reported by the store client.
        reason: String,
    },

    /// The blob does not exist. Never retried; callers decide whether the
    /// absence has a meaning (empty log, missing manifest).
    #[error("blob not found: {id}")]
    NotFound {
        /// Identifier that failed to resolve.
        id: BlobId,
    },

    /// The store rejected the request or returned something unusable.
    #[error("invalid store interaction: {reason}")]
    Invalid {
        /// What was malformed.
        reason: String,
    },

    /// Permission failure. Never retried.
    #[error("store access denied: {reason}")]
    Denied {
        /// What the store reported.
        reason: String,
    },
}

impl StoreError {
    /// Builds a [`StoreError::Transient`].
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient {
            reason: reason.into(),
        }
    }

    /// Builds a [`StoreError::NotFound`].
    #[must_use]
    pub fn not_found(id: BlobId) -> Self {
        Self::NotFound { id }
    }

    /// Returns `true` for failures the retry loop may act on.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Capability surface of the remote blob store.
///
/// Folders are identified by [`BlobId`] like any other object. `delete` is
/// idempotent: deleting an id that is already absent succeeds.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reads a whole object.
    async fn get(&self, id: &BlobId) -> Result<Bytes, StoreError>;

    /// Overwrites a whole object, creating it if absent.
    async fn put(&self, id: &BlobId, bytes: Bytes) -> Result<(), StoreError>;

    /// Lists the immediate children of a folder.
    async fn list(&self, folder: &BlobId) -> Result<Vec<BlobEntry>, StoreError>;

    /// Creates a link object in `folder` named `name` pointing at
    /// `target`. Returns the new link's id. Duplicate names are allowed by
    /// the store; callers that need uniqueness delete first.
    async fn create_link(
        &self,
        target: &BlobId,
        name: &str,
        folder: &BlobId,
    ) -> Result<BlobId, StoreError>;

    /// Creates a fresh named object in `folder` with the given content
    /// and returns its store-assigned id.
    async fn create(
        &self,
        name: &str,
        folder: &BlobId,
        bytes: Bytes,
    ) -> Result<BlobId, StoreError>;

    /// Deletes one object. Succeeds if the id is already absent.
    async fn delete(&self, id: &BlobId) -> Result<(), StoreError>;
}
