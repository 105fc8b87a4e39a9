//! Append-semantics decision logs over whole-object blobs.
//!
//! The store cannot append, so [`DecisionLog::append`] is read-merge-write:
//! fetch the current text, concatenate the new lines, write the whole body
//! back. Two sessions appending concurrently can lose one side's lines to
//! the race; the window is shrunk by write buffering ([`BufferedLog`]) and
//! by the store layer's retries, but the design accepts the race rather
//! than pretending the store has compare-and-swap.
//!
//! # Failure ladder
//!
//! When the read half of an append fails even after retries:
//! 1. merge onto the last successfully read text for that blob, if any;
//! 2. otherwise write only the new lines as the whole body, so decisions
//!    survive even when history is unreachable. The outcome is flagged
//!    [`AppendOutcome::salvaged`] and must be surfaced to the caller.
//!
//! A failed write keeps the lines in the caller's buffer; nothing is
//! dropped silently.

mod buffer;
pub mod wire;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::TextCache;
use crate::store::{BlobId, BlobStore, StoreError};

pub use buffer::BufferedLog;

/// Errors from decision log I/O.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JournalError {
    /// The log could not be read and no cached text exists to serve.
    #[error("decision log {blob} is unreadable: {source}")]
    Unreadable {
        /// Log blob id.
        blob: BlobId,
        /// Store failure after retries.
        source: StoreError,
    },

    /// The merged body could not be written back.
    #[error("decision log {blob} write failed: {source}")]
    WriteFailed {
        /// Log blob id.
        blob: BlobId,
        /// Store failure after retries.
        source: StoreError,
    },
}

/// Log text as served to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogText {
    /// Whole-blob text, newline-delimited JSON lines.
    pub text: String,
    /// `true` when the store was unreachable and this text came from the
    /// local fallback cache.
    pub stale: bool,
}

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppendOutcome {
    /// Lines appended by this call.
    pub appended: usize,
    /// `true` when prior log history was unreadable and the body written
    /// contains only the new lines.
    pub salvaged: bool,
}

/// One per-side decision log blob.
///
/// Reads go to the store first and refresh the fallback cache on success;
/// the cache is only served when the store fails. A missing blob is an
/// empty log, not an error.
pub struct DecisionLog {
    store: Arc<dyn BlobStore>,
    cache: Arc<TextCache>,
    blob: BlobId,
}

impl DecisionLog {
    /// Binds a log to its blob id.
    pub fn new(store: Arc<dyn BlobStore>, cache: Arc<TextCache>, blob: BlobId) -> Self {
        Self { store, cache, blob }
    }

    /// The log's blob id.
    #[must_use]
    pub fn blob(&self) -> &BlobId {
        &self.blob
    }

    /// Reads the whole log.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Unreadable`] only when the store failed and
    /// no cached text exists; a cached copy is served with
    /// [`LogText::stale`] set instead.
    pub async fn read(&self) -> Result<LogText, JournalError> {
        match self.store.get(&self.blob).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.cache.put(&self.blob, text.clone());
                Ok(LogText { text, stale: false })
            }
            Err(StoreError::NotFound { .. }) => {
                self.cache.put(&self.blob, String::new());
                Ok(LogText {
                    text: String::new(),
                    stale: false,
                })
            }
            Err(err) => match self.cache.get(&self.blob) {
                Some(text) => {
                    warn!(blob = %self.blob, error = %err, "serving cached log text after failed read");
                    Ok(LogText { text, stale: true })
                }
                None => Err(JournalError::Unreadable {
                    blob: self.blob.clone(),
                    source: err,
                }),
            },
        }
    }

    /// Appends `lines` via read-merge-write.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::WriteFailed`] when the final write does not
    /// go through; the caller's buffer still holds the lines.
    pub async fn append(&self, lines: &[String]) -> Result<AppendOutcome, JournalError> {
        if lines.is_empty() {
            return Ok(AppendOutcome::default());
        }

        let (base, salvaged) = match self.store.get(&self.blob).await {
            Ok(bytes) => (String::from_utf8_lossy(&bytes).into_owned(), false),
            Err(StoreError::NotFound { .. }) => (String::new(), false),
            Err(err) => match self.cache.get(&self.blob) {
                Some(text) => {
                    warn!(blob = %self.blob, error = %err, "merging append onto cached log text");
                    (text, false)
                }
                None => {
                    warn!(blob = %self.blob, error = %err, "log history unreadable, writing new lines standalone");
                    (String::new(), true)
                }
            },
        };

        let mut body = base;
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
        for line in lines {
            body.push_str(line);
            body.push('\n');
        }

        self.store
            .put(&self.blob, Bytes::from(body.clone()))
            .await
            .map_err(|source| JournalError::WriteFailed {
                blob: self.blob.clone(),
                source,
            })?;
        self.cache.put(&self.blob, body);

        debug!(blob = %self.blob, appended = lines.len(), salvaged, "appended decision lines");
        Ok(AppendOutcome {
            appended: lines.len(),
            salvaged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryBlobStore;

    fn log_over(store: &Arc<InMemoryBlobStore>) -> DecisionLog {
        DecisionLog::new(
            Arc::clone(store) as Arc<dyn BlobStore>,
            Arc::new(TextCache::new()),
            BlobId::from("log-h"),
        )
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn append_creates_a_missing_log() {
        let store = Arc::new(InMemoryBlobStore::new());
        let log = log_over(&store);

        let outcome = log.append(&lines(&["l1", "l2"])).await.unwrap();
        assert_eq!(outcome.appended, 2);
        assert!(!outcome.salvaged);
        assert_eq!(store.blob_text("log-h").unwrap(), "l1\nl2\n");
    }

    #[tokio::test]
    async fn append_merges_onto_existing_text() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed_text("log-h", "old\n");
        let log = log_over(&store);

        log.append(&lines(&["new"])).await.unwrap();
        assert_eq!(store.blob_text("log-h").unwrap(), "old\nnew\n");
    }

    #[tokio::test]
    async fn append_repairs_a_missing_trailing_newline() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed_text("log-h", "old");
        let log = log_over(&store);

        log.append(&lines(&["new"])).await.unwrap();
        assert_eq!(store.blob_text("log-h").unwrap(), "old\nnew\n");
    }

    #[tokio::test]
    async fn read_serves_cached_text_when_the_store_fails() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed_text("log-h", "l1\n");
        let log = log_over(&store);

        let fresh = log.read().await.unwrap();
        assert_eq!(fresh.text, "l1\n");
        assert!(!fresh.stale);

        store.fail_always("get", StoreError::transient("store down"));
        let served = log.read().await.unwrap();
        assert_eq!(served.text, "l1\n");
        assert!(served.stale);
    }

    #[tokio::test]
    async fn read_without_cached_text_propagates() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.fail_always("get", StoreError::transient("store down"));
        let log = log_over(&store);

        let err = log.read().await.unwrap_err();
        assert!(matches!(err, JournalError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn missing_log_reads_as_empty() {
        let store = Arc::new(InMemoryBlobStore::new());
        let text = log_over(&store).read().await.unwrap();
        assert_eq!(text.text, "");
        assert!(!text.stale);
    }

    #[tokio::test]
    async fn append_merges_onto_cached_text_when_read_fails() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed_text("log-h", "old\n");
        let log = log_over(&store);

        log.read().await.unwrap();
        store.fail_always("get", StoreError::transient("read down"));

        let outcome = log.append(&lines(&["new"])).await.unwrap();
        assert!(!outcome.salvaged);
        assert_eq!(store.blob_text("log-h").unwrap(), "old\nnew\n");
    }

    #[tokio::test]
    async fn append_salvages_the_delta_when_history_is_unreadable() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed_text("log-h", "lost-history\n");
        store.fail_always("get", StoreError::transient("read down"));
        let log = log_over(&store);

        let outcome = log.append(&lines(&["kept"])).await.unwrap();
        assert!(outcome.salvaged);
        assert_eq!(store.blob_text("log-h").unwrap(), "kept\n");
    }

    #[tokio::test]
    async fn append_write_failure_propagates() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed_text("log-h", "old\n");
        store.fail_always("put", StoreError::transient("write down"));
        let log = log_over(&store);

        let err = log.append(&lines(&["new"])).await.unwrap_err();
        assert!(matches!(err, JournalError::WriteFailed { .. }));
        assert_eq!(store.blob_text("log-h").unwrap(), "old\n");
    }

    #[tokio::test]
    async fn empty_append_is_a_no_op() {
        let store = Arc::new(InMemoryBlobStore::new());
        let outcome = log_over(&store).append(&[]).await.unwrap();
        assert_eq!(outcome, AppendOutcome::default());
        assert_eq!(store.calls("put"), 0);
    }
}
