//! Reviewer sessions: the engine's top surface.
//!
//! An [`Engine`] wires the store stack (retry, rate gate, caches) from
//! configuration once; [`Engine::open_session`] then binds one reviewer to
//! one category and returns a [`ReviewSession`] holding the record
//! sequence, the reconciled decision state, and a cursor.
//!
//! The session never trusts derived state over the logs: every save ends
//! with a fresh fold of the log text, and the persisted progress hint is
//! advisory only. Preview payloads are opaque bytes; the engine does not
//! decode images.
//!
//! # Errors
//!
//! [`ReviewSession::save`] deliberately does not return `Result`: per the
//! error design every abort path folds into a [`SaveReport`] with `ok:
//! false` and a rendered message, so a front end can always show
//! something. Session construction, by contrast, fails loudly via
//! [`SessionError`] when the category wiring is broken.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{FolderIndex, PreviewCache, PreviewKey, TextCache};
use crate::config::EngineConfig;
use crate::export::ExportIndex;
use crate::journal::{BufferedLog, DecisionLog, JournalError};
use crate::model::{DecisionStatus, ItemRecord, ModelError, Reviewer, Side, SideMap};
use crate::progress::{locate, start_index, summarize, ProgressHint, ProgressSummary, ResumePoint};
use crate::reconcile::{reconcile_side, ReviewerState, SideView};
use crate::save::{SaveOutcome, Saver};
use crate::store::{BlobId, BlobStore, RetryingStore, StoreError};

const MSG_SAVED: &str = "Saved.";
const MSG_DUPLICATE: &str = "Already saved (no changes).";
const MSG_SALVAGED: &str = "Saved; log history was unreadable, decisions written standalone.";

/// Errors opening a session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// No such category in the configuration.
    #[error("unknown category: {name}")]
    UnknownCategory {
        /// Requested category name.
        name: String,
    },

    /// The category's manifest blob does not exist.
    #[error("manifest blob {blob} is missing")]
    ManifestMissing {
        /// Configured manifest blob id.
        blob: BlobId,
    },

    /// The manifest could not be read and no cached copy exists.
    #[error("manifest blob {blob} is unreadable: {source}")]
    ManifestUnreadable {
        /// Configured manifest blob id.
        blob: BlobId,
        /// Store failure after retries.
        source: StoreError,
    },

    /// A decision log could not be read and no cached copy exists.
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// The reviewer name is unusable.
    #[error("invalid reviewer: {0}")]
    Reviewer(#[from] ModelError),
}

/// Outcome of [`ReviewSession::save`], ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// `false` when the save did not take.
    pub ok: bool,
    /// Human-readable outcome.
    pub message: String,
}

/// Shared store stack and caches, built from configuration once.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn BlobStore>,
    folders: Arc<FolderIndex>,
    texts: Arc<TextCache>,
    previews: Arc<PreviewCache>,
}

impl Engine {
    /// Wires the engine over a store backend.
    ///
    /// The backend is wrapped with the configured retry budget and rate
    /// gate; everything above shares that wrapped store.
    #[must_use]
    pub fn new(config: EngineConfig, backend: Arc<dyn BlobStore>) -> Self {
        let store: Arc<dyn BlobStore> =
            Arc::new(RetryingStore::new(backend, config.retry, config.rate));
        let folders = Arc::new(FolderIndex::new(
            Arc::clone(&store),
            Duration::from_secs(config.cache.folder_ttl_secs),
        ));
        let previews = Arc::new(PreviewCache::new(
            config.cache.preview_capacity,
            Duration::from_secs(config.cache.preview_ttl_secs),
        ));
        Self {
            config,
            store,
            folders,
            texts: Arc::new(TextCache::new()),
            previews,
        }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens a session for `reviewer` over `category`.
    ///
    /// Loads the manifest, folds both decision logs, and positions the
    /// cursor at the resume point fast-forwarded by the advisory hint.
    ///
    /// # Errors
    ///
    /// Fails when the category is not configured, the manifest is missing
    /// or unreadable, the logs are unreadable with nothing cached, or the
    /// reviewer name is empty.
    pub async fn open_session(
        &self,
        category: &str,
        reviewer: &str,
    ) -> Result<ReviewSession, SessionError> {
        let reviewer = Reviewer::new(reviewer)?;
        let binding = self
            .config
            .category(category)
            .ok_or_else(|| SessionError::UnknownCategory {
                name: category.to_string(),
            })?
            .clone();

        let manifest_blob = BlobId::from(binding.manifest_blob.as_str());
        let (manifest_text, manifest_stale) = match self.store.get(&manifest_blob).await {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.texts.put(&manifest_blob, text.clone());
                (text, false)
            }
            Err(StoreError::NotFound { .. }) => {
                return Err(SessionError::ManifestMissing {
                    blob: manifest_blob,
                })
            }
            Err(err) => match self.texts.get(&manifest_blob) {
                Some(text) => {
                    warn!(blob = %manifest_blob, error = %err, "serving cached manifest text");
                    (text, true)
                }
                None => {
                    return Err(SessionError::ManifestUnreadable {
                        blob: manifest_blob,
                        source: err,
                    })
                }
            },
        };
        let (records, manifest_skipped) = parse_manifest(&manifest_text);

        let logs = SideMap::from_fn(|side| {
            BufferedLog::new(
                DecisionLog::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.texts),
                    BlobId::from(binding.log_blob(side)),
                ),
                &self.config.buffer,
            )
        });

        let mut views = SideMap::<SideView>::default();
        let mut stale = manifest_stale;
        for side in Side::BOTH {
            let text = logs.get(side).log().read().await?;
            stale |= text.stale;
            *views.get_mut(side) = reconcile_side(&text.text, side, &reviewer);
        }
        let state = ReviewerState::from_views(views, stale);

        let exports = SideMap::from_fn(|side| {
            ExportIndex::new(
                Arc::clone(&self.store),
                Arc::clone(&self.folders),
                BlobId::from(binding.source_folder(side)),
                BlobId::from(binding.dest_folder(side)),
            )
        });
        let saver = Saver::new(reviewer.clone(), exports);
        let hint = ProgressHint::new(
            Arc::clone(&self.store),
            Arc::clone(&self.folders),
            BlobId::from(binding.progress_folder.as_str()),
            category,
            &reviewer,
        );
        let sources = SideMap::from_fn(|side| BlobId::from(binding.source_folder(side)));

        let resume = locate(&records, &state.completed);
        let hinted = hint.load().await;
        let start = start_index(resume, hinted, records.len());
        info!(
            category,
            reviewer = %reviewer,
            records = records.len(),
            completed = state.completed.len(),
            start = ?start.index(),
            "session opened"
        );

        let mut session = ReviewSession {
            category: category.to_string(),
            reviewer,
            records,
            manifest_skipped,
            state,
            logs,
            saver,
            hint,
            store: Arc::clone(&self.store),
            folders: Arc::clone(&self.folders),
            previews: Arc::clone(&self.previews),
            sources,
            cursor: None,
            working: SideMap::new(None, None),
        };
        if let Some(index) = start.index() {
            session.set_cursor(index);
        }
        Ok(session)
    }
}

/// One reviewer working one category.
pub struct ReviewSession {
    category: String,
    reviewer: Reviewer,
    records: Vec<ItemRecord>,
    manifest_skipped: usize,
    state: ReviewerState,
    logs: SideMap<BufferedLog>,
    saver: Saver,
    hint: ProgressHint,
    store: Arc<dyn BlobStore>,
    folders: Arc<FolderIndex>,
    previews: Arc<PreviewCache>,
    sources: SideMap<BlobId>,
    cursor: Option<usize>,
    working: SideMap<Option<DecisionStatus>>,
}

impl fmt::Debug for ReviewSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewSession")
            .field("category", &self.category)
            .field("reviewer", &self.reviewer)
            .field("records", &self.records.len())
            .field("cursor", &self.cursor)
            .field("completed", &self.state.completed.len())
            .finish_non_exhaustive()
    }
}

impl ReviewSession {
    /// The category this session reviews.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The active reviewer.
    #[must_use]
    pub fn reviewer(&self) -> &Reviewer {
        &self.reviewer
    }

    /// Number of records in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when the manifest held no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current cursor position, `None` for an empty sequence.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The record under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&ItemRecord> {
        self.cursor.map(|i| &self.records[i])
    }

    /// The working verdicts for the record under the cursor.
    #[must_use]
    pub fn working(&self) -> &SideMap<Option<DecisionStatus>> {
        &self.working
    }

    /// `true` when any state was served from a fallback cache instead of
    /// the store. Front ends surface this as a "showing cached data"
    /// notice.
    #[must_use]
    pub fn state_is_stale(&self) -> bool {
        self.state.stale
    }

    /// Unparseable decision lines seen across both logs.
    #[must_use]
    pub fn skipped_log_lines(&self) -> usize {
        self.state.skipped
    }

    /// Unparseable manifest lines skipped at load.
    #[must_use]
    pub fn skipped_manifest_lines(&self) -> usize {
        self.manifest_skipped
    }

    /// Moves the cursor, clamped to the sequence, and prefills the
    /// working verdicts from the reconciled state.
    pub fn goto(&mut self, index: usize) {
        if self.records.is_empty() {
            return;
        }
        self.set_cursor(index.min(self.records.len() - 1));
    }

    /// Moves one record forward (clamped).
    pub fn advance(&mut self) {
        if let Some(index) = self.cursor {
            self.goto(index.saturating_add(1));
        }
    }

    /// Moves one record back (clamped).
    pub fn back(&mut self) {
        if let Some(index) = self.cursor {
            self.goto(index.saturating_sub(1));
        }
    }

    /// Sets the working verdict for one side of the current record.
    pub fn decide(&mut self, side: Side, status: DecisionStatus) {
        *self.working.get_mut(side) = Some(status);
    }

    /// Completion counts over the sequence.
    #[must_use]
    pub fn progress(&self) -> ProgressSummary {
        summarize(&self.records, &self.state.completed)
    }

    /// The log-derived resume point for the current state.
    #[must_use]
    pub fn resume_point(&self) -> ResumePoint {
        locate(&self.records, &self.state.completed)
    }

    /// Saves the working decision for the record under the cursor.
    ///
    /// Every abort folds into a rendered [`SaveReport`]; see the module
    /// docs. On success the decision state is refolded from the logs, the
    /// resume point recomputed, and the advisory hint persisted.
    pub async fn save(&mut self) -> SaveReport {
        let Some(index) = self.cursor else {
            return SaveReport {
                ok: false,
                message: "Save failed: no record is selected.".to_string(),
            };
        };
        let record = self.records[index].clone();

        match self
            .saver
            .save(&record, &self.working, &self.state, &mut self.logs)
            .await
        {
            Ok(SaveOutcome::Saved(receipt)) => {
                self.reload_state().await;
                let resume = locate(&self.records, &self.state.completed);
                if let Some(next) = resume.index() {
                    self.hint.persist(next).await;
                }
                SaveReport {
                    ok: true,
                    message: if receipt.salvaged {
                        MSG_SALVAGED.to_string()
                    } else {
                        MSG_SAVED.to_string()
                    },
                }
            }
            Ok(SaveOutcome::Duplicate) => SaveReport {
                ok: true,
                message: MSG_DUPLICATE.to_string(),
            },
            Err(err) => SaveReport {
                ok: false,
                message: format!("Save failed: {err}."),
            },
        }
    }

    /// Fetches preview bytes for both sides of the current record, two
    /// fetches in parallel. A side that cannot be resolved or read comes
    /// back `None`; the other side is unaffected.
    pub async fn previews(&self, max_side: Option<u32>) -> SideMap<Option<Bytes>> {
        let Some(index) = self.cursor else {
            return SideMap::new(None, None);
        };
        let record = &self.records[index];
        let (hypothesis, adversarial) = tokio::join!(
            self.side_preview(Side::Hypothesis, record, max_side),
            self.side_preview(Side::Adversarial, record, max_side),
        );
        SideMap::new(hypothesis, adversarial)
    }

    async fn side_preview(
        &self,
        side: Side,
        record: &ItemRecord,
        max_side: Option<u32>,
    ) -> Option<Bytes> {
        let name = record.item_name(side);
        if name.is_empty() {
            return None;
        }
        let blob = match self.folders.resolve(self.sources.get(side), name).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(item = name, side = %side, "preview source not found");
                return None;
            }
            Err(err) => {
                warn!(item = name, side = %side, error = %err, "preview folder lookup failed");
                return None;
            }
        };

        let key = PreviewKey {
            blob: blob.clone(),
            max_side,
        };
        if let Some(bytes) = self.previews.get(&key) {
            return Some(bytes);
        }
        match self.store.get(&blob).await {
            Ok(bytes) => {
                self.previews.insert(key, bytes.clone());
                Some(bytes)
            }
            Err(err) => {
                warn!(item = name, side = %side, error = %err, "preview fetch failed");
                None
            }
        }
    }

    fn set_cursor(&mut self, index: usize) {
        self.cursor = Some(index);
        let key = self.records[index].pair_key();
        let working = SideMap::from_fn(|side| self.state.status(side, &key));
        self.working = working;
    }

    /// Refolds the decision state from the logs. Read failures keep the
    /// previous per-side view and mark the state stale instead of losing
    /// it.
    async fn reload_state(&mut self) {
        let mut views = SideMap::<SideView>::default();
        let mut stale = false;
        for side in Side::BOTH {
            match self.logs.get(side).log().read().await {
                Ok(text) => {
                    stale |= text.stale;
                    *views.get_mut(side) = reconcile_side(&text.text, side, &self.reviewer);
                }
                Err(err) => {
                    warn!(side = %side, error = %err, "keeping previous view after failed log read");
                    stale = true;
                    *views.get_mut(side) = self.state.sides.get(side).clone();
                }
            }
        }
        self.state = ReviewerState::from_views(views, stale);
        debug!(completed = self.state.completed.len(), "decision state refolded");
    }
}

fn parse_manifest(text: &str) -> (Vec<ItemRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0_usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ItemRecord>(line) {
            Ok(record) => records.push(record),
            Err(err) => {
                skipped += 1;
                debug!(error = %err, "skipping malformed manifest line");
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, "manifest contained malformed lines");
    }
    (records, skipped)
}
