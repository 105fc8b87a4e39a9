//! The save transaction: one decision pair from working memory to the log.
//!
//! Steps run in a fixed order; each one only runs when everything before
//! it held:
//!
//! 1. precondition: both sides must hold a verdict, checked before any
//!    I/O;
//! 2. idempotency: a content-derived token short-circuits a resubmit of
//!    the last successful save;
//! 3. export maintenance per side, flip-safe; a failure here aborts with
//!    no decision recorded;
//! 4. append both decision lines through the write buffers, flushed on
//!    demand;
//! 5. token bookkeeping for the next duplicate check.
//!
//! An append failure after step 3 leaves artifacts without matching log
//! lines. That asymmetry is reported as [`SaveError::PartialFailure`] and
//! logged at error level so it stays operationally visible; the encoded
//! lines stay in the write buffer and ride along with the next flush.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error};

use crate::export::{ExportError, ExportIndex};
use crate::journal::wire::DecisionLine;
use crate::journal::{BufferedLog, JournalError};
use crate::model::{DecisionStatus, ItemRecord, PairKey, Reviewer, Side, SideMap};
use crate::reconcile::ReviewerState;
use crate::store::BlobId;

/// Errors from the save transaction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SaveError {
    /// A side holds no verdict yet. Raised before any I/O.
    #[error("cannot save: the {side} side is undecided")]
    Undecided {
        /// The side missing a verdict.
        side: Side,
    },

    /// Export maintenance failed; no decision was appended.
    #[error("export maintenance failed for the {side} side: {source}")]
    Export {
        /// The side whose artifact could not be maintained.
        side: Side,
        /// Underlying failure.
        source: ExportError,
    },

    /// Artifacts were already mutated but the log append failed. The
    /// decision lines remain buffered; the transaction must not be
    /// re-driven as if nothing happened.
    #[error("decision append failed after export maintenance: {source}")]
    PartialFailure {
        /// Underlying append failure.
        source: JournalError,
    },
}

/// What a successful save did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Both lines were appended.
    Saved(SaveReceipt),
    /// The decision is identical to the last successful save; nothing was
    /// written.
    Duplicate,
}

/// Details of one completed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    /// Pair the decision applies to.
    pub pair_key: PairKey,
    /// Idempotency token of this save.
    pub token: String,
    /// Unix seconds stamped on both lines.
    pub decided_at: u64,
    /// Verdicts per side.
    pub statuses: SideMap<DecisionStatus>,
    /// Export links now standing per side.
    pub artifacts: SideMap<Option<BlobId>>,
    /// `true` when an append could not read prior history and wrote the
    /// new lines standalone.
    pub salvaged: bool,
}

/// Runs save transactions for one reviewer over one category.
///
/// Holds the per-side export indexes and the last successful token; log
/// buffers and reconciled state stay with the caller and are borrowed per
/// save.
pub struct Saver {
    reviewer: Reviewer,
    exports: SideMap<ExportIndex>,
    last_token: Option<String>,
}

impl Saver {
    /// Builds a saver for `reviewer` over the side export indexes.
    pub fn new(reviewer: Reviewer, exports: SideMap<ExportIndex>) -> Self {
        Self {
            reviewer,
            exports,
            last_token: None,
        }
    }

    /// Token of the last successful save, if any.
    #[must_use]
    pub fn last_token(&self) -> Option<&str> {
        self.last_token.as_deref()
    }

    /// Executes the transaction for `record`.
    ///
    /// `decision` is the working verdict per side; `state` is the
    /// reconciled state the session currently holds (used for previous
    /// artifact ids); `logs` are the per-side write buffers.
    ///
    /// # Errors
    ///
    /// [`SaveError::Undecided`] before any I/O, [`SaveError::Export`]
    /// with nothing appended, or [`SaveError::PartialFailure`] after
    /// artifacts were mutated.
    pub async fn save(
        &mut self,
        record: &ItemRecord,
        decision: &SideMap<Option<DecisionStatus>>,
        state: &ReviewerState,
        logs: &mut SideMap<BufferedLog>,
    ) -> Result<SaveOutcome, SaveError> {
        let statuses = SideMap::new(
            decision
                .hypothesis
                .ok_or(SaveError::Undecided {
                    side: Side::Hypothesis,
                })?,
            decision
                .adversarial
                .ok_or(SaveError::Undecided {
                    side: Side::Adversarial,
                })?,
        );

        let pair_key = record.pair_key();
        let token = save_token(&pair_key, &statuses, &self.reviewer);
        if self.last_token.as_deref() == Some(token.as_str()) {
            debug!(pair = %pair_key, "identical to last save, skipping");
            return Ok(SaveOutcome::Duplicate);
        }

        let mut artifacts: SideMap<Option<BlobId>> = SideMap::new(None, None);
        for side in Side::BOTH {
            let previous = state
                .record(side, &pair_key)
                .and_then(|r| r.export_id.clone());
            let placed = self
                .exports
                .get(side)
                .apply(record.item_name(side), *statuses.get(side), previous.as_ref())
                .await
                .map_err(|source| SaveError::Export { side, source })?;
            *artifacts.get_mut(side) = placed;
        }

        let decided_at = unix_now();
        for side in Side::BOTH {
            let line = DecisionLine {
                pair_key: pair_key.clone(),
                side,
                status: *statuses.get(side),
                reviewer: self.reviewer.canonical().to_string(),
                reviewer_display: self.reviewer.display().to_string(),
                decided_at,
                save_token: token.clone(),
                export_id: artifacts.get(side).clone(),
                extra: record_fields(record),
            };
            logs.get_mut(side).push(line.encode());
        }

        let mut salvaged = false;
        for side in Side::BOTH {
            let outcome = logs.get_mut(side).flush().await.map_err(|source| {
                error!(
                    pair = %pair_key,
                    side = %side,
                    error = %source,
                    "append failed after export maintenance; artifact state is ahead of the log"
                );
                SaveError::PartialFailure { source }
            })?;
            salvaged |= outcome.salvaged;
        }

        self.last_token = Some(token.clone());
        debug!(pair = %pair_key, token, "decision pair saved");

        Ok(SaveOutcome::Saved(SaveReceipt {
            pair_key,
            token,
            decided_at,
            statuses,
            artifacts,
            salvaged,
        }))
    }
}

/// Content-derived idempotency token over what the save would write.
fn save_token(key: &PairKey, statuses: &SideMap<DecisionStatus>, reviewer: &Reviewer) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(statuses.hypothesis.wire_name().as_bytes());
    hasher.update([0]);
    hasher.update(statuses.adversarial.wire_name().as_bytes());
    hasher.update([0]);
    hasher.update(reviewer.canonical().as_bytes());
    hex::encode(hasher.finalize())
}

/// The record's fields as a flat map for line passthrough.
fn record_fields(record: &ItemRecord) -> serde_json::Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cache::{FolderIndex, TextCache};
    use crate::config::BufferConfig;
    use crate::journal::DecisionLog;
    use crate::reconcile::{reconcile_side, SideView};
    use crate::store::{BlobStore, InMemoryBlobStore, StoreError};

    struct Fixture {
        store: Arc<InMemoryBlobStore>,
        saver: Saver,
        logs: SideMap<BufferedLog>,
        reviewer: Reviewer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed_folder_entry("folder-src-h", "h_1.png", "blob-h1");
        store.seed_folder_entry("folder-src-a", "a_1.png", "blob-a1");

        let dyn_store = Arc::clone(&store) as Arc<dyn BlobStore>;
        let folders = Arc::new(FolderIndex::new(
            Arc::clone(&dyn_store),
            Duration::from_secs(3600),
        ));
        let text_cache = Arc::new(TextCache::new());
        let reviewer = Reviewer::new("Ana").unwrap();

        let exports = SideMap::new(
            ExportIndex::new(
                Arc::clone(&dyn_store),
                Arc::clone(&folders),
                BlobId::from("folder-src-h"),
                BlobId::from("folder-dst-h"),
            ),
            ExportIndex::new(
                Arc::clone(&dyn_store),
                Arc::clone(&folders),
                BlobId::from("folder-src-a"),
                BlobId::from("folder-dst-a"),
            ),
        );
        let buffer_config = BufferConfig {
            max_pending: 16,
            max_age_secs: 20,
        };
        let logs = SideMap::new(
            BufferedLog::new(
                DecisionLog::new(
                    Arc::clone(&dyn_store),
                    Arc::clone(&text_cache),
                    BlobId::from("log-h"),
                ),
                &buffer_config,
            ),
            BufferedLog::new(
                DecisionLog::new(Arc::clone(&dyn_store), text_cache, BlobId::from("log-a")),
                &buffer_config,
            ),
        );

        Fixture {
            store,
            saver: Saver::new(reviewer.clone(), exports),
            logs,
            reviewer,
        }
    }

    fn record() -> ItemRecord {
        ItemRecord {
            id: "rec-1".to_string(),
            text: "a cat".to_string(),
            hypothesis_item: "h_1.png".to_string(),
            adversarial_item: "a_1.png".to_string(),
            ..ItemRecord::default()
        }
    }

    fn both(h: DecisionStatus, a: DecisionStatus) -> SideMap<Option<DecisionStatus>> {
        SideMap::new(Some(h), Some(a))
    }

    async fn current_state(fx: &Fixture) -> ReviewerState {
        let mut views = SideMap::<SideView>::default();
        let mut stale = false;
        for side in Side::BOTH {
            let text = fx.logs.get(side).log().read().await.unwrap();
            stale |= text.stale;
            *views.get_mut(side) = reconcile_side(&text.text, side, &fx.reviewer);
        }
        ReviewerState::from_views(views, stale)
    }

    fn log_lines(fx: &Fixture, blob: &str) -> Vec<String> {
        fx.store
            .blob_text(blob)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn save_appends_both_sides_and_places_the_artifact() {
        let mut fx = fixture();
        let state = ReviewerState::default();

        let outcome = fx
            .saver
            .save(
                &record(),
                &both(DecisionStatus::Accepted, DecisionStatus::Rejected),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap();

        let SaveOutcome::Saved(receipt) = outcome else {
            panic!("expected a saved receipt");
        };
        assert!(receipt.artifacts.hypothesis.is_some());
        assert_eq!(receipt.artifacts.adversarial, None);
        assert!(!receipt.salvaged);

        assert_eq!(log_lines(&fx, "log-h").len(), 1);
        assert_eq!(log_lines(&fx, "log-a").len(), 1);
        assert_eq!(
            fx.store.folder_names("folder-dst-h"),
            vec!["h_1.png".to_string()]
        );
        assert!(fx.store.folder_names("folder-dst-a").is_empty());

        let state = current_state(&fx).await;
        let key = record().pair_key();
        assert!(state.is_complete(&key));
        assert_eq!(
            state.status(Side::Hypothesis, &key),
            Some(DecisionStatus::Accepted)
        );
    }

    #[tokio::test]
    async fn an_undecided_side_blocks_before_any_io() {
        let mut fx = fixture();
        let state = ReviewerState::default();
        let decision = SideMap::new(Some(DecisionStatus::Accepted), None);

        let err = fx
            .saver
            .save(&record(), &decision, &state, &mut fx.logs)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SaveError::Undecided {
                side: Side::Adversarial
            }
        ));
        assert_eq!(fx.store.calls("put"), 0);
        assert_eq!(fx.store.calls("create_link"), 0);
        assert_eq!(fx.store.calls("delete"), 0);
    }

    #[tokio::test]
    async fn resubmitting_the_same_decision_is_a_no_op() {
        let mut fx = fixture();
        let decision = both(DecisionStatus::Accepted, DecisionStatus::Rejected);

        let state = ReviewerState::default();
        let first = fx
            .saver
            .save(&record(), &decision, &state, &mut fx.logs)
            .await
            .unwrap();
        assert!(matches!(first, SaveOutcome::Saved(_)));

        let state = current_state(&fx).await;
        let second = fx
            .saver
            .save(&record(), &decision, &state, &mut fx.logs)
            .await
            .unwrap();
        assert_eq!(second, SaveOutcome::Duplicate);

        assert_eq!(log_lines(&fx, "log-h").len(), 1, "no second append");
        assert_eq!(fx.store.calls("create_link"), 1);
    }

    #[tokio::test]
    async fn a_changed_decision_is_not_a_duplicate() {
        let mut fx = fixture();

        let state = ReviewerState::default();
        fx.saver
            .save(
                &record(),
                &both(DecisionStatus::Accepted, DecisionStatus::Rejected),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap();

        let state = current_state(&fx).await;
        let outcome = fx
            .saver
            .save(
                &record(),
                &both(DecisionStatus::Rejected, DecisionStatus::Rejected),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));

        assert!(
            fx.store.folder_names("folder-dst-h").is_empty(),
            "flip to rejected removed the artifact"
        );
        let state = current_state(&fx).await;
        assert_eq!(
            state.status(Side::Hypothesis, &record().pair_key()),
            Some(DecisionStatus::Rejected)
        );
    }

    #[tokio::test]
    async fn flip_cycle_keeps_exactly_one_artifact() {
        let mut fx = fixture();
        let rec = record();
        let key = rec.pair_key();

        let state = ReviewerState::default();
        let first = fx
            .saver
            .save(
                &rec,
                &both(DecisionStatus::Accepted, DecisionStatus::Accepted),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap();
        let SaveOutcome::Saved(first) = first else {
            panic!("expected saved");
        };
        let original = first.artifacts.hypothesis.clone().unwrap();

        let state = current_state(&fx).await;
        fx.saver
            .save(
                &rec,
                &both(DecisionStatus::Rejected, DecisionStatus::Accepted),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap();
        assert!(fx.store.folder_names("folder-dst-h").is_empty());
        let state = current_state(&fx).await;
        assert_eq!(
            state.record(Side::Hypothesis, &key).unwrap().export_id,
            None
        );

        let outcome = fx
            .saver
            .save(
                &rec,
                &both(DecisionStatus::Accepted, DecisionStatus::Accepted),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap();
        let SaveOutcome::Saved(receipt) = outcome else {
            panic!("expected saved");
        };
        let fresh = receipt.artifacts.hypothesis.unwrap();
        assert_ne!(fresh, original);
        assert_eq!(fx.store.folder_names("folder-dst-h").len(), 1);

        let state = current_state(&fx).await;
        assert_eq!(
            state.record(Side::Hypothesis, &key).unwrap().export_id,
            Some(fresh)
        );
    }

    #[tokio::test]
    async fn export_failure_aborts_with_nothing_appended() {
        let mut fx = fixture();
        fx.store
            .fail_always("create_link", StoreError::transient("link refused"));
        let state = ReviewerState::default();

        let err = fx
            .saver
            .save(
                &record(),
                &both(DecisionStatus::Accepted, DecisionStatus::Rejected),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SaveError::Export {
                side: Side::Hypothesis,
                ..
            }
        ));
        assert_eq!(fx.store.calls("put"), 0);
        assert!(fx.store.blob_text("log-h").is_none());
        assert_eq!(fx.saver.last_token(), None);
    }

    #[tokio::test]
    async fn append_failure_is_partial_and_lines_are_retained() {
        let mut fx = fixture();
        fx.store
            .fail_always("put", StoreError::transient("write down"));
        let decision = both(DecisionStatus::Accepted, DecisionStatus::Rejected);

        let state = ReviewerState::default();
        let err = fx
            .saver
            .save(&record(), &decision, &state, &mut fx.logs)
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::PartialFailure { .. }));
        assert_eq!(
            fx.store.folder_names("folder-dst-h").len(),
            1,
            "artifact state ran ahead of the log"
        );
        assert_eq!(fx.logs.hypothesis.pending(), 1);
        assert_eq!(fx.saver.last_token(), None);

        // The next successful save carries the retained lines along.
        fx.store.clear_faults();
        let state = current_state(&fx).await;
        let outcome = fx
            .saver
            .save(&record(), &decision, &state, &mut fx.logs)
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
        assert_eq!(fx.logs.hypothesis.pending(), 0);
        assert_eq!(fx.store.folder_names("folder-dst-h").len(), 1);

        let state = current_state(&fx).await;
        assert!(state.is_complete(&record().pair_key()));
    }

    #[tokio::test]
    async fn salvaged_append_is_flagged_on_the_receipt() {
        let mut fx = fixture();
        // History reads fail; folder listing and writes still work.
        fx.store
            .fail_always("get", StoreError::transient("read down"));
        let state = ReviewerState::default();

        let outcome = fx
            .saver
            .save(
                &record(),
                &both(DecisionStatus::Rejected, DecisionStatus::Rejected),
                &state,
                &mut fx.logs,
            )
            .await
            .unwrap();
        let SaveOutcome::Saved(receipt) = outcome else {
            panic!("expected saved");
        };
        assert!(receipt.salvaged);
        assert_eq!(log_lines(&fx, "log-h").len(), 1);
    }

    #[test]
    fn token_depends_on_every_input() {
        let reviewer = Reviewer::new("Ana").unwrap();
        let key = PairKey::new("h|a");
        let accepted = SideMap::new(DecisionStatus::Accepted, DecisionStatus::Accepted);
        let flipped = SideMap::new(DecisionStatus::Rejected, DecisionStatus::Accepted);

        let base = save_token(&key, &accepted, &reviewer);
        assert_eq!(base, save_token(&key, &accepted, &reviewer));
        assert_ne!(base, save_token(&PairKey::new("x|y"), &accepted, &reviewer));
        assert_ne!(base, save_token(&key, &flipped, &reviewer));
        assert_ne!(
            base,
            save_token(&key, &accepted, &Reviewer::new("Ben").unwrap())
        );
    }
}
