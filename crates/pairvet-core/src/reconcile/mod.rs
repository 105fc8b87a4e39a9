//! Log replay: from raw log text to per-reviewer decision state.
//!
//! Logs are append-only; current state is always derived by folding, never
//! stored. The fold is latest-wins per `(pair, reviewer, side)`: lines are
//! sorted by `decided_at` (stable, so equal stamps keep log order, which
//! protects against out-of-order appends from retried writes) and then
//! folded left to right so the last line per pair stands.
//!
//! Back-compat rules applied here, and only here:
//! - lines without a reviewer belong to the active reviewer;
//! - lines without a side belong to the log they were found in;
//! - unparseable lines are skipped and counted, never fatal.
//!
//! A pair is complete for a reviewer when both sides hold a verdict.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::journal::wire::parse_decision_line;
use crate::model::{DecisionStatus, PairKey, Reviewer, Side, SideMap};
use crate::store::BlobId;

/// The standing decision for one `(pair, side)` after the fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    /// The verdict.
    pub status: DecisionStatus,
    /// Unix seconds of the winning line.
    pub decided_at: u64,
    /// Export link recorded with the winning line, if any.
    pub export_id: Option<BlobId>,
}

/// One side's reconciled view for one reviewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideView {
    /// Latest decision per pair.
    pub latest: HashMap<PairKey, DecisionRecord>,
    /// Lines that could not be parsed as decisions.
    pub skipped: usize,
}

/// Folds one log's text into the latest decision per pair for `reviewer`.
///
/// `log_side` names the log being replayed; lines carrying a different
/// explicit side are misfiled and ignored.
#[must_use]
pub fn reconcile_side(text: &str, log_side: Side, reviewer: &Reviewer) -> SideView {
    let mut decisions = Vec::new();
    let mut skipped = 0_usize;

    for raw in text.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        let Some(parsed) = parse_decision_line(raw) else {
            skipped += 1;
            continue;
        };
        if parsed.side.is_some_and(|side| side != log_side) {
            debug!(log_side = %log_side, "ignoring misfiled decision line");
            continue;
        }
        let theirs = if parsed.reviewer.is_empty() {
            reviewer.canonical()
        } else {
            parsed.reviewer.as_str()
        };
        if theirs != reviewer.canonical() {
            continue;
        }
        decisions.push(parsed);
    }

    if skipped > 0 {
        warn!(log_side = %log_side, skipped, "skipped unparseable decision lines");
    }

    // Stable sort: equal stamps keep their log order.
    decisions.sort_by_key(|d| d.decided_at);

    let mut latest = HashMap::new();
    for decision in decisions {
        latest.insert(
            decision.pair_key,
            DecisionRecord {
                status: decision.status,
                decided_at: decision.decided_at,
                export_id: decision.export_id,
            },
        );
    }

    SideView { latest, skipped }
}

/// Both sides' reconciled state for one reviewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewerState {
    /// Per-side latest decisions.
    pub sides: SideMap<SideView>,
    /// Pairs with a verdict on both sides.
    pub completed: HashSet<PairKey>,
    /// Unparseable lines across both logs.
    pub skipped: usize,
    /// `true` when either log was served from the fallback cache.
    pub stale: bool,
}

impl ReviewerState {
    /// Combines two per-side views into session state.
    #[must_use]
    pub fn from_views(sides: SideMap<SideView>, stale: bool) -> Self {
        let completed = sides
            .hypothesis
            .latest
            .keys()
            .filter(|key| sides.adversarial.latest.contains_key(*key))
            .cloned()
            .collect();
        let skipped = sides.hypothesis.skipped + sides.adversarial.skipped;
        Self {
            sides,
            completed,
            skipped,
            stale,
        }
    }

    /// The standing record for one `(pair, side)`, if any.
    #[must_use]
    pub fn record(&self, side: Side, key: &PairKey) -> Option<&DecisionRecord> {
        self.sides.get(side).latest.get(key)
    }

    /// The standing verdict for one `(pair, side)`, if any.
    #[must_use]
    pub fn status(&self, side: Side, key: &PairKey) -> Option<DecisionStatus> {
        self.record(side, key).map(|r| r.status)
    }

    /// Whether both sides of `key` hold a verdict.
    #[must_use]
    pub fn is_complete(&self, key: &PairKey) -> bool {
        self.completed.contains(key)
    }
}

#[cfg(test)]
mod proptest_fold;
