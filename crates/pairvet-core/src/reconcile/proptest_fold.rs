//! Property-based tests for the latest-wins fold.
//!
//! The fold must be insensitive to line order (appends retried out of
//! order), to interleaved garbage, and must never un-complete a pair.

use proptest::prelude::*;

use crate::model::{DecisionStatus, PairKey, Reviewer, Side, SideMap};

use super::{reconcile_side, ReviewerState};

fn status_name(accepted: bool) -> &'static str {
    if accepted {
        "accepted"
    } else {
        "rejected"
    }
}

fn line(key: &str, accepted: bool, ts: u64) -> String {
    format!(
        r#"{{"pair_key":"{key}","status":"{}","reviewer":"ana","decided_at":{ts}}}"#,
        status_name(accepted)
    )
}

fn ana() -> Reviewer {
    Reviewer::new("ana").unwrap()
}

/// Statuses for one pair plus a permutation of their line order.
fn shuffled_history() -> impl Strategy<Value = (Vec<bool>, Vec<usize>)> {
    prop::collection::vec(any::<bool>(), 1..16).prop_flat_map(|statuses| {
        let order: Vec<usize> = (0..statuses.len()).collect();
        (Just(statuses), Just(order).prop_shuffle())
    })
}

/// Garbage that can never parse as JSON (JSON cannot start with `!`).
fn garbage_lines() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("![a-z ]{0,16}", 0..8)
}

proptest! {
    /// The greatest timestamp wins no matter the order lines appear in
    /// the log.
    #[test]
    fn prop_latest_wins_under_any_line_order(
        (statuses, order) in shuffled_history(),
    ) {
        let text = order
            .iter()
            .map(|&i| line("h|a", statuses[i], (i + 1) as u64))
            .collect::<Vec<_>>()
            .join("\n");

        let view = reconcile_side(&text, Side::Hypothesis, &ana());
        let winner = view.latest.get(&PairKey::new("h|a")).unwrap();
        let expected = if *statuses.last().unwrap() {
            DecisionStatus::Accepted
        } else {
            DecisionStatus::Rejected
        };
        prop_assert_eq!(winner.status, expected);
        prop_assert_eq!(winner.decided_at, statuses.len() as u64);
    }

    /// Interleaving unparseable lines never changes the fold result.
    #[test]
    fn prop_garbage_lines_change_nothing(
        statuses in prop::collection::vec(any::<bool>(), 1..12),
        garbage in garbage_lines(),
    ) {
        let clean: Vec<String> = statuses
            .iter()
            .enumerate()
            .map(|(i, &accepted)| line(&format!("p{i}"), accepted, (i + 1) as u64))
            .collect();

        let mut dirty = clean.clone();
        for (offset, junk) in garbage.into_iter().enumerate() {
            let at = (offset * 2).min(dirty.len());
            dirty.insert(at, junk);
        }

        let clean_view = reconcile_side(&clean.join("\n"), Side::Hypothesis, &ana());
        let dirty_view = reconcile_side(&dirty.join("\n"), Side::Hypothesis, &ana());
        prop_assert_eq!(clean_view.latest, dirty_view.latest);
    }

    /// Once both sides hold a verdict, no appended line can remove the
    /// pair from the completed set; later lines can only flip status.
    #[test]
    fn prop_completion_is_monotonic(
        extra in prop::collection::vec(any::<bool>(), 0..8),
        junk in garbage_lines(),
    ) {
        let mut hypothesis = vec![line("h|a", true, 1)];
        for (i, &accepted) in extra.iter().enumerate() {
            hypothesis.push(line("h|a", accepted, (i + 2) as u64));
        }
        hypothesis.extend(junk);
        let adversarial = line("h|a", false, 1);

        let state = ReviewerState::from_views(
            SideMap::new(
                reconcile_side(&hypothesis.join("\n"), Side::Hypothesis, &ana()),
                reconcile_side(&adversarial, Side::Adversarial, &ana()),
            ),
            false,
        );
        prop_assert!(state.is_complete(&PairKey::new("h|a")));
    }
}
