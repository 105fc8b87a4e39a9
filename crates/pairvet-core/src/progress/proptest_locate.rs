//! Property-based tests for resume-point selection.

use std::collections::HashSet;

use proptest::prelude::*;

use crate::model::{ItemRecord, PairKey};

use super::{locate, start_index, ResumePoint};

fn record(i: usize) -> ItemRecord {
    ItemRecord {
        hypothesis_item: format!("h{i}"),
        adversarial_item: format!("a{i}"),
        ..ItemRecord::default()
    }
}

/// A roster plus an arbitrary subset of it marked complete.
fn roster_with_completion() -> impl Strategy<Value = (Vec<ItemRecord>, HashSet<PairKey>)> {
    prop::collection::vec(any::<bool>(), 0..32).prop_map(|flags| {
        let records: Vec<ItemRecord> = (0..flags.len()).map(record).collect();
        let completed = records
            .iter()
            .zip(&flags)
            .filter(|(_, &done)| done)
            .map(|(r, _)| r.pair_key())
            .collect();
        (records, completed)
    })
}

proptest! {
    /// Everything before the resume point is complete, and the resume
    /// point itself is incomplete unless the whole roster is done.
    #[test]
    fn prop_locate_fronts_the_first_incomplete(
        (records, completed) in roster_with_completion(),
    ) {
        match locate(&records, &completed) {
            ResumePoint::Empty => prop_assert!(records.is_empty()),
            ResumePoint::At(at) => {
                prop_assert!(at < records.len());
                prop_assert!(records[..at]
                    .iter()
                    .all(|r| completed.contains(&r.pair_key())));
                if completed.len() == records.len() {
                    prop_assert_eq!(at, records.len() - 1);
                } else {
                    prop_assert!(!completed.contains(&records[at].pair_key()));
                }
            }
        }
    }

    /// A stored hint can only move the start forward, and never past the
    /// end of the roster.
    #[test]
    fn prop_hint_only_fast_forwards(
        base in 0usize..64,
        hint in proptest::option::of(0usize..128),
        len in 1usize..64,
    ) {
        let base = base.min(len - 1);
        let start = start_index(ResumePoint::At(base), hint, len);
        match start {
            ResumePoint::Empty => prop_assert!(false, "non-empty roster lost its start"),
            ResumePoint::At(at) => {
                prop_assert!(at >= base);
                prop_assert!(at < len);
                if let Some(h) = hint {
                    prop_assert_eq!(at, base.max(h).min(len - 1));
                }
            }
        }
    }
}
