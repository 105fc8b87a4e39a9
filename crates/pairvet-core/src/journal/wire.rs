//! Wire codec for decision log lines.
//!
//! A log blob is newline-delimited JSON, one decision per line. Encoding
//! is strict and total: a [`DecisionLine`] always serializes to a single
//! line. Decoding is lenient by contract: logs accumulate lines from many
//! client versions, so [`parse_decision_line`] recovers everything it can
//! and returns `None` for lines that carry no usable decision. Skipped
//! lines are counted by the reconciler, never fatal.
//!
//! Legacy field shapes accepted on read:
//! - missing `pair_key`, synthesized from the `hypo_id` / `adversarial_id`
//!   item names
//! - `annotator` / `_annotator_canon` in place of `reviewer`
//! - `copied_id` in place of `export_id`
//! - missing `side`, inferred by the caller from which log held the line

use serde_json::{Map, Value};

use crate::model::{DecisionStatus, PairKey, Reviewer, Side};
use crate::store::BlobId;

/// One decision as written to a log line.
///
/// `extra` carries the originating record's descriptive fields verbatim so
/// a log line is auditable without the manifest at hand. The named fields
/// below always win over same-named keys in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionLine {
    /// Identity of the pair within its category.
    pub pair_key: PairKey,
    /// Which side of the pair was judged.
    pub side: Side,
    /// The verdict.
    pub status: DecisionStatus,
    /// Canonical reviewer name.
    pub reviewer: String,
    /// Reviewer name as entered.
    pub reviewer_display: String,
    /// Unix seconds at which the decision was made.
    pub decided_at: u64,
    /// Idempotency token of the save that produced this line.
    pub save_token: String,
    /// Export link created by this decision, when the side was accepted.
    pub export_id: Option<BlobId>,
    /// Originating record fields, passed through for audit.
    pub extra: Map<String, Value>,
}

impl DecisionLine {
    /// Serializes to one line of compact JSON (no trailing newline).
    #[must_use]
    pub fn encode(&self) -> String {
        let mut map = self.extra.clone();
        map.insert(
            "pair_key".to_string(),
            Value::String(self.pair_key.as_str().to_string()),
        );
        map.insert(
            "side".to_string(),
            Value::String(self.side.wire_name().to_string()),
        );
        map.insert(
            "status".to_string(),
            Value::String(self.status.wire_name().to_string()),
        );
        map.insert("reviewer".to_string(), Value::String(self.reviewer.clone()));
        map.insert(
            "reviewer_display".to_string(),
            Value::String(self.reviewer_display.clone()),
        );
        map.insert("decided_at".to_string(), Value::from(self.decided_at));
        map.insert(
            "save_token".to_string(),
            Value::String(self.save_token.clone()),
        );
        if let Some(id) = &self.export_id {
            map.insert(
                "export_id".to_string(),
                Value::String(id.as_str().to_string()),
            );
        }
        Value::Object(map).to_string()
    }
}

/// A decision recovered from one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDecision {
    /// Pair identity, explicit or synthesized from item names.
    pub pair_key: PairKey,
    /// Side named on the line, if any. Lines from per-side logs often
    /// omit it; the caller substitutes the log's own side.
    pub side: Option<Side>,
    /// The verdict.
    pub status: DecisionStatus,
    /// Canonical reviewer name. Empty on legacy lines written before
    /// attribution; the reconciler assigns those to the active reviewer.
    pub reviewer: String,
    /// Unix seconds; `0` when absent or unparseable.
    pub decided_at: u64,
    /// Export link recorded with the decision, if any.
    pub export_id: Option<BlobId>,
}

/// Parses one non-blank log line.
///
/// Returns `None` when the line is not a JSON object or carries no
/// recognizable verdict; callers count those as skipped.
#[must_use]
pub fn parse_decision_line(raw: &str) -> Option<ParsedDecision> {
    let value: Value = serde_json::from_str(raw.trim()).ok()?;
    let obj = value.as_object()?;

    let status = DecisionStatus::parse(text_field(obj, "status")?)?;

    let pair_key = match text_field(obj, "pair_key") {
        Some(key) if !key.trim().is_empty() => PairKey::new(key),
        _ => PairKey::derive(
            text_field(obj, "hypo_id")
                .or_else(|| text_field(obj, "hypothesis_id"))
                .unwrap_or(""),
            text_field(obj, "adversarial_id").unwrap_or(""),
        ),
    };

    let side = text_field(obj, "side").and_then(Side::parse);

    let reviewer = text_field(obj, "reviewer")
        .or_else(|| text_field(obj, "_annotator_canon"))
        .or_else(|| text_field(obj, "annotator"))
        .map(Reviewer::canonicalize)
        .unwrap_or_default();

    let decided_at = match obj.get("decided_at") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };

    let export_id = text_field(obj, "export_id")
        .or_else(|| text_field(obj, "copied_id"))
        .filter(|id| !id.trim().is_empty())
        .map(BlobId::from);

    Some(ParsedDecision {
        pair_key,
        side,
        status,
        reviewer,
        decided_at,
        export_id,
    })
}

fn text_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}
