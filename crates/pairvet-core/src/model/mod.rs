//! Shared vocabulary types for the decision engine.
//!
//! Everything above the store seam speaks in these types: which side of a
//! pair is being judged ([`Side`]), what was decided ([`DecisionStatus`]),
//! who decided ([`Reviewer`]), and which pair it was ([`PairKey`]).
//!
//! # Design
//!
//! Per-side logic is written once and driven by [`Side`] plus
//! [`SideMap`]; there are no duplicated hypothesis/adversarial code paths
//! anywhere in the crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while constructing vocabulary types.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    /// Reviewer name was empty after trimming.
    #[error("reviewer name is empty after canonicalization")]
    EmptyReviewer,
}

// =============================================================================
// Side
// =============================================================================

/// The two sides of a paired record.
///
/// Every record under triage carries exactly two images; each is accepted or
/// rejected independently. Wire names are `"hypothesis"` and
/// `"adversarial"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The candidate (non-prototype) image.
    Hypothesis,
    /// The adversarial (prototype) image.
    Adversarial,
}

impl Side {
    /// Both sides, in canonical order.
    pub const BOTH: [Self; 2] = [Self::Hypothesis, Self::Adversarial];

    /// The wire name used in decision log lines.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Hypothesis => "hypothesis",
            Self::Adversarial => "adversarial",
        }
    }

    /// Parses a wire name leniently (surrounding whitespace and ASCII case
    /// are ignored). Returns `None` for anything else.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("hypothesis") {
            Some(Self::Hypothesis)
        } else if raw.eq_ignore_ascii_case("adversarial") {
            Some(Self::Adversarial)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// A pair of values addressed by [`Side`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideMap<T> {
    /// Value for [`Side::Hypothesis`].
    pub hypothesis: T,
    /// Value for [`Side::Adversarial`].
    pub adversarial: T,
}

impl<T> SideMap<T> {
    /// Builds a map from explicit per-side values.
    pub const fn new(hypothesis: T, adversarial: T) -> Self {
        Self {
            hypothesis,
            adversarial,
        }
    }

    /// Builds a map by evaluating `f` once per side.
    pub fn from_fn(mut f: impl FnMut(Side) -> T) -> Self {
        Self {
            hypothesis: f(Side::Hypothesis),
            adversarial: f(Side::Adversarial),
        }
    }

    /// Borrows the value for `side`.
    pub const fn get(&self, side: Side) -> &T {
        match side {
            Side::Hypothesis => &self.hypothesis,
            Side::Adversarial => &self.adversarial,
        }
    }

    /// Mutably borrows the value for `side`.
    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Hypothesis => &mut self.hypothesis,
            Side::Adversarial => &mut self.adversarial,
        }
    }

    /// Maps both values, keeping the side association.
    pub fn map<U>(self, mut f: impl FnMut(Side, T) -> U) -> SideMap<U> {
        SideMap {
            hypothesis: f(Side::Hypothesis, self.hypothesis),
            adversarial: f(Side::Adversarial, self.adversarial),
        }
    }

    /// Iterates `(side, value)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Side, &T)> {
        [
            (Side::Hypothesis, &self.hypothesis),
            (Side::Adversarial, &self.adversarial),
        ]
        .into_iter()
    }
}

// =============================================================================
// DecisionStatus
// =============================================================================

/// A reviewer's verdict on one side of a pair.
///
/// There is no "undecided" variant: an undecided side is the *absence* of a
/// status (`Option<DecisionStatus>`), and nothing that reaches a decision
/// log carries anything but these two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    /// The image passes triage.
    Accepted,
    /// The image fails triage.
    Rejected,
}

impl DecisionStatus {
    /// The wire name used in decision log lines.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a wire name leniently; anything that is not an accept or a
    /// reject is `None` (callers treat that as undecided).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("accepted") {
            Some(Self::Accepted)
        } else if raw.eq_ignore_ascii_case("rejected") {
            Some(Self::Rejected)
        } else {
            None
        }
    }

    /// Returns `true` for [`DecisionStatus::Accepted`].
    #[must_use]
    pub const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// =============================================================================
// PairKey
// =============================================================================

/// Opaque identity of a record within a category.
///
/// Canonical form is `"{hypothesis_item}|{adversarial_item}"`. Log lines
/// that carry an explicit key use it verbatim; lines that predate the key
/// field get one synthesized from their item names. That synthesis is the
/// single legacy derivation step in the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairKey(String);

impl PairKey {
    /// Wraps an explicit key taken from a log line.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Synthesizes the canonical key from the two item names.
    ///
    /// Empty names still yield a usable key (`"|"` at worst) so legacy
    /// logs with sparse records stay foldable.
    #[must_use]
    pub fn derive(hypothesis_item: &str, adversarial_item: &str) -> Self {
        Self(format!("{hypothesis_item}|{adversarial_item}"))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Reviewer
// =============================================================================

/// A reviewer identity with its canonical form.
///
/// Canonicalization is trim plus ASCII lowercase; `"  Ana "` and `"ana"`
/// are the same reviewer. Equality and hashing use only the canonical
/// form; the display form is kept for log lines and messages.
#[derive(Debug, Clone)]
pub struct Reviewer {
    display: String,
    canonical: String,
}

impl Reviewer {
    /// Builds a reviewer from a display name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyReviewer`] if the name is empty after
    /// trimming.
    pub fn new(display: impl Into<String>) -> Result<Self, ModelError> {
        let display = display.into();
        let canonical = Self::canonicalize(&display);
        if canonical.is_empty() {
            return Err(ModelError::EmptyReviewer);
        }
        Ok(Self {
            display: display.trim().to_string(),
            canonical,
        })
    }

    /// Canonical form of an arbitrary name (trim plus ASCII lowercase).
    /// Usable on untrusted log fields; may return an empty string.
    #[must_use]
    pub fn canonicalize(raw: &str) -> String {
        raw.trim().to_ascii_lowercase()
    }

    /// The name as entered, trimmed.
    #[must_use]
    pub fn display(&self) -> &str {
        &self.display
    }

    /// The canonical name used for log attribution.
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl PartialEq for Reviewer {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Reviewer {}

impl std::hash::Hash for Reviewer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for Reviewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

// =============================================================================
// ItemRecord
// =============================================================================

/// One unit of triage work, parsed from a category's manifest blob.
///
/// The per-side fields `hypo_id` / `adversarial_id` are item *names*, not
/// blob ids; they are resolved against the category's source folders when
/// bytes or export targets are needed. Unknown manifest fields are kept in
/// `extra` and passed through to decision log lines for audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Manifest-assigned record id (may be empty).
    #[serde(default)]
    pub id: String,
    /// Prompt text shown alongside the images.
    #[serde(default)]
    pub text: String,
    /// Description of the hypothesis image.
    #[serde(default)]
    pub hypothesis: String,
    /// Description of the adversarial image.
    #[serde(default)]
    pub adversarial: String,
    /// Item name of the hypothesis image.
    #[serde(rename = "hypo_id", alias = "hypothesis_id", default)]
    pub hypothesis_item: String,
    /// Item name of the adversarial image.
    #[serde(rename = "adversarial_id", default)]
    pub adversarial_item: String,
    /// Any further manifest fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ItemRecord {
    /// The item name for `side`.
    #[must_use]
    pub fn item_name(&self, side: Side) -> &str {
        match side {
            Side::Hypothesis => &self.hypothesis_item,
            Side::Adversarial => &self.adversarial_item,
        }
    }

    /// The canonical pair key of this record.
    #[must_use]
    pub fn pair_key(&self) -> PairKey {
        PairKey::derive(&self.hypothesis_item, &self.adversarial_item)
    }
}
