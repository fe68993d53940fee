//! Tiers and the two annotation kinds they can hold.
//!
//! A tier stores its annotations in exactly one of two modes for its whole
//! lifetime: time-aligned (anchored to two timeslots) or referential
//! (anchored to an annotation on the parent tier). The mode is fixed at
//! creation from the tier's linguistic type and enforced on every insert.

use serde::{Deserialize, Serialize};

/// A named point in time. The timestamp may be absent (unanchored slot
/// pending explicit assignment).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TimeSlot {
    /// Slot identifier, `ts<N>`.
    pub id: String,
    /// Millisecond timestamp, if anchored.
    pub time: Option<i64>,
}

impl TimeSlot {
    /// Numeric suffix of a `ts<N>` / `a<N>` style identifier, used to seed
    /// the id counters when re-parsing a document.
    pub fn numeric_suffix(id: &str) -> Option<u64> {
        let digits = id.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        digits.parse().ok()
    }
}

/// An annotation directly anchored to two timeslots.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AlignedAnnotation {
    /// Annotation identifier, `a<N>`.
    pub id: String,
    /// Start timeslot reference.
    pub start_slot: String,
    /// End timeslot reference.
    pub end_slot: String,
    /// Annotation text.
    pub value: String,
    /// Optional graphic reference.
    pub svg_ref: Option<String>,
}

/// An annotation defined relative to an annotation on the parent tier,
/// with no time anchor of its own.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RefAnnotation {
    /// Annotation identifier, `a<N>`.
    pub id: String,
    /// The annotation this one refers to, living on the parent tier.
    pub annotation_ref: String,
    /// Annotation text.
    pub value: String,
    /// Previous sibling under the same parent annotation, if any.
    pub previous: Option<String>,
    /// Optional graphic reference.
    pub svg_ref: Option<String>,
}

/// Annotation storage of a tier: a tagged variant rather than a pair of
/// maps, so mixing the two kinds is unrepresentable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum TierAnnotations {
    /// Time-aligned annotations, in insertion order.
    Aligned(Vec<AlignedAnnotation>),
    /// Reference annotations, in insertion order.
    Reference(Vec<RefAnnotation>),
}

impl TierAnnotations {
    /// Number of annotations on the tier.
    pub fn len(&self) -> usize {
        match self {
            TierAnnotations::Aligned(a) => a.len(),
            TierAnnotations::Reference(r) => r.len(),
        }
    }

    /// True when the tier holds no annotations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all annotations on the tier, in insertion order.
    pub fn ids(&self) -> Vec<&str> {
        match self {
            TierAnnotations::Aligned(a) => a.iter().map(|a| a.id.as_str()).collect(),
            TierAnnotations::Reference(r) => r.iter().map(|r| r.id.as_str()).collect(),
        }
    }
}

/// A named, ordered channel of annotations, optionally nested under a
/// parent tier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Tier {
    /// Unique, stable tier identifier.
    pub id: String,
    /// Serialization order, assigned at creation, compacted on tier
    /// removal and preserved across load/save.
    pub ordinal: usize,
    /// Linguistic type reference; decides the annotation mode.
    pub linguistic_type: String,
    /// Structural parent tier, if any. The parent graph is a forest.
    pub parent: Option<String>,
    /// Default locale reference.
    pub locale: Option<String>,
    /// Participant metadata.
    pub participant: Option<String>,
    /// Annotator metadata.
    pub annotator: Option<String>,
    /// Content language reference.
    pub language: Option<String>,
    /// The annotations, in the mode fixed at creation.
    pub annotations: TierAnnotations,
}

impl Tier {
    /// Look up an aligned annotation by id. `None` for reference tiers.
    pub fn aligned(&self, id: &str) -> Option<&AlignedAnnotation> {
        match &self.annotations {
            TierAnnotations::Aligned(anns) => anns.iter().find(|a| a.id == id),
            TierAnnotations::Reference(_) => None,
        }
    }

    /// Look up a reference annotation by id. `None` for aligned tiers.
    pub fn reference(&self, id: &str) -> Option<&RefAnnotation> {
        match &self.annotations {
            TierAnnotations::Reference(anns) => anns.iter().find(|a| a.id == id),
            TierAnnotations::Aligned(_) => None,
        }
    }

    /// True when the tier stores time-aligned annotations.
    pub fn is_aligned(&self) -> bool {
        matches!(self.annotations, TierAnnotations::Aligned(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_suffix() {
        assert_eq!(TimeSlot::numeric_suffix("ts42"), Some(42));
        assert_eq!(TimeSlot::numeric_suffix("a7"), Some(7));
        assert_eq!(TimeSlot::numeric_suffix("ts"), None);
        assert_eq!(TimeSlot::numeric_suffix("nonsense"), None);
    }
}
