//! Gap, pause and overlap timeline between two annotation tiers.
//!
//! Given the sorted interval lists of two speakers, the engine labels
//! every maximal run of the combined timeline following the Heldner &
//! Edlund classification: silences between different speakers are gaps,
//! silences within one speaker's activity are pauses, simultaneous speech
//! is a between- or within-speaker overlap depending on whether the turn
//! changes hands across it.
//!
//! Two implementations are exposed. [`gaps_and_overlaps`] merges the two
//! interval lists as sorted streams in O(n). [`gaps_and_overlaps_naive`]
//! samples the timeline millisecond by millisecond, O(duration); it is the
//! reference the merge variant is checked against and agrees with it for
//! all non-degenerate inputs.

use serde::{Deserialize, Serialize};

/// Classification of one timeline segment. Speaker numbers are 1 for the
/// first tier and 2 for the second.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Only the first speaker is active.
    Speaker1,
    /// Only the second speaker is active.
    Speaker2,
    /// Within-speaker silence.
    Pause(u8),
    /// Between-speaker silence, from the first speaker to the second.
    Gap(u8, u8),
    /// Both speaking across a turn change, from-speaker to to-speaker.
    BetweenOverlap(u8, u8),
    /// Both speaking within one speaker's turn.
    WithinOverlap(u8),
}

impl SegmentKind {
    /// Directional label of the segment: `S1`, `S2`, `P1`, `G12`, `O21`,
    /// `W2`, ...
    pub fn label(&self) -> String {
        match self {
            SegmentKind::Speaker1 => "S1".to_string(),
            SegmentKind::Speaker2 => "S2".to_string(),
            SegmentKind::Pause(s) => format!("P{}", s),
            SegmentKind::Gap(from, to) => format!("G{}{}", from, to),
            SegmentKind::BetweenOverlap(from, to) => format!("O{}{}", from, to),
            SegmentKind::WithinOverlap(s) => format!("W{}", s),
        }
    }

    /// True for gaps and pauses, the only kinds the max-length filter
    /// applies to.
    pub fn is_silence(&self) -> bool {
        matches!(self, SegmentKind::Pause(_) | SegmentKind::Gap(_, _))
    }
}

/// One labeled segment of the combined timeline, `[begin, end)` in ms.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub begin: i64,
    pub end: i64,
    pub kind: SegmentKind,
}

/// Raw activity state of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Neither,
    Only1,
    Only2,
    Both,
}

/// Compute the labeled timeline by merging the two interval lists as
/// sorted streams. O(n) in the number of intervals.
///
/// `max_length_ms` drops gaps and pauses longer than the threshold;
/// overlaps and speech segments are never filtered.
pub fn gaps_and_overlaps(
    tier1: &[(i64, i64)],
    tier2: &[(i64, i64)],
    max_length_ms: Option<i64>,
) -> Vec<Segment> {
    classify(merge_runs(tier1, tier2), max_length_ms)
}

/// Millisecond-resolution reference implementation of the same
/// classification. O(duration); use [`gaps_and_overlaps`] outside tests
/// and verification.
pub fn gaps_and_overlaps_naive(
    tier1: &[(i64, i64)],
    tier2: &[(i64, i64)],
    max_length_ms: Option<i64>,
) -> Vec<Segment> {
    classify(scan_runs(tier1, tier2), max_length_ms)
}

/// Coalesced activity runs via a two-pointer boundary merge.
fn merge_runs(tier1: &[(i64, i64)], tier2: &[(i64, i64)]) -> Vec<(i64, i64, State)> {
    let (lo, hi) = match extent(tier1, tier2) {
        Some(b) => b,
        None => return Vec::new(),
    };

    // Boundary times of both tiers, merged. Each interval contributes its
    // two edges; the lists are sorted, so a linear merge suffices after
    // flattening.
    let mut bounds: Vec<i64> = Vec::with_capacity(2 * (tier1.len() + tier2.len()) + 2);
    bounds.push(lo);
    bounds.push(hi);
    for &(s, e) in tier1.iter().chain(tier2.iter()) {
        bounds.push(s);
        bounds.push(e);
    }
    bounds.sort_unstable();
    bounds.dedup();

    let mut runs: Vec<(i64, i64, State)> = Vec::new();
    let mut i1 = 0;
    let mut i2 = 0;
    for pair in bounds.windows(2) {
        let (begin, end) = (pair[0], pair[1]);
        while i1 < tier1.len() && tier1[i1].1 <= begin {
            i1 += 1;
        }
        while i2 < tier2.len() && tier2[i2].1 <= begin {
            i2 += 1;
        }
        let active1 = i1 < tier1.len() && tier1[i1].0 <= begin && begin < tier1[i1].1;
        let active2 = i2 < tier2.len() && tier2[i2].0 <= begin && begin < tier2[i2].1;
        push_run(&mut runs, begin, end, state_of(active1, active2));
    }
    runs
}

/// Coalesced activity runs by sampling every millisecond of the extent.
fn scan_runs(tier1: &[(i64, i64)], tier2: &[(i64, i64)]) -> Vec<(i64, i64, State)> {
    let (lo, hi) = match extent(tier1, tier2) {
        Some(b) => b,
        None => return Vec::new(),
    };
    let contains = |intervals: &[(i64, i64)], t: i64| {
        intervals.iter().any(|&(s, e)| s <= t && t < e)
    };
    let mut runs: Vec<(i64, i64, State)> = Vec::new();
    for t in lo..hi {
        let state = state_of(contains(tier1, t), contains(tier2, t));
        push_run(&mut runs, t, t + 1, state);
    }
    runs
}

fn extent(tier1: &[(i64, i64)], tier2: &[(i64, i64)]) -> Option<(i64, i64)> {
    let lo = tier1
        .iter()
        .chain(tier2.iter())
        .map(|&(s, _)| s)
        .min()?;
    let hi = tier1
        .iter()
        .chain(tier2.iter())
        .map(|&(_, e)| e)
        .max()?;
    (lo < hi).then_some((lo, hi))
}

fn state_of(active1: bool, active2: bool) -> State {
    match (active1, active2) {
        (false, false) => State::Neither,
        (true, false) => State::Only1,
        (false, true) => State::Only2,
        (true, true) => State::Both,
    }
}

/// Append a run, coalescing with the previous one when the state matches
/// and never emitting zero-width runs.
fn push_run(runs: &mut Vec<(i64, i64, State)>, begin: i64, end: i64, state: State) {
    if begin >= end {
        return;
    }
    match runs.last_mut() {
        Some((_, last_end, last_state)) if *last_state == state && *last_end == begin => {
            *last_end = end;
        }
        _ => runs.push((begin, end, state)),
    }
}

fn speaker_of(state: State) -> Option<u8> {
    match state {
        State::Only1 => Some(1),
        State::Only2 => Some(2),
        _ => None,
    }
}

/// Label runs using the nearest single-speaker neighbors for the
/// silent/both cases, then apply the max-length filter to silences.
fn classify(runs: Vec<(i64, i64, State)>, max_length_ms: Option<i64>) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(runs.len());
    for (i, &(begin, end, state)) in runs.iter().enumerate() {
        let prev = runs[..i].iter().rev().find_map(|&(_, _, s)| speaker_of(s));
        let next = runs[i + 1..].iter().find_map(|&(_, _, s)| speaker_of(s));
        let kind = match state {
            State::Only1 => SegmentKind::Speaker1,
            State::Only2 => SegmentKind::Speaker2,
            State::Neither => match (prev, next) {
                (Some(p), Some(n)) if p != n => SegmentKind::Gap(p, n),
                (p, n) => SegmentKind::Pause(p.or(n).unwrap_or(1)),
            },
            State::Both => match (prev, next) {
                (Some(p), Some(n)) if p != n => SegmentKind::BetweenOverlap(p, n),
                (p, n) => SegmentKind::WithinOverlap(p.or(n).unwrap_or(1)),
            },
        };
        segments.push(Segment { begin, end, kind });
    }
    if let Some(maxlen) = max_length_ms {
        segments.retain(|seg| {
            let keep = !seg.kind.is_silence() || seg.end - seg.begin <= maxlen;
            if !keep {
                log::debug!(
                    "dropping {} segment [{}, {}) over the {} ms threshold",
                    seg.kind.label(),
                    seg.begin,
                    seg.end,
                    maxlen
                );
            }
            keep
        });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &[(i64, i64)] = &[(1, 500), (1000, 2000), (3000, 4500)];
    const B: &[(i64, i64)] = &[(1500, 2500), (3500, 4000)];

    fn labels(segments: &[Segment]) -> Vec<(i64, i64, String)> {
        segments
            .iter()
            .map(|s| (s.begin, s.end, s.kind.label()))
            .collect()
    }

    #[test]
    fn test_two_speaker_scenario() {
        let segments = gaps_and_overlaps(A, B, None);
        assert_eq!(
            labels(&segments),
            vec![
                (1, 500, "S1".to_string()),
                (500, 1000, "P1".to_string()),
                (1000, 1500, "S1".to_string()),
                (1500, 2000, "O12".to_string()),
                (2000, 2500, "S2".to_string()),
                (2500, 3000, "G21".to_string()),
                (3000, 3500, "S1".to_string()),
                (3500, 4000, "W1".to_string()),
                (4000, 4500, "S1".to_string()),
            ]
        );
    }

    #[test]
    fn test_naive_agrees_with_merge() {
        assert_eq!(gaps_and_overlaps_naive(A, B, None), gaps_and_overlaps(A, B, None));

        let mixed: &[(i64, i64)] = &[(0, 10), (10, 20), (25, 40)];
        let other: &[(i64, i64)] = &[(5, 15), (40, 50)];
        assert_eq!(
            gaps_and_overlaps_naive(mixed, other, None),
            gaps_and_overlaps(mixed, other, None)
        );
    }

    #[test]
    fn test_abutting_intervals_emit_no_silence() {
        // Shared boundary at 100: no zero-width gap or pause appears, in
        // either implementation.
        let a: &[(i64, i64)] = &[(0, 100)];
        let b: &[(i64, i64)] = &[(100, 200)];
        let expected = vec![
            (0, 100, "S1".to_string()),
            (100, 200, "S2".to_string()),
        ];
        assert_eq!(labels(&gaps_and_overlaps(a, b, None)), expected);
        assert_eq!(labels(&gaps_and_overlaps_naive(a, b, None)), expected);
    }

    #[test]
    fn test_max_length_filters_silences_only() {
        let segments = gaps_and_overlaps(A, B, Some(400));
        let labels = labels(&segments);
        // The 500 ms pause and gap are gone, the overlaps stay.
        assert!(!labels.iter().any(|(_, _, l)| l == "P1" || l == "G21"));
        assert!(labels.iter().any(|(_, _, l)| l == "O12"));
        assert!(labels.iter().any(|(_, _, l)| l == "W1"));
    }

    #[test]
    fn test_edge_silence_is_pause() {
        // A silence with a speaker on only one side classifies as a pause
        // of that speaker.
        let a: &[(i64, i64)] = &[(0, 100), (200, 300)];
        let b: &[(i64, i64)] = &[];
        assert_eq!(
            labels(&gaps_and_overlaps(a, b, None)),
            vec![
                (0, 100, "S1".to_string()),
                (100, 200, "P1".to_string()),
                (200, 300, "S1".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(gaps_and_overlaps(&[], &[], None).is_empty());
        assert!(gaps_and_overlaps_naive(&[], &[], None).is_empty());
    }

    #[test]
    fn test_containment_overlap_is_within() {
        // B speaks entirely inside A's turn.
        let a: &[(i64, i64)] = &[(0, 1000)];
        let b: &[(i64, i64)] = &[(200, 400)];
        assert_eq!(
            labels(&gaps_and_overlaps(a, b, None)),
            vec![
                (0, 200, "S1".to_string()),
                (200, 400, "W1".to_string()),
                (400, 1000, "S1".to_string()),
            ]
        );
    }
}
