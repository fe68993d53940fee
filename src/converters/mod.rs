//! Conversion between annotation documents and grid documents.
//!
//! Times cross the boundary as milliseconds on the annotation side and
//! seconds on the grid side. Converting a document to a grid keeps only
//! its time-aligned tiers; converting a grid back materializes every
//! tier as an aligned tier, widening points into short intervals.

use crate::error::{Error, Result};
use crate::models::document::{AnnotationDocument, TierAttributes, DEFAULT_TIER};
use crate::models::grid::{TextGrid, TierContent};

/// Convert an annotation document into a grid document.
///
/// `tiers` selects the tiers to include, in the given order; `None` means
/// every tier in ordinal order. Reference tiers and selected names that do
/// not exist are skipped with a warning, never an error. Grid bounds come
/// from the document's full time interval.
pub fn eaf_to_textgrid(doc: &AnnotationDocument, tiers: Option<&[&str]>) -> Result<TextGrid> {
    let names: Vec<String> = match tiers {
        Some(names) => names.iter().map(|n| n.to_string()).collect(),
        None => doc.tier_names().iter().map(|n| n.to_string()).collect(),
    };
    let (begin_ms, end_ms) = doc.full_time_interval();
    let mut grid = TextGrid::new(begin_ms as f64 / 1000.0, end_ms as f64 / 1000.0);
    for name in &names {
        let tier = match doc.tier(name) {
            Some(tier) => tier,
            None => {
                log::warn!("tier '{}' not in the document, skipping", name);
                continue;
            }
        };
        if !tier.is_aligned() {
            log::warn!("tier '{}' holds reference annotations, skipping", name);
            continue;
        }
        let index = grid.add_interval_tier(name);
        for (start, end, value) in doc.aligned_intervals(name)? {
            grid.add_interval(index, start as f64 / 1000.0, end as f64 / 1000.0, &value)?;
        }
    }
    Ok(grid)
}

/// Convert a grid document into an annotation document.
///
/// Interval times are rounded to whole milliseconds; intervals that
/// collapse under rounding are skipped with a warning. Points become
/// intervals of `pointlength` seconds. Grid tier names may collide with
/// each other; collisions are resolved with a numeric suffix.
pub fn textgrid_to_eaf(grid: &TextGrid, pointlength: f64) -> Result<AnnotationDocument> {
    if !(pointlength > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "pointlength {} is not positive",
            pointlength
        )));
    }
    let mut doc = AnnotationDocument::new();
    // The seeded placeholder tier would shadow a grid tier of the same
    // name; the conversion builds its own tier set.
    if !grid.tiers().is_empty() {
        doc.remove_tier(DEFAULT_TIER)?;
    }
    for (index, tier) in grid.tiers().iter().enumerate() {
        let name = unique_tier_name(&doc, &tier.name);
        if name != tier.name {
            log::warn!("renaming grid tier '{}' to '{}'", tier.name, name);
        }
        doc.add_tier(&name, TierAttributes::default())?;
        match &tier.content {
            TierContent::Interval(_) => {
                for interval in grid.filled_intervals(index) {
                    if interval.text.is_empty() {
                        continue;
                    }
                    let start = (interval.begin * 1000.0).round() as i64;
                    let end = (interval.end * 1000.0).round() as i64;
                    if start >= end {
                        log::warn!(
                            "interval [{}, {}) on '{}' collapses at millisecond resolution, skipping",
                            interval.begin,
                            interval.end,
                            name
                        );
                        continue;
                    }
                    doc.add_aligned_annotation(&name, start, end, &interval.text, None)?;
                }
            }
            TierContent::Point(points) => {
                for point in points {
                    let start = (point.time * 1000.0).round() as i64;
                    let end = ((point.time + pointlength) * 1000.0).round() as i64;
                    if start >= end {
                        log::warn!(
                            "point at {} on '{}' collapses at millisecond resolution, skipping",
                            point.time,
                            name
                        );
                        continue;
                    }
                    doc.add_aligned_annotation(&name, start, end, &point.text, None)?;
                }
            }
        }
    }
    Ok(doc)
}

fn unique_tier_name(doc: &AnnotationDocument, wanted: &str) -> String {
    if doc.tier(wanted).is_none() {
        return wanted.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}", wanted, n);
        if doc.tier(&candidate).is_none() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{LinguisticType, Stereotype};

    #[test]
    fn test_round_trip_stays_within_a_millisecond() {
        let mut doc = AnnotationDocument::new();
        doc.add_aligned_annotation(DEFAULT_TIER, 130, 2460, "hello", None)
            .unwrap();
        doc.add_aligned_annotation(DEFAULT_TIER, 3000, 4005, "world", None)
            .unwrap();

        let grid = eaf_to_textgrid(&doc, None).unwrap();
        let back = textgrid_to_eaf(&grid, 0.1).unwrap();

        let original = doc.aligned_intervals(DEFAULT_TIER).unwrap();
        let returned = back.aligned_intervals(DEFAULT_TIER).unwrap();
        assert_eq!(original.len(), returned.len());
        for ((s1, e1, v1), (s2, e2, v2)) in original.iter().zip(&returned) {
            assert!((s1 - s2).abs() <= 1, "{} vs {}", s1, s2);
            assert!((e1 - e2).abs() <= 1, "{} vs {}", e1, e2);
            assert_eq!(v1, v2);
        }
    }

    #[test]
    fn test_reference_tier_is_skipped() {
        let mut doc = AnnotationDocument::new();
        doc.add_linguistic_type(LinguisticType {
            time_alignable: false,
            constraints: Some(Stereotype::SymbolicAssociation),
            ..LinguisticType::alignable("ref-lt")
        })
        .unwrap();
        doc.add_tier(
            "notes",
            TierAttributes {
                linguistic_type: Some("ref-lt".to_string()),
                parent: Some(DEFAULT_TIER.to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        doc.add_aligned_annotation(DEFAULT_TIER, 0, 1000, "x", None)
            .unwrap();

        let grid = eaf_to_textgrid(&doc, None).unwrap();
        assert_eq!(grid.tier_names(), vec![DEFAULT_TIER]);
    }

    #[test]
    fn test_points_widen_by_pointlength() {
        let mut grid = TextGrid::new(0.0, 2.0);
        let t = grid.add_point_tier("events");
        grid.add_point(t, 0.5, "click").unwrap();

        let doc = textgrid_to_eaf(&grid, 0.25).unwrap();
        let intervals = doc.aligned_intervals("events").unwrap();
        assert_eq!(intervals, vec![(500, 750, "click".to_string())]);
    }

    #[test]
    fn test_nonpositive_pointlength_rejected() {
        let grid = TextGrid::new(0.0, 1.0);
        assert!(textgrid_to_eaf(&grid, 0.0).is_err());
        assert!(textgrid_to_eaf(&grid, -1.0).is_err());
    }

    #[test]
    fn test_colliding_tier_names_get_suffixes() {
        let mut grid = TextGrid::new(0.0, 1.0);
        let a = grid.add_interval_tier("speech");
        let b = grid.add_interval_tier("speech");
        grid.add_interval(a, 0.0, 0.5, "a").unwrap();
        grid.add_interval(b, 0.0, 0.5, "b").unwrap();

        let doc = textgrid_to_eaf(&grid, 0.1).unwrap();
        assert!(doc.tier("speech").is_some());
        assert!(doc.tier("speech_2").is_some());
    }
}
