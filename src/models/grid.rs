//! The grid document: interval and point tiers over real-valued time.
//!
//! A much flatter model than the annotation document: named tiers in
//! serialization order (names need not be unique), each holding either
//! non-overlapping intervals or points at distinct times, in seconds.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One interval of an interval tier, `[begin, end)` seconds. Empty text
/// marks a silence/gap interval.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Interval {
    pub begin: f64,
    pub end: f64,
    pub text: String,
}

/// One point of a point tier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Point {
    pub time: f64,
    pub text: String,
}

/// Content of a grid tier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TierContent {
    /// Non-overlapping intervals, kept sorted by begin time.
    Interval(Vec<Interval>),
    /// Points at pairwise distinct times, kept sorted.
    Point(Vec<Point>),
}

/// A named tier of a grid document.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GridTier {
    /// Tier name; grid tiers may share names.
    pub name: String,
    /// Lower time bound, recomputed from content on every insert.
    pub xmin: f64,
    /// Upper time bound, recomputed from content on every insert.
    pub xmax: f64,
    /// The intervals or points.
    pub content: TierContent,
}

impl GridTier {
    /// The on-disk class tag of this tier.
    pub fn class(&self) -> &'static str {
        match self.content {
            TierContent::Interval(_) => "IntervalTier",
            TierContent::Point(_) => "TextTier",
        }
    }

    fn recompute_bounds(&mut self) {
        let (lo, hi) = match &self.content {
            TierContent::Interval(intervals) => (
                intervals.iter().map(|i| i.begin).fold(f64::INFINITY, f64::min),
                intervals.iter().map(|i| i.end).fold(f64::NEG_INFINITY, f64::max),
            ),
            TierContent::Point(points) => (
                points.iter().map(|p| p.time).fold(f64::INFINITY, f64::min),
                points.iter().map(|p| p.time).fold(f64::NEG_INFINITY, f64::max),
            ),
        };
        if lo.is_finite() {
            self.xmin = lo;
            self.xmax = hi;
        }
    }
}

/// A grid document: global bounds plus an ordered list of tiers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TextGrid {
    /// Global lower time bound, seconds.
    pub xmin: f64,
    /// Global upper time bound, seconds.
    pub xmax: f64,
    pub(crate) tiers: Vec<GridTier>,
}

impl TextGrid {
    /// Create an empty grid with the given global bounds.
    pub fn new(xmin: f64, xmax: f64) -> Self {
        Self {
            xmin,
            xmax,
            tiers: Vec::new(),
        }
    }

    /// Append an empty interval tier and return its index.
    pub fn add_interval_tier(&mut self, name: &str) -> usize {
        self.tiers.push(GridTier {
            name: name.to_string(),
            xmin: self.xmin,
            xmax: self.xmax,
            content: TierContent::Interval(Vec::new()),
        });
        self.tiers.len() - 1
    }

    /// Append an empty point tier and return its index.
    pub fn add_point_tier(&mut self, name: &str) -> usize {
        self.tiers.push(GridTier {
            name: name.to_string(),
            xmin: self.xmin,
            xmax: self.xmax,
            content: TierContent::Point(Vec::new()),
        });
        self.tiers.len() - 1
    }

    /// The tiers, in serialization order.
    pub fn tiers(&self) -> &[GridTier] {
        &self.tiers
    }

    /// Tier names in serialization order.
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name.as_str()).collect()
    }

    fn tier_mut(&mut self, index: usize) -> Result<&mut GridTier> {
        let count = self.tiers.len();
        self.tiers
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("grid tier {} of {}", index, count)))
    }

    /// Remove a tier by index.
    pub fn remove_tier(&mut self, index: usize) -> Result<GridTier> {
        if index >= self.tiers.len() {
            return Err(Error::NotFound(format!(
                "grid tier {} of {}",
                index,
                self.tiers.len()
            )));
        }
        Ok(self.tiers.remove(index))
    }

    /// Insert an interval into an interval tier. The interval must be
    /// strictly increasing and may not overlap a stored one; the tier's
    /// bounds are recomputed.
    pub fn add_interval(&mut self, tier: usize, begin: f64, end: f64, text: &str) -> Result<()> {
        let t = self.tier_mut(tier)?;
        if !(begin < end) {
            return Err(Error::InvalidArgument(format!(
                "interval [{}, {}) is not strictly increasing",
                begin, end
            )));
        }
        let intervals = match &mut t.content {
            TierContent::Interval(intervals) => intervals,
            TierContent::Point(_) => {
                return Err(Error::InvalidArgument(format!(
                    "tier '{}' is a point tier",
                    t.name
                )))
            }
        };
        if intervals.iter().any(|i| begin < i.end && i.begin < end) {
            return Err(Error::InvalidArgument(format!(
                "interval [{}, {}) overlaps a stored interval",
                begin, end
            )));
        }
        intervals.push(Interval {
            begin,
            end,
            text: text.to_string(),
        });
        intervals.sort_by(|a, b| a.begin.total_cmp(&b.begin));
        t.recompute_bounds();
        Ok(())
    }

    /// Insert a point into a point tier. Times must be pairwise distinct;
    /// the tier's bounds are recomputed.
    pub fn add_point(&mut self, tier: usize, time: f64, text: &str) -> Result<()> {
        let t = self.tier_mut(tier)?;
        let points = match &mut t.content {
            TierContent::Point(points) => points,
            TierContent::Interval(_) => {
                return Err(Error::InvalidArgument(format!(
                    "tier '{}' is an interval tier",
                    t.name
                )))
            }
        };
        if points.iter().any(|p| p.time == time) {
            return Err(Error::InvalidArgument(format!(
                "duplicate point at {}",
                time
            )));
        }
        points.push(Point {
            time,
            text: text.to_string(),
        });
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        t.recompute_bounds();
        Ok(())
    }

    /// Gapless view of an interval tier for serialization: every
    /// sub-range of the tier's own `[xmin, xmax]` not covered by a stored
    /// interval is materialized as an empty-text interval. The stored
    /// tier is not mutated.
    pub fn filled_intervals(&self, tier: usize) -> Vec<Interval> {
        let t = match self.tiers.get(tier) {
            Some(t) => t,
            None => return Vec::new(),
        };
        let intervals = match &t.content {
            TierContent::Interval(intervals) => intervals,
            TierContent::Point(_) => return Vec::new(),
        };
        let mut out = Vec::with_capacity(intervals.len());
        let mut cursor = t.xmin;
        for interval in intervals {
            if interval.begin > cursor {
                out.push(Interval {
                    begin: cursor,
                    end: interval.begin,
                    text: String::new(),
                });
            }
            out.push(interval.clone());
            cursor = interval.end;
        }
        if cursor < t.xmax {
            out.push(Interval {
                begin: cursor,
                end: t.xmax,
                text: String::new(),
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_follow_content() {
        let mut grid = TextGrid::new(0.0, 10.0);
        let t = grid.add_interval_tier("words");
        grid.add_interval(t, 1.0, 2.0, "a").unwrap();
        grid.add_interval(t, 4.0, 5.0, "b").unwrap();
        let tier = &grid.tiers()[t];
        assert_eq!((tier.xmin, tier.xmax), (1.0, 5.0));
    }

    #[test]
    fn test_overlapping_interval_rejected() {
        let mut grid = TextGrid::new(0.0, 10.0);
        let t = grid.add_interval_tier("words");
        grid.add_interval(t, 1.0, 3.0, "a").unwrap();
        assert!(grid.add_interval(t, 2.0, 4.0, "b").is_err());
        // Abutting is fine.
        grid.add_interval(t, 3.0, 4.0, "c").unwrap();
    }

    #[test]
    fn test_degenerate_interval_rejected() {
        let mut grid = TextGrid::new(0.0, 10.0);
        let t = grid.add_interval_tier("words");
        assert!(grid.add_interval(t, 2.0, 2.0, "a").is_err());
        assert!(grid.add_interval(t, 3.0, 2.0, "a").is_err());
    }

    #[test]
    fn test_duplicate_point_rejected() {
        let mut grid = TextGrid::new(0.0, 10.0);
        let t = grid.add_point_tier("events");
        grid.add_point(t, 1.5, "click").unwrap();
        assert!(grid.add_point(t, 1.5, "clack").is_err());
    }

    #[test]
    fn test_filled_intervals_is_presentation_only() {
        let mut grid = TextGrid::new(0.0, 5.0);
        let t = grid.add_interval_tier("words");
        grid.add_interval(t, 1.0, 2.0, "i1").unwrap();
        grid.add_interval(t, 2.0, 3.0, "i2").unwrap();
        grid.add_interval(t, 4.0, 5.0, "i3").unwrap();
        let filled = grid.filled_intervals(t);
        assert_eq!(filled.len(), 4);
        assert_eq!(filled[2], Interval { begin: 3.0, end: 4.0, text: String::new() });
        // The stored tier keeps its three intervals.
        match &grid.tiers()[t].content {
            TierContent::Interval(intervals) => assert_eq!(intervals.len(), 3),
            _ => unreachable!(),
        }
    }
}
