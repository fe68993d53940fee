//! Tiered speech annotation documents and Praat grid documents.
//!
//! The crate reads, mutates and writes EAF annotation documents and
//! TextGrid grid documents, converts between the two, and computes
//! gap/overlap timelines for two-speaker tier pairs.
//!
//! ```no_run
//! use tiergrid::models::document::DEFAULT_TIER;
//!
//! # fn main() -> tiergrid::Result<()> {
//! let mut doc = tiergrid::eaf::from_file("session.eaf")?;
//! doc.add_aligned_annotation(DEFAULT_TIER, 1200, 1850, "hello", None)?;
//! tiergrid::eaf::to_file(&doc, "session.eaf")?;
//! # Ok(())
//! # }
//! ```

pub mod converters;
pub mod eaf;
pub mod error;
pub mod models;
pub mod overlaps;
pub mod textgrid;

pub use converters::{eaf_to_textgrid, textgrid_to_eaf};
pub use error::{Error, Result};
pub use models::document::{AnnotationDocument, TierAttributes};
pub use models::grid::TextGrid;
pub use overlaps::{gaps_and_overlaps, Segment, SegmentKind};
pub use textgrid::TextGridMode;
