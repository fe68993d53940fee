//! Data models for annotation documents and grid documents.

pub mod document;
pub mod grid;
pub mod tier;
pub mod types;

// Re-export commonly used types
pub use document::{AnnotationDocument, TierAttributes, DEFAULT_LINGUISTIC_TYPE, DEFAULT_TIER};
pub use grid::{GridTier, Interval, Point, TextGrid, TierContent};
pub use tier::{AlignedAnnotation, RefAnnotation, Tier, TierAnnotations, TimeSlot};
pub use types::{
    Constraint, ControlledVocabulary, CvDescription, CvEntry, CvEntryValue, ExternalRef, Language,
    LexiconRef, License, LinguisticType, LinkedFileDescriptor, Locale, MediaDescriptor, Property,
    Stereotype,
};
