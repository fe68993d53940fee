//! Error types for tiergrid operations.

use thiserror::Error;

/// Result type for tiergrid operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type covering the model, the codecs and the converters.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A model invariant was violated: mixed aligned/reference annotations
    /// in one tier, cyclic tier parentage, or a dangling reference chain.
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    /// An operation referenced a tier, annotation, timeslot, linguistic
    /// type or locale that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied value was out of range: negative or inverted time
    /// range, non-positive point length, empty tier id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed XML, text or binary input. No partial model is returned.
    #[error("format error: {0}")]
    FormatError(String),

    /// IO error during whole-document read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
