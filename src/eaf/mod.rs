//! Annotation-document (EAF) codec: XML parse and deterministic emit.
//!
//! `parse(serialize(doc))` is model-equal to `doc` for any document built
//! through the public model operations.

pub mod parser;
pub mod writer;

pub use parser::{parse, parse_with, ParseOptions};
pub use writer::{serialize, serialize_with, xml_escape};

use std::path::Path;

use crate::error::Result;
use crate::models::AnnotationDocument;

/// Read and parse an annotation document from a file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<AnnotationDocument> {
    from_file_with(path, ParseOptions::default())
}

/// Read and parse an annotation document from a file with options.
pub fn from_file_with<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<AnnotationDocument> {
    let input = std::fs::read_to_string(path)?;
    parse_with(&input, options)
}

/// Serialize a document to a file. An existing file at `path` is first
/// renamed to `<path>.bak`, so a crash mid-write never destroys the last
/// good copy.
pub fn to_file<P: AsRef<Path>>(doc: &AnnotationDocument, path: P) -> Result<()> {
    let path = path.as_ref();
    backup_existing(path)?;
    std::fs::write(path, serialize(doc))?;
    Ok(())
}

/// Rename an existing file to its backup name before overwriting.
pub(crate) fn backup_existing(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        let mut backup = path.as_os_str().to_os_string();
        backup.push(".bak");
        std::fs::rename(path, backup)?;
    }
    Ok(())
}
