//! Grid-document serialization: the normal and short text encodings and
//! the binary encoding, plus file IO with overwrite backup.

pub mod binary;
pub mod text;

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::grid::TextGrid;

/// Physical encoding of a grid document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextGridMode {
    /// Labeled, indented text.
    Normal,
    /// Bare-value text.
    Short,
    /// Big-endian binary.
    Binary,
}

/// Parse a grid document, detecting the encoding from the leading bytes.
pub fn parse(bytes: &[u8]) -> Result<TextGrid> {
    if bytes.starts_with(b"ooBinaryFile") {
        return binary::parse(bytes);
    }
    let source = std::str::from_utf8(bytes)
        .map_err(|_| Error::FormatError("grid document is neither binary nor UTF-8".to_string()))?;
    text::parse(source)
}

/// Serialize a grid document in the requested encoding.
pub fn serialize(grid: &TextGrid, mode: TextGridMode) -> Vec<u8> {
    match mode {
        TextGridMode::Normal => text::serialize(grid, false).into_bytes(),
        TextGridMode::Short => text::serialize(grid, true).into_bytes(),
        TextGridMode::Binary => binary::serialize(grid),
    }
}

/// Read a grid document from disk, detecting the encoding.
pub fn from_file(path: impl AsRef<Path>) -> Result<TextGrid> {
    let bytes = fs::read(path)?;
    parse(&bytes)
}

/// Write a grid document to disk. An existing file at the target path is
/// first renamed to `<path>.bak`.
pub fn to_file(grid: &TextGrid, path: impl AsRef<Path>, mode: TextGridMode) -> Result<()> {
    let path = path.as_ref();
    crate::eaf::backup_existing(path)?;
    fs::write(path, serialize(grid, mode))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TextGrid {
        let mut grid = TextGrid::new(0.0, 5.0);
        let t = grid.add_interval_tier("words");
        grid.add_interval(t, 1.0, 2.0, "i1").unwrap();
        grid.add_interval(t, 2.0, 3.0, "i2").unwrap();
        grid.add_interval(t, 4.0, 5.0, "i3").unwrap();
        grid
    }

    #[test]
    fn test_all_modes_parse_to_same_grid() {
        let grid = sample();
        let normal = parse(&serialize(&grid, TextGridMode::Normal)).unwrap();
        let short = parse(&serialize(&grid, TextGridMode::Short)).unwrap();
        let binary = parse(&serialize(&grid, TextGridMode::Binary)).unwrap();
        assert_eq!(normal, short);
        assert_eq!(short, binary);
    }

    #[test]
    fn test_non_utf8_non_binary_rejected() {
        assert!(matches!(
            parse(&[0xff, 0xfe, 0x00]),
            Err(Error::FormatError(_))
        ));
    }
}
