//! Grid-document binary codec.
//!
//! Fixed layout, all multi-byte values big-endian: the magic header, the
//! global bounds as 8-byte floats, an existence flag byte, a 4-byte tier
//! count, then per tier a byte-length-prefixed ASCII class tag, a Pascal
//! string name, bounds, entry count and the entries. Strings use a 2-byte
//! length; the sentinel length -1 switches to a second 2-byte length
//! counting UTF-16BE code units, used when the text is not pure ASCII.

use crate::error::{Error, Result};
use crate::models::grid::{TextGrid, TierContent};

/// Leading bytes of a binary grid document.
pub const MAGIC: &[u8] = b"ooBinaryFile\x08TextGrid";

/// Serialize a grid document to the binary encoding.
pub fn serialize(grid: &TextGrid) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&grid.xmin.to_be_bytes());
    out.extend_from_slice(&grid.xmax.to_be_bytes());
    out.push(1);
    out.extend_from_slice(&(grid.tiers().len() as i32).to_be_bytes());
    for (index, tier) in grid.tiers().iter().enumerate() {
        let class = tier.class();
        out.push(class.len() as u8);
        out.extend_from_slice(class.as_bytes());
        write_string(&mut out, &tier.name);
        out.extend_from_slice(&tier.xmin.to_be_bytes());
        out.extend_from_slice(&tier.xmax.to_be_bytes());
        match &tier.content {
            TierContent::Interval(_) => {
                let intervals = grid.filled_intervals(index);
                out.extend_from_slice(&(intervals.len() as i32).to_be_bytes());
                for interval in &intervals {
                    out.extend_from_slice(&interval.begin.to_be_bytes());
                    out.extend_from_slice(&interval.end.to_be_bytes());
                    write_string(&mut out, &interval.text);
                }
            }
            TierContent::Point(points) => {
                out.extend_from_slice(&(points.len() as i32).to_be_bytes());
                for point in points {
                    out.extend_from_slice(&point.time.to_be_bytes());
                    write_string(&mut out, &point.text);
                }
            }
        }
    }
    out
}

/// Pascal string with the -1/UTF-16BE escape for non-ASCII text.
fn write_string(out: &mut Vec<u8>, text: &str) {
    if text.is_ascii() {
        out.extend_from_slice(&(text.len() as i16).to_be_bytes());
        out.extend_from_slice(text.as_bytes());
    } else {
        let units: Vec<u16> = text.encode_utf16().collect();
        out.extend_from_slice(&(-1i16).to_be_bytes());
        out.extend_from_slice(&(units.len() as i16).to_be_bytes());
        for unit in units {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::FormatError("truncated binary grid document".to_string()));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Byte-length-prefixed ASCII tag.
    fn read_tag(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::FormatError("non-ASCII tier class tag".to_string()))
    }

    /// Pascal string, honoring the -1/UTF-16BE escape.
    fn read_string(&mut self) -> Result<String> {
        let len = self.read_i16()?;
        if len >= 0 {
            let bytes = self.take(len as usize)?;
            return String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::FormatError("invalid ASCII string payload".to_string()));
        }
        if len != -1 {
            return Err(Error::FormatError(format!("invalid string length {}", len)));
        }
        let units = self.read_i16()?;
        if units < 0 {
            return Err(Error::FormatError(format!("invalid UTF-16 length {}", units)));
        }
        let mut buffer = Vec::with_capacity(units as usize);
        for _ in 0..units {
            let b = self.take(2)?;
            buffer.push(u16::from_be_bytes([b[0], b[1]]));
        }
        String::from_utf16(&buffer)
            .map_err(|_| Error::FormatError("invalid UTF-16 string payload".to_string()))
    }
}

/// Parse a binary grid document.
pub fn parse(bytes: &[u8]) -> Result<TextGrid> {
    if !bytes.starts_with(MAGIC) {
        return Err(Error::FormatError("missing binary grid magic header".to_string()));
    }
    let mut cursor = Cursor {
        bytes,
        pos: MAGIC.len(),
    };
    let xmin = cursor.read_f64()?;
    let xmax = cursor.read_f64()?;
    let mut grid = TextGrid::new(xmin, xmax);
    if cursor.read_u8()? == 0 {
        return Ok(grid);
    }
    let count = cursor.read_i32()?;
    if count < 0 {
        return Err(Error::FormatError(format!("invalid tier count {}", count)));
    }
    for _ in 0..count {
        let class = cursor.read_tag()?;
        let name = cursor.read_string()?;
        let _tier_xmin = cursor.read_f64()?;
        let _tier_xmax = cursor.read_f64()?;
        let entries = cursor.read_i32()?;
        if entries < 0 {
            return Err(Error::FormatError(format!("invalid entry count {}", entries)));
        }
        match class.as_str() {
            "IntervalTier" => {
                let tier = grid.add_interval_tier(&name);
                for _ in 0..entries {
                    let begin = cursor.read_f64()?;
                    let end = cursor.read_f64()?;
                    let text = cursor.read_string()?;
                    if begin < end {
                        grid.add_interval(tier, begin, end, &text)?;
                    } else {
                        log::warn!("skipping degenerate interval [{}, {}] in '{}'", begin, end, name);
                    }
                }
            }
            "TextTier" => {
                let tier = grid.add_point_tier(&name);
                for _ in 0..entries {
                    let time = cursor.read_f64()?;
                    let text = cursor.read_string()?;
                    grid.add_point(tier, time, &text)?;
                }
            }
            other => {
                return Err(Error::FormatError(format!("unknown grid tier class '{}'", other)))
            }
        }
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_round_trip() {
        let mut grid = TextGrid::new(0.0, 5.0);
        let t = grid.add_interval_tier("words");
        grid.add_interval(t, 1.0, 2.0, "i1").unwrap();
        grid.add_interval(t, 2.0, 3.0, "i2").unwrap();
        grid.add_interval(t, 4.0, 5.0, "i3").unwrap();
        let parsed = parse(&serialize(&grid)).unwrap();
        match &parsed.tiers()[0].content {
            TierContent::Interval(intervals) => {
                assert_eq!(intervals.len(), 4);
                assert_eq!(intervals[2].text, "");
            }
            _ => unreachable!(),
        }
        assert_eq!((parsed.xmin, parsed.xmax), (0.0, 5.0));
    }

    #[test]
    fn test_non_ascii_strings_use_utf16() {
        let mut grid = TextGrid::new(0.0, 1.0);
        let t = grid.add_point_tier("тон");
        grid.add_point(t, 0.5, "übermäßig").unwrap();
        let bytes = serialize(&grid);
        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.tiers()[0].name, "тон");
        match &parsed.tiers()[0].content {
            TierContent::Point(points) => assert_eq!(points[0].text, "übermäßig"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_truncated_input_rejected() {
        let mut grid = TextGrid::new(0.0, 1.0);
        grid.add_interval_tier("t");
        let bytes = serialize(&grid);
        let err = parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }

    #[test]
    fn test_missing_magic_rejected() {
        assert!(matches!(
            parse(b"File type = \"ooTextFile\""),
            Err(Error::FormatError(_))
        ));
    }
}
