//! Grid-document text codec: normal (labeled, indented) and short (bare
//! values) modes. Both carry the same logical content in the same order;
//! the parser tells them apart structurally, by whether the tiers-exist
//! line is the bare token `<exists>`.

use crate::error::{Error, Result};
use crate::models::grid::{TextGrid, TierContent};

/// Quote a value for a text-mode file, doubling embedded quotes.
fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Serialize a grid document to normal or short text.
pub fn serialize(grid: &TextGrid, short: bool) -> String {
    let mut out = String::new();
    out.push_str("File type = \"ooTextFile\"\n");
    out.push_str("Object class = \"TextGrid\"\n\n");

    let mut value = |indent: usize, label: &str, body: String| {
        if short {
            out.push_str(&body);
        } else {
            for _ in 0..indent {
                out.push_str("  ");
            }
            out.push_str(label);
            out.push_str(&body);
        }
        out.push('\n');
    };

    value(0, "xmin = ", grid.xmin.to_string());
    value(0, "xmax = ", grid.xmax.to_string());
    if short {
        value(0, "", "<exists>".to_string());
    } else {
        value(0, "tiers? ", "<exists>".to_string());
    }
    value(0, "size = ", grid.tiers().len().to_string());
    if !short {
        value(0, "item []:", String::new());
    }

    for (index, tier) in grid.tiers().iter().enumerate() {
        if !short {
            value(1, &format!("item [{}]:", index + 1), String::new());
        }
        value(2, "class = ", quote(tier.class()));
        value(2, "name = ", quote(&tier.name));
        value(2, "xmin = ", tier.xmin.to_string());
        value(2, "xmax = ", tier.xmax.to_string());
        match &tier.content {
            TierContent::Interval(_) => {
                let intervals = grid.filled_intervals(index);
                value(2, "intervals: size = ", intervals.len().to_string());
                for (j, interval) in intervals.iter().enumerate() {
                    if !short {
                        value(2, &format!("intervals [{}]:", j + 1), String::new());
                    }
                    value(3, "xmin = ", interval.begin.to_string());
                    value(3, "xmax = ", interval.end.to_string());
                    value(3, "text = ", quote(&interval.text));
                }
            }
            TierContent::Point(points) => {
                value(2, "points: size = ", points.len().to_string());
                for (j, point) in points.iter().enumerate() {
                    if !short {
                        value(2, &format!("points [{}]:", j + 1), String::new());
                    }
                    value(3, "number = ", point.time.to_string());
                    value(3, "mark = ", quote(&point.text));
                }
            }
        }
    }
    out
}

/// Line cursor over a text-mode file. Blank lines are skipped except
/// inside a continued quoted string.
struct LineReader<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    short: bool,
}

impl<'a> LineReader<'a> {
    fn next_line(&mut self) -> Result<&'a str> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            if !line.trim().is_empty() {
                return Ok(line);
            }
        }
        Err(Error::FormatError("unexpected end of grid document".to_string()))
    }

    fn next_raw_line(&mut self) -> Result<&'a str> {
        if self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            Ok(line)
        } else {
            Err(Error::FormatError("unterminated string in grid document".to_string()))
        }
    }

    /// Value portion of the next line: the whole line in short mode, the
    /// text after the last `=` in normal mode.
    fn next_value(&mut self) -> Result<String> {
        let line = self.next_line()?;
        let raw = if self.short {
            line.trim()
        } else {
            line.rsplit('=').next().unwrap_or(line).trim()
        };
        Ok(raw.to_string())
    }

    fn next_f64(&mut self) -> Result<f64> {
        let raw = self.next_value()?;
        raw.parse()
            .map_err(|_| Error::FormatError(format!("'{}' is not a number", raw)))
    }

    fn next_usize(&mut self) -> Result<usize> {
        let raw = self.next_value()?;
        raw.parse()
            .map_err(|_| Error::FormatError(format!("'{}' is not a count", raw)))
    }

    /// Parse a quoted string, possibly continued over several lines, with
    /// `""` as the escape for an embedded quote.
    fn next_string(&mut self) -> Result<String> {
        let line = self.next_line()?;
        let raw = if self.short {
            line.trim()
        } else {
            match line.find('=') {
                Some(i) => line[i + 1..].trim_start(),
                None => line.trim(),
            }
        };
        let mut chars: Vec<char> = raw.chars().collect();
        if chars.first() != Some(&'"') {
            return Err(Error::FormatError(format!("expected quoted value, found '{}'", raw)));
        }
        let mut out = String::new();
        let mut idx = 1;
        loop {
            while idx < chars.len() {
                if chars[idx] == '"' {
                    if chars.get(idx + 1) == Some(&'"') {
                        out.push('"');
                        idx += 2;
                    } else {
                        return Ok(out);
                    }
                } else {
                    out.push(chars[idx]);
                    idx += 1;
                }
            }
            out.push('\n');
            chars = self.next_raw_line()?.chars().collect();
            idx = 0;
        }
    }
}

/// Parse a normal- or short-mode grid document.
pub fn parse(input: &str) -> Result<TextGrid> {
    let lines: Vec<&str> = input.lines().collect();
    if lines.len() < 2
        || !lines[0].contains("ooTextFile")
        || !lines[1].contains("TextGrid")
    {
        return Err(Error::FormatError("not a grid document header".to_string()));
    }

    // Mode detection: peek at the tiers-exist line, the third value line.
    let value_lines: Vec<&str> = lines[2..]
        .iter()
        .copied()
        .filter(|l| !l.trim().is_empty())
        .collect();
    let exists_line = value_lines
        .get(2)
        .ok_or_else(|| Error::FormatError("truncated grid document".to_string()))?
        .trim();
    let short = exists_line == "<exists>" || exists_line == "<absent>";

    let mut reader = LineReader {
        lines: lines[2..].to_vec(),
        pos: 0,
        short,
    };
    let xmin = reader.next_f64()?;
    let xmax = reader.next_f64()?;
    let mut grid = TextGrid::new(xmin, xmax);

    let exists = reader.next_line()?;
    if exists.contains("<absent>") {
        return Ok(grid);
    }
    if !exists.contains("<exists>") {
        return Err(Error::FormatError(format!(
            "expected tiers-exist flag, found '{}'",
            exists.trim()
        )));
    }
    let size = reader.next_usize()?;
    if !short {
        // "item []:" wrapper line.
        reader.next_line()?;
    }

    for _ in 0..size {
        if !short {
            // "item [i]:" line.
            reader.next_line()?;
        }
        let class = reader.next_string()?;
        let name = reader.next_string()?;
        let _tier_xmin = reader.next_f64()?;
        let _tier_xmax = reader.next_f64()?;
        let count = reader.next_usize()?;
        match class.as_str() {
            "IntervalTier" => {
                let tier = grid.add_interval_tier(&name);
                for _ in 0..count {
                    if !short {
                        reader.next_line()?;
                    }
                    let begin = reader.next_f64()?;
                    let end = reader.next_f64()?;
                    let text = reader.next_string()?;
                    if begin < end {
                        grid.add_interval(tier, begin, end, &text)?;
                    } else {
                        log::warn!("skipping degenerate interval [{}, {}] in '{}'", begin, end, name);
                    }
                }
            }
            "TextTier" => {
                let tier = grid.add_point_tier(&name);
                for _ in 0..count {
                    if !short {
                        reader.next_line()?;
                    }
                    let time = reader.next_f64()?;
                    let text = reader.next_string()?;
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

    fn sample_grid() -> TextGrid {
        let mut grid = TextGrid::new(0.0, 5.0);
        let t = grid.add_interval_tier("words");
        grid.add_interval(t, 1.0, 2.0, "i1").unwrap();
        grid.add_interval(t, 2.0, 3.0, "i2").unwrap();
        grid.add_interval(t, 4.0, 5.0, "i3").unwrap();
        let p = grid.add_point_tier("clicks");
        grid.add_point(p, 1.25, "pop").unwrap();
        grid
    }

    #[test]
    fn test_normal_round_trip_includes_filled_gap() {
        let grid = sample_grid();
        let parsed = parse(&serialize(&grid, false)).unwrap();
        match &parsed.tiers()[0].content {
            TierContent::Interval(intervals) => {
                assert_eq!(intervals.len(), 4);
                assert_eq!(intervals[2].begin, 3.0);
                assert_eq!(intervals[2].end, 4.0);
                assert_eq!(intervals[2].text, "");
            }
            _ => unreachable!(),
        }
        assert_eq!(parsed.tier_names(), vec!["words", "clicks"]);
    }

    #[test]
    fn test_short_round_trip_matches_normal() {
        let grid = sample_grid();
        let from_normal = parse(&serialize(&grid, false)).unwrap();
        let from_short = parse(&serialize(&grid, true)).unwrap();
        assert_eq!(from_normal, from_short);
    }

    #[test]
    fn test_quotes_in_text_round_trip() {
        let mut grid = TextGrid::new(0.0, 1.0);
        let t = grid.add_interval_tier("t");
        grid.add_interval(t, 0.0, 1.0, "say \"hi\"").unwrap();
        for short in [false, true] {
            let parsed = parse(&serialize(&grid, short)).unwrap();
            match &parsed.tiers()[0].content {
                TierContent::Interval(intervals) => assert_eq!(intervals[0].text, "say \"hi\""),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_bad_header_rejected() {
        assert!(matches!(
            parse("not a textgrid\nat all\n"),
            Err(Error::FormatError(_))
        ));
    }
}
