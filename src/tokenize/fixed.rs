// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::io::Read;

use crate::{
    errors::{GrabError, Result},
    spec::CsvSpecs,
    tokenize::{ByteStream, CellMeta, RowBuf, RowGrabber},
};

/// The fixed-width cell grabber.
///
/// Cells are cut by column widths measured in UTF-16 code units or UTF-32
/// code points (Unicode scalar values). The final width is a sentinel: the
/// last cell extends to the end of the line regardless of its declared
/// width. Cell padding (ASCII spaces on either side) is not data and is
/// always removed.
pub(crate) struct FixedGrabber<R> {
    stream: ByteStream<R>,
    /// Unit widths per column; empty until set or inferred from the header.
    widths: Vec<usize>,
    utf32: bool,
    row_start_line: u64,
    line_buf: Vec<u8>,
}

impl<R: Read> FixedGrabber<R> {
    pub(crate) fn new(input: R, specs: &CsvSpecs) -> Self {
        FixedGrabber {
            stream: ByteStream::new(input),
            widths: specs.fixed_column_widths.clone(),
            utf32: specs.use_utf32_counting_convention,
            row_start_line: 1,
            line_buf: Vec::new(),
        }
    }

    #[inline]
    fn units(&self, c: char) -> usize {
        if self.utf32 {
            1
        } else {
            c.len_utf16()
        }
    }

    /// Reads one physical line into `self.line_buf`, stripping the
    /// terminator. Returns false at end of input.
    fn read_line(&mut self) -> Result<bool> {
        self.row_start_line = self.stream.lines() + 1;
        self.line_buf.clear();
        match self.stream.take_until3(b'\r', b'\n', b'\n', &mut self.line_buf)? {
            Some(terminator) => {
                self.stream.eat_terminator(terminator)?;
                Ok(true)
            }
            None => {
                if self.line_buf.is_empty() {
                    Ok(false)
                } else {
                    self.stream.count_line();
                    Ok(true)
                }
            }
        }
    }

    /// Reads the header row. Column widths are taken from the configured
    /// widths, or inferred from the header by scanning for runs of
    /// non-space followed by runs of space. Header names are always
    /// trimmed. Returns None at end of input.
    pub(crate) fn header_names(&mut self) -> Result<Option<Vec<String>>> {
        if !self.read_line()? {
            return if self.widths.is_empty() {
                Err(GrabError::NoHeaderForWidths.into())
            } else {
                Ok(None)
            };
        }
        let line = self.decode_line()?.to_owned();
        if self.widths.is_empty() {
            self.infer_widths(&line);
            if self.widths.is_empty() {
                return Err(GrabError::NoHeaderForWidths.into());
            }
        }
        let mut names = Vec::with_capacity(self.widths.len());
        self.split(&line, |cell, _| names.push(cell.trim_matches(' ').to_string()));
        names.resize_with(self.widths.len(), String::new);
        Ok(Some(names))
    }

    /// Scans the header for runs of non-space followed by runs of space;
    /// each column spans from the start of its name to the start of the
    /// next.
    fn infer_widths(&mut self, header: &str) {
        let mut starts = Vec::new();
        let mut pos = 0usize;
        let mut in_name = false;
        for c in header.chars() {
            if c == ' ' {
                in_name = false;
            } else if !in_name {
                in_name = true;
                starts.push(pos);
            }
            pos += self.units(c);
        }
        self.widths = starts
            .iter()
            .zip(starts.iter().skip(1).chain(std::iter::once(&pos)))
            .map(|(a, b)| b - a)
            .collect();
    }

    fn decode_line(&self) -> Result<&str> {
        std::str::from_utf8(&self.line_buf).map_err(|_| {
            GrabError::RowNotUtf8 {
                row: self.row_start_line,
            }
            .into()
        })
    }

    /// Cuts `line` by the configured widths, invoking `push` once per
    /// present cell. A column whose start lies at or past the end of the
    /// line is absent, not empty.
    fn split(&self, line: &str, mut push: impl FnMut(&str, bool)) {
        let mut rest = line;
        let last = self.widths.len() - 1;
        for (index, &width) in self.widths.iter().enumerate() {
            if rest.is_empty() && index > 0 {
                break;
            }
            if index == last {
                push(rest, true);
                break;
            }
            let mut remaining = width;
            let mut cut = rest.len();
            for (at, c) in rest.char_indices() {
                let units = self.units(c);
                if units > remaining {
                    // With one UTF-16 unit left and a character that needs a
                    // surrogate pair, the character belongs to the next
                    // column, never split.
                    cut = at;
                    break;
                }
                remaining -= units;
                if remaining == 0 {
                    cut = at + c.len_utf8();
                    break;
                }
            }
            push(&rest[..cut], false);
            rest = &rest[cut..];
        }
    }
}

impl<R: Read> RowGrabber for FixedGrabber<R> {
    fn grab_row(&mut self, row: &mut RowBuf) -> Result<bool> {
        debug_assert!(!self.widths.is_empty(), "widths not yet established");
        row.clear();
        if !self.read_line()? {
            return Ok(false);
        }
        if self.line_buf.is_empty() {
            row.cells.push(CellMeta {
                start: 0,
                end: 0,
                quoted: false,
            });
            row.blank = true;
            return Ok(true);
        }
        let line = std::mem::take(&mut self.line_buf);
        let result: std::result::Result<bool, GrabError> = (|| {
            let text = std::str::from_utf8(&line).map_err(|_| GrabError::RowNotUtf8 {
                row: self.row_start_line,
            })?;
            self.split(text, |cell, _| {
                let cell = cell.trim_matches(' ');
                let start = row.bytes.len();
                row.bytes.extend_from_slice(cell.as_bytes());
                row.cells.push(CellMeta {
                    start,
                    end: row.bytes.len(),
                    quoted: false,
                });
            });
            Ok(true)
        })();
        self.line_buf = line;
        result.map_err(Into::into)
    }

    fn skip_row(&mut self, _row: &mut RowBuf) -> Result<bool> {
        // Raw line skip: works before widths are established.
        self.read_line()
    }

    fn start_line(&self) -> u64 {
        self.row_start_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::CsvSpecs;

    fn specs(widths: Vec<usize>, utf32: bool) -> CsvSpecs {
        let mut builder = CsvSpecs::builder().has_fixed_width_columns(true);
        if !widths.is_empty() {
            builder = builder.fixed_column_widths(widths);
        }
        builder
            .use_utf32_counting_convention(utf32)
            .build()
            .unwrap()
    }

    fn grab_all(input: &str, sp: &CsvSpecs) -> (Vec<String>, Vec<Vec<String>>) {
        let mut grabber = FixedGrabber::new(input.as_bytes(), sp);
        let names = grabber.header_names().unwrap().unwrap();
        let mut row = RowBuf::default();
        let mut rows = Vec::new();
        while grabber.grab_row(&mut row).unwrap() {
            rows.push(
                (0..row.cells.len())
                    .map(|i| String::from_utf8(row.cell(i).to_vec()).unwrap())
                    .collect(),
            );
        }
        (names, rows)
    }

    #[test]
    fn widths_inferred_from_header() {
        let input = "Sym   Type\nAAPL  Stock\nZ     Bond\n";
        let (names, rows) = grab_all(input, &specs(vec![], false));
        assert_eq!(names, ["Sym", "Type"]);
        assert_eq!(rows, [["AAPL", "Stock"], ["Z", "Bond"]]);
    }

    #[test]
    fn last_column_extends_to_end_of_line() {
        let input = "A  B\nxxxa long tail\n";
        let (_, rows) = grab_all(input, &specs(vec![], false));
        assert_eq!(rows, [["xxx", "a long tail"]]);
    }

    #[test]
    fn utf32_vs_utf16_counting() {
        let input = "Sym   Type\n🥰😻🧡💓💕💖Dividend\nZ     Dividend\n";
        let (_, rows) = grab_all(input, &specs(vec![], true));
        assert_eq!(
            rows,
            [["🥰😻🧡💓💕💖", "Dividend"], ["Z", "Dividend"]]
        );
        let (_, rows) = grab_all(input, &specs(vec![], false));
        assert_eq!(
            rows,
            [["🥰😻🧡", "💓💕💖Dividend"], ["Z", "Dividend"]]
        );
    }

    #[test]
    fn short_rows_have_missing_cells() {
        let input = "AA BB CC\nx  y  z\nx\n";
        let (names, rows) = grab_all(input, &specs(vec![], false));
        assert_eq!(names, ["AA", "BB", "CC"]);
        assert_eq!(rows[0], ["x", "y", "z"]);
        assert_eq!(rows[1], ["x"]);
    }

    #[test]
    fn caller_widths_override_header_scan() {
        let input = "ABCD\nwxyz\n";
        let (names, rows) = grab_all(input, &specs(vec![2, 2], false));
        assert_eq!(names, ["AB", "CD"]);
        assert_eq!(rows, [["wx", "yz"]]);
    }
}
