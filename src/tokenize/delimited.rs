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

/// The delimited-mode cell grabber.
///
/// Cuts the stream into cells at unquoted delimiters and rows at unquoted
/// newlines (`\n`, `\r`, and `\r\n` are all one terminator). A quoted cell
/// starts with the quote byte, represents a literal quote as a doubled
/// quote, and may contain any byte including newlines.
pub(crate) struct DelimitedGrabber<R> {
    stream: ByteStream<R>,
    delimiter: u8,
    quote: u8,
    ignore_surrounding_spaces: bool,
    trim: bool,
    row_start_line: u64,
    /// Whether the current row consumed any content byte. Distinguishes a
    /// truly blank line from a line holding a single empty cell.
    row_had_input: bool,
}

enum CellOutcome {
    Cell { row_ended: bool, quoted: bool },
    EndOfInput,
}

impl<R: Read> DelimitedGrabber<R> {
    pub(crate) fn new(input: R, specs: &CsvSpecs) -> Self {
        DelimitedGrabber {
            stream: ByteStream::new(input),
            delimiter: specs.delimiter,
            quote: specs.quote,
            ignore_surrounding_spaces: specs.ignore_surrounding_spaces,
            trim: specs.trim,
            row_start_line: 1,
            row_had_input: false,
        }
    }

    /// Grabs the next cell into `row`, appending its bytes and nothing
    /// else. The caller records the [`CellMeta`].
    fn next_cell(&mut self, row: &mut RowBuf) -> Result<CellOutcome> {
        let cell_start = row.bytes.len();

        // Leading spaces: consumed provisionally, so a quote after them can
        // still open a quoted cell when surrounding spaces are ignored.
        let mut first = self.stream.peek()?;
        if self.ignore_surrounding_spaces {
            while first == Some(b' ') {
                self.stream.bump();
                self.row_had_input = true;
                row.bytes.push(b' ');
                first = self.stream.peek()?;
            }
        }

        match first {
            None => {
                if row.bytes.len() > cell_start {
                    // Trailing spaces with no terminator still form a cell.
                    self.finish_unquoted(row, cell_start);
                    Ok(CellOutcome::Cell {
                        row_ended: true,
                        quoted: false,
                    })
                } else {
                    Ok(CellOutcome::EndOfInput)
                }
            }
            Some(b) if b == self.quote => {
                row.bytes.truncate(cell_start);
                self.grab_quoted(row, cell_start)
            }
            Some(_) => self.grab_unquoted(row, cell_start),
        }
    }

    fn grab_unquoted(&mut self, row: &mut RowBuf, cell_start: usize) -> Result<CellOutcome> {
        loop {
            let found =
                self.stream
                    .take_until3(self.delimiter, b'\r', b'\n', &mut row.bytes)?;
            if row.bytes.len() > cell_start {
                self.row_had_input = true;
            }
            match found {
                None => {
                    self.finish_unquoted(row, cell_start);
                    return Ok(CellOutcome::Cell {
                        row_ended: true,
                        quoted: false,
                    });
                }
                Some(b) if b == self.delimiter => {
                    self.stream.bump();
                    self.row_had_input = true;
                    self.finish_unquoted(row, cell_start);
                    return Ok(CellOutcome::Cell {
                        row_ended: false,
                        quoted: false,
                    });
                }
                Some(terminator) => {
                    self.stream.eat_terminator(terminator)?;
                    self.finish_unquoted(row, cell_start);
                    return Ok(CellOutcome::Cell {
                        row_ended: true,
                        quoted: false,
                    });
                }
            }
        }
    }

    fn finish_unquoted(&mut self, row: &mut RowBuf, cell_start: usize) {
        if self.ignore_surrounding_spaces {
            while row.bytes.len() > cell_start && *row.bytes.last().unwrap() == b' ' {
                row.bytes.pop();
            }
            let content_start = row.bytes[cell_start..]
                .iter()
                .position(|&b| b != b' ')
                .map_or(row.bytes.len(), |i| cell_start + i);
            row.bytes.drain(cell_start..content_start);
        }
    }

    fn grab_quoted(&mut self, row: &mut RowBuf, cell_start: usize) -> Result<CellOutcome> {
        self.stream.bump();
        self.row_had_input = true;

        loop {
            let before = row.bytes.len();
            let found = self.stream.take_until(self.quote, &mut row.bytes)?;
            for &b in &row.bytes[before..] {
                if b == b'\n' {
                    self.stream.count_line();
                }
            }
            if found.is_none() {
                return Err(GrabError::UnterminatedQuote {
                    row: self.row_start_line,
                }
                .into());
            }
            self.stream.bump();
            if self.stream.peek()? == Some(self.quote) {
                // A doubled quote is a literal quote.
                self.stream.bump();
                row.bytes.push(self.quote);
            } else {
                break;
            }
        }

        if self.trim {
            while row.bytes.len() > cell_start && *row.bytes.last().unwrap() == b' ' {
                row.bytes.pop();
            }
            let content_start = row.bytes[cell_start..]
                .iter()
                .position(|&b| b != b' ')
                .map_or(row.bytes.len(), |i| cell_start + i);
            row.bytes.drain(cell_start..content_start);
        }

        // Only whitespace may sit between the closing quote and the next
        // delimiter or row terminator.
        loop {
            match self.stream.peek()? {
                None => {
                    return Ok(CellOutcome::Cell {
                        row_ended: true,
                        quoted: true,
                    })
                }
                Some(b) if b == self.delimiter => {
                    self.stream.bump();
                    return Ok(CellOutcome::Cell {
                        row_ended: false,
                        quoted: true,
                    });
                }
                Some(terminator @ (b'\r' | b'\n')) => {
                    self.stream.eat_terminator(terminator)?;
                    return Ok(CellOutcome::Cell {
                        row_ended: true,
                        quoted: true,
                    });
                }
                Some(b' ' | b'\t') => self.stream.bump(),
                Some(_) => {
                    return Err(GrabError::JunkAfterClosingQuote {
                        row: self.row_start_line,
                    }
                    .into())
                }
            }
        }
    }
}

impl<R: Read> RowGrabber for DelimitedGrabber<R> {
    fn grab_row(&mut self, row: &mut RowBuf) -> Result<bool> {
        row.clear();
        self.row_start_line = self.stream.lines() + 1;
        self.row_had_input = false;

        loop {
            let cell_start = row.bytes.len();
            match self.next_cell(row)? {
                CellOutcome::EndOfInput => {
                    if row.cells.is_empty() {
                        return Ok(false);
                    }
                    // A trailing delimiter at EOF closes the row with an
                    // empty cell.
                    row.cells.push(CellMeta {
                        start: cell_start,
                        end: row.bytes.len(),
                        quoted: false,
                    });
                    break;
                }
                CellOutcome::Cell { row_ended, quoted } => {
                    row.cells.push(CellMeta {
                        start: cell_start,
                        end: row.bytes.len(),
                        quoted,
                    });
                    if row_ended {
                        break;
                    }
                }
            }
        }

        row.blank = row.cells.len() == 1 && row.cell(0).is_empty() && !self.row_had_input;
        Ok(true)
    }

    fn start_line(&self) -> u64 {
        self.row_start_line
    }
}
