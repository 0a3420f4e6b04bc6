// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Cell grabbers: cut the decoded input stream into cells and rows, under
//! delimited (RFC 4180–style) or fixed-width column rules.

mod delimited;
mod fixed;

use std::io::{self, Read};

use memchr::{memchr, memchr3};

pub(crate) use delimited::DelimitedGrabber;
pub(crate) use fixed::FixedGrabber;

use crate::errors::Result;

/// One grabbed cell: a range into [`RowBuf::bytes`] plus the quoted flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CellMeta {
    pub start: usize,
    pub end: usize,
    pub quoted: bool,
}

/// A reusable buffer holding one row: all cell bytes back to back, plus one
/// [`CellMeta`] per cell. Grown while the row is grabbed, cleared for the
/// next row, so spans stay cheap and stable within a row.
#[derive(Debug, Default)]
pub(crate) struct RowBuf {
    pub bytes: Vec<u8>,
    pub cells: Vec<CellMeta>,
    /// Whether the physical line held no content at all (no bytes before
    /// its terminator). Such a row grabs as a single empty cell; the
    /// `ignore_empty_lines` handling needs to tell the two apart.
    pub blank: bool,
}

impl RowBuf {
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.cells.clear();
        self.blank = false;
    }

    #[inline]
    pub fn cell(&self, index: usize) -> &[u8] {
        let meta = &self.cells[index];
        &self.bytes[meta.start..meta.end]
    }
}

/// Produces rows from the decoded input.
pub(crate) trait RowGrabber {
    /// Grabs the next row into `row`, clearing it first. Returns false at
    /// end of input.
    fn grab_row(&mut self, row: &mut RowBuf) -> Result<bool>;

    /// Consumes one row without delivering it. Fixed-width inputs can skip
    /// a raw line even before column widths are established.
    fn skip_row(&mut self, row: &mut RowBuf) -> Result<bool> {
        self.grab_row(row)
    }

    /// The 1-based physical line number where the most recently grabbed row
    /// started. Embedded newlines inside quoted cells advance the count.
    fn start_line(&self) -> u64;
}

const STREAM_BUF: usize = 64 * 1024;

/// A buffered byte stream with single-byte peek and vectored scans.
pub(super) struct ByteStream<R> {
    r: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    /// Completed physical lines (newlines consumed so far).
    lines: u64,
}

impl<R: Read> ByteStream<R> {
    pub(super) fn new(r: R) -> Self {
        ByteStream {
            r,
            buf: Vec::with_capacity(STREAM_BUF),
            pos: 0,
            eof: false,
            lines: 0,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        debug_assert!(self.pos >= self.buf.len(), "refill with bytes pending");
        if self.eof {
            return Ok(());
        }
        self.buf.clear();
        self.pos = 0;
        self.buf.resize(STREAM_BUF, 0);
        let n = self.r.read(&mut self.buf)?;
        self.buf.truncate(n);
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }

    #[inline]
    pub(super) fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.pos >= self.buf.len() {
            self.refill()?;
            if self.pos >= self.buf.len() {
                return Ok(None);
            }
        }
        Ok(Some(self.buf[self.pos]))
    }

    /// Advances past the byte most recently peeked.
    #[inline]
    pub(super) fn bump(&mut self) {
        debug_assert!(self.pos < self.buf.len(), "bump past end of buffer");
        self.pos += 1;
    }

    #[inline]
    pub(super) fn lines(&self) -> u64 {
        self.lines
    }

    #[inline]
    pub(super) fn count_line(&mut self) {
        self.lines += 1;
    }

    /// Appends bytes onto `out` up to, but not including, the first
    /// occurrence of any of the three needles. Returns the needle found, or
    /// None when the input ends first.
    pub(super) fn take_until3(
        &mut self,
        n1: u8,
        n2: u8,
        n3: u8,
        out: &mut Vec<u8>,
    ) -> io::Result<Option<u8>> {
        loop {
            if self.pos >= self.buf.len() {
                self.refill()?;
                if self.pos >= self.buf.len() {
                    return Ok(None);
                }
            }
            let haystack = &self.buf[self.pos..];
            match memchr3(n1, n2, n3, haystack) {
                Some(i) => {
                    out.extend_from_slice(&haystack[..i]);
                    self.pos += i;
                    return Ok(Some(haystack[i]));
                }
                None => {
                    out.extend_from_slice(haystack);
                    self.pos = self.buf.len();
                }
            }
        }
    }

    /// Like [`take_until3`](Self::take_until3) with a single needle.
    pub(super) fn take_until(&mut self, needle: u8, out: &mut Vec<u8>) -> io::Result<Option<u8>> {
        loop {
            if self.pos >= self.buf.len() {
                self.refill()?;
                if self.pos >= self.buf.len() {
                    return Ok(None);
                }
            }
            let haystack = &self.buf[self.pos..];
            match memchr(needle, haystack) {
                Some(i) => {
                    out.extend_from_slice(&haystack[..i]);
                    self.pos += i;
                    return Ok(Some(haystack[i]));
                }
                None => {
                    out.extend_from_slice(haystack);
                    self.pos = self.buf.len();
                }
            }
        }
    }

    /// Consumes a row terminator at the cursor: `\n`, `\r`, or `\r\n`, all
    /// equivalent. The caller must have peeked one of them.
    pub(super) fn eat_terminator(&mut self, first: u8) -> io::Result<()> {
        debug_assert!(matches!(first, b'\r' | b'\n'), "not a terminator");
        self.bump();
        if first == b'\r' && self.peek()? == Some(b'\n') {
            self.bump();
        }
        self.count_line();
        Ok(())
    }
}
