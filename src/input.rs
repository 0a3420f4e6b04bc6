// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Charset decoding for the raw input stream.
//!
//! The tokenizer operates on UTF-8 bytes. ASCII and UTF-8 inputs pass
//! through untouched (a leading UTF-8 byte-order mark is stripped);
//! ISO-8859-1 and the UTF-16 family are transcoded on the fly.

use std::io::{self, Read};

use crate::spec::Charset;

const RAW_CHUNK: usize = 16 * 1024;

/// A reader that yields the input transcoded to UTF-8.
pub(crate) struct DecodingReader<R> {
    inner: R,
    charset: Charset,
    /// Raw input bytes not yet decoded (at most one code unit's worth
    /// between fills, plus an unpaired high surrogate).
    raw: Vec<u8>,
    /// Decoded UTF-8 bytes not yet handed to the caller.
    decoded: Vec<u8>,
    decoded_pos: usize,
    /// A high surrogate waiting for its pair across a fill boundary.
    pending_high: Option<u16>,
    started: bool,
    eof: bool,
}

impl<R: Read> DecodingReader<R> {
    pub(crate) fn new(inner: R, charset: Charset) -> Self {
        DecodingReader {
            inner,
            charset,
            raw: Vec::new(),
            decoded: Vec::new(),
            decoded_pos: 0,
            pending_high: None,
            started: false,
            eof: false,
        }
    }

    /// Refills `self.decoded` from the underlying reader. Returns false at
    /// EOF with nothing decoded.
    fn fill(&mut self) -> io::Result<bool> {
        debug_assert!(self.decoded_pos >= self.decoded.len(), "decoded not drained");
        self.decoded.clear();
        self.decoded_pos = 0;

        while !self.eof && self.raw.len() < RAW_CHUNK {
            let start = self.raw.len();
            self.raw.resize(start + RAW_CHUNK, 0);
            let n = self.inner.read(&mut self.raw[start..])?;
            self.raw.truncate(start + n);
            if n == 0 {
                self.eof = true;
            }
        }

        if !self.started {
            self.started = true;
            self.strip_bom();
        }

        match self.charset {
            Charset::Utf8 => {
                std::mem::swap(&mut self.raw, &mut self.decoded);
            }
            Charset::UsAscii => {
                if let Some(&b) = self.raw.iter().find(|b| !b.is_ascii()) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("input byte {b:#04x} is not US-ASCII"),
                    ));
                }
                std::mem::swap(&mut self.raw, &mut self.decoded);
            }
            Charset::Iso8859_1 => {
                for &b in &self.raw {
                    let mut buf = [0u8; 4];
                    self.decoded
                        .extend_from_slice((b as char).encode_utf8(&mut buf).as_bytes());
                }
                self.raw.clear();
            }
            Charset::Utf16 | Charset::Utf16Be => self.decode_utf16(false)?,
            Charset::Utf16Le => self.decode_utf16(true)?,
        }
        Ok(!self.decoded.is_empty())
    }

    fn strip_bom(&mut self) {
        match self.charset {
            Charset::Utf8 => {
                if self.raw.starts_with(b"\xEF\xBB\xBF") {
                    self.raw.drain(..3);
                }
            }
            Charset::Utf16 => {
                // Unmarked UTF-16 defaults to big-endian.
                if self.raw.starts_with(b"\xFF\xFE") {
                    self.charset = Charset::Utf16Le;
                    self.raw.drain(..2);
                } else {
                    if self.raw.starts_with(b"\xFE\xFF") {
                        self.raw.drain(..2);
                    }
                    self.charset = Charset::Utf16Be;
                }
            }
            _ => {}
        }
    }

    fn decode_utf16(&mut self, little_endian: bool) -> io::Result<()> {
        let whole_units = self.raw.len() / 2 * 2;
        let mut units = self.raw[..whole_units]
            .chunks_exact(2)
            .map(|pair| {
                if little_endian {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                }
            });

        let mut buf = [0u8; 4];
        let mut push = |c: char, decoded: &mut Vec<u8>| {
            decoded.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        };

        while let Some(unit) = units.next() {
            let unit = match self.pending_high.take() {
                Some(high) => {
                    if !(0xDC00..=0xDFFF).contains(&unit) {
                        return Err(bad_surrogate(high));
                    }
                    let c = char::from_u32(
                        0x10000 + (((high as u32) - 0xD800) << 10) + (unit as u32 - 0xDC00),
                    )
                    .expect("surrogate pair decodes to a scalar");
                    push(c, &mut self.decoded);
                    continue;
                }
                None => unit,
            };
            match unit {
                0xD800..=0xDBFF => self.pending_high = Some(unit),
                0xDC00..=0xDFFF => return Err(bad_surrogate(unit)),
                _ => push(char::from_u32(unit as u32).expect("BMP scalar"), &mut self.decoded),
            }
        }

        let leftover = self.raw.len() - whole_units;
        self.raw.copy_within(whole_units.., 0);
        self.raw.truncate(leftover);
        if self.eof {
            if leftover != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "UTF-16 input has an odd number of bytes",
                ));
            }
            if let Some(high) = self.pending_high {
                return Err(bad_surrogate(high));
            }
        }
        Ok(())
    }
}

fn bad_surrogate(unit: u16) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("UTF-16 input has an unpaired surrogate {unit:#06x}"),
    )
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.decoded_pos >= self.decoded.len() {
            if self.eof && self.raw.is_empty() && self.pending_high.is_none() {
                return Ok(0);
            }
            if !self.fill()? && self.eof && self.raw.is_empty() {
                return Ok(0);
            }
        }
        let n = (self.decoded.len() - self.decoded_pos).min(buf.len());
        buf[..n].copy_from_slice(&self.decoded[self.decoded_pos..self.decoded_pos + n]);
        self.decoded_pos += n;
        Ok(n)
    }
}
