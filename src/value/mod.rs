// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Pure value tokenizers.
//!
//! Each function takes a byte slice holding one cell and either produces a
//! typed value or rejects the cell. No allocation, no state; the inference
//! layer decides what a rejection means.

mod number;
mod temporal;

use std::sync::Arc;

pub use number::{
    try_parse_bool, try_parse_char, try_parse_double, try_parse_float_strict, try_parse_long,
};
pub use temporal::{try_parse_datetime, try_parse_timestamp, TimestampUnit};

/// A user-supplied replacement for the built-in decimal-to-binary
/// conversion.
///
/// The byte form is consulted when the cell is 7-bit ASCII; the character
/// form when it is not (which also covers the datetime tokenizer handing
/// over a decoded suffix). Returning `None` is a parse failure and promotes
/// the column, the same as the built-in parser rejecting the cell.
pub trait DoubleParser: Send + Sync {
    fn parse_ascii(&self, cell: &[u8]) -> Option<f64>;
    fn parse_str(&self, cell: &str) -> Option<f64>;
}

/// A user-supplied recognizer for time-zone suffixes the ISO-8601 grammar
/// does not cover.
///
/// The parser consumes a prefix of the remaining slice (everything after
/// the time and fraction) and returns the number of bytes consumed together
/// with the zone offset east of UTC, in seconds.
pub trait TimeZoneParser: Send + Sync {
    fn parse(&self, suffix: &[u8]) -> Option<(usize, i32)>;
}

/// The hooks threaded through value tokenization: the optional custom
/// double parser and the optional custom time-zone parser.
#[derive(Clone, Default)]
pub struct Tokenizer {
    pub(crate) custom_double: Option<Arc<dyn DoubleParser>>,
    pub(crate) custom_zone: Option<Arc<dyn TimeZoneParser>>,
}

impl Tokenizer {
    pub(crate) fn new(
        custom_double: Option<Arc<dyn DoubleParser>>,
        custom_zone: Option<Arc<dyn TimeZoneParser>>,
    ) -> Self {
        Tokenizer {
            custom_double,
            custom_zone,
        }
    }

    /// Interprets the cell as a double, routing through the custom parser
    /// when one is configured.
    #[inline]
    pub(crate) fn parse_double(&self, cell: &[u8]) -> Option<f64> {
        match &self.custom_double {
            None => try_parse_double(cell),
            Some(custom) => {
                if cell.is_ascii() {
                    custom.parse_ascii(cell)
                } else {
                    custom.parse_str(std::str::from_utf8(cell).ok()?)
                }
            }
        }
    }

    /// Interprets the cell as a float, accepting it only when the double
    /// value survives an f32 round trip exactly. Values that lose precision
    /// reject so the column promotes to double.
    #[inline]
    pub(crate) fn parse_float(&self, cell: &[u8]) -> Option<f32> {
        let d = self.parse_double(cell)?;
        number::shrink_to_float(d)
    }

    #[inline]
    pub(crate) fn parse_datetime(&self, cell: &[u8]) -> Option<i64> {
        try_parse_datetime(cell, self.custom_zone.as_deref())
    }
}
