// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

/// Parses a signed decimal integer: `^[-+]?[0-9]+$`, checked against the
/// bounds of `i64`. An empty slice, a bare sign, or any non-digit rejects.
#[inline]
pub fn try_parse_long(cell: &[u8]) -> Option<i64> {
    let (negative, digits) = match cell {
        [b'-', rest @ ..] => (true, rest),
        [b'+', rest @ ..] => (false, rest),
        rest => (false, rest),
    };
    if digits.is_empty() {
        return None;
    }
    // Accumulate negated so that i64::MIN parses without overflow.
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_sub((b - b'0') as i64)?;
    }
    if negative {
        Some(value)
    } else {
        value.checked_neg()
    }
}

/// Parses a floating-point cell: ordinary decimal, scientific notation, and
/// the literals `Infinity`, `-Infinity`, and `NaN`.
#[inline]
pub fn try_parse_double(cell: &[u8]) -> Option<f64> {
    fast_float2::parse(cell).ok()
}

/// Parses a float, accepting the cell only when the double value is exactly
/// representable as an f32. `1234.5678` rejects here and lands in a double
/// column instead of silently rounding.
#[inline]
pub fn try_parse_float_strict(cell: &[u8]) -> Option<f32> {
    shrink_to_float(try_parse_double(cell)?)
}

#[inline]
pub(super) fn shrink_to_float(d: f64) -> Option<f32> {
    let f = d as f32;
    if f as f64 == d || d.is_nan() {
        Some(f)
    } else {
        None
    }
}

/// Parses case-insensitive `true`/`false`.
#[inline]
pub fn try_parse_bool(cell: &[u8]) -> Option<bool> {
    if cell.eq_ignore_ascii_case(b"true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case(b"false") {
        Some(false)
    } else {
        None
    }
}

/// Parses a cell holding exactly one Unicode scalar value in the Basic
/// Multilingual Plane. Anything longer, shorter, or outside the BMP
/// disqualifies the cell from the char parser.
#[inline]
pub fn try_parse_char(cell: &[u8]) -> Option<char> {
    let s = std::str::from_utf8(cell).ok()?;
    let mut chars = s.chars();
    let c = chars.next()?;
    if chars.next().is_some() || c as u32 > 0xFFFF {
        return None;
    }
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longs() {
        assert_eq!(try_parse_long(b"0"), Some(0));
        assert_eq!(try_parse_long(b"+17"), Some(17));
        assert_eq!(try_parse_long(b"-300"), Some(-300));
        assert_eq!(try_parse_long(b"9223372036854775807"), Some(i64::MAX));
        assert_eq!(try_parse_long(b"-9223372036854775808"), Some(i64::MIN));
        assert_eq!(try_parse_long(b"9223372036854775808"), None);
        assert_eq!(try_parse_long(b""), None);
        assert_eq!(try_parse_long(b"-"), None);
        assert_eq!(try_parse_long(b"12 "), None);
        assert_eq!(try_parse_long(b"1.0"), None);
    }

    #[test]
    fn doubles() {
        assert_eq!(try_parse_double(b"1234.5678"), Some(1234.5678));
        assert_eq!(try_parse_double(b"3e8"), Some(3e8));
        assert_eq!(try_parse_double(b"-Infinity"), Some(f64::NEG_INFINITY));
        assert_eq!(try_parse_double(b"Infinity"), Some(f64::INFINITY));
        assert!(try_parse_double(b"NaN").unwrap().is_nan());
        assert_eq!(try_parse_double(b"nope"), None);
        assert_eq!(try_parse_double(b""), None);
    }

    #[test]
    fn floats_must_round_trip() {
        assert_eq!(try_parse_float_strict(b"1.5"), Some(1.5));
        assert_eq!(try_parse_float_strict(b"-0.25"), Some(-0.25));
        // Exactly representable as f64 but not f32.
        assert_eq!(try_parse_float_strict(b"1234.5678"), None);
        assert!(try_parse_float_strict(b"NaN").unwrap().is_nan());
    }

    #[test]
    fn bools() {
        assert_eq!(try_parse_bool(b"true"), Some(true));
        assert_eq!(try_parse_bool(b"FALSE"), Some(false));
        assert_eq!(try_parse_bool(b"TrUe"), Some(true));
        assert_eq!(try_parse_bool(b"yes"), None);
        assert_eq!(try_parse_bool(b""), None);
    }

    #[test]
    fn chars_are_single_bmp_scalars() {
        assert_eq!(try_parse_char(b"x"), Some('x'));
        assert_eq!(try_parse_char("é".as_bytes()), Some('é'));
        assert_eq!(try_parse_char("ﬀ".as_bytes()), Some('ﬀ'));
        assert_eq!(try_parse_char(b"xy"), None);
        assert_eq!(try_parse_char(b""), None);
        // Outside the BMP.
        assert_eq!(try_parse_char("🥰".as_bytes()), None);
    }
}
