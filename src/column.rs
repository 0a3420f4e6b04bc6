// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Array-backed default sinks.
//!
//! [`DefaultSinkFactory`] keeps every column in a plain `Vec` and declares
//! the usual reserved sentinels, so the reader works standalone and the
//! integration tests have something concrete to look at.

use paste::paste;

use crate::{
    errors::SinkError,
    sink::{ColumnData, NumericSink, Sink, SinkFactory, Source},
};

pub const NULL_BYTE: i8 = i8::MIN;
pub const NULL_SHORT: i16 = i16::MIN;
pub const NULL_INT: i32 = i32::MIN;
pub const NULL_LONG: i64 = i64::MIN;
pub const NULL_FLOAT: f32 = f32::MIN;
pub const NULL_DOUBLE: f64 = f64::MIN;
pub const NULL_BOOLEAN_AS_BYTE: u8 = u8::MAX;
pub const NULL_CHAR: char = '\u{FFFE}';
pub const NULL_DATETIME: i64 = i64::MIN;
pub const NULL_TIMESTAMP: i64 = i64::MIN;

/// A growable column of values plus the parallel null bitmap.
struct ArrayColumn<T> {
    values: Vec<T>,
    nulls: Vec<bool>,
    wrap: fn(Vec<T>, Vec<bool>) -> ColumnData,
}

impl<T> ArrayColumn<T> {
    fn new(wrap: fn(Vec<T>, Vec<bool>) -> ColumnData) -> Self {
        ArrayColumn {
            values: Vec::new(),
            nulls: Vec::new(),
            wrap,
        }
    }
}

impl<T: Clone + Send> Sink<T> for ArrayColumn<T> {
    fn write(
        &mut self,
        values: &[T],
        is_null: &[bool],
        dest_begin: u64,
        dest_end: u64,
        _appending: bool,
    ) -> Result<(), SinkError> {
        let begin = dest_begin as usize;
        let n = (dest_end - dest_begin) as usize;
        debug_assert!(values.len() >= n && is_null.len() >= n, "short chunk");
        debug_assert!(begin <= self.values.len(), "write leaves a gap");
        for i in 0..n {
            if begin + i < self.values.len() {
                self.values[begin + i] = values[i].clone();
                self.nulls[begin + i] = is_null[i];
            } else {
                self.values.push(values[i].clone());
                self.nulls.push(is_null[i]);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> ColumnData {
        (self.wrap)(
            std::mem::take(&mut self.values),
            std::mem::take(&mut self.nulls),
        )
    }
}

impl<T: Copy + Send> Source<T> for ArrayColumn<T>
where
    ArrayColumn<T>: Sink<T>,
{
    fn read(
        &mut self,
        values: &mut [T],
        is_null: &mut [bool],
        src_begin: u64,
        src_end: u64,
    ) -> Result<(), SinkError> {
        let begin = src_begin as usize;
        let n = (src_end - src_begin) as usize;
        values[..n].copy_from_slice(&self.values[begin..begin + n]);
        is_null[..n].copy_from_slice(&self.nulls[begin..begin + n]);
        Ok(())
    }
}

/// The sink factory used when the caller has no columnar store of its own:
/// every column lands in a `Vec`, nulls stored as the reserved sentinels.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultSinkFactory;

impl DefaultSinkFactory {
    pub fn new() -> Self {
        DefaultSinkFactory
    }
}

macro_rules! numeric_impls(($($name:ident: $ty:ty, $variant:ident, $null:expr),* $(,)?) => {
    paste! {
        $(
            fn [<$name _sink>](&mut self, _column: usize) -> NumericSink<$ty> {
                NumericSink::WithSource(Box::new(ArrayColumn::new(|values, _| {
                    ColumnData::$variant(values)
                })))
            }

            fn [<reserved_ $name>](&self) -> Option<$ty> {
                Some($null)
            }
        )*
    }
});

impl SinkFactory for DefaultSinkFactory {
    numeric_impls! {
        byte: i8, Byte, NULL_BYTE,
        short: i16, Short, NULL_SHORT,
        int: i32, Int, NULL_INT,
        long: i64, Long, NULL_LONG,
        float: f32, Float, NULL_FLOAT,
        double: f64, Double, NULL_DOUBLE,
    }

    fn boolean_sink(&mut self, _column: usize) -> Box<dyn Sink<u8>> {
        Box::new(ArrayColumn::new(|values, _| {
            ColumnData::BooleanAsByte(values)
        }))
    }

    fn datetime_sink(&mut self, _column: usize) -> Box<dyn Sink<i64>> {
        Box::new(ArrayColumn::new(|values, _| {
            ColumnData::DateTimeAsLong(values)
        }))
    }

    fn timestamp_sink(&mut self, _column: usize) -> Box<dyn Sink<i64>> {
        Box::new(ArrayColumn::new(|values, _| {
            ColumnData::TimestampAsLong(values)
        }))
    }

    fn char_sink(&mut self, _column: usize) -> Box<dyn Sink<char>> {
        Box::new(ArrayColumn::new(|values, _| ColumnData::Char(values)))
    }

    fn string_sink(&mut self, _column: usize) -> Box<dyn Sink<String>> {
        Box::new(ArrayColumn::new(|values, nulls| {
            ColumnData::String(
                values
                    .into_iter()
                    .zip(nulls)
                    .map(|(value, is_null)| if is_null { None } else { Some(value) })
                    .collect(),
            )
        }))
    }

    fn reserved_boolean(&self) -> Option<u8> {
        Some(NULL_BOOLEAN_AS_BYTE)
    }

    fn reserved_datetime(&self) -> Option<i64> {
        Some(NULL_DATETIME)
    }

    fn reserved_timestamp(&self) -> Option<i64> {
        Some(NULL_TIMESTAMP)
    }

    fn reserved_char(&self) -> Option<char> {
        Some(NULL_CHAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_then_source_round_trips() {
        let mut factory = DefaultSinkFactory::new();
        let mut sink = factory.int_sink(0);
        sink.sink_mut()
            .write(&[1, NULL_INT, 3], &[false, true, false], 0, 3, true)
            .unwrap();

        let source = sink.source_mut().expect("default sinks are sources");
        let mut values = [0i32; 3];
        let mut nulls = [false; 3];
        source.read(&mut values, &mut nulls, 0, 3).unwrap();
        assert_eq!(values, [1, NULL_INT, 3]);
        assert_eq!(nulls, [false, true, false]);

        match sink.sink_mut().finish() {
            ColumnData::Int(v) => assert_eq!(v, [1, NULL_INT, 3]),
            other => panic!("unexpected column: {other:?}"),
        }
    }

    #[test]
    fn overwrite_then_append() {
        let mut factory = DefaultSinkFactory::new();
        let mut sink = factory.long_sink(0);
        sink.sink_mut()
            .write(&[10, 20], &[false, false], 0, 2, true)
            .unwrap();
        // Rewrite row 1 and extend, the shape a promotion produces.
        sink.sink_mut()
            .write(&[21, 30], &[false, false], 1, 3, false)
            .unwrap();
        match sink.sink_mut().finish() {
            ColumnData::Long(v) => assert_eq!(v, [10, 21, 30]),
            other => panic!("unexpected column: {other:?}"),
        }
    }

    #[test]
    fn string_column_yields_options() {
        let mut factory = DefaultSinkFactory::new();
        let mut sink = factory.string_sink(0);
        sink.write(
            &["a".to_string(), String::new()],
            &[false, true],
            0,
            2,
            true,
        )
        .unwrap();
        match sink.finish() {
            ColumnData::String(v) => assert_eq!(v, [Some("a".to_string()), None]),
            other => panic!("unexpected column: {other:?}"),
        }
    }
}
