// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! The sink/source adapter layer: how parsed columns reach the caller's
//! storage.
//!
//! The inference engine writes each column through a [`Sink`] in chunks of
//! ascending, contiguous row ranges. Numeric sinks may also be [`Source`]s;
//! a readable sink lets a numeric promotion replay already-parsed values
//! without re-tokenizing the column. A [`SinkFactory`] supplies the sinks
//! and, per type, an optional reserved sentinel value that stands in for
//! null and is rejected as ordinary data.

use std::{any::Any, fmt};

use paste::paste;

use crate::errors::SinkError;

/// The elected type of a finished column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
    BooleanAsByte,
    /// Nanoseconds since the Unix epoch, from ISO-8601 text.
    DateTimeAsLong,
    /// Nanoseconds since the Unix epoch, from a whole-cell integer.
    TimestampAsLong,
    Custom,
}

/// The data handed back by a sink when its column completes.
pub enum ColumnData {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Char(Vec<char>),
    String(Vec<Option<String>>),
    BooleanAsByte(Vec<u8>),
    DateTimeAsLong(Vec<i64>),
    TimestampAsLong(Vec<i64>),
    Custom(Box<dyn Any + Send>),
}

impl fmt::Debug for ColumnData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnData::Byte(v) => f.debug_tuple("Byte").field(v).finish(),
            ColumnData::Short(v) => f.debug_tuple("Short").field(v).finish(),
            ColumnData::Int(v) => f.debug_tuple("Int").field(v).finish(),
            ColumnData::Long(v) => f.debug_tuple("Long").field(v).finish(),
            ColumnData::Float(v) => f.debug_tuple("Float").field(v).finish(),
            ColumnData::Double(v) => f.debug_tuple("Double").field(v).finish(),
            ColumnData::Char(v) => f.debug_tuple("Char").field(v).finish(),
            ColumnData::String(v) => f.debug_tuple("String").field(v).finish(),
            ColumnData::BooleanAsByte(v) => f.debug_tuple("BooleanAsByte").field(v).finish(),
            ColumnData::DateTimeAsLong(v) => f.debug_tuple("DateTimeAsLong").field(v).finish(),
            ColumnData::TimestampAsLong(v) => f.debug_tuple("TimestampAsLong").field(v).finish(),
            ColumnData::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Accepts parsed values for one column.
///
/// `write` receives a chunk of values covering destination rows
/// `[dest_begin, dest_end)` together with the parallel null bitmap. Null
/// positions carry the type's reserved sentinel in `values`. Ranges arrive
/// in ascending row order and are contiguous while `appending` is true; a
/// non-appending write overwrites rows delivered earlier (numeric
/// promotion rewrites the prefix it read back).
pub trait Sink<T>: Send {
    fn write(
        &mut self,
        values: &[T],
        is_null: &[bool],
        dest_begin: u64,
        dest_end: u64,
        appending: bool,
    ) -> Result<(), SinkError>;

    /// Surrenders the finished column.
    fn finish(&mut self) -> ColumnData;
}

/// Reads back rows previously written to a sink, powering numeric
/// promotion without re-tokenizing.
pub trait Source<T>: Send {
    fn read(
        &mut self,
        values: &mut [T],
        is_null: &mut [bool],
        src_begin: u64,
        src_end: u64,
    ) -> Result<(), SinkError>;
}

/// A sink that can also be read back.
pub trait SinkSource<T>: Sink<T> + Source<T> {}

impl<T, S: Sink<T> + Source<T> + ?Sized> SinkSource<T> for S {}

/// A numeric sink as supplied by the factory: with or without the paired
/// source. Without a source, promotion out of this sink re-streams the
/// column from dense storage instead of reading back.
pub enum NumericSink<T> {
    Plain(Box<dyn Sink<T>>),
    WithSource(Box<dyn SinkSource<T>>),
}

impl<T> NumericSink<T> {
    #[inline]
    pub(crate) fn sink_mut(&mut self) -> &mut dyn Sink<T> {
        match self {
            NumericSink::Plain(sink) => &mut **sink,
            NumericSink::WithSource(sink) => &mut **sink,
        }
    }

    #[inline]
    pub(crate) fn has_source(&self) -> bool {
        matches!(self, NumericSink::WithSource(_))
    }

    #[inline]
    pub(crate) fn source_mut(&mut self) -> Option<&mut dyn SinkSource<T>> {
        match self {
            NumericSink::Plain(_) => None,
            NumericSink::WithSource(sink) => Some(&mut **sink),
        }
    }
}

macro_rules! factory_methods(($($name:ident: $ty:ty),* $(,)?) => {
    paste! {
        $(
            #[doc = concat!("Creates the ", stringify!($name), " sink for the given column.")]
            fn [<$name _sink>](&mut self, column: usize) -> NumericSink<$ty>;

            #[doc = concat!("The reserved ", stringify!($name), " value, if any. A parsed cell")]
            /// equal to it is rejected (promoting the column), and null
            /// cells are stored as it.
            fn [<reserved_ $name>](&self) -> Option<$ty> {
                None
            }
        )*
    }
});

/// Supplies sinks and reserved sentinels. One factory serves every column
/// of a read; it must tolerate being called from the coordinator's worker
/// threads (calls are serialized).
pub trait SinkFactory: Send {
    factory_methods! {
        byte: i8,
        short: i16,
        int: i32,
        long: i64,
        float: f32,
        double: f64,
    }

    fn boolean_sink(&mut self, column: usize) -> Box<dyn Sink<u8>>;
    fn datetime_sink(&mut self, column: usize) -> Box<dyn Sink<i64>>;
    fn timestamp_sink(&mut self, column: usize) -> Box<dyn Sink<i64>>;
    fn char_sink(&mut self, column: usize) -> Box<dyn Sink<char>>;
    fn string_sink(&mut self, column: usize) -> Box<dyn Sink<String>>;

    fn reserved_boolean(&self) -> Option<u8> {
        None
    }
    fn reserved_datetime(&self) -> Option<i64> {
        None
    }
    fn reserved_timestamp(&self) -> Option<i64> {
        None
    }
    fn reserved_char(&self) -> Option<char> {
        None
    }
}
