// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! The non-numeric parsers: datetime, timestamp, boolean, char, string,
//! and user parsers. None of these participates in read-back; promotion
//! into them re-streams the column.

use crate::{
    errors::{InferError, Result},
    parse::{
        chunk::Chunk,
        infer::{lock_factory, Attempt, ColumnSpec, Outcome, SharedFactory},
        CustomParserFactory, Parser,
    },
    sink::{ColumnData, DataType, Sink},
    value::{try_parse_bool, try_parse_char, try_parse_timestamp, TimestampUnit},
};

/// The shared attempt loop for a parser with a plain sink and an optional
/// reserved sentinel.
fn run_plain<T: Clone + PartialEq>(
    mut attempt: Attempt<'_>,
    mut sink: Box<dyn Sink<T>>,
    reserved: Option<T>,
    data_type: DataType,
    parse: impl Fn(&ColumnSpec, &[u8]) -> Option<T>,
) -> Result<Outcome> {
    debug_assert!(attempt.prefill.is_none(), "read-back into a plain parser");
    let mut chunk = Chunk::<T>::new();
    let mut nonnull = 0u64;
    let mut nulls_seen = false;
    loop {
        let Some(cell) = attempt.feed.next()? else {
            chunk.flush(&mut *sink)?;
            return Ok(Outcome::Done {
                rows: chunk.next_row(),
                nonnull,
                data_type,
                data: sink.finish(),
            });
        };
        let accepted = {
            let bytes = cell.bytes();
            if attempt.spec.is_null_literal(bytes) {
                match reserved.clone() {
                    Some(sentinel) => {
                        chunk.push(sentinel, true);
                        nulls_seen = true;
                        true
                    }
                    None => false,
                }
            } else {
                match parse(attempt.spec, bytes) {
                    Some(value) if reserved == Some(value.clone()) => false,
                    Some(value) => {
                        chunk.push(value, false);
                        nonnull += 1;
                        true
                    }
                    None => false,
                }
            }
        };
        if !accepted {
            chunk.flush(&mut *sink)?;
            return Ok(Outcome::Fault {
                consumed: chunk.next_row(),
                nulls_seen,
                cell,
                holder: None,
            });
        }
        if chunk.is_full() {
            chunk.flush(&mut *sink)?;
        }
    }
}

pub(crate) fn run_datetime(attempt: Attempt<'_>) -> Result<Outcome> {
    let (sink, reserved) = {
        let mut factory = lock_factory(attempt.factory);
        (
            factory.datetime_sink(attempt.spec.index),
            factory.reserved_datetime(),
        )
    };
    run_plain(attempt, sink, reserved, DataType::DateTimeAsLong, |spec, b| {
        spec.tokenizer.parse_datetime(b)
    })
}

pub(crate) fn run_timestamp(attempt: Attempt<'_>, unit: TimestampUnit) -> Result<Outcome> {
    let (sink, reserved) = {
        let mut factory = lock_factory(attempt.factory);
        (
            factory.timestamp_sink(attempt.spec.index),
            factory.reserved_timestamp(),
        )
    };
    run_plain(attempt, sink, reserved, DataType::TimestampAsLong, move |_, b| {
        try_parse_timestamp(b, unit)
    })
}

pub(crate) fn run_boolean(attempt: Attempt<'_>) -> Result<Outcome> {
    let (sink, reserved) = {
        let mut factory = lock_factory(attempt.factory);
        (
            factory.boolean_sink(attempt.spec.index),
            factory.reserved_boolean(),
        )
    };
    run_plain(attempt, sink, reserved, DataType::BooleanAsByte, |_, b| {
        try_parse_bool(b).map(u8::from)
    })
}

pub(crate) fn run_char(attempt: Attempt<'_>) -> Result<Outcome> {
    let (sink, reserved) = {
        let mut factory = lock_factory(attempt.factory);
        (
            factory.char_sink(attempt.spec.index),
            factory.reserved_char(),
        )
    };
    run_plain(attempt, sink, reserved, DataType::Char, |_, b| {
        try_parse_char(b)
    })
}

/// The string parser accepts everything, so it never faults; a cell that is
/// not valid UTF-8 is a hard error rather than a promotion.
pub(crate) fn run_string(mut attempt: Attempt<'_>) -> Result<Outcome> {
    debug_assert!(attempt.prefill.is_none(), "read-back into the string parser");
    let mut sink = lock_factory(attempt.factory).string_sink(attempt.spec.index);
    let mut chunk = Chunk::<String>::new();
    let mut nonnull = 0u64;
    loop {
        let Some(cell) = attempt.feed.next()? else {
            chunk.flush(&mut *sink)?;
            return Ok(Outcome::Done {
                rows: chunk.next_row(),
                nonnull,
                data_type: DataType::String,
                data: sink.finish(),
            });
        };
        let bytes = cell.bytes();
        if attempt.spec.is_null_literal(bytes) {
            chunk.push(String::new(), true);
        } else {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                attempt.spec.err(InferError::CellNotUtf8 {
                    row: chunk.next_row() + 1,
                })
            })?;
            chunk.push(text.to_string(), false);
            nonnull += 1;
        }
        if chunk.is_full() {
            chunk.flush(&mut *sink)?;
        }
    }
}

pub(crate) fn run_custom(
    mut attempt: Attempt<'_>,
    factory: &dyn CustomParserFactory,
) -> Result<Outcome> {
    debug_assert!(attempt.prefill.is_none(), "read-back into a custom parser");
    let mut parser = factory.make();
    let mut rows = 0u64;
    let mut nonnull = 0u64;
    let mut nulls_seen = false;
    loop {
        let Some(cell) = attempt.feed.next()? else {
            return Ok(Outcome::Done {
                rows,
                nonnull,
                data_type: DataType::Custom,
                data: ColumnData::Custom(parser.finish()),
            });
        };
        let accepted = {
            let bytes = cell.bytes();
            if attempt.spec.is_null_literal(bytes) {
                parser.append_null();
                nulls_seen = true;
                true
            } else {
                match std::str::from_utf8(bytes) {
                    Ok(text) => {
                        let ok = parser.try_cell(text);
                        if ok {
                            nonnull += 1;
                        }
                        ok
                    }
                    Err(_) => false,
                }
            }
        };
        if !accepted {
            return Ok(Outcome::Fault {
                consumed: rows,
                nulls_seen,
                cell,
                holder: None,
            });
        }
        rows += 1;
    }
}

/// Emits a column of `rows` nulls through the configured null parser.
pub(crate) fn emit_all_null(
    spec: &ColumnSpec,
    parser: &Parser,
    rows: u64,
    factory: &SharedFactory,
) -> Result<(DataType, ColumnData, u64)> {
    fn fill<T: Clone>(
        sink: &mut dyn Sink<T>,
        sentinel: Option<T>,
        rows: u64,
        spec: &ColumnSpec,
        parser: &Parser,
    ) -> Result<()> {
        let sentinel = sentinel.ok_or_else(|| {
            spec.err(InferError::NoNullSentinel {
                parser: parser.name().to_string(),
            })
        })?;
        let mut chunk = Chunk::<T>::new();
        for _ in 0..rows {
            chunk.push(sentinel.clone(), true);
            if chunk.is_full() {
                chunk.flush(sink)?;
            }
        }
        chunk.flush(sink)?;
        Ok(())
    }

    log::debug!(
        "column {:?}: all cells null, emitting via {}",
        spec.name,
        parser.name(),
    );
    let mut factory_guard = lock_factory(factory);
    let (data_type, data) = match parser {
        Parser::Byte => {
            let mut sink = factory_guard.byte_sink(spec.index);
            let reserved = factory_guard.reserved_byte();
            fill(sink.sink_mut(), reserved, rows, spec, parser)?;
            (DataType::Byte, sink.sink_mut().finish())
        }
        Parser::Short => {
            let mut sink = factory_guard.short_sink(spec.index);
            let reserved = factory_guard.reserved_short();
            fill(sink.sink_mut(), reserved, rows, spec, parser)?;
            (DataType::Short, sink.sink_mut().finish())
        }
        Parser::Int => {
            let mut sink = factory_guard.int_sink(spec.index);
            let reserved = factory_guard.reserved_int();
            fill(sink.sink_mut(), reserved, rows, spec, parser)?;
            (DataType::Int, sink.sink_mut().finish())
        }
        Parser::Long => {
            let mut sink = factory_guard.long_sink(spec.index);
            let reserved = factory_guard.reserved_long();
            fill(sink.sink_mut(), reserved, rows, spec, parser)?;
            (DataType::Long, sink.sink_mut().finish())
        }
        Parser::Float => {
            let mut sink = factory_guard.float_sink(spec.index);
            let reserved = factory_guard.reserved_float();
            fill(sink.sink_mut(), reserved, rows, spec, parser)?;
            (DataType::Float, sink.sink_mut().finish())
        }
        Parser::Double => {
            let mut sink = factory_guard.double_sink(spec.index);
            let reserved = factory_guard.reserved_double();
            fill(sink.sink_mut(), reserved, rows, spec, parser)?;
            (DataType::Double, sink.sink_mut().finish())
        }
        Parser::DateTime => {
            let mut sink = factory_guard.datetime_sink(spec.index);
            let reserved = factory_guard.reserved_datetime();
            fill(&mut *sink, reserved, rows, spec, parser)?;
            (DataType::DateTimeAsLong, sink.finish())
        }
        Parser::TimestampSeconds
        | Parser::TimestampMillis
        | Parser::TimestampMicros
        | Parser::TimestampNanos => {
            let mut sink = factory_guard.timestamp_sink(spec.index);
            let reserved = factory_guard.reserved_timestamp();
            fill(&mut *sink, reserved, rows, spec, parser)?;
            (DataType::TimestampAsLong, sink.finish())
        }
        Parser::Boolean => {
            let mut sink = factory_guard.boolean_sink(spec.index);
            let reserved = factory_guard.reserved_boolean();
            fill(&mut *sink, reserved, rows, spec, parser)?;
            (DataType::BooleanAsByte, sink.finish())
        }
        Parser::Char => {
            let mut sink = factory_guard.char_sink(spec.index);
            let reserved = factory_guard.reserved_char();
            fill(&mut *sink, reserved, rows, spec, parser)?;
            (DataType::Char, sink.finish())
        }
        Parser::String => {
            let mut sink = factory_guard.string_sink(spec.index);
            let mut chunk = Chunk::<String>::new();
            for _ in 0..rows {
                chunk.push(String::new(), true);
                if chunk.is_full() {
                    chunk.flush(&mut *sink)?;
                }
            }
            chunk.flush(&mut *sink)?;
            (DataType::String, sink.finish())
        }
        Parser::Custom(custom) => {
            let mut parser = custom.make();
            for _ in 0..rows {
                parser.append_null();
            }
            (DataType::Custom, ColumnData::Custom(parser.finish()))
        }
    };
    Ok((data_type, data, rows))
}
