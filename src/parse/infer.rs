// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! The per-column inference driver.
//!
//! One call to [`infer_column`] owns a column from first cell to finished
//! sink. It tries the column's assigned parsers in list order; the first
//! parser that consumes every cell without fault elects the column's type.
//! A fault promotes to the next parser, either by reading already-parsed
//! values back from the narrower sink (numeric widening with a source) or
//! by re-streaming the column from dense storage.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    errors::{ColumnError, CsvError, InferError, Result},
    parse::{numeric, scalar, Parser},
    sink::{ColumnData, DataType, NumericSink, SinkFactory},
    storage::{CellHandle, LaneReader, ReplayHandle},
    value::Tokenizer,
};

/// The factory is shared by every column worker; sink creation is brief
/// and serialized through this lock.
pub(crate) type SharedFactory = Mutex<Box<dyn SinkFactory>>;

pub(crate) fn lock_factory(factory: &SharedFactory) -> MutexGuard<'_, Box<dyn SinkFactory>> {
    factory.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything the inferencer knows about one column.
pub(crate) struct ColumnSpec {
    pub index: usize,
    /// The original (pre-legalizer) name; error messages quote it.
    pub name: String,
    pub legal_name: String,
    pub parsers: Vec<Parser>,
    pub null_literals: Vec<Vec<u8>>,
    pub null_parser: Option<Parser>,
    pub tokenizer: Tokenizer,
}

impl ColumnSpec {
    #[inline]
    pub(crate) fn is_null_literal(&self, bytes: &[u8]) -> bool {
        self.null_literals.iter().any(|lit| lit.as_slice() == bytes)
    }

    pub(crate) fn err(&self, kind: InferError) -> CsvError {
        ColumnError {
            column: self.name.clone(),
            kind,
        }
        .into()
    }
}

/// The cell stream for one parser attempt: a lane cursor plus a one-cell
/// pushback slot, so the cell that faulted a narrower parser can be
/// re-presented to the wider one after a read-back promotion.
pub(crate) struct CellFeed {
    reader: LaneReader,
    peeked: Option<CellHandle>,
}

impl CellFeed {
    pub(crate) fn new(reader: LaneReader) -> Self {
        CellFeed {
            reader,
            peeked: None,
        }
    }

    #[inline]
    pub(crate) fn next(&mut self) -> Result<Option<CellHandle>> {
        match self.peeked.take() {
            Some(cell) => Ok(Some(cell)),
            None => self.reader.next(),
        }
    }

    #[inline]
    pub(crate) fn unget(&mut self, cell: CellHandle) {
        debug_assert!(self.peeked.is_none(), "double unget");
        self.peeked = Some(cell);
    }
}

/// A numeric sink held across a promotion so the wider parser can read the
/// narrower values back.
pub(crate) enum NumericHolder {
    Byte(NumericSink<i8>),
    Short(NumericSink<i16>),
    Int(NumericSink<i32>),
    Long(NumericSink<i64>),
    Float(NumericSink<f32>),
    Double(NumericSink<f64>),
}

impl NumericHolder {
    fn has_source(&self) -> bool {
        match self {
            NumericHolder::Byte(sink) => sink.has_source(),
            NumericHolder::Short(sink) => sink.has_source(),
            NumericHolder::Int(sink) => sink.has_source(),
            NumericHolder::Long(sink) => sink.has_source(),
            NumericHolder::Float(sink) => sink.has_source(),
            NumericHolder::Double(sink) => sink.has_source(),
        }
    }
}

/// Rows read back from a faulted numeric parser's sink, to be widened into
/// the next parser's sink before it sees new cells.
pub(crate) struct Prefill {
    pub holder: NumericHolder,
    pub rows: u64,
}

/// The result of running one parser over the remainder of a column.
pub(crate) enum Outcome {
    Done {
        rows: u64,
        nonnull: u64,
        data_type: DataType,
        data: ColumnData,
    },
    Fault {
        /// Rows successfully delivered to the sink, `[0, consumed)`.
        consumed: u64,
        /// Whether any null cell was recorded (read-back needs the next
        /// type to have a sentinel for them).
        nulls_seen: bool,
        /// The cell the parser could not accept.
        cell: CellHandle,
        /// The sink, when the parser was numeric; powers read-back.
        holder: Option<NumericHolder>,
    },
}

/// One parser attempt's environment.
pub(crate) struct Attempt<'a> {
    pub spec: &'a ColumnSpec,
    pub factory: &'a SharedFactory,
    pub feed: &'a mut CellFeed,
    pub prefill: Option<Prefill>,
}

fn run_attempt(parser: &Parser, attempt: Attempt<'_>) -> Result<Outcome> {
    match parser {
        Parser::Byte => numeric::run_byte(attempt),
        Parser::Short => numeric::run_short(attempt),
        Parser::Int => numeric::run_int(attempt),
        Parser::Long => numeric::run_long(attempt),
        Parser::Float => numeric::run_float(attempt),
        Parser::Double => numeric::run_double(attempt),
        Parser::DateTime => scalar::run_datetime(attempt),
        Parser::TimestampSeconds
        | Parser::TimestampMillis
        | Parser::TimestampMicros
        | Parser::TimestampNanos => {
            let unit = parser.timestamp_unit().expect("timestamp parser");
            scalar::run_timestamp(attempt, unit)
        }
        Parser::Boolean => scalar::run_boolean(attempt),
        Parser::Char => scalar::run_char(attempt),
        Parser::String => scalar::run_string(attempt),
        Parser::Custom(factory) => scalar::run_custom(attempt, factory.as_ref()),
    }
}

/// Whether promoting into `parser` can represent null cells.
fn reserved_exists(factory: &SharedFactory, parser: &Parser) -> bool {
    let factory = lock_factory(factory);
    match parser {
        Parser::Byte => factory.reserved_byte().is_some(),
        Parser::Short => factory.reserved_short().is_some(),
        Parser::Int => factory.reserved_int().is_some(),
        Parser::Long => factory.reserved_long().is_some(),
        Parser::Float => factory.reserved_float().is_some(),
        Parser::Double => factory.reserved_double().is_some(),
        _ => false,
    }
}

/// Drives the parser state machine for one column. Returns the elected
/// type, the finished column data, and the row count.
pub(crate) fn infer_column(
    spec: &ColumnSpec,
    reader: LaneReader,
    replay: ReplayHandle,
    factory: &SharedFactory,
) -> Result<(DataType, ColumnData, u64)> {
    if spec.parsers.is_empty() {
        return Err(spec.err(InferError::NoParsers));
    }

    let mut replay = Some(replay);
    let mut feed = CellFeed::new(reader);
    let mut prefill = None;
    let mut idx = 0;
    loop {
        let parser = &spec.parsers[idx];
        let last = idx + 1 == spec.parsers.len();
        if last {
            // No promotion past this parser, so no re-stream either:
            // release the replay reserve and let blocks free as the cursor
            // advances.
            replay = None;
        }
        log::trace!("column {:?}: trying parser {}", spec.name, parser.name());
        let outcome = run_attempt(
            parser,
            Attempt {
                spec,
                factory,
                feed: &mut feed,
                prefill: prefill.take(),
            },
        )?;
        match outcome {
            Outcome::Done {
                rows,
                nonnull,
                data_type,
                data,
            } => {
                if rows > 0 && nonnull == 0 {
                    return finish_all_null(spec, rows, factory);
                }
                log::debug!(
                    "column {:?}: elected {} ({rows} rows)",
                    spec.name,
                    parser.name(),
                );
                return Ok((data_type, data, rows));
            }
            Outcome::Fault {
                consumed,
                nulls_seen,
                cell,
                holder,
            } => {
                if last {
                    return Err(spec.err(if parser.numeric_rank().is_some() {
                        InferError::NumericExhausted { consumed }
                    } else {
                        InferError::Exhausted { row: consumed + 1 }
                    }));
                }
                let next = &spec.parsers[idx + 1];
                let read_back = match (parser.numeric_rank(), next.numeric_rank(), &holder) {
                    (Some(narrow), Some(wide), Some(holder))
                        if wide > narrow && holder.has_source() =>
                    {
                        !nulls_seen || reserved_exists(factory, next)
                    }
                    _ => false,
                };
                if read_back {
                    log::trace!(
                        "column {:?}: promoting {} -> {} via read-back of {consumed} rows",
                        spec.name,
                        parser.name(),
                        next.name(),
                    );
                    feed.unget(cell);
                    prefill = Some(Prefill {
                        holder: holder.expect("read-back without a sink"),
                        rows: consumed,
                    });
                } else {
                    log::trace!(
                        "column {:?}: promoting {} -> {} via re-stream",
                        spec.name,
                        parser.name(),
                        next.name(),
                    );
                    let handle = replay.as_ref().expect("replay reserve released early");
                    feed = CellFeed::new(handle.activate());
                }
                idx += 1;
            }
        }
    }
}

fn finish_all_null(
    spec: &ColumnSpec,
    rows: u64,
    factory: &SharedFactory,
) -> Result<(DataType, ColumnData, u64)> {
    match &spec.null_parser {
        Some(parser) => scalar::emit_all_null(spec, parser, rows, factory),
        None => Err(spec.err(InferError::AllNull)),
    }
}
