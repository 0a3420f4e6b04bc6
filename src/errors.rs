// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use std::{io, time::Duration};

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, CsvError>;

/// An error from reading an input, including IO errors.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Grab(#[from] GrabError),
    #[error(transparent)]
    Infer(#[from] ColumnError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Shutdown(ShutdownError),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// A worker observed the abort flag before finding its own error. The
    /// coordinator replaces this with the root cause; it never escapes the
    /// top-level read call.
    #[error("operation aborted")]
    Aborted,
}

/// A configuration rejected by [`CsvSpecs`](crate::CsvSpecs) validation.
///
/// All failed checks are reported at once, semicolon-separated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("CsvSpecs failed validation for the following reasons: {}", reasons.join("; "))]
pub struct SpecError {
    pub reasons: Vec<String>,
}

/// A kind of error from cutting the input into cells and rows.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GrabError {
    #[error("Cell did not have closing quote character (row {row})")]
    UnterminatedQuote { row: u64 },
    #[error("Logic error: final non-whitespace in field is not quoteChar (row {row})")]
    JunkAfterClosingQuote { row: u64 },
    #[error("Row {row} has too few columns (expected {expected})")]
    TooFewColumns { row: u64, expected: usize },
    #[error("Row {row} has too many columns (expected {expected})")]
    TooManyColumns { row: u64, expected: usize },
    #[error("Column assumed empty but contains data (row {row})")]
    TrailingColumnNotEmpty { row: u64 },
    /// A short row cannot be padded when the missing column has no null
    /// value literal to pad with.
    #[error("Row {row} is missing a value for column {column:?}, which has no null value literal")]
    NoNullLiteralForMissingColumn { row: u64, column: String },
    #[error("Row {row} is not valid UTF-8")]
    RowNotUtf8 { row: u64 },
    #[error("header row has duplicate column name {name:?}")]
    DuplicateColumnName { name: String },
    #[error("input has no header row to infer fixed column widths from")]
    NoHeaderForWidths,
}

/// An inference error, carrying the original (pre-legalizer) column name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("column {column:?}: {kind}")]
pub struct ColumnError {
    pub column: String,
    pub kind: InferError,
}

/// A kind of error from electing a parser for a column.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InferError {
    #[error("No available parsers.")]
    NoParsers,
    #[error(
        "Column contains all null cells: can't infer type of column, and nullParser is not specified."
    )]
    AllNull,
    #[error(
        "Consumed {consumed} numeric items, then encountered a non-numeric item but there are no char/string parsers available."
    )]
    NumericExhausted { consumed: u64 },
    #[error("all configured parsers failed to parse the cell at data row {row}")]
    Exhausted { row: u64 },
    /// The null parser, or the only assigned parser, cannot represent a null
    /// cell because its sink declares no reserved sentinel.
    #[error("parser {parser} has no null sentinel but the column contains null cells")]
    NoNullSentinel { parser: String },
    #[error("cell at data row {row} is not valid UTF-8")]
    CellNotUtf8 { row: u64 },
}

/// An error returned by a user [`Sink`](crate::Sink) or
/// [`Source`](crate::Source).
#[derive(Debug, Error)]
#[error("sink error: {0}")]
pub struct SinkError(pub Box<dyn std::error::Error + Send + Sync>);

impl SinkError {
    pub fn msg(msg: impl Into<String>) -> Self {
        SinkError(msg.into().into())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for SinkError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        SinkError(err)
    }
}

/// A worker ignored cancellation past the configured deadline. The root
/// cause is retained as the source; the timeout itself is the suppressed
/// detail, matching how shutdown failures are reported.
#[derive(Debug, Error)]
#[error("Failed to shutdown all threads (after waiting {timeout:?})")]
pub struct ShutdownError {
    pub timeout: Duration,
    #[source]
    pub root: Box<CsvError>,
}

impl CsvError {
    /// Whether this error is the internal abort marker rather than a real
    /// failure.
    #[inline]
    pub(crate) fn is_abort(&self) -> bool {
        matches!(self, CsvError::Aborted)
    }
}
