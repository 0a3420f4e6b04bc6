// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! Reader for CSV, TSV, and fixed-width text that infers a type per column
//! and emits typed columnar data.
//!
//! The reader cuts the input into cells under RFC 4180–style delimited rules
//! or fixed-width column rules, ferries the cell bytes through a bounded,
//! replayable per-column pipeline, and drives a hierarchy of parsers
//! (byte → short → int → long → float → double → datetime → timestamp →
//! boolean → char → string, plus user parsers) over each column until one of
//! them accepts every cell. Parsed values are flushed in chunks to
//! caller-provided [`Sink`]s; the crate ships array-backed default sinks so
//! it is usable on its own.
//!
//! ```no_run
//! use csv_import::{read_csv, CsvSpecs, DefaultSinkFactory};
//!
//! let specs = CsvSpecs::builder().build()?;
//! let input = std::fs::File::open("trades.csv")?;
//! let table = read_csv(&specs, input, Box::new(DefaultSinkFactory::new()))?;
//! for col in table.columns() {
//!     println!("{}: {:?} ({} rows)", col.name, col.data_type, table.num_rows);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod column;
mod coordinator;
mod errors;
mod input;
pub mod parse;
mod reader;
pub mod sink;
mod spec;
mod storage;
mod tokenize;
pub mod value;

pub use column::{
    DefaultSinkFactory, NULL_BOOLEAN_AS_BYTE, NULL_BYTE, NULL_CHAR, NULL_DATETIME, NULL_DOUBLE,
    NULL_FLOAT, NULL_INT, NULL_LONG, NULL_SHORT, NULL_TIMESTAMP,
};
pub use errors::{
    ColumnError, CsvError, GrabError, InferError, Result, ShutdownError, SinkError, SpecError,
};
pub use parse::{CustomParser, CustomParserFactory, Parser};
pub use reader::{read_csv, ResultColumn, Table};
pub use sink::{ColumnData, DataType, NumericSink, Sink, SinkFactory, SinkSource, Source};
pub use spec::{Charset, CsvSpecs, CsvSpecsBuilder};
pub use value::{DoubleParser, TimeZoneParser};
