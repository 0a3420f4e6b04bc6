// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! The top-level read: header handling, row shaping, and the tokenizer
//! pump that feeds the per-column lanes.

use std::{
    collections::HashSet,
    io::Read,
    sync::{Arc, Mutex},
};

use crate::{
    coordinator::run_pipeline,
    errors::{GrabError, Result},
    input::DecodingReader,
    parse::{infer_column, ColumnSpec},
    sink::{ColumnData, DataType, SinkFactory},
    spec::CsvSpecs,
    storage::{new_lane, LaneWriter},
    tokenize::{DelimitedGrabber, FixedGrabber, RowBuf, RowGrabber},
    value::Tokenizer,
};

/// One finished column.
#[derive(Debug)]
pub struct ResultColumn {
    /// The final (post-legalizer) column name.
    pub name: String,
    pub data_type: DataType,
    pub data: ColumnData,
}

/// The result of a read: every retained column plus the row count.
#[derive(Debug)]
pub struct Table {
    pub num_rows: u64,
    columns: Vec<ResultColumn>,
}

impl Table {
    pub fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<ResultColumn> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ResultColumn> {
        self.columns.iter().find(|col| col.name == name)
    }
}

/// Reads the input into typed columns according to `specs`, writing
/// through sinks from `factory`.
pub fn read_csv<R: Read + Send + 'static>(
    specs: &CsvSpecs,
    input: R,
    factory: Box<dyn SinkFactory>,
) -> Result<Table> {
    let decoded = DecodingReader::new(input, specs.charset);
    let tokenizer = Tokenizer::new(
        specs.custom_double_parser.clone(),
        specs.custom_time_zone_parser.clone(),
    );

    let mut scratch = RowBuf::default();
    let (mut grabber, file_names): (Box<dyn RowGrabber + Send>, Option<Vec<String>>) =
        if specs.has_fixed_width_columns {
            let mut grabber = FixedGrabber::new(decoded, specs);
            for _ in 0..specs.skip_header_rows {
                if !grabber.skip_row(&mut scratch)? {
                    break;
                }
            }
            let names = if specs.has_header_row {
                Some(grabber.header_names()?.unwrap_or_default())
            } else {
                None
            };
            (Box::new(grabber), names)
        } else {
            let mut grabber = DelimitedGrabber::new(decoded, specs);
            for _ in 0..specs.skip_header_rows {
                if !grabber.skip_row(&mut scratch)? {
                    break;
                }
            }
            let names = if specs.has_header_row {
                if grabber.grab_row(&mut scratch)? {
                    let mut names = Vec::with_capacity(scratch.cells.len());
                    for i in 0..scratch.cells.len() {
                        let name = std::str::from_utf8(scratch.cell(i)).map_err(|_| {
                            GrabError::RowNotUtf8 {
                                row: grabber.start_line(),
                            }
                        })?;
                        names.push(name.to_string());
                    }
                    Some(names)
                } else {
                    Some(Vec::new())
                }
            } else {
                None
            };
            (Box::new(grabber), names)
        };

    for _ in 0..specs.skip_rows {
        if !grabber.grab_row(&mut scratch)? {
            break;
        }
    }

    // Establish the column names, and with them the expected row shape.
    // Without a header, the first data row fixes the count.
    let mut pending_row: Option<RowBuf> = None;
    let original_names: Vec<String> = if let Some(overrides) = &specs.headers {
        overrides.clone()
    } else if let Some(from_file) = file_names {
        from_file
    } else if specs.has_fixed_width_columns {
        (1..=specs.fixed_column_widths.len())
            .map(|i| format!("Column{i}"))
            .collect()
    } else {
        let mut names = Vec::new();
        let mut first = RowBuf::default();
        loop {
            if !grabber.grab_row(&mut first)? {
                break;
            }
            if specs.ignore_empty_lines && first.blank {
                continue;
            }
            names = (1..=first.cells.len())
                .map(|i| format!("Column{i}"))
                .collect();
            pending_row = Some(first);
            break;
        }
        names
    };

    if original_names.is_empty() {
        return Ok(Table {
            num_rows: 0,
            columns: Vec::new(),
        });
    }

    let legal_names: Vec<String> = match &specs.header_legalizer {
        Some(legalize) => original_names.iter().map(|name| legalize(name)).collect(),
        None => original_names.clone(),
    };
    let mut seen = HashSet::new();
    for name in &legal_names {
        if !seen.insert(name.as_str()) {
            return Err(GrabError::DuplicateColumnName { name: name.clone() }.into());
        }
    }

    let expected = original_names.len();
    let mut col_specs = Vec::with_capacity(expected);
    for (index, name) in original_names.iter().enumerate() {
        let parsers = specs
            .parsers_for_name
            .get(name)
            .or_else(|| specs.parsers_for_index.get(&index))
            .cloned()
            .unwrap_or_else(|| specs.parsers.clone());
        let null_literals: Vec<Vec<u8>> = specs
            .null_literals_for_name
            .get(name)
            .or_else(|| specs.null_literals_for_index.get(&index))
            .unwrap_or(&specs.null_literals)
            .iter()
            .map(|literal| literal.clone().into_bytes())
            .collect();
        col_specs.push(ColumnSpec {
            index,
            name: name.clone(),
            legal_name: legal_names[index].clone(),
            parsers,
            null_literals,
            null_parser: specs.null_parser.clone(),
            tokenizer: tokenizer.clone(),
        });
    }

    let mut writers = Vec::with_capacity(expected);
    let mut cursors = Vec::with_capacity(expected);
    for _ in 0..expected {
        let (writer, reader, replay) = new_lane(specs.concurrent);
        writers.push(writer);
        cursors.push((reader, replay));
    }
    let lane_aborts = writers.iter().map(LaneWriter::abort_handle).collect();

    let mut pump = RowPump {
        null_pad: col_specs
            .iter()
            .map(|spec| spec.null_literals.first().cloned())
            .collect(),
        names: original_names,
        lanes: writers,
        grabber,
        expected,
        allow_missing: specs.allow_missing_columns,
        ignore_excess: specs.ignore_excess_columns,
        ignore_empty_lines: specs.ignore_empty_lines,
        num_rows: specs.num_rows,
        assumed_empty: false,
        written: 0,
    };
    let tokenize = move || pump.run(pending_row);

    let factory = Arc::new(Mutex::new(factory));
    let mut column_tasks: Vec<Box<dyn FnOnce() -> Result<(ResultColumn, u64)> + Send>> =
        Vec::with_capacity(expected);
    for (spec, (reader, replay)) in col_specs.into_iter().zip(cursors) {
        let factory = factory.clone();
        column_tasks.push(Box::new(move || {
            let (data_type, data, rows) = infer_column(&spec, reader, replay, &factory)?;
            Ok((
                ResultColumn {
                    name: spec.legal_name,
                    data_type,
                    data,
                },
                rows,
            ))
        }));
    }

    let results = run_pipeline(
        specs.concurrent,
        specs.thread_shutdown_timeout,
        tokenize,
        column_tasks,
        lane_aborts,
    )?;

    let num_rows = results.first().map_or(0, |(_, rows)| *rows);
    debug_assert!(
        results.iter().all(|(_, rows)| *rows == num_rows),
        "column row counts disagree",
    );
    Ok(Table {
        num_rows,
        columns: results.into_iter().map(|(column, _)| column).collect(),
    })
}

/// The tokenizer side of a read: grabs rows, applies the row-shape rules,
/// and appends each cell to its column's lane.
struct RowPump {
    grabber: Box<dyn RowGrabber + Send>,
    lanes: Vec<LaneWriter>,
    /// Original column names, for error messages.
    names: Vec<String>,
    /// Per column, the literal short rows are padded with.
    null_pad: Vec<Option<Vec<u8>>>,
    expected: usize,
    allow_missing: bool,
    ignore_excess: bool,
    ignore_empty_lines: bool,
    num_rows: Option<u64>,
    /// Whether a surplus trailing cell has been elided; once assumed, a
    /// non-empty cell in that position is an error.
    assumed_empty: bool,
    written: u64,
}

impl RowPump {
    fn run(&mut self, pending: Option<RowBuf>) -> Result<()> {
        let result = self.pump(pending).and_then(|()| {
            for lane in &mut self.lanes {
                lane.finish()?;
            }
            Ok(())
        });
        if let Err(err) = &result {
            if !err.is_abort() {
                log::debug!("tokenizer failing lanes: {err}");
            }
            for lane in &mut self.lanes {
                lane.fail();
            }
        }
        result
    }

    fn pump(&mut self, pending: Option<RowBuf>) -> Result<()> {
        if let Some(row) = pending {
            if !self.limit_reached() {
                self.process(&row)?;
            }
        }
        let mut row = RowBuf::default();
        while !self.limit_reached() {
            if !self.grabber.grab_row(&mut row)? {
                break;
            }
            self.process(&row)?;
        }
        Ok(())
    }

    #[inline]
    fn limit_reached(&self) -> bool {
        self.num_rows.is_some_and(|limit| self.written >= limit)
    }

    fn process(&mut self, row: &RowBuf) -> Result<()> {
        let line = self.grabber.start_line();
        if row.blank {
            if self.ignore_empty_lines {
                return Ok(());
            }
            // An empty line becomes a row of null literals.
            for col in 0..self.expected {
                self.pad(col, line)?;
            }
            self.written += 1;
            return Ok(());
        }

        let mut ncells = row.cells.len();
        // Trailing null column elision comes before the excess-column
        // rules: a single surplus cell that is empty is the trailing
        // delimiter convention, not data.
        if ncells == self.expected + 1 && row.cell(ncells - 1).is_empty() {
            ncells -= 1;
            self.assumed_empty = true;
        } else if self.assumed_empty && ncells == self.expected + 1 {
            return Err(GrabError::TrailingColumnNotEmpty { row: line }.into());
        }
        if ncells > self.expected {
            if self.ignore_excess {
                ncells = self.expected;
            } else {
                return Err(GrabError::TooManyColumns {
                    row: line,
                    expected: self.expected,
                }
                .into());
            }
        }
        if ncells < self.expected && !self.allow_missing {
            return Err(GrabError::TooFewColumns {
                row: line,
                expected: self.expected,
            }
            .into());
        }

        for col in 0..ncells {
            let quoted = row.cells[col].quoted;
            self.lanes[col].append(row.cell(col), quoted)?;
        }
        for col in ncells..self.expected {
            self.pad(col, line)?;
        }
        self.written += 1;
        Ok(())
    }

    fn pad(&mut self, col: usize, line: u64) -> Result<()> {
        let literal = self.null_pad[col].clone().ok_or_else(|| {
            GrabError::NoNullLiteralForMissingColumn {
                row: line,
                column: self.names[col].clone(),
            }
        })?;
        self.lanes[col].append(&literal, false)
    }
}
