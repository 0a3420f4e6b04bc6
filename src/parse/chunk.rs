// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

use crate::{errors::SinkError, sink::Sink};

/// Rows staged per flush to a sink.
pub(crate) const CHUNK_ROWS: usize = 65_536;

/// A staging buffer of parsed values plus the parallel null bitmap,
/// batching writes to a sink. Reused across flushes; rows `0..len` always
/// correspond to destination rows `dest_begin..dest_begin + len`.
pub(crate) struct Chunk<T> {
    values: Vec<T>,
    nulls: Vec<bool>,
    dest_begin: u64,
}

impl<T: Clone> Chunk<T> {
    pub(crate) fn new() -> Self {
        Chunk {
            values: Vec::with_capacity(CHUNK_ROWS),
            nulls: Vec::with_capacity(CHUNK_ROWS),
            dest_begin: 0,
        }
    }

    /// A chunk whose first flush lands at `dest_begin` (used after a
    /// read-back prefill).
    pub(crate) fn starting_at(dest_begin: u64) -> Self {
        let mut chunk = Chunk::new();
        chunk.dest_begin = dest_begin;
        chunk
    }

    #[inline]
    pub(crate) fn push(&mut self, value: T, is_null: bool) {
        self.values.push(value);
        self.nulls.push(is_null);
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.values.len() >= CHUNK_ROWS
    }

    /// Destination row of the next push.
    #[inline]
    pub(crate) fn next_row(&self) -> u64 {
        self.dest_begin + self.values.len() as u64
    }

    /// Writes the staged rows to `sink` and advances. A no-op when empty.
    pub(crate) fn flush(&mut self, sink: &mut dyn Sink<T>) -> Result<(), SinkError> {
        if self.values.is_empty() {
            return Ok(());
        }
        let end = self.dest_begin + self.values.len() as u64;
        sink.write(&self.values, &self.nulls, self.dest_begin, end, true)?;
        self.dest_begin = end;
        self.values.clear();
        self.nulls.clear();
        Ok(())
    }
}
