// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! The dense storage pipeline.
//!
//! One lane per column ferries cell bytes from the tokenizer to that
//! column's parser with bounded memory and ordered delivery. Cell payloads
//! are packed back to back into ~1 MiB blocks with a parallel record list;
//! oversized payloads go to a per-block large-object list so they cannot
//! fragment a block. A lane is replayable: a reserve cursor pinned at
//! record zero keeps blocks alive until the parser rules out a re-stream,
//! letting a promotion to a non-numeric parser read the column again from
//! the start.

use std::{
    collections::VecDeque,
    fmt::{self, Debug, Formatter},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use bstr::ByteSlice;
use enumflags2::{bitflags, BitFlags};
use static_assertions::assert_impl_all;

use crate::errors::{CsvError, Result};

/// Capacity of one block's payload region.
pub(crate) const BLOCK_BYTES: usize = 1 << 20;
/// Payloads at or above this size go to the large-object list.
pub(crate) const LARGE_CELL: usize = 1024;
/// How many sealed blocks the writer may run ahead of the slowest gating
/// cursor before it stalls.
pub(crate) const MAX_UNOBSERVED_BLOCKS: u64 = 16;

/// Flags carried by each cell record. Lanes deliver exactly one record
/// per row, so there is no row-terminator flag here; that discriminator
/// belongs to the cell grabber, which consumes it to assemble rows.
#[bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CellFlag {
    /// The cell was quoted in the input.
    Quoted,
    /// The payload lives in the block's large-object list; the record
    /// offset indexes that list.
    Large,
    /// End of the column: the tokenizer finished cleanly.
    End,
    /// The tokenizer stopped on an error; readers unblock and abandon the
    /// column.
    Error,
}

#[derive(Clone, Copy)]
struct Rec {
    offset: u32,
    len: u32,
    flags: BitFlags<CellFlag>,
}

/// A sealed, immutable region of cell payloads plus their records.
pub(crate) struct Block {
    data: Vec<u8>,
    recs: Vec<Rec>,
    large: Vec<Arc<[u8]>>,
}

/// An owning view of one cell in a block. Cheap to clone; keeps its block
/// alive, which is what lets the inferencer hold the faulting cell across
/// a parser switch.
#[derive(Clone)]
pub(crate) struct CellHandle {
    block: Arc<Block>,
    rec: usize,
}

impl CellHandle {
    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        let rec = &self.block.recs[self.rec];
        if rec.flags.contains(CellFlag::Large) {
            &self.block.large[rec.offset as usize]
        } else {
            &self.block.data[rec.offset as usize..(rec.offset + rec.len) as usize]
        }
    }

    #[inline]
    pub(crate) fn quoted(&self) -> bool {
        self.block.recs[self.rec].flags.contains(CellFlag::Quoted)
    }
}

impl Debug for CellHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellHandle")
            .field("bytes", &self.bytes().as_bstr())
            .field("quoted", &self.quoted())
            .finish()
    }
}

struct CursorSlot {
    /// Global index of the block this cursor still needs.
    pos: u64,
    /// Whether the writer's back-pressure measures against this cursor.
    /// The replay reserve retains blocks without gating the writer.
    gating: bool,
}

struct LaneState {
    blocks: VecDeque<Arc<Block>>,
    /// Global index of `blocks[0]`.
    base: u64,
    /// Total blocks sealed so far.
    sealed: u64,
    cursors: Vec<Option<CursorSlot>>,
    aborted: bool,
    /// Back-pressure switch; single-threaded mode runs unbounded.
    bounded: bool,
}

impl LaneState {
    fn min_live_pos(&self) -> Option<u64> {
        self.cursors
            .iter()
            .flatten()
            .map(|slot| slot.pos)
            .min()
    }

    fn gate_pos(&self) -> Option<u64> {
        self.cursors
            .iter()
            .flatten()
            .filter(|slot| slot.gating)
            .map(|slot| slot.pos)
            .min()
    }

    /// Frees blocks every live cursor has advanced past.
    fn reclaim(&mut self) {
        let keep_from = self.min_live_pos().unwrap_or(self.sealed);
        while self.base < keep_from && !self.blocks.is_empty() {
            self.blocks.pop_front();
            self.base += 1;
        }
    }
}

struct Shared {
    state: Mutex<LaneState>,
    can_read: Condvar,
    can_write: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LaneState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates one column lane: the tokenizer-side writer, the parser-side
/// primary cursor, and the replay reserve pinned at record zero.
pub(crate) fn new_lane(bounded: bool) -> (LaneWriter, LaneReader, ReplayHandle) {
    let shared = Arc::new(Shared {
        state: Mutex::new(LaneState {
            blocks: VecDeque::new(),
            base: 0,
            sealed: 0,
            cursors: vec![
                Some(CursorSlot {
                    pos: 0,
                    gating: true,
                }),
                Some(CursorSlot {
                    pos: 0,
                    gating: false,
                }),
            ],
            aborted: false,
            bounded,
        }),
        can_read: Condvar::new(),
        can_write: Condvar::new(),
    });
    let writer = LaneWriter {
        shared: shared.clone(),
        data: Vec::with_capacity(BLOCK_BYTES),
        recs: Vec::new(),
        large: Vec::new(),
    };
    let reader = LaneReader {
        shared: shared.clone(),
        slot: 0,
        block: None,
        block_idx: 0,
        rec_idx: 0,
        done: false,
    };
    let replay = ReplayHandle {
        shared,
        slot: Some(1),
    };
    (writer, reader, replay)
}

/// The tokenizer's end of a lane.
pub(crate) struct LaneWriter {
    shared: Arc<Shared>,
    data: Vec<u8>,
    recs: Vec<Rec>,
    large: Vec<Arc<[u8]>>,
}

assert_impl_all!(LaneWriter: Send);
assert_impl_all!(LaneReader: Send);
assert_impl_all!(CellHandle: Send, Sync);

impl LaneWriter {
    /// Appends one cell record. Blocks when the lane is full and the
    /// back-pressure bound is reached; fails with the abort marker when the
    /// coordinator has cancelled the read.
    pub(crate) fn append(&mut self, bytes: &[u8], quoted: bool) -> Result<()> {
        let mut flags = BitFlags::empty();
        if quoted {
            flags |= CellFlag::Quoted;
        }
        if bytes.len() >= LARGE_CELL {
            self.recs.push(Rec {
                offset: self.large.len() as u32,
                len: bytes.len() as u32,
                flags: flags | CellFlag::Large,
            });
            self.large.push(bytes.into());
        } else {
            if self.data.len() + bytes.len() > BLOCK_BYTES && !self.recs.is_empty() {
                self.seal(true)?;
            }
            self.recs.push(Rec {
                offset: self.data.len() as u32,
                len: bytes.len() as u32,
                flags,
            });
            self.data.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Appends the end sentinel and publishes everything still buffered.
    pub(crate) fn finish(&mut self) -> Result<()> {
        self.push_sentinel(CellFlag::End);
        self.seal(false)
    }

    /// Appends the error sentinel, unblocking the lane's reader. Never
    /// blocks and never fails; used while unwinding.
    pub(crate) fn fail(&mut self) {
        self.push_sentinel(CellFlag::Error);
        let _ = self.seal(false);
    }

    fn push_sentinel(&mut self, flag: CellFlag) {
        self.recs.push(Rec {
            offset: 0,
            len: 0,
            flags: flag.into(),
        });
    }

    fn seal(&mut self, wait: bool) -> Result<()> {
        let block = Arc::new(Block {
            data: std::mem::replace(&mut self.data, Vec::with_capacity(BLOCK_BYTES)),
            recs: std::mem::take(&mut self.recs),
            large: std::mem::take(&mut self.large),
        });
        let mut st = self.shared.lock();
        st.blocks.push_back(block);
        st.sealed += 1;
        st.reclaim();
        self.shared.can_read.notify_all();
        if st.bounded && wait {
            loop {
                if st.aborted {
                    return Err(CsvError::Aborted);
                }
                match st.gate_pos() {
                    Some(gate) if st.sealed - gate > MAX_UNOBSERVED_BLOCKS => {
                        st = self
                            .shared
                            .can_write
                            .wait(st)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    _ => break,
                }
            }
        }
        if st.aborted {
            return Err(CsvError::Aborted);
        }
        Ok(())
    }
}

/// A parser-side cursor over one lane. Records arrive in tokenizer order.
pub(crate) struct LaneReader {
    shared: Arc<Shared>,
    slot: usize,
    block: Option<Arc<Block>>,
    block_idx: u64,
    rec_idx: usize,
    done: bool,
}

impl LaneReader {
    /// The next cell, or None once the end sentinel is observed.
    pub(crate) fn next(&mut self) -> Result<Option<CellHandle>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let block = match &self.block {
                Some(block) => block.clone(),
                None => {
                    let block = self.wait_for_block()?;
                    self.block = Some(block.clone());
                    block
                }
            };
            if self.rec_idx < block.recs.len() {
                let rec = self.rec_idx;
                self.rec_idx += 1;
                let flags = block.recs[rec].flags;
                if flags.contains(CellFlag::End) {
                    self.done = true;
                    return Ok(None);
                }
                if flags.contains(CellFlag::Error) {
                    self.done = true;
                    return Err(CsvError::Aborted);
                }
                return Ok(Some(CellHandle { block, rec }));
            }
            // Block exhausted: advance the cursor and let the writer and
            // reclamation see the progress.
            self.block = None;
            self.block_idx += 1;
            self.rec_idx = 0;
            let mut st = self.shared.lock();
            if let Some(slot) = st.cursors[self.slot].as_mut() {
                slot.pos = self.block_idx;
            }
            st.reclaim();
            self.shared.can_write.notify_all();
        }
    }

    fn wait_for_block(&self) -> Result<Arc<Block>> {
        let mut st = self.shared.lock();
        loop {
            if self.block_idx < st.sealed {
                let at = (self.block_idx - st.base) as usize;
                return Ok(st.blocks[at].clone());
            }
            if st.aborted {
                return Err(CsvError::Aborted);
            }
            st = self
                .shared
                .can_read
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for LaneReader {
    fn drop(&mut self) {
        let mut st = self.shared.lock();
        st.cursors[self.slot] = None;
        st.reclaim();
        self.shared.can_write.notify_all();
    }
}

/// The replay reserve: keeps a lane's blocks alive from record zero so the
/// inferencer can re-stream the column into a later parser. Dropping it
/// releases the retained blocks; activating it turns it into a live cursor
/// that gates the writer like the primary did.
pub(crate) struct ReplayHandle {
    shared: Arc<Shared>,
    slot: Option<usize>,
}

impl ReplayHandle {
    /// Starts a fresh cursor at record zero. The reserve itself stays
    /// pinned, so the lane remains replayable until the handle drops.
    pub(crate) fn activate(&self) -> LaneReader {
        debug_assert!(self.slot.is_some(), "replay handle already released");
        let mut st = self.shared.lock();
        let slot = st.cursors.len();
        st.cursors.push(Some(CursorSlot {
            pos: 0,
            gating: true,
        }));
        drop(st);
        LaneReader {
            shared: self.shared.clone(),
            slot,
            block: None,
            block_idx: 0,
            rec_idx: 0,
            done: false,
        }
    }
}

impl Drop for ReplayHandle {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let mut st = self.shared.lock();
            st.cursors[slot] = None;
            st.reclaim();
            self.shared.can_write.notify_all();
        }
    }
}

/// Marks the lane aborted and wakes everything blocked on it.
pub(crate) fn abort_lane(handle: &LaneAbort) {
    let mut st = handle.shared.lock();
    st.aborted = true;
    handle.shared.can_read.notify_all();
    handle.shared.can_write.notify_all();
}

/// A detached abort handle for one lane, held by the coordinator.
#[derive(Clone)]
pub(crate) struct LaneAbort {
    shared: Arc<Shared>,
}

impl LaneWriter {
    pub(crate) fn abort_handle(&self) -> LaneAbort {
        LaneAbort {
            shared: self.shared.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_cells(writer: &mut LaneWriter, cells: &[&[u8]]) {
        for cell in cells {
            writer.append(cell, false).expect("append");
        }
    }

    fn read_all(reader: &mut LaneReader) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(cell) = reader.next().expect("next") {
            out.push(cell.bytes().to_vec());
        }
        out
    }

    #[test]
    fn delivers_in_order() {
        let (mut writer, mut reader, _replay) = new_lane(false);
        push_cells(&mut writer, &[b"a", b"bb", b"ccc"]);
        writer.finish().unwrap();
        assert_eq!(read_all(&mut reader), [b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
        // The end sentinel is sticky.
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn large_cells_bypass_the_block() {
        let (mut writer, mut reader, _replay) = new_lane(false);
        let big = vec![b'x'; LARGE_CELL + 5];
        writer.append(b"small", false).unwrap();
        writer.append(&big, false).unwrap();
        writer.finish().unwrap();
        let cells = read_all(&mut reader);
        assert_eq!(cells[0], b"small");
        assert_eq!(cells[1], big);
    }

    #[test]
    fn replay_reads_from_record_zero() {
        let (mut writer, mut reader, replay) = new_lane(false);
        push_cells(&mut writer, &[b"1", b"2", b"3"]);
        writer.finish().unwrap();
        assert_eq!(read_all(&mut reader).len(), 3);
        drop(reader);
        let mut again = replay.activate();
        assert_eq!(read_all(&mut again), [b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn quoted_flag_round_trips() {
        let (mut writer, mut reader, _replay) = new_lane(false);
        writer.append(b"q", true).unwrap();
        writer.append(b"r", false).unwrap();
        writer.finish().unwrap();
        assert!(reader.next().unwrap().unwrap().quoted());
        assert!(!reader.next().unwrap().unwrap().quoted());
    }

    #[test]
    fn error_sentinel_unblocks_reader() {
        let (mut writer, mut reader, _replay) = new_lane(false);
        writer.append(b"ok", false).unwrap();
        writer.fail();
        assert!(reader.next().unwrap().is_some());
        assert!(reader.next().unwrap_err().is_abort());
    }

    #[test]
    fn back_pressure_bounds_the_writer() {
        let (mut writer, reader, replay) = new_lane(true);
        drop(replay);
        // Just under the large-cell threshold, so payloads pack into blocks.
        let payload = vec![b'x'; LARGE_CELL - 1];

        let consumer = std::thread::spawn(move || {
            let mut reader = reader;
            let mut seen = 0usize;
            while reader.next().expect("reader").is_some() {
                seen += 1;
            }
            seen
        });

        // Far more blocks than MAX_UNOBSERVED_BLOCKS; completes only if the
        // reader drains while the writer stalls.
        let per_block = BLOCK_BYTES / payload.len() + 1;
        let total = per_block * (MAX_UNOBSERVED_BLOCKS as usize + 8);
        for _ in 0..total {
            writer.append(&payload, false).unwrap();
        }
        writer.finish().unwrap();
        assert_eq!(consumer.join().unwrap(), total);
    }

    #[test]
    fn abort_wakes_a_blocked_reader() {
        let (writer, mut reader, _replay) = new_lane(true);
        let abort = writer.abort_handle();
        let waiter = std::thread::spawn(move || reader.next());
        std::thread::sleep(std::time::Duration::from_millis(20));
        abort_lane(&abort);
        assert!(waiter.join().unwrap().unwrap_err().is_abort());
        drop(writer);
    }
}
