// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! The coordinator: owns the tokenizer task and the per-column parser
//! tasks, joins their results, aggregates errors, and enforces the
//! shutdown deadline.
//!
//! The first real error is the root cause. On observing it the coordinator
//! aborts every lane; the tokenizer sees the abort at its next block
//! boundary and the other parsers unblock on their lanes' sentinels.
//! Workers that keep running anyway are abandoned once the shutdown
//! deadline passes, and the root cause comes back wrapped in the timeout
//! error. Secondary errors are logged, not returned.

use std::time::{Duration, Instant};

use crossbeam_channel as channel;

use crate::{
    errors::{CsvError, Result, ShutdownError},
    storage::{abort_lane, LaneAbort},
};

enum Msg<C> {
    Tokenizer(Result<()>),
    Column(usize, Result<C>),
}

/// Runs the tokenizer and one task per column, returning every column's
/// output or the root-cause error.
pub(crate) fn run_pipeline<C: Send + 'static>(
    concurrent: bool,
    shutdown_timeout: Duration,
    tokenize: impl FnOnce() -> Result<()> + Send + 'static,
    columns: Vec<Box<dyn FnOnce() -> Result<C> + Send + 'static>>,
    lane_aborts: Vec<LaneAbort>,
) -> Result<Vec<C>> {
    if !concurrent {
        return run_single_threaded(tokenize, columns);
    }

    let (tx, rx) = channel::unbounded();
    let count = columns.len();

    let tok_tx = tx.clone();
    let spawned = spawn_worker("csv-import-tokenizer", move || {
        let _ = tok_tx.send(Msg::Tokenizer(tokenize()));
    })
    .and_then(|()| {
        for (index, column) in columns.into_iter().enumerate() {
            let col_tx = tx.clone();
            spawn_worker(&format!("csv-import-col-{index}"), move || {
                let _ = col_tx.send(Msg::Column(index, column()));
            })?;
        }
        Ok(())
    });
    drop(tx);
    if let Err(err) = spawned {
        for lane in &lane_aborts {
            abort_lane(lane);
        }
        return Err(err);
    }

    let mut results: Vec<Option<C>> = (0..count).map(|_| None).collect();
    let mut root: Option<CsvError> = None;
    let mut deadline: Option<Instant> = None;
    let mut pending = count + 1;
    while pending > 0 {
        let msg = match deadline {
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => return Err(worker_vanished()),
            },
            Some(deadline) => match rx.recv_deadline(deadline) {
                Ok(msg) => msg,
                Err(channel::RecvTimeoutError::Timeout) => {
                    let root = root.expect("deadline without a root cause");
                    return Err(CsvError::Shutdown(ShutdownError {
                        timeout: shutdown_timeout,
                        root: Box::new(root),
                    }));
                }
                Err(channel::RecvTimeoutError::Disconnected) => return Err(worker_vanished()),
            },
        };
        pending -= 1;
        let failure = match msg {
            Msg::Tokenizer(Ok(())) => None,
            Msg::Tokenizer(Err(err)) => Some(err),
            Msg::Column(index, Ok(column)) => {
                results[index] = Some(column);
                None
            }
            Msg::Column(_, Err(err)) => Some(err),
        };
        if let Some(err) = failure {
            if err.is_abort() {
                // A worker unwound on the shared abort flag; the root cause
                // is already in hand.
                continue;
            }
            if root.is_none() {
                log::debug!("cancelling workers on root cause: {err}");
                for lane in &lane_aborts {
                    abort_lane(lane);
                }
                root = Some(err);
                deadline = Some(Instant::now() + shutdown_timeout);
            } else {
                log::debug!("suppressed secondary error: {err}");
            }
        }
    }

    match root {
        Some(root) => Err(root),
        None => Ok(results
            .into_iter()
            .map(|column| column.expect("worker finished without a result"))
            .collect()),
    }
}

/// Cooperative mode: the tokenizer runs to completion into the (unbounded)
/// lanes, then each column parses sequentially. Results are identical to
/// concurrent mode.
fn run_single_threaded<C>(
    tokenize: impl FnOnce() -> Result<()>,
    columns: Vec<Box<dyn FnOnce() -> Result<C> + Send + 'static>>,
) -> Result<Vec<C>> {
    tokenize()?;
    columns.into_iter().map(|column| column()).collect()
}

fn spawn_worker(name: &str, f: impl FnOnce() + Send + 'static) -> Result<()> {
    // The handle is dropped on purpose: completion is reported over the
    // channel, and a worker that outlives the shutdown deadline is
    // abandoned rather than joined.
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map(drop)
        .map_err(CsvError::from)
}

fn worker_vanished() -> CsvError {
    std::io::Error::new(
        std::io::ErrorKind::Other,
        "a worker thread exited without reporting a result",
    )
    .into()
}
