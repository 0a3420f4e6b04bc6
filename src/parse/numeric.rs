// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of csv-import, distributed under the GPL 2.0 with a
// linking exception. For the full terms, see the included COPYING file.

//! The numeric parser family: byte through double, with read-back
//! widening.
//!
//! Each parser is an instantiation of the same attempt loop; `paste!`
//! stamps out one function per type with its parse routine and the set of
//! narrower holders it can widen from.

use paste::paste;

use crate::{
    errors::Result,
    parse::{
        chunk::{Chunk, CHUNK_ROWS},
        infer::{lock_factory, Attempt, NumericHolder, Outcome, Prefill},
    },
    sink::{DataType, Sink, SinkSource},
    value::{try_parse_long, Tokenizer},
};

/// Copies rows `[0, rows)` from a narrower source into `sink`, widening
/// each value. Null rows become the wider type's sentinel; the driver only
/// chooses read-back when that sentinel exists.
fn widen_into<S, T>(
    src: &mut dyn SinkSource<S>,
    rows: u64,
    reserved: Option<T>,
    sink: &mut dyn Sink<T>,
    widen: impl Fn(S) -> T,
) -> Result<u64>
where
    S: Copy + Default,
    T: Clone,
{
    let mut nulls = 0u64;
    let mut dest = Chunk::<T>::new();
    let batch = CHUNK_ROWS.min(rows.max(1) as usize);
    let mut read_values = vec![S::default(); batch];
    let mut read_nulls = vec![false; batch];
    let mut at = 0u64;
    while at < rows {
        let n = ((rows - at) as usize).min(batch);
        src.read(&mut read_values[..n], &mut read_nulls[..n], at, at + n as u64)?;
        for i in 0..n {
            if read_nulls[i] {
                nulls += 1;
                let sentinel = match &reserved {
                    Some(sentinel) => sentinel.clone(),
                    None => unreachable!("read-back of nulls without a sentinel"),
                };
                dest.push(sentinel, true);
            } else {
                dest.push(widen(read_values[i]), false);
            }
        }
        dest.flush(sink)?;
        at += n as u64;
    }
    Ok(nulls)
}

macro_rules! numeric_attempt(
    ($name:ident: $ty:ty, $variant:ident, $dt:ident, $parse:expr, [$($src:ident: $srcty:ty),*]) => {
        paste! {
            pub(crate) fn [<run_ $name>](mut attempt: Attempt<'_>) -> Result<Outcome> {
                let (mut holder, reserved) = {
                    let mut factory = lock_factory(attempt.factory);
                    (
                        NumericHolder::$variant(factory.[<$name _sink>](attempt.spec.index)),
                        factory.[<reserved_ $name>](),
                    )
                };
                fn sink_of(holder: &mut NumericHolder) -> &mut dyn Sink<$ty> {
                    match holder {
                        NumericHolder::$variant(sink) => sink.sink_mut(),
                        _ => unreachable!("holder type changed mid-attempt"),
                    }
                }

                let mut nulls_seen = false;
                let mut start_row = 0u64;
                // The byte parser has no narrower source, so its arm list
                // is empty and the match collapses to the unreachable case.
                #[allow(unreachable_patterns, unreachable_code, unused_variables)]
                if let Some(Prefill { holder: mut prev, rows }) = attempt.prefill.take() {
                    let nulls: u64 = match &mut prev {
                        $(
                            NumericHolder::$src(narrow) => {
                                let src = narrow
                                    .source_mut()
                                    .expect("read-back chosen without a source");
                                widen_into(
                                    src,
                                    rows,
                                    reserved.clone(),
                                    sink_of(&mut holder),
                                    |v: $srcty| v as $ty,
                                )?
                            }
                        )*
                        _ => unreachable!("read-back from a non-narrower parser"),
                    };
                    nulls_seen = nulls > 0;
                    start_row = rows;
                }

                let parse = $parse;
                let mut chunk = Chunk::<$ty>::starting_at(start_row);
                let mut nonnull = 0u64;
                loop {
                    let Some(cell) = attempt.feed.next()? else {
                        chunk.flush(sink_of(&mut holder))?;
                        let rows = chunk.next_row();
                        let data = sink_of(&mut holder).finish();
                        return Ok(Outcome::Done {
                            rows,
                            nonnull,
                            data_type: DataType::$dt,
                            data,
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
                            match parse(&attempt.spec.tokenizer, bytes) {
                                // A parse that lands exactly on the reserved
                                // sentinel rejects the cell, same as a parse
                                // failure.
                                Some(value) if reserved == Some(value) => false,
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
                        chunk.flush(sink_of(&mut holder))?;
                        return Ok(Outcome::Fault {
                            consumed: chunk.next_row(),
                            nulls_seen,
                            cell,
                            holder: Some(holder),
                        });
                    }
                    if chunk.is_full() {
                        chunk.flush(sink_of(&mut holder))?;
                    }
                }
            }
        }
    }
);

fn parse_fitting<T: TryFrom<i64>>(bytes: &[u8]) -> Option<T> {
    try_parse_long(bytes).and_then(|v| T::try_from(v).ok())
}

numeric_attempt!(byte: i8, Byte, Byte,
    |_: &Tokenizer, b: &[u8]| parse_fitting::<i8>(b),
    []);
numeric_attempt!(short: i16, Short, Short,
    |_: &Tokenizer, b: &[u8]| parse_fitting::<i16>(b),
    [Byte: i8]);
numeric_attempt!(int: i32, Int, Int,
    |_: &Tokenizer, b: &[u8]| parse_fitting::<i32>(b),
    [Byte: i8, Short: i16]);
numeric_attempt!(long: i64, Long, Long,
    |_: &Tokenizer, b: &[u8]| try_parse_long(b),
    [Byte: i8, Short: i16, Int: i32]);
numeric_attempt!(float: f32, Float, Float,
    |tok: &Tokenizer, b: &[u8]| tok.parse_float(b),
    [Byte: i8, Short: i16, Int: i32, Long: i64]);
numeric_attempt!(double: f64, Double, Double,
    |tok: &Tokenizer, b: &[u8]| tok.parse_double(b),
    [Byte: i8, Short: i16, Int: i32, Long: i64, Float: f32]);
