//! `for range` iteration.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{chan_of, Task};
use crate::errors::{internal, nil_dereference, ExecResult};
use crate::program::RangeKind;
use crate::value::{order, RangeIter, SeqSource, SliceValue};
use crate::Value;

/// Iterator state for ranging over `src`.
///
/// Arrays are iterated over a snapshot, slices live. Maps iterate a sorted
/// snapshot of their keys; entries deleted during the loop are skipped.
pub(super) fn start(kind: RangeKind, src: Value) -> ExecResult<Value> {
    let iter = match kind {
        RangeKind::Seq => {
            let items = match src {
                Value::Array(items) => SeqSource::Array(items),
                Value::Slice(s) => SeqSource::Slice(s),
                Value::Pointer(p) => match p.load() {
                    Value::Array(items) => SeqSource::Array(items),
                    _ => return Err(nil_dereference()),
                },
                _ => SeqSource::Slice(SliceValue::from_vec(Vec::new())),
            };
            RangeIter::Seq { items, pos: 0 }
        }
        RangeKind::Str => RangeIter::Str {
            text: match src {
                Value::Str(s) => s,
                _ => Arc::from(""),
            },
            pos: 0,
        },
        RangeKind::Map => {
            let map = match src {
                Value::Map(m) => m,
                _ => Arc::default(),
            };
            let mut keys: Vec<Value> = map.lock().keys().cloned().collect();
            keys.sort_by(order);
            RangeIter::Map { map, keys, pos: 0 }
        }
        RangeKind::Chan => RangeIter::Chan(chan_of(&src)),
        RangeKind::Int => {
            let (end, unsigned) = match src {
                Value::Uint(n) => (i64::try_from(n).unwrap_or(i64::MAX), true),
                other => (other.as_i64().unwrap_or(0), false),
            };
            RangeIter::Int {
                end,
                next: 0,
                unsigned,
            }
        }
    };
    Ok(Value::Iter(Arc::new(Mutex::new(iter))))
}

impl Task {
    /// Next key/value pair, or `None` when the loop is done. Channel ranges
    /// yield the received value as the key and block while empty.
    pub(super) fn range_next(&self, iter: &Value) -> ExecResult<Option<(Value, Value)>> {
        let Value::Iter(iter) = iter else {
            return Err(internal("range over a non-iterator"));
        };
        let chan = {
            let mut state = iter.lock();
            match &mut *state {
                RangeIter::Seq { items, pos } => {
                    if *pos >= items.len() {
                        return Ok(None);
                    }
                    let i = *pos;
                    *pos += 1;
                    let v = items.get(i).unwrap_or(Value::Nil);
                    return Ok(Some((Value::Int(i as i64), v)));
                }
                RangeIter::Str { text, pos } => {
                    let Some(c) = text.get(*pos..).and_then(|rest| rest.chars().next()) else {
                        return Ok(None);
                    };
                    let i = *pos;
                    *pos += c.len_utf8();
                    return Ok(Some((Value::Int(i as i64), Value::Int(i64::from(u32::from(c))))));
                }
                RangeIter::Map { map, keys, pos } => {
                    while let Some(k) = keys.get(*pos) {
                        *pos += 1;
                        if let Some(v) = map.lock().get(k).cloned() {
                            return Ok(Some((k.clone(), v)));
                        }
                    }
                    return Ok(None);
                }
                RangeIter::Int {
                    end,
                    next,
                    unsigned,
                } => {
                    if *next >= *end {
                        return Ok(None);
                    }
                    let i = *next;
                    *next += 1;
                    let key = if *unsigned {
                        Value::Uint(i as u64)
                    } else {
                        Value::Int(i)
                    };
                    return Ok(Some((key, Value::Nil)));
                }
                RangeIter::Chan(chan) => chan.clone(),
            }
        };
        // The iterator lock is released before blocking.
        let got = self.rt.recv(chan.as_ref(), &self.waiter, self.is_main)?;
        Ok(got.map(|v| (v, Value::Nil)))
    }
}
