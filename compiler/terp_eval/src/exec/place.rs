//! Addressable locations, map access, string indexing and slicing.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{CallState, Task};
use crate::errors::{
    index_out_of_range, internal, nil_dereference, nil_map_write, slice_out_of_range, ExecResult,
};
use crate::program::{Place, PlaceBase, Step};
use crate::value::{PtrBase, Pointer, SliceValue};
use crate::Value;

impl Task {
    /// Resolve `place` to a pointer, running nil and bounds checks.
    pub(super) fn place_pointer(&self, cs: &CallState, place: &Place) -> ExecResult<Pointer> {
        let mut ptr = match &place.base {
            PlaceBase::Loc(loc) => {
                let (frame, index) = self
                    .frame_of(cs, *loc)
                    .ok_or_else(|| internal("dangling frame location"))?;
                Pointer::new(PtrBase::Slot(frame, index))
            }
            PlaceBase::Deref(src) => match self.read(cs, src) {
                Value::Pointer(p) => p,
                _ => return Err(nil_dereference()),
            },
            PlaceBase::SliceElem { slice, index } => {
                let index = index_value(&self.read(cs, index));
                match self.read(cs, slice) {
                    Value::Slice(s) if index >= 0 && (index as usize) < s.len => {
                        Pointer::new(PtrBase::Elem(Arc::clone(&s.data), s.off + index as usize))
                    }
                    Value::Slice(s) => return Err(index_out_of_range(index, s.len)),
                    _ => return Err(index_out_of_range(index, 0)),
                }
            }
        };
        for step in &place.steps {
            ptr = match step {
                Step::Field(i) => ptr.child(*i),
                Step::Index { index, len } => {
                    let i = index_value(&self.read(cs, index));
                    if i < 0 || i as u64 >= *len {
                        return Err(index_out_of_range(i, *len as usize));
                    }
                    ptr.child(i as u32)
                }
            };
        }
        Ok(ptr)
    }

    pub(super) fn load_place(&self, cs: &CallState, place: &Place) -> ExecResult<Value> {
        if let (PlaceBase::Loc(loc), true) = (&place.base, place.steps.is_empty()) {
            return Ok(self.load(cs, *loc));
        }
        Ok(self.place_pointer(cs, place)?.load())
    }

    pub(super) fn store_place(&self, cs: &CallState, place: &Place, value: Value) -> ExecResult<()> {
        if let (PlaceBase::Loc(loc), true) = (&place.base, place.steps.is_empty()) {
            self.write(cs, *loc, value);
            return Ok(());
        }
        self.place_pointer(cs, place)?.store(value);
        Ok(())
    }
}

fn index_value(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        Value::Uint(u) => i64::try_from(*u).unwrap_or(i64::MAX),
        _ => 0,
    }
}

/// `m[k]` with the found flag; a nil map reads as empty.
pub(super) fn map_index(map: &Value, key: &Value, zero: &Value) -> (Value, bool) {
    match map {
        Value::Map(m) => match m.lock().get(key) {
            Some(v) => (v.clone(), true),
            None => (zero.clone(), false),
        },
        _ => (zero.clone(), false),
    }
}

pub(super) fn map_store(map: &Value, key: Value, value: Value) -> ExecResult<()> {
    match map {
        Value::Map(m) => {
            m.lock().insert(key, value);
            Ok(())
        }
        _ => Err(nil_map_write()),
    }
}

/// Byte `i` of a string.
pub(super) fn str_index(text: &Value, index: &Value) -> ExecResult<Value> {
    let bytes = text.as_str().unwrap_or_default().as_bytes();
    let i = index_value(index);
    usize::try_from(i)
        .ok()
        .and_then(|i| bytes.get(i))
        .map(|b| Value::Uint(u64::from(*b)))
        .ok_or_else(|| index_out_of_range(i, bytes.len()))
}

/// `x[low:high:max]` on strings, slices and arrays.
pub(super) fn slice_expr(
    src: &Value,
    low: Option<Value>,
    high: Option<Value>,
    max: Option<Value>,
) -> ExecResult<Value> {
    let low = low.map_or(0, |v| index_value(&v));
    let high = high.map(|v| index_value(&v));
    let max = max.map(|v| index_value(&v));
    match src {
        Value::Str(s) => {
            let high = high.unwrap_or(s.len() as i64);
            check_bounds(low, high, high, s.len())?;
            let bytes = &s.as_bytes()[low as usize..high as usize];
            Ok(Value::string(String::from_utf8_lossy(bytes).into_owned()))
        }
        Value::Slice(sv) => {
            let high = high.unwrap_or(sv.len as i64);
            let max = max.unwrap_or(sv.cap as i64);
            check_bounds(low, high, max, sv.cap)?;
            Ok(Value::Slice(SliceValue {
                data: Arc::clone(&sv.data),
                off: sv.off + low as usize,
                len: (high - low) as usize,
                cap: (max - low) as usize,
            }))
        }
        Value::Array(items) => slice_array(items, low, high, max),
        Value::Pointer(p) => match p.load() {
            Value::Array(items) => slice_array(&items, low, high, max),
            _ => Err(nil_dereference()),
        },
        _ => {
            check_bounds(low, high.unwrap_or(0), max.unwrap_or(0), 0)?;
            Ok(Value::Nil)
        }
    }
}

/// Slicing an array copies its elements into a fresh backing array.
fn slice_array(items: &[Value], low: i64, high: Option<i64>, max: Option<i64>) -> ExecResult<Value> {
    let len = items.len();
    let high = high.unwrap_or(len as i64);
    let max = max.unwrap_or(len as i64);
    check_bounds(low, high, max, len)?;
    let backing = items[low as usize..max as usize].to_vec();
    Ok(Value::Slice(SliceValue {
        data: Arc::new(Mutex::new(backing)),
        off: 0,
        len: (high - low) as usize,
        cap: (max - low) as usize,
    }))
}

fn check_bounds(low: i64, high: i64, max: i64, cap: usize) -> ExecResult<()> {
    if low < 0 || high < low || max < high || max as u64 > cap as u64 {
        return Err(slice_out_of_range(low, high, cap));
    }
    Ok(())
}
