//! Built-in functions.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{chan_of, Task};
use crate::errors::{internal, runtime_error, ExecResult, Panic, PanicKind, Unwind};
use crate::program::Builtin;
use crate::runtime::Channel;
use crate::value::{format_value, order, SliceValue};
use crate::Value;

impl Task {
    /// Run a builtin; calls without a result return nil.
    pub(super) fn builtin(&mut self, func: &Builtin, args: Vec<Value>) -> ExecResult<Value> {
        let mut args = args.into_iter();
        Ok(match func {
            Builtin::Len => Value::Int(next_arg(&mut args).len() as i64),
            Builtin::Cap => Value::Int(next_arg(&mut args).cap() as i64),
            Builtin::Append => {
                let base = next_arg(&mut args);
                append(base, args.collect())
            }
            Builtin::AppendSpread => {
                let base = next_arg(&mut args);
                let items = match next_arg(&mut args) {
                    Value::Slice(s) => s.to_vec(),
                    Value::Str(s) => s.bytes().map(|b| Value::Uint(u64::from(b))).collect(),
                    _ => Vec::new(),
                };
                append(base, items)
            }
            Builtin::Copy => {
                let (dst, src) = (next_arg(&mut args), next_arg(&mut args));
                Value::Int(copy(&dst, &src) as i64)
            }
            Builtin::Delete => {
                let (map, key) = (next_arg(&mut args), next_arg(&mut args));
                if let Value::Map(m) = map {
                    m.lock().remove(&key);
                }
                Value::Nil
            }
            Builtin::Panic => {
                let value = match next_arg(&mut args) {
                    Value::Nil => {
                        return Err(runtime_error(
                            PanicKind::Explicit,
                            "panic called with nil argument",
                        ))
                    }
                    v => v,
                };
                return Err(Unwind::Panic(Box::new(Panic::new(value, PanicKind::Explicit))));
            }
            Builtin::Recover => self.recover(),
            Builtin::Print => {
                let text: String = args.map(|v| format_value(&v)).collect();
                self.rt.print(&text);
                Value::Nil
            }
            Builtin::Println => {
                let mut text = args.map(|v| format_value(&v)).collect::<Vec<_>>().join(" ");
                text.push('\n');
                self.rt.print(&text);
                Value::Nil
            }
            Builtin::Close => {
                self.rt.close(chan_of(&next_arg(&mut args)).as_ref())?;
                Value::Nil
            }
            Builtin::Min => extremum(args, Ordering::Less)?,
            Builtin::Max => extremum(args, Ordering::Greater)?,
            Builtin::Clear { zero } => {
                match next_arg(&mut args) {
                    Value::Map(m) => m.lock().clear(),
                    Value::Slice(s) => {
                        for i in 0..s.len {
                            s.set(i, zero.clone());
                        }
                    }
                    _ => {}
                }
                Value::Nil
            }
            Builtin::MakeSlice { zero } => {
                let len = next_arg(&mut args).as_i64().unwrap_or(0);
                let cap = args.next().and_then(|v| v.as_i64()).unwrap_or(len);
                if len < 0 {
                    return Err(runtime_error(PanicKind::IndexOutOfRange, "makeslice: len out of range"));
                }
                if cap < len {
                    return Err(runtime_error(PanicKind::IndexOutOfRange, "makeslice: cap out of range"));
                }
                Value::Slice(SliceValue {
                    data: Arc::new(Mutex::new(vec![zero.clone(); cap as usize])),
                    off: 0,
                    len: len as usize,
                    cap: cap as usize,
                })
            }
            Builtin::MakeMap => Value::map(Default::default()),
            Builtin::MakeChan => {
                let size = args.next().and_then(|v| v.as_i64()).unwrap_or(0);
                let cap = usize::try_from(size).map_err(|_| {
                    runtime_error(PanicKind::IndexOutOfRange, "makechan: size out of range")
                })?;
                Value::Chan(Arc::new(Channel::new(cap)))
            }
        })
    }
}

fn next_arg(args: &mut impl Iterator<Item = Value>) -> Value {
    args.next().unwrap_or(Value::Nil)
}

/// `append`: writes in place while capacity lasts, else reallocates with
/// doubled capacity.
fn append(base: Value, items: Vec<Value>) -> Value {
    let s = match base {
        Value::Slice(s) => s,
        _ if items.is_empty() => return base,
        _ => return Value::slice(items),
    };
    if items.is_empty() {
        return Value::Slice(s);
    }
    let need = s.len + items.len();
    if need <= s.cap {
        {
            let mut data = s.data.lock();
            for (i, item) in items.into_iter().enumerate() {
                let at = s.off + s.len + i;
                if at < data.len() {
                    data[at] = item;
                } else {
                    data.push(item);
                }
            }
        }
        return Value::Slice(SliceValue { len: need, ..s });
    }
    let cap = need.max(s.cap * 2);
    let mut data = s.to_vec();
    data.extend(items);
    let filler = data.first().map(zero_like).unwrap_or(Value::Nil);
    data.resize(cap, filler);
    Value::Slice(SliceValue {
        data: Arc::new(Mutex::new(data)),
        off: 0,
        len: need,
        cap,
    })
}

/// Zero value of the same shape as `v`, for spare slice capacity.
fn zero_like(v: &Value) -> Value {
    match v {
        Value::Bool(_) => Value::Bool(false),
        Value::Int(_) => Value::Int(0),
        Value::Uint(_) => Value::Uint(0),
        Value::Float(_) => Value::Float(0.0),
        Value::Str(_) => Value::string(""),
        Value::Struct(items) => Value::strukt(items.iter().map(zero_like).collect()),
        Value::Array(items) => Value::array(items.iter().map(zero_like).collect()),
        _ => Value::Nil,
    }
}

/// `copy(dst, src)` returning the number of elements copied.
fn copy(dst: &Value, src: &Value) -> usize {
    let Value::Slice(dst) = dst else {
        return 0;
    };
    // Snapshot first: source and destination may share a backing array.
    let items: Vec<Value> = match src {
        Value::Slice(s) => s.to_vec(),
        Value::Str(s) => s.bytes().map(|b| Value::Uint(u64::from(b))).collect(),
        _ => Vec::new(),
    };
    let n = dst.len.min(items.len());
    for (i, item) in items.into_iter().take(n).enumerate() {
        dst.set(i, item);
    }
    n
}

/// `min`/`max`; a NaN operand makes the result NaN.
fn extremum(args: impl Iterator<Item = Value>, want: Ordering) -> ExecResult<Value> {
    let mut best: Option<Value> = None;
    for v in args {
        if matches!(v, Value::Float(f) if f.is_nan()) {
            return Ok(v);
        }
        best = Some(match best {
            Some(b) if order(&v, &b) != want => b,
            _ => v,
        });
    }
    best.ok_or_else(|| internal("min/max without arguments"))
}
