//! Text form of values for `print`/`println` and panic messages.

use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;

use super::{FuncValue, Value};

/// Format a float the way the builtin `println` does: `+1.500000e+000`.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let sci = format!("{:.6e}", v.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if v.is_sign_negative() { '-' } else { '+' };
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{sign}{mantissa}e{exp_sign}{:03}", exp.abs())
}

/// Format a value for printing.
pub fn format_value(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_seq(out: &mut String, items: &[Value]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_value(out, item);
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Uint(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Float(v) => out.push_str(&format_float(*v)),
        Value::Str(s) => out.push_str(s),
        Value::Struct(fields) => {
            out.push('{');
            write_seq(out, fields);
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            write_seq(out, items);
            out.push(']');
        }
        Value::Slice(s) => {
            out.push('[');
            write_seq(out, &s.to_vec());
            out.push(']');
        }
        Value::Map(m) => {
            let mut entries: Vec<(Value, Value)> = m
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            entries.sort_by(|a, b| order(&a.0, &b.0));
            out.push_str("map[");
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(out, k);
                out.push(':');
                write_value(out, v);
            }
            out.push(']');
        }
        Value::Chan(ch) => {
            let _ = write!(out, "{:#x}", Arc::as_ptr(ch) as usize);
        }
        Value::Pointer(p) => {
            let _ = write!(out, "{:#x}", p.addr());
        }
        Value::Iface(i) => write_value(out, &i.value),
        Value::Func(f) => {
            let id = match f {
                FuncValue::Closure { func, .. } | FuncValue::Bound { func, .. } => func.raw(),
                FuncValue::Host(_) => 0,
            };
            let _ = write!(out, "func#{id}");
        }
        Value::Iter(_) => out.push_str("iter"),
    }
}

/// Ordering for sorted map printing and `min`/`max`.
pub(crate) fn order(a: &Value, b: &Value) -> Ordering {
    match (a.concrete(), b.concrete()) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Uint(x), Value::Uint(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (x, y) => format_value(x).cmp(&format_value(y)),
    }
}
