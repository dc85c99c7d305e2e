//! Arithmetic, comparison and conversion on runtime values.
//!
//! Integer results are wrapped to the operand width; `float32` results are
//! rounded to single precision.

use terp_ir::{BinaryOp, UnaryOp};

use crate::errors::{divide_by_zero, internal, runtime_error, ExecResult, PanicKind};
use crate::program::{Conversion, NumKind, OpKind};
use crate::Value;

pub(super) fn binary(op: BinaryOp, kind: OpKind, lhs: &Value, rhs: &Value) -> ExecResult<Value> {
    match kind {
        OpKind::Num(k) if k.is_float() => Ok(float_binary(op, k, as_f64(lhs), as_f64(rhs))),
        OpKind::Num(k) if k.is_unsigned() => uint_binary(op, k, as_u64(lhs), rhs),
        OpKind::Num(k) => int_binary(op, k, as_i64(lhs), rhs),
        OpKind::Str => str_binary(op, lhs, rhs),
        OpKind::Bool => {
            let (a, b) = (lhs.as_bool() == Some(true), rhs.as_bool() == Some(true));
            Ok(Value::Bool(match op {
                BinaryOp::Eq => a == b,
                BinaryOp::NotEq => a != b,
                BinaryOp::LogicalAnd => a && b,
                BinaryOp::LogicalOr => a || b,
                _ => return Err(internal(format!("bool operator {op:?}"))),
            }))
        }
        OpKind::Any => match op {
            BinaryOp::Eq => Ok(Value::Bool(equal(lhs, rhs)?)),
            BinaryOp::NotEq => Ok(Value::Bool(!equal(lhs, rhs)?)),
            _ => Err(internal(format!("operator {op:?} on general values"))),
        },
    }
}

/// `==` on comparable values. Comparing interfaces holding the same
/// uncomparable dynamic type panics.
fn equal(lhs: &Value, rhs: &Value) -> ExecResult<bool> {
    if let (Value::Iface(a), Value::Iface(b)) = (lhs, rhs) {
        if a.ty == b.ty && matches!(a.value, Value::Slice(_) | Value::Map(_) | Value::Func(_)) {
            return Err(runtime_error(
                PanicKind::TypeAssertion,
                "comparing uncomparable type",
            ));
        }
    }
    Ok(lhs == rhs)
}

fn as_i64(v: &Value) -> i64 {
    v.as_i64().unwrap_or(0)
}

fn as_u64(v: &Value) -> u64 {
    match v {
        Value::Uint(u) => *u,
        Value::Int(i) => *i as u64,
        _ => 0,
    }
}

fn as_f64(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}

/// Shift count; negative counts panic.
fn shift_count(rhs: &Value) -> ExecResult<u64> {
    match rhs {
        Value::Int(n) if *n < 0 => Err(runtime_error(PanicKind::Explicit, "negative shift amount")),
        Value::Int(n) => Ok(*n as u64),
        Value::Uint(n) => Ok(*n),
        _ => Ok(0),
    }
}

fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> Option<bool> {
    Some(match op {
        BinaryOp::Eq => a == b,
        BinaryOp::NotEq => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => return None,
    })
}

fn int_binary(op: BinaryOp, k: NumKind, a: i64, rhs: &Value) -> ExecResult<Value> {
    if op.is_shift() {
        let n = shift_count(rhs)?;
        let v = match op {
            BinaryOp::Shl if n >= 64 => 0,
            BinaryOp::Shl => a.wrapping_shl(n as u32),
            _ if n >= 64 => {
                if a < 0 {
                    -1
                } else {
                    0
                }
            }
            _ => a >> n,
        };
        return Ok(Value::Int(k.wrap_signed(v)));
    }
    let b = as_i64(rhs);
    if let Some(result) = compare(op, a, b) {
        return Ok(Value::Bool(result));
    }
    let v = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(divide_by_zero()),
        BinaryOp::Div => k.wrap_signed(a).wrapping_div(b),
        BinaryOp::Rem => a.wrapping_rem(b),
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::AndNot => a & !b,
        _ => return Err(internal(format!("integer operator {op:?}"))),
    };
    Ok(Value::Int(k.wrap_signed(v)))
}

fn uint_binary(op: BinaryOp, k: NumKind, a: u64, rhs: &Value) -> ExecResult<Value> {
    if op.is_shift() {
        let n = shift_count(rhs)?;
        let v = match op {
            _ if n >= 64 => 0,
            BinaryOp::Shl => a << n,
            _ => a >> n,
        };
        return Ok(Value::Uint(k.wrap_unsigned(v)));
    }
    let b = as_u64(rhs);
    if let Some(result) = compare(op, a, b) {
        return Ok(Value::Bool(result));
    }
    let v = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(divide_by_zero()),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::AndNot => a & !b,
        _ => return Err(internal(format!("unsigned operator {op:?}"))),
    };
    Ok(Value::Uint(k.wrap_unsigned(v)))
}

fn float_binary(op: BinaryOp, k: NumKind, a: f64, b: f64) -> Value {
    if let Some(result) = compare(op, a, b) {
        return Value::Bool(result);
    }
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => f64::NAN,
    };
    Value::Float(round_to(k, v))
}

fn round_to(k: NumKind, v: f64) -> f64 {
    if k == NumKind::F32 {
        f64::from(v as f32)
    } else {
        v
    }
}

fn str_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> ExecResult<Value> {
    let a = lhs.as_str().unwrap_or_default();
    let b = rhs.as_str().unwrap_or_default();
    if op == BinaryOp::Add {
        let mut s = String::with_capacity(a.len() + b.len());
        s.push_str(a);
        s.push_str(b);
        return Ok(Value::string(s));
    }
    compare(op, a, b)
        .map(Value::Bool)
        .ok_or_else(|| internal(format!("string operator {op:?}")))
}

pub(super) fn unary(op: UnaryOp, kind: OpKind, v: &Value) -> ExecResult<Value> {
    Ok(match (op, kind) {
        (UnaryOp::Plus, _) => v.clone(),
        (UnaryOp::Neg, OpKind::Num(k)) if k.is_float() => Value::Float(-as_f64(v)),
        (UnaryOp::Neg, OpKind::Num(k)) if k.is_unsigned() => {
            Value::Uint(k.wrap_unsigned(as_u64(v).wrapping_neg()))
        }
        (UnaryOp::Neg, OpKind::Num(k)) => Value::Int(k.wrap_signed(as_i64(v).wrapping_neg())),
        (UnaryOp::Not, OpKind::Bool) => Value::Bool(v.as_bool() != Some(true)),
        (UnaryOp::BitNot, OpKind::Num(k)) if k.is_unsigned() => Value::Uint(k.wrap_unsigned(!as_u64(v))),
        (UnaryOp::BitNot, OpKind::Num(k)) if !k.is_float() => Value::Int(k.wrap_signed(!as_i64(v))),
        _ => return Err(internal(format!("unary operator {op:?} on {kind:?}"))),
    })
}

pub(super) fn convert(conv: Conversion, v: &Value) -> Value {
    match conv {
        Conversion::Num { to, .. } => convert_num(to, v),
        Conversion::IntToString => {
            let c = match v {
                Value::Int(i) => u32::try_from(*i).ok().and_then(char::from_u32),
                Value::Uint(u) => u32::try_from(*u).ok().and_then(char::from_u32),
                _ => None,
            };
            Value::string(c.unwrap_or(char::REPLACEMENT_CHARACTER).to_string())
        }
        Conversion::BytesToString => {
            let bytes: Vec<u8> = elements(v).iter().map(|b| as_u64(b) as u8).collect();
            Value::string(String::from_utf8_lossy(&bytes).into_owned())
        }
        Conversion::RunesToString => {
            let text: String = elements(v)
                .iter()
                .map(|r| {
                    u32::try_from(as_i64(r))
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER)
                })
                .collect();
            Value::string(text)
        }
        Conversion::StringToBytes => {
            let s = v.as_str().unwrap_or_default();
            Value::slice(s.bytes().map(|b| Value::Uint(u64::from(b))).collect())
        }
        Conversion::StringToRunes => {
            let s = v.as_str().unwrap_or_default();
            Value::slice(s.chars().map(|c| Value::Int(i64::from(u32::from(c)))).collect())
        }
    }
}

fn elements(v: &Value) -> Vec<Value> {
    match v {
        Value::Slice(s) => s.to_vec(),
        _ => Vec::new(),
    }
}

fn convert_num(to: NumKind, v: &Value) -> Value {
    if to.is_float() {
        return Value::Float(round_to(to, as_f64(v)));
    }
    if to.is_unsigned() {
        let u = match v {
            Value::Int(i) => *i as u64,
            Value::Uint(u) => *u,
            Value::Float(f) if *f < 0.0 => (*f as i64) as u64,
            Value::Float(f) => *f as u64,
            _ => 0,
        };
        return Value::Uint(to.wrap_unsigned(u));
    }
    let i = match v {
        Value::Int(i) => *i,
        Value::Uint(u) => *u as i64,
        Value::Float(f) => *f as i64,
        _ => 0,
    };
    Value::Int(to.wrap_signed(i))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use pretty_assertions::assert_eq;
    use terp_ir::{BinaryOp, UnaryOp};

    use super::{binary, convert, unary};
    use crate::errors::{PanicKind, Unwind};
    use crate::program::{Conversion, NumKind, OpKind};
    use crate::Value;

    fn int8(op: BinaryOp, a: i64, b: i64) -> Value {
        binary(op, OpKind::Num(NumKind::I8), &Value::Int(a), &Value::Int(b)).unwrap()
    }

    #[test]
    fn signed_arithmetic_wraps_to_width() {
        assert_eq!(int8(BinaryOp::Add, 127, 1), Value::Int(-128));
        assert_eq!(int8(BinaryOp::Mul, 64, 4), Value::Int(0));
        assert_eq!(int8(BinaryOp::Div, -128, -1), Value::Int(-128));
    }

    #[test]
    fn unsigned_subtraction_wraps() {
        let v = binary(
            BinaryOp::Sub,
            OpKind::Num(NumKind::U8),
            &Value::Uint(0),
            &Value::Uint(1),
        )
        .unwrap();
        assert_eq!(v, Value::Uint(255));
    }

    #[test]
    fn integer_division_by_zero_panics() {
        let err = binary(
            BinaryOp::Rem,
            OpKind::Num(NumKind::I64),
            &Value::Int(1),
            &Value::Int(0),
        )
        .unwrap_err();
        assert!(matches!(err, Unwind::Panic(p) if p.kind == PanicKind::DivideByZero));
    }

    #[test]
    fn oversized_shifts_saturate() {
        assert_eq!(int8(BinaryOp::Shl, 1, 8), Value::Int(0));
        let v = binary(
            BinaryOp::Shr,
            OpKind::Num(NumKind::I64),
            &Value::Int(-8),
            &Value::Uint(100),
        )
        .unwrap();
        assert_eq!(v, Value::Int(-1));
    }

    #[test]
    fn float32_results_are_rounded() {
        let v = binary(
            BinaryOp::Add,
            OpKind::Num(NumKind::F32),
            &Value::Float(0.1),
            &Value::Float(0.2),
        )
        .unwrap();
        assert_eq!(v, Value::Float(f64::from(0.1_f32 + 0.2_f32)));
    }

    #[test]
    fn strings_concatenate_and_compare_bytewise() {
        let cat = binary(BinaryOp::Add, OpKind::Str, &"go".into(), &"pher".into()).unwrap();
        assert_eq!(cat, Value::from("gopher"));
        let lt = binary(BinaryOp::Lt, OpKind::Str, &"Z".into(), &"a".into()).unwrap();
        assert_eq!(lt, Value::Bool(true));
    }

    #[test]
    fn bit_complement_respects_signedness() {
        let u = unary(UnaryOp::BitNot, OpKind::Num(NumKind::U8), &Value::Uint(1)).unwrap();
        assert_eq!(u, Value::Uint(254));
        let i = unary(UnaryOp::BitNot, OpKind::Num(NumKind::I32), &Value::Int(0)).unwrap();
        assert_eq!(i, Value::Int(-1));
    }

    #[test]
    fn conversions_truncate_and_decode() {
        let to_u8 = Conversion::Num {
            from: NumKind::I64,
            to: NumKind::U8,
        };
        assert_eq!(convert(to_u8, &Value::Int(300)), Value::Uint(44));
        let to_int = Conversion::Num {
            from: NumKind::F64,
            to: NumKind::I64,
        };
        assert_eq!(convert(to_int, &Value::Float(-2.9)), Value::Int(-2));
        assert_eq!(
            convert(Conversion::IntToString, &Value::Int(0x4e16)),
            Value::from("世")
        );
        assert_eq!(
            convert(Conversion::IntToString, &Value::Int(-1)),
            Value::from("\u{fffd}")
        );
        let runes = convert(Conversion::StringToRunes, &"héllo".into());
        assert_eq!(runes.len(), 5);
    }
}
