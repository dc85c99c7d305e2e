//! Compile-time constant values and arithmetic.
//!
//! Untyped integer constants are held as `i128` and checked for overflow on
//! every operation. Typed constants hold the same representation; callers
//! convert the result back to the operand kind with [`ConstValue::convert`],
//! which is where typed overflow is reported.

#[cfg(test)]
mod tests;

use std::fmt;

use terp_ir::{BinaryOp, UnaryOp};

use crate::BasicKind;

#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstError {
    /// Result does not fit the target kind.
    Overflow,
    DivByZero,
    /// A float with a fractional part used where an integer is required.
    Truncated,
    /// Operand kinds don't combine (e.g. string + int).
    Mismatch,
    NegativeShift,
}

impl fmt::Display for ConstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstError::Overflow => write!(f, "constant overflow"),
            ConstError::DivByZero => write!(f, "division by zero"),
            ConstError::Truncated => write!(f, "constant truncated to integer"),
            ConstError::Mismatch => write!(f, "mismatched constant operands"),
            ConstError::NegativeShift => write!(f, "negative shift count"),
        }
    }
}

/// Largest shift accepted on untyped constants.
const MAX_SHIFT: i128 = 126;

impl ConstValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value, accepting floats without a fractional part.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            ConstValue::Int(v) => Some(*v),
            ConstValue::Float(f) if f.fract() == 0.0 && f.abs() < 1.7e38 => Some(*f as i128),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConstValue::Int(v) => Some(*v as f64),
            ConstValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Arithmetic, bitwise and logical binary operators.
    ///
    /// Two integer operands use integer division; a float on either side
    /// promotes both.
    pub fn binary(&self, op: BinaryOp, rhs: &ConstValue) -> Result<ConstValue, ConstError> {
        if op.is_comparison() {
            return self.compare(op, rhs).map(ConstValue::Bool);
        }
        if op.is_shift() {
            return self.shift(op, rhs);
        }
        match (self, rhs) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) => match op {
                BinaryOp::LogicalAnd => Ok(ConstValue::Bool(*a && *b)),
                BinaryOp::LogicalOr => Ok(ConstValue::Bool(*a || *b)),
                _ => Err(ConstError::Mismatch),
            },
            (ConstValue::Str(a), ConstValue::Str(b)) => match op {
                BinaryOp::Add => Ok(ConstValue::Str(format!("{a}{b}"))),
                _ => Err(ConstError::Mismatch),
            },
            (ConstValue::Int(a), ConstValue::Int(b)) => int_binary(op, *a, *b),
            (ConstValue::Int(_) | ConstValue::Float(_), ConstValue::Int(_) | ConstValue::Float(_)) => {
                let (Some(a), Some(b)) = (self.as_float(), rhs.as_float()) else {
                    return Err(ConstError::Mismatch);
                };
                float_binary(op, a, b)
            }
            _ => Err(ConstError::Mismatch),
        }
    }

    /// `<<` and `>>`. The count must be a non-negative integer.
    pub fn shift(&self, op: BinaryOp, count: &ConstValue) -> Result<ConstValue, ConstError> {
        let n = count.as_int().ok_or(ConstError::Mismatch)?;
        if n < 0 {
            return Err(ConstError::NegativeShift);
        }
        let v = self.as_int().ok_or(ConstError::Truncated)?;
        match op {
            BinaryOp::Shl => {
                if v == 0 {
                    return Ok(ConstValue::Int(0));
                }
                if n > MAX_SHIFT {
                    return Err(ConstError::Overflow);
                }
                let shifted = v.checked_mul(1i128 << n).ok_or(ConstError::Overflow)?;
                Ok(ConstValue::Int(shifted))
            }
            BinaryOp::Shr => Ok(ConstValue::Int(if n > MAX_SHIFT {
                if v < 0 {
                    -1
                } else {
                    0
                }
            } else {
                v >> n
            })),
            _ => Err(ConstError::Mismatch),
        }
    }

    /// Comparison operators.
    pub fn compare(&self, op: BinaryOp, rhs: &ConstValue) -> Result<bool, ConstError> {
        use std::cmp::Ordering;

        let ord = match (self, rhs) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) => {
                return match op {
                    BinaryOp::Eq => Ok(a == b),
                    BinaryOp::NotEq => Ok(a != b),
                    _ => Err(ConstError::Mismatch),
                };
            }
            (ConstValue::Str(a), ConstValue::Str(b)) => a.cmp(b),
            (ConstValue::Int(a), ConstValue::Int(b)) => a.cmp(b),
            _ => {
                let (Some(a), Some(b)) = (self.as_float(), rhs.as_float()) else {
                    return Err(ConstError::Mismatch);
                };
                a.partial_cmp(&b).ok_or(ConstError::Mismatch)?
            }
        };
        Ok(match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::NotEq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::LtEq => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::GtEq => ord != Ordering::Less,
            _ => return Err(ConstError::Mismatch),
        })
    }

    /// Unary `+ - ! ^`. `kind` selects the width for `^` on unsigned types.
    pub fn unary(&self, op: UnaryOp, kind: Option<BasicKind>) -> Result<ConstValue, ConstError> {
        match (op, self) {
            (UnaryOp::Plus, ConstValue::Int(_) | ConstValue::Float(_)) => Ok(self.clone()),
            (UnaryOp::Neg, ConstValue::Int(v)) => {
                v.checked_neg().map(ConstValue::Int).ok_or(ConstError::Overflow)
            }
            (UnaryOp::Neg, ConstValue::Float(f)) => Ok(ConstValue::Float(-f)),
            (UnaryOp::Not, ConstValue::Bool(b)) => Ok(ConstValue::Bool(!b)),
            (UnaryOp::BitNot, ConstValue::Int(v)) => match kind {
                Some(k) if k.is_unsigned() => {
                    let bits = k.int_bits().unwrap_or(64);
                    let mask = (1i128 << bits) - 1;
                    Ok(ConstValue::Int(v ^ mask))
                }
                _ => Ok(ConstValue::Int(!v)),
            },
            _ => Err(ConstError::Mismatch),
        }
    }

    /// Convert to (and check representability in) `kind`.
    pub fn convert(&self, kind: BasicKind) -> Result<ConstValue, ConstError> {
        if kind.is_boolean() {
            return match self {
                ConstValue::Bool(_) => Ok(self.clone()),
                _ => Err(ConstError::Mismatch),
            };
        }
        if kind.is_string() {
            return match self {
                ConstValue::Str(_) => Ok(self.clone()),
                _ => Err(ConstError::Mismatch),
            };
        }
        if kind.is_integer() {
            let v = match self {
                ConstValue::Int(v) => *v,
                ConstValue::Float(_) => self.as_int().ok_or(ConstError::Truncated)?,
                _ => return Err(ConstError::Mismatch),
            };
            if let Some((min, max)) = int_range(kind) {
                if v < min || v > max {
                    return Err(ConstError::Overflow);
                }
            }
            return Ok(ConstValue::Int(v));
        }
        if kind.is_float() {
            let f = self.as_float().ok_or(ConstError::Mismatch)?;
            return match kind {
                BasicKind::Float32 => {
                    let narrowed = f as f32;
                    if narrowed.is_infinite() && f.is_finite() {
                        Err(ConstError::Overflow)
                    } else {
                        Ok(ConstValue::Float(f64::from(narrowed)))
                    }
                }
                _ if f.is_infinite() => Err(ConstError::Overflow),
                _ => Ok(ConstValue::Float(f)),
            };
        }
        Err(ConstError::Mismatch)
    }

    /// Whether the value fits `kind` without loss.
    pub fn representable(&self, kind: BasicKind) -> bool {
        self.convert(kind).is_ok()
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v}"),
            ConstValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Inclusive value range of a sized integer kind.
pub fn int_range(kind: BasicKind) -> Option<(i128, i128)> {
    let bits = kind.int_bits()?;
    if kind.is_unsigned() {
        Some((0, (1i128 << bits) - 1))
    } else {
        Some((-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1))
    }
}

fn int_binary(op: BinaryOp, a: i128, b: i128) -> Result<ConstValue, ConstError> {
    let v = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(ConstError::DivByZero),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        BinaryOp::And => Some(a & b),
        BinaryOp::Or => Some(a | b),
        BinaryOp::Xor => Some(a ^ b),
        BinaryOp::AndNot => Some(a & !b),
        _ => return Err(ConstError::Mismatch),
    };
    v.map(ConstValue::Int).ok_or(ConstError::Overflow)
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> Result<ConstValue, ConstError> {
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err(ConstError::DivByZero),
        BinaryOp::Div => a / b,
        _ => return Err(ConstError::Mismatch),
    };
    if v.is_finite() {
        Ok(ConstValue::Float(v))
    } else {
        Err(ConstError::Overflow)
    }
}
