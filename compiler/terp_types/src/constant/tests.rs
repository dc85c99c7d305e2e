use pretty_assertions::assert_eq;
use terp_ir::{BinaryOp, UnaryOp};

use crate::BasicKind;

use super::{int_range, ConstError, ConstValue};

#[test]
fn integer_arithmetic() {
    let a = ConstValue::Int(7);
    let b = ConstValue::Int(2);
    assert_eq!(a.binary(BinaryOp::Div, &b), Ok(ConstValue::Int(3)));
    assert_eq!(a.binary(BinaryOp::Rem, &b), Ok(ConstValue::Int(1)));
    assert_eq!(a.binary(BinaryOp::AndNot, &b), Ok(ConstValue::Int(5)));
    assert_eq!(
        a.binary(BinaryOp::Div, &ConstValue::Int(0)),
        Err(ConstError::DivByZero)
    );
}

#[test]
fn float_promotion() {
    let a = ConstValue::Float(7.0);
    let b = ConstValue::Int(2);
    assert_eq!(a.binary(BinaryOp::Div, &b), Ok(ConstValue::Float(3.5)));
    assert_eq!(a.binary(BinaryOp::Rem, &b), Err(ConstError::Mismatch));
}

#[test]
fn comparisons_and_logic() {
    let t = ConstValue::Bool(true);
    let f = ConstValue::Bool(false);
    assert_eq!(t.binary(BinaryOp::LogicalAnd, &f), Ok(ConstValue::Bool(false)));
    assert_eq!(t.binary(BinaryOp::Eq, &t), Ok(ConstValue::Bool(true)));
    assert_eq!(t.binary(BinaryOp::Lt, &f), Err(ConstError::Mismatch));
    let x = ConstValue::Str("a".into());
    let y = ConstValue::Str("b".into());
    assert_eq!(x.compare(BinaryOp::Lt, &y), Ok(true));
    assert_eq!(
        x.binary(BinaryOp::Add, &y),
        Ok(ConstValue::Str("ab".into()))
    );
    assert_eq!(
        ConstValue::Int(1).compare(BinaryOp::GtEq, &ConstValue::Float(1.0)),
        Ok(true)
    );
}

#[test]
fn shifts() {
    let one = ConstValue::Int(1);
    assert_eq!(
        one.shift(BinaryOp::Shl, &ConstValue::Int(62)),
        Ok(ConstValue::Int(1 << 62))
    );
    assert_eq!(
        one.shift(BinaryOp::Shl, &ConstValue::Int(-1)),
        Err(ConstError::NegativeShift)
    );
    assert_eq!(
        ConstValue::Int(-8).shift(BinaryOp::Shr, &ConstValue::Int(1)),
        Ok(ConstValue::Int(-4))
    );
    assert_eq!(
        ConstValue::Float(1.5).shift(BinaryOp::Shl, &ConstValue::Int(1)),
        Err(ConstError::Truncated)
    );
}

#[test]
fn unary_ops() {
    assert_eq!(
        ConstValue::Int(5).unary(UnaryOp::Neg, None),
        Ok(ConstValue::Int(-5))
    );
    assert_eq!(
        ConstValue::Int(0).unary(UnaryOp::BitNot, Some(BasicKind::Uint8)),
        Ok(ConstValue::Int(255))
    );
    assert_eq!(
        ConstValue::Int(0).unary(UnaryOp::BitNot, Some(BasicKind::Int)),
        Ok(ConstValue::Int(-1))
    );
    assert_eq!(
        ConstValue::Bool(true).unary(UnaryOp::Not, None),
        Ok(ConstValue::Bool(false))
    );
}

#[test]
fn representability() {
    assert!(ConstValue::Int(255).representable(BasicKind::Uint8));
    assert!(!ConstValue::Int(256).representable(BasicKind::Uint8));
    assert!(!ConstValue::Int(-1).representable(BasicKind::Uint));
    assert!(ConstValue::Float(3.0).representable(BasicKind::Int));
    assert_eq!(
        ConstValue::Float(3.5).convert(BasicKind::Int),
        Err(ConstError::Truncated)
    );
    assert_eq!(
        ConstValue::Int(3).convert(BasicKind::Float64),
        Ok(ConstValue::Float(3.0))
    );
    assert_eq!(
        ConstValue::Float(1e300).convert(BasicKind::Float32),
        Err(ConstError::Overflow)
    );
    assert!(!ConstValue::Str("x".into()).representable(BasicKind::Int));
}

#[test]
fn ranges() {
    assert_eq!(int_range(BasicKind::Int8), Some((-128, 127)));
    assert_eq!(int_range(BasicKind::Uint16), Some((0, 65535)));
    assert_eq!(int_range(BasicKind::Float64), None);
}
