#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;
use terp_types::Idx;

use super::*;
use crate::Frame;

fn hash_of(v: &Value) -> u64 {
    let mut h = DefaultHasher::new();
    v.hash(&mut h);
    h.finish()
}

#[test]
fn floats_print_in_scientific_form() {
    assert_eq!(format_float(1.5), "+1.500000e+000");
    assert_eq!(format_float(-0.001), "-1.000000e-003");
    assert_eq!(format_float(f64::INFINITY), "+Inf");
}

#[test]
fn composites_print_with_sorted_map_keys() {
    let mut entries = FxHashMap::default();
    entries.insert(Value::from("b"), Value::Int(2));
    entries.insert(Value::from("a"), Value::Int(1));
    assert_eq!(format_value(&Value::map(entries)), "map[a:1 b:2]");
    let s = Value::strukt(vec![Value::Int(1), Value::from("x")]);
    assert_eq!(format_value(&s), "{1 x}");
    assert_eq!(format_value(&Value::slice(vec![Value::Bool(true)])), "[true]");
}

#[test]
fn positive_and_negative_zero_are_one_map_key() {
    let (a, b) = (Value::Float(0.0), Value::Float(-0.0));
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn interface_equality_needs_same_dynamic_type() {
    let a = Value::iface(Idx::INT, Value::Int(1));
    let b = Value::iface(Idx::INT64, Value::Int(1));
    assert_ne!(a, b);
    assert_eq!(a, Value::iface(Idx::INT, Value::Int(1)));
}

#[test]
fn struct_copies_are_independent() {
    let original = Value::strukt(vec![Value::Int(1), Value::Int(2)]);
    let frame = Frame::new(1, None);
    frame.set(0, original.clone());
    let field = Pointer::new(PtrBase::Slot(frame.clone(), 0)).child(1);
    field.store(Value::Int(9));
    assert_eq!(format_value(&frame.get(0)), "{1 9}");
    assert_eq!(format_value(&original), "{1 2}");
}

#[test]
fn subslices_share_their_backing_array() {
    let whole = SliceValue::from_vec(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let tail = SliceValue {
        off: 1,
        len: 2,
        cap: 2,
        ..whole.clone()
    };
    assert!(tail.set(0, Value::Int(20)));
    assert_eq!(whole.get(1), Some(Value::Int(20)));
    assert!(!tail.set(2, Value::Int(0)));
}

#[test]
fn nil_collections_have_zero_length() {
    assert_eq!(Value::Nil.len(), 0);
    assert_eq!(Value::Nil.cap(), 0);
    assert!(Value::string("").is_empty());
    assert_eq!(Value::from("héllo").len(), 6);
}

#[test]
fn pointers_compare_by_target() {
    let frame = Frame::new(2, None);
    let p = Pointer::new(PtrBase::Slot(frame.clone(), 0));
    let q = Pointer::new(PtrBase::Slot(frame.clone(), 0));
    let r = Pointer::new(PtrBase::Slot(frame, 1));
    assert_eq!(Value::Pointer(p.clone()), Value::Pointer(q));
    assert_ne!(Value::Pointer(p), Value::Pointer(r));
}
