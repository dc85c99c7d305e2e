#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use terp_ir::{ChanDir, SharedInterner};

use crate::{Idx, IfaceMethod, MethodSig, Pool, StructField, Term};

use super::Unsatisfied;

fn pool() -> Pool {
    Pool::new(SharedInterner::new())
}

/// `type Celsius float64`
fn celsius(pool: &mut Pool) -> Idx {
    let name = pool.interner().intern("Celsius");
    let t = pool.new_named(name, None);
    pool.set_underlying(t, Idx::FLOAT64);
    t
}

/// `type Stringer interface { String() string }`
fn stringer(pool: &mut Pool) -> (Idx, IfaceMethod) {
    let name = pool.interner().intern("String");
    let sig = pool.func(Vec::new(), vec![Idx::STRING], false);
    let method = IfaceMethod { name, sig };
    let iface = pool
        .make_interface(vec![method.clone()], &[], Vec::new())
        .unwrap();
    (iface, method)
}

#[test]
fn untyped_constants_assign_by_category() {
    let mut pool = pool();
    let c = celsius(&mut pool);
    assert!(pool.assignable_to(Idx::UNTYPED_INT, Idx::FLOAT64));
    assert!(pool.assignable_to(Idx::UNTYPED_FLOAT, c));
    assert!(pool.assignable_to(Idx::UNTYPED_RUNE, Idx::INT32));
    assert!(!pool.assignable_to(Idx::UNTYPED_STRING, Idx::INT));
    assert!(!pool.assignable_to(Idx::UNTYPED_BOOL, Idx::STRING));
    assert!(pool.assignable_to(Idx::UNTYPED_STRING, Idx::ANY));
}

#[test]
fn nil_assigns_to_nillable_types() {
    let mut pool = pool();
    let s = pool.slice(Idx::INT);
    let m = pool.map(Idx::STRING, Idx::INT);
    assert!(pool.assignable_to(Idx::UNTYPED_NIL, s));
    assert!(pool.assignable_to(Idx::UNTYPED_NIL, m));
    assert!(pool.assignable_to(Idx::UNTYPED_NIL, Idx::ERROR));
    assert!(!pool.assignable_to(Idx::UNTYPED_NIL, Idx::INT));
    assert!(!pool.assignable_to(Idx::UNTYPED_NIL, Idx::STRING));
}

#[test]
fn named_types_need_conversion() {
    let mut pool = pool();
    let c = celsius(&mut pool);
    assert!(!pool.assignable_to(Idx::FLOAT64, c));
    assert!(!pool.assignable_to(c, Idx::FLOAT64));
    assert!(pool.convertible_to(Idx::FLOAT64, c));
    assert!(pool.convertible_to(c, Idx::INT));
}

#[test]
fn unnamed_composite_assigns_to_named() {
    let mut pool = pool();
    let ints = pool.slice(Idx::INT);
    let name = pool.interner().intern("Ints");
    let named = pool.new_named(name, None);
    pool.set_underlying(named, ints);
    assert!(pool.assignable_to(ints, named));
    assert!(pool.assignable_to(named, ints));
}

#[test]
fn bidirectional_channel_narrows() {
    let mut pool = pool();
    let both = pool.chan(ChanDir::Both, Idx::INT);
    let send = pool.chan(ChanDir::Send, Idx::INT);
    assert!(pool.assignable_to(both, send));
    assert!(!pool.assignable_to(send, both));
}

#[test]
fn string_conversions() {
    let mut pool = pool();
    let bytes = pool.slice(Idx::BYTE);
    let runes = pool.slice(Idx::RUNE);
    assert!(pool.convertible_to(Idx::STRING, bytes));
    assert!(pool.convertible_to(runes, Idx::STRING));
    assert!(pool.convertible_to(Idx::INT, Idx::STRING));
    assert!(!pool.convertible_to(Idx::STRING, Idx::INT));
    assert!(!pool.convertible_to(Idx::BOOL, Idx::INT));
}

#[test]
fn comparability() {
    let mut pool = pool();
    let name = pool.interner().intern("x");
    let s = pool.slice(Idx::INT);
    let f = pool.func(Vec::new(), Vec::new(), false);
    let m = pool.map(Idx::INT, Idx::INT);
    assert!(pool.comparable(Idx::STRING));
    assert!(pool.comparable(Idx::ERROR));
    assert!(!pool.comparable(s));
    assert!(!pool.comparable(f));
    assert!(!pool.comparable(m));

    let ok = pool.struct_type(vec![StructField {
        name,
        ty: Idx::INT,
        embedded: false,
    }]);
    let bad = pool.struct_type(vec![StructField {
        name,
        ty: s,
        embedded: false,
    }]);
    assert!(pool.comparable(ok));
    assert!(!pool.comparable(bad));
    let arr = pool.array(2, ok);
    assert!(pool.comparable(arr));
}

#[test]
fn ordering() {
    let mut pool = pool();
    let c = celsius(&mut pool);
    assert!(pool.ordered(Idx::INT));
    assert!(pool.ordered(c));
    assert!(pool.ordered(Idx::STRING));
    assert!(!pool.ordered(Idx::BOOL));
    assert!(!pool.ordered(Idx::ERROR));
}

#[test]
fn implements_with_receiver_kinds() {
    let mut pool = pool();
    let (iface, method) = stringer(&mut pool);
    let name = pool.interner().intern("Point");
    let point = pool.new_named(name, None);
    pool.set_underlying(point, Idx::INT);
    pool.add_method(
        point,
        MethodSig {
            name: method.name,
            sig: method.sig,
            ptr_recv: true,
        },
    );
    let ptr = pool.pointer(point);
    assert_eq!(
        pool.implements(point, iface),
        Err(Unsatisfied::PointerReceiver(method.name))
    );
    assert_eq!(pool.implements(ptr, iface), Ok(()));
    assert!(pool.assignable_to(ptr, iface));
    assert!(!pool.assignable_to(point, iface));
    assert_eq!(
        pool.implements(Idx::INT, iface),
        Err(Unsatisfied::MissingMethod(method.name))
    );
}

#[test]
fn implements_checks_signatures() {
    let mut pool = pool();
    let (iface, method) = stringer(&mut pool);
    let name = pool.interner().intern("Wrong");
    let wrong = pool.new_named(name, None);
    pool.set_underlying(wrong, Idx::INT);
    let sig = pool.func(Vec::new(), vec![Idx::INT], false);
    pool.add_method(
        wrong,
        MethodSig {
            name: method.name,
            sig,
            ptr_recv: false,
        },
    );
    assert_eq!(
        pool.implements(wrong, iface),
        Err(Unsatisfied::WrongSignature(method.name))
    );
}

#[test]
fn constraint_satisfaction() {
    let mut pool = pool();
    let c = celsius(&mut pool);
    let number = pool
        .make_interface(
            Vec::new(),
            &[],
            vec![vec![
                Term {
                    tilde: false,
                    ty: Idx::INT,
                },
                Term {
                    tilde: true,
                    ty: Idx::FLOAT64,
                },
            ]],
        )
        .unwrap();
    assert_eq!(pool.satisfies(Idx::INT, number), Ok(()));
    assert_eq!(pool.satisfies(c, number), Ok(()));
    assert_eq!(
        pool.satisfies(Idx::STRING, number),
        Err(Unsatisfied::NotInTypeSet)
    );

    let s = pool.slice(Idx::INT);
    assert_eq!(pool.satisfies(Idx::STRING, Idx::COMPARABLE), Ok(()));
    assert_eq!(
        pool.satisfies(s, Idx::COMPARABLE),
        Err(Unsatisfied::NotComparable)
    );
    assert_eq!(pool.satisfies(s, Idx::ANY), Ok(()));
}

#[test]
fn type_param_constraints_drive_predicates() {
    let mut pool = pool();
    let t = pool.interner().intern("T");
    let tp = pool.new_type_param(t, 0);
    pool.set_constraint(tp, Idx::COMPARABLE);
    assert!(pool.comparable(tp));
    assert!(!pool.ordered(tp));
}

#[test]
fn defaults_and_widening() {
    let pool = pool();
    assert_eq!(pool.default_type(Idx::UNTYPED_RUNE), Idx::INT32);
    assert_eq!(pool.default_type(Idx::UNTYPED_FLOAT), Idx::FLOAT64);
    assert_eq!(pool.default_type(Idx::UINT8), Idx::UINT8);
    assert_eq!(
        pool.wider_untyped(Idx::UNTYPED_INT, Idx::UNTYPED_FLOAT),
        Idx::UNTYPED_FLOAT
    );
    assert_eq!(
        pool.wider_untyped(Idx::UNTYPED_RUNE, Idx::UNTYPED_INT),
        Idx::UNTYPED_RUNE
    );
}
