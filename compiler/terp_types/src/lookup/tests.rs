#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use terp_ir::{Name, SharedInterner};

use crate::{FieldStep, Idx, MethodSig, Pool, StructField};

use super::{LookupError, Selection};

struct Fixture {
    pool: Pool,
    base: Idx,
    outer: Idx,
    name: Name,
    id: Name,
    describe: Name,
}

/// `type Base struct { id int }` with `func (b *Base) Describe() string`,
/// and `type Outer struct { *Base; name string }`.
fn fixture() -> Fixture {
    let mut pool = Pool::new(SharedInterner::new());
    let interner = pool.interner().clone();
    let id = interner.intern("id");
    let name = interner.intern("name");
    let describe = interner.intern("Describe");

    let base = pool.new_named(interner.intern("Base"), None);
    let base_struct = pool.struct_type(vec![StructField {
        name: id,
        ty: Idx::INT,
        embedded: false,
    }]);
    pool.set_underlying(base, base_struct);
    let sig = pool.func(Vec::new(), vec![Idx::STRING], false);
    pool.add_method(
        base,
        MethodSig {
            name: describe,
            sig,
            ptr_recv: true,
        },
    );

    let base_ptr = pool.pointer(base);
    let outer = pool.new_named(interner.intern("Outer"), None);
    let outer_struct = pool.struct_type(vec![
        StructField {
            name: interner.intern("Base"),
            ty: base_ptr,
            embedded: true,
        },
        StructField {
            name,
            ty: Idx::STRING,
            embedded: false,
        },
    ]);
    pool.set_underlying(outer, outer_struct);

    Fixture {
        pool,
        base,
        outer,
        name,
        id,
        describe,
    }
}

#[test]
fn direct_field() {
    let f = fixture();
    assert_eq!(
        f.pool.lookup(f.outer, f.name),
        Ok(Selection::Field {
            path: vec![FieldStep {
                index: 1,
                ptr: false
            }],
            ty: Idx::STRING,
        })
    );
}

#[test]
fn promoted_field_through_pointer() {
    let f = fixture();
    let sel = f.pool.lookup(f.outer, f.id).unwrap();
    assert_eq!(
        sel.path(),
        &[
            FieldStep {
                index: 0,
                ptr: false
            },
            FieldStep {
                index: 0,
                ptr: true
            },
        ]
    );
}

#[test]
fn promoted_pointer_method_is_in_value_method_set() {
    let f = fixture();
    let sel = f.pool.lookup(f.outer, f.describe).unwrap();
    match &sel {
        Selection::Method { recv, recv_ptr, .. } => {
            assert_eq!(*recv, f.base);
            assert!(*recv_ptr);
        }
        other => panic!("expected method, got {other:?}"),
    }
    let set = f.pool.method_set(f.outer);
    assert_eq!(set.len(), 1);
    assert_eq!(set[0].0, f.describe);
    assert!(f.pool.method_set(f.base).is_empty());
}

#[test]
fn pointer_lookup_sets_first_step() {
    let mut f = fixture();
    let ptr = f.pool.pointer(f.base);
    let sel = f.pool.lookup(ptr, f.id).unwrap();
    assert_eq!(
        sel.path(),
        &[FieldStep {
            index: 0,
            ptr: true
        }]
    );
    assert_eq!(f.pool.method_set(ptr).len(), 1);
}

#[test]
fn missing_and_ambiguous() {
    let mut f = fixture();
    let interner = f.pool.interner().clone();
    assert_eq!(
        f.pool.lookup(f.outer, interner.intern("nope")),
        Err(LookupError::NotFound)
    );

    // Two embedded structs at the same depth both providing `id`.
    let other = f.pool.new_named(interner.intern("Other"), None);
    let other_struct = f.pool.struct_type(vec![StructField {
        name: f.id,
        ty: Idx::INT,
        embedded: false,
    }]);
    f.pool.set_underlying(other, other_struct);
    let both = f.pool.struct_type(vec![
        StructField {
            name: interner.intern("Base"),
            ty: f.base,
            embedded: true,
        },
        StructField {
            name: interner.intern("Other"),
            ty: other,
            embedded: true,
        },
    ]);
    assert_eq!(f.pool.lookup(both, f.id), Err(LookupError::Ambiguous));
}

#[test]
fn interface_methods() {
    let pool = Pool::new(SharedInterner::new());
    let error = pool.interner().intern("Error");
    match pool.lookup(Idx::ERROR, error).unwrap() {
        Selection::IfaceMethod { iface, sig, path } => {
            assert_eq!(iface, Idx::ERROR);
            assert_eq!(sig, Idx::ERROR_SIG);
            assert!(path.is_empty());
        }
        other => panic!("expected interface method, got {other:?}"),
    }
    assert_eq!(pool.lookup(Idx::RUNTIME_ERROR, error).map(|s| s.is_method()), Ok(true));
}
