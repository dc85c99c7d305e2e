//! Type model for the terp interpreter.
//!
//! Types live in a [`Pool`] and are referenced by [`Idx`]. Unnamed composites
//! are hash-consed, so type identity is index equality; named types and type
//! parameters are nominal and get a fresh index per declaration.
//!
//! # Contents
//!
//! - [`Pool`]: construction, interning and accessors
//! - relations: assignability, convertibility, comparability, `implements`
//!   and constraint satisfaction
//! - [`Pool::lookup`]: field and method selection through embedding
//! - [`Pool::unify`]: type argument inference
//! - [`ConstValue`]: compile-time constant arithmetic and representability

mod constant;
mod data;
mod flags;
mod idx;
mod lookup;
mod pool;
mod relate;
mod unify;

pub use constant::{int_range, ConstError, ConstValue};
pub use data::{
    BasicKind, IfaceMethod, InterfaceData, MethodSig, NamedInfo, Origin, Signature, StructField,
    Term, TypeData, TypeParamInfo,
};
pub use flags::TypeFlags;
pub use idx::Idx;
pub use lookup::{FieldStep, LookupError, Selection};
pub use pool::{InterfaceError, Pool};
pub use relate::Unsatisfied;
pub use unify::UnifyError;

#[cfg(target_pointer_width = "64")]
mod size_asserts {
    use super::Idx;
    const _: () = assert!(std::mem::size_of::<Idx>() == 4);
    const _: () = assert!(std::mem::size_of::<Option<Idx>>() == 8);
}
