//! Terp Compile - declaration resolution, type checking and CFG construction.
//!
//! A [`CompileContext`] accumulates everything a session knows: the syntax
//! arena, the type pool, the package scope and the growing [`Program`].
//! Each compilation unit goes through three steps:
//!
//! 1. **Declare**: every top-level name enters the package scope. Types get
//!    a named-type handle right away; everything else is pending.
//! 2. **Resolve** (the GTA worklist): pending declarations are retried in
//!    passes until none makes progress. A declaration that mentions a
//!    pending name is skipped for the current pass; what is left after the
//!    last productive pass is a cycle or an undefined name.
//! 3. **Lower**: function bodies (and generic instances, on demand) are
//!    type-checked and lowered to CFG nodes with pre-resolved frame slots.
//!
//! Nothing is committed when a unit fails: the context is restored to its
//! state before the unit and the diagnostics are returned.
//!
//! [`Program`]: terp_eval::Program

mod context;
mod error;
mod generics;
mod gta;
mod host;
mod lower;
mod resolve;
mod scope;

pub use context::{CompileContext, EvalUnit};
pub use scope::{BuiltinFn, GenericId, Scope, ScopeKind, Storage, Symbol, SymbolKind};
