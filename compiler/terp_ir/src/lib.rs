//! Terp IR - syntax tree and shared identifiers for the terp interpreter.
//!
//! Hosts hand the interpreter a tree built with [`AstBuilder`]; the compiler
//! reads it through [`Ast`] and never mutates it. Every node lives in one
//! arena and is addressed by [`NodeId`].
//!
//! # Contents
//!
//! - [`Name`], [`StringInterner`], [`SharedInterner`]: interned identifiers
//! - [`Span`]: byte ranges for diagnostics
//! - [`Ast`], [`Node`], [`NodeKind`]: the syntax tree arena with parent links
//! - [`SourceFile`], [`Package`]: compilation units

mod ast;
mod interner;
mod name;
mod ops;
mod span;

pub use ast::{
    Ast, AstBuilder, Import, Literal, Node, NodeId, NodeKind, Package, SourceFile,
};
pub use interner::{InternError, SharedInterner, StringInterner, StringLookup};
pub use name::Name;
pub use ops::{BinaryOp, BranchKind, ChanDir, UnaryOp};
pub use span::Span;
