//! The universe scope: predeclared types, constants and built-ins.

use terp_ir::SharedInterner;
use terp_types::{ConstValue, Idx};

use super::{BuiltinFn, Scope, ScopeKind, Storage, Symbol, SymbolKind};

const TYPES: &[(&str, Idx)] = &[
    ("bool", Idx::BOOL),
    ("int", Idx::INT),
    ("int8", Idx::INT8),
    ("int16", Idx::INT16),
    ("int32", Idx::INT32),
    ("int64", Idx::INT64),
    ("uint", Idx::UINT),
    ("uint8", Idx::UINT8),
    ("uint16", Idx::UINT16),
    ("uint32", Idx::UINT32),
    ("uint64", Idx::UINT64),
    ("uintptr", Idx::UINTPTR),
    ("float32", Idx::FLOAT32),
    ("float64", Idx::FLOAT64),
    ("string", Idx::STRING),
    ("byte", Idx::BYTE),
    ("rune", Idx::RUNE),
    ("error", Idx::ERROR),
    ("any", Idx::ANY),
    ("comparable", Idx::COMPARABLE),
];

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("append", BuiltinFn::Append),
    ("cap", BuiltinFn::Cap),
    ("clear", BuiltinFn::Clear),
    ("close", BuiltinFn::Close),
    ("copy", BuiltinFn::Copy),
    ("delete", BuiltinFn::Delete),
    ("len", BuiltinFn::Len),
    ("make", BuiltinFn::Make),
    ("max", BuiltinFn::Max),
    ("min", BuiltinFn::Min),
    ("new", BuiltinFn::New),
    ("panic", BuiltinFn::Panic),
    ("print", BuiltinFn::Print),
    ("println", BuiltinFn::Println),
    ("recover", BuiltinFn::Recover),
];

pub(crate) fn universe(interner: &SharedInterner) -> Scope {
    let mut scope = Scope::new(ScopeKind::Universe, 0);
    for &(name, ty) in TYPES {
        scope.insert(Symbol::new(
            interner.intern(name),
            SymbolKind::Type,
            ty,
            Storage::None,
        ));
    }
    for (name, value) in [("true", true), ("false", false)] {
        scope.insert(
            Symbol::new(
                interner.intern(name),
                SymbolKind::Const,
                Idx::UNTYPED_BOOL,
                Storage::None,
            )
            .with_value(ConstValue::Bool(value)),
        );
    }
    // `iota` has no value of its own; its value comes from the const spec
    // being evaluated.
    scope.insert(Symbol::new(
        interner.intern("iota"),
        SymbolKind::Const,
        Idx::UNTYPED_INT,
        Storage::None,
    ));
    scope.insert(Symbol::new(
        interner.intern("nil"),
        SymbolKind::Nil,
        Idx::UNTYPED_NIL,
        Storage::None,
    ));
    for &(name, func) in BUILTINS {
        scope.insert(Symbol::new(
            interner.intern(name),
            SymbolKind::Builtin,
            Idx::INVALID,
            Storage::Builtin(func),
        ));
    }
    scope
}
