//! Type descriptors.

use terp_ir::{ChanDir, Name};

use crate::Idx;

/// Predeclared scalar kinds, including the untyped constant kinds.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BasicKind {
    Invalid,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    String,
    UntypedBool,
    UntypedInt,
    UntypedRune,
    UntypedFloat,
    UntypedString,
    UntypedNil,
}

impl BasicKind {
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Invalid => "invalid type",
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::String => "string",
            BasicKind::UntypedBool => "untyped bool",
            BasicKind::UntypedInt => "untyped int",
            BasicKind::UntypedRune => "untyped rune",
            BasicKind::UntypedFloat => "untyped float",
            BasicKind::UntypedString => "untyped string",
            BasicKind::UntypedNil => "untyped nil",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            BasicKind::Int
                | BasicKind::Int8
                | BasicKind::Int16
                | BasicKind::Int32
                | BasicKind::Int64
                | BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
                | BasicKind::Uintptr
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            BasicKind::Uint
                | BasicKind::Uint8
                | BasicKind::Uint16
                | BasicKind::Uint32
                | BasicKind::Uint64
                | BasicKind::Uintptr
        )
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BasicKind::Float32 | BasicKind::Float64 | BasicKind::UntypedFloat
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_string(self) -> bool {
        matches!(self, BasicKind::String | BasicKind::UntypedString)
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, BasicKind::Bool | BasicKind::UntypedBool)
    }

    pub fn is_untyped(self) -> bool {
        matches!(
            self,
            BasicKind::UntypedBool
                | BasicKind::UntypedInt
                | BasicKind::UntypedRune
                | BasicKind::UntypedFloat
                | BasicKind::UntypedString
                | BasicKind::UntypedNil
        )
    }

    /// Bit width of sized integers; `int`/`uint` are 64-bit.
    pub fn int_bits(self) -> Option<u32> {
        match self {
            BasicKind::Int8 | BasicKind::Uint8 => Some(8),
            BasicKind::Int16 | BasicKind::Uint16 => Some(16),
            BasicKind::Int32 | BasicKind::Uint32 => Some(32),
            BasicKind::Int
            | BasicKind::Int64
            | BasicKind::Uint
            | BasicKind::Uint64
            | BasicKind::Uintptr => Some(64),
            _ => None,
        }
    }

    /// Ordering used when mixing untyped numeric constants.
    pub(crate) fn untyped_rank(self) -> u8 {
        match self {
            BasicKind::UntypedInt => 1,
            BasicKind::UntypedRune => 2,
            BasicKind::UntypedFloat => 3,
            _ => 0,
        }
    }
}

/// A struct field. Embedded fields are named after their type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: Name,
    pub ty: Idx,
    pub embedded: bool,
}

/// Function signature (without receiver).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Idx>,
    pub results: Vec<Idx>,
    /// The last parameter is `...T` and has slice type `[]T`.
    pub variadic: bool,
}

/// One interface method; `sig` is a function type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IfaceMethod {
    pub name: Name,
    pub sig: Idx,
}

/// A type-set term: `T` or `~T`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Term {
    pub tilde: bool,
    pub ty: Idx,
}

/// Flattened interface: embedded interfaces are merged at construction.
///
/// `terms == None` means the type set is unrestricted. Methods are sorted by
/// name so identical interfaces intern to one index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct InterfaceData {
    pub methods: Vec<IfaceMethod>,
    pub terms: Option<Vec<Term>>,
    pub comparable: bool,
}

impl InterfaceData {
    /// Usable as an ordinary value type.
    pub fn is_basic(&self) -> bool {
        self.terms.is_none() && !self.comparable
    }

    pub fn method(&self, name: Name) -> Option<&IfaceMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Type descriptor stored in the pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    Basic(BasicKind),
    Pointer(Idx),
    Array { len: u64, elem: Idx },
    Slice(Idx),
    Map { key: Idx, value: Idx },
    Chan { dir: ChanDir, elem: Idx },
    Struct(Vec<StructField>),
    Interface(InterfaceData),
    Func(Signature),
    /// Results of a multi-value call.
    Tuple(Vec<Idx>),
    /// Index into the pool's named-type table.
    Named(u32),
    /// Index into the pool's type-parameter table.
    TypeParam(u32),
}

/// A declared method of a named type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodSig {
    pub name: Name,
    /// Function type without the receiver.
    pub sig: Idx,
    pub ptr_recv: bool,
}

/// Generic origin of an instantiated named type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Compiler-side id of the generic type declaration.
    pub generic: u32,
    pub args: Vec<Idx>,
}

/// Nominal type information.
#[derive(Clone, Debug)]
pub struct NamedInfo {
    pub name: Name,
    /// `Idx::INVALID` until the declaration resolves.
    pub underlying: Idx,
    pub methods: Vec<MethodSig>,
    pub origin: Option<Origin>,
}

impl NamedInfo {
    pub fn method(&self, name: Name) -> Option<(usize, &MethodSig)> {
        self.methods.iter().enumerate().find(|(_, m)| m.name == name)
    }
}

/// A type parameter of a generic declaration.
#[derive(Clone, Debug)]
pub struct TypeParamInfo {
    pub name: Name,
    pub index: u32,
    /// Constraint interface; `Idx::INVALID` until resolved.
    pub constraint: Idx,
}
