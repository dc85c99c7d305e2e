//! Type handle.
//!
//! Every type lives in the [`Pool`](crate::Pool) and is referenced by a 32-bit
//! [`Idx`]. Unnamed composite types are interned, so two structurally equal
//! composites share one index and type identity is index equality. Named
//! types and type parameters get a fresh index per declaration (or per
//! generic instance).

use std::fmt;

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Idx(u32);

impl Idx {
    // === Pre-interned types ===
    // `Pool::new` creates these in exactly this order.

    /// Placeholder for a type that failed to resolve.
    pub const INVALID: Self = Self(0);
    pub const BOOL: Self = Self(1);
    pub const INT: Self = Self(2);
    pub const INT8: Self = Self(3);
    pub const INT16: Self = Self(4);
    pub const INT32: Self = Self(5);
    pub const INT64: Self = Self(6);
    pub const UINT: Self = Self(7);
    pub const UINT8: Self = Self(8);
    pub const UINT16: Self = Self(9);
    pub const UINT32: Self = Self(10);
    pub const UINT64: Self = Self(11);
    pub const UINTPTR: Self = Self(12);
    pub const FLOAT32: Self = Self(13);
    pub const FLOAT64: Self = Self(14);
    pub const STRING: Self = Self(15);
    pub const UNTYPED_BOOL: Self = Self(16);
    pub const UNTYPED_INT: Self = Self(17);
    pub const UNTYPED_RUNE: Self = Self(18);
    pub const UNTYPED_FLOAT: Self = Self(19);
    pub const UNTYPED_STRING: Self = Self(20);
    pub const UNTYPED_NIL: Self = Self(21);
    /// `interface{}` (also `any`).
    pub const EMPTY_INTERFACE: Self = Self(22);
    /// `func() string`
    pub const ERROR_SIG: Self = Self(23);
    /// `interface{ Error() string }`
    pub const ERROR_INTERFACE: Self = Self(24);
    /// The predeclared `error` type.
    pub const ERROR: Self = Self(25);
    /// Dynamic type of runtime fault values; implements `error`.
    pub const RUNTIME_ERROR: Self = Self(26);
    /// `interface{ comparable }`
    pub const COMPARABLE_INTERFACE: Self = Self(27);
    /// The predeclared `comparable` constraint.
    pub const COMPARABLE: Self = Self(28);
    /// `()` - result of calls without results.
    pub const EMPTY_TUPLE: Self = Self(29);
    /// Dynamic type of plain error values made from a message (host errors,
    /// `errors.New`-style values); implements `error`.
    pub const ERROR_STRING: Self = Self(30);

    /// Number of pre-interned types.
    pub const PREDECLARED_COUNT: u32 = 31;

    /// `byte` is an alias of `uint8`.
    pub const BYTE: Self = Self::UINT8;
    /// `rune` is an alias of `int32`.
    pub const RUNE: Self = Self::INT32;
    /// `any` is an alias of `interface{}`.
    pub const ANY: Self = Self::EMPTY_INTERFACE;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0 == 0
    }

    /// One of the untyped constant kinds (including untyped nil).
    #[inline]
    pub const fn is_untyped(self) -> bool {
        self.0 >= Self::UNTYPED_BOOL.0 && self.0 <= Self::UNTYPED_NIL.0
    }
}

impl Default for Idx {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Idx({})", self.0)
    }
}
