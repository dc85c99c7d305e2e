//! Per-type properties computed at construction time.

use bitflags::bitflags;

bitflags! {
    /// Cached type properties.
    ///
    /// Presence flags propagate from children to parents when a composite is
    /// interned, so asking whether a type mentions a type parameter never
    /// walks the type.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TypeFlags: u16 {
        /// Mentions a type parameter somewhere inside.
        const HAS_TYPE_PARAM = 1 << 0;
        /// Untyped constant kind.
        const IS_UNTYPED = 1 << 1;
        /// Named (nominal) type.
        const IS_NAMED = 1 << 2;
        /// Instance of a generic named type.
        const IS_INSTANCE = 1 << 3;
        /// Interface carrying a type set; only valid as a constraint.
        const IS_CONSTRAINT = 1 << 4;

        /// Flags a composite inherits from its children.
        const PROPAGATED = Self::HAS_TYPE_PARAM.bits();
    }
}
