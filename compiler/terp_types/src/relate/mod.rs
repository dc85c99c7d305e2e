//! Type relations: identity, assignability, convertibility, comparability,
//! interface implementation and constraint satisfaction.

#[cfg(test)]
mod tests;

use std::fmt;

use terp_ir::{ChanDir, Name};

use crate::{BasicKind, Idx, Pool, Selection, Term, TypeData};

/// Why a type fails to implement an interface or satisfy a constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unsatisfied {
    MissingMethod(Name),
    /// Method exists with a different signature.
    WrongSignature(Name),
    /// Method exists but only on the pointer type.
    PointerReceiver(Name),
    /// Type is outside the constraint's type set.
    NotInTypeSet,
    NotComparable,
    /// The constraint is not an interface.
    NotAnInterface,
}

impl Unsatisfied {
    /// Render with names resolved through the pool's interner.
    pub fn describe(&self, pool: &Pool) -> String {
        let interner = pool.interner();
        match self {
            Unsatisfied::MissingMethod(n) => format!("missing method {}", interner.lookup(*n)),
            Unsatisfied::WrongSignature(n) => {
                format!("wrong type for method {}", interner.lookup(*n))
            }
            Unsatisfied::PointerReceiver(n) => format!(
                "method {} has pointer receiver",
                interner.lookup(*n)
            ),
            Unsatisfied::NotInTypeSet => "not in type set".to_string(),
            Unsatisfied::NotComparable => "not comparable".to_string(),
            Unsatisfied::NotAnInterface => "constraint is not an interface".to_string(),
        }
    }
}

impl fmt::Display for Unsatisfied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unsatisfied::MissingMethod(_) => write!(f, "missing method"),
            Unsatisfied::WrongSignature(_) => write!(f, "wrong method signature"),
            Unsatisfied::PointerReceiver(_) => write!(f, "method has pointer receiver"),
            Unsatisfied::NotInTypeSet => write!(f, "not in type set"),
            Unsatisfied::NotComparable => write!(f, "not comparable"),
            Unsatisfied::NotAnInterface => write!(f, "constraint is not an interface"),
        }
    }
}

impl Pool {
    // === Predicates ===

    pub fn is_boolean(&self, t: Idx) -> bool {
        self.basic_kind(t).is_some_and(BasicKind::is_boolean)
    }

    pub fn is_integer(&self, t: Idx) -> bool {
        self.basic_kind(t).is_some_and(BasicKind::is_integer)
    }

    pub fn is_unsigned(&self, t: Idx) -> bool {
        self.basic_kind(t).is_some_and(BasicKind::is_unsigned)
    }

    pub fn is_float(&self, t: Idx) -> bool {
        self.basic_kind(t).is_some_and(BasicKind::is_float)
    }

    pub fn is_numeric(&self, t: Idx) -> bool {
        self.basic_kind(t).is_some_and(BasicKind::is_numeric)
    }

    pub fn is_string(&self, t: Idx) -> bool {
        self.basic_kind(t).is_some_and(BasicKind::is_string)
    }

    pub fn is_named(&self, t: Idx) -> bool {
        matches!(self.data(t), TypeData::Named(_) | TypeData::Basic(_))
    }

    pub fn is_type_param(&self, t: Idx) -> bool {
        matches!(self.data(t), TypeData::TypeParam(_))
    }

    pub fn is_interface(&self, t: Idx) -> bool {
        !self.is_type_param(t) && self.interface_data(t).is_some()
    }

    pub fn is_pointer(&self, t: Idx) -> bool {
        matches!(self.underlying_data(t), TypeData::Pointer(_))
    }

    /// Types whose zero value is `nil`.
    pub fn is_nillable(&self, t: Idx) -> bool {
        matches!(
            self.underlying_data(t),
            TypeData::Pointer(_)
                | TypeData::Slice(_)
                | TypeData::Map { .. }
                | TypeData::Chan { .. }
                | TypeData::Func(_)
                | TypeData::Interface(_)
        )
    }

    /// `[]byte`
    pub fn is_byte_slice(&self, t: Idx) -> bool {
        matches!(self.underlying_data(t), TypeData::Slice(e) if self.underlying(*e) == Idx::UINT8)
    }

    /// `[]rune`
    pub fn is_rune_slice(&self, t: Idx) -> bool {
        matches!(self.underlying_data(t), TypeData::Slice(e) if self.underlying(*e) == Idx::INT32)
    }

    /// Default type of an untyped constant kind; other types map to themselves.
    pub fn default_type(&self, t: Idx) -> Idx {
        match t {
            Idx::UNTYPED_BOOL => Idx::BOOL,
            Idx::UNTYPED_INT => Idx::INT,
            Idx::UNTYPED_RUNE => Idx::INT32,
            Idx::UNTYPED_FLOAT => Idx::FLOAT64,
            Idx::UNTYPED_STRING => Idx::STRING,
            _ => t,
        }
    }

    /// The larger of two untyped numeric kinds (`int < rune < float`).
    pub fn wider_untyped(&self, a: Idx, b: Idx) -> Idx {
        let rank = |t: Idx| self.basic_kind(t).map_or(0, BasicKind::untyped_rank);
        if rank(b) > rank(a) {
            b
        } else {
            a
        }
    }

    // === Relations ===

    /// Type identity. Interning makes this index equality.
    #[inline]
    pub fn identical(&self, a: Idx, b: Idx) -> bool {
        a == b
    }

    /// Whether a value of type `v` may be assigned to a variable of type `t`.
    ///
    /// Untyped constant kinds are checked for category only; representability
    /// of the constant value is a separate check.
    pub fn assignable_to(&self, v: Idx, t: Idx) -> bool {
        if v == t || v.is_invalid() || t.is_invalid() {
            return true;
        }
        if v == Idx::UNTYPED_NIL {
            return self.is_nillable(t) && !self.is_type_param(t);
        }
        if v.is_untyped() {
            if let Some(iface) = self.interface_data(t) {
                return iface.methods.is_empty() && iface.is_basic();
            }
            let Some(kind) = self.basic_kind(t) else {
                return false;
            };
            return match v {
                Idx::UNTYPED_BOOL => kind.is_boolean(),
                Idx::UNTYPED_STRING => kind.is_string(),
                Idx::UNTYPED_INT | Idx::UNTYPED_RUNE | Idx::UNTYPED_FLOAT => kind.is_numeric(),
                _ => false,
            };
        }

        let (vu, tu) = (self.underlying(v), self.underlying(t));
        let either_unnamed = !self.is_named(v) || !self.is_named(t);
        if vu == tu && either_unnamed && !self.is_type_param(v) && !self.is_type_param(t) {
            return true;
        }
        if self.is_interface(t) {
            return self.implements(v, t).is_ok();
        }
        if let (
            TypeData::Chan {
                dir: ChanDir::Both,
                elem: ve,
            },
            TypeData::Chan { elem: te, .. },
        ) = (self.data(vu), self.data(tu))
        {
            return ve == te && either_unnamed;
        }
        false
    }

    /// Whether an explicit conversion `t(x)` is allowed for `x` of type `v`.
    pub fn convertible_to(&self, v: Idx, t: Idx) -> bool {
        if self.assignable_to(v, t) {
            return true;
        }
        let (vu, tu) = (self.underlying(v), self.underlying(t));
        if vu == tu {
            return true;
        }
        if let (TypeData::Pointer(a), TypeData::Pointer(b)) = (self.data(vu), self.data(tu)) {
            if self.underlying(*a) == self.underlying(*b) {
                return true;
            }
        }
        if self.is_numeric(vu) && self.is_numeric(tu) {
            return true;
        }
        if self.is_string(tu)
            && (self.is_integer(vu) || self.is_byte_slice(vu) || self.is_rune_slice(vu))
        {
            return true;
        }
        self.is_string(vu) && (self.is_byte_slice(tu) || self.is_rune_slice(tu))
    }

    /// Whether `==` is defined on values of `t`.
    pub fn comparable(&self, t: Idx) -> bool {
        if let Some(info) = self.type_param_info(t) {
            return self.constraint_comparable(info.constraint);
        }
        match self.underlying_data(t) {
            TypeData::Basic(kind) => !matches!(kind, BasicKind::Invalid | BasicKind::UntypedNil),
            TypeData::Pointer(_) | TypeData::Chan { .. } => true,
            TypeData::Interface(data) => data.is_basic(),
            TypeData::Struct(fields) => fields.iter().all(|f| self.comparable(f.ty)),
            TypeData::Array { elem, .. } => self.comparable(*elem),
            _ => false,
        }
    }

    fn constraint_comparable(&self, constraint: Idx) -> bool {
        let Some(data) = self.interface_data(constraint) else {
            return false;
        };
        if data.comparable {
            return true;
        }
        data.terms
            .as_ref()
            .is_some_and(|terms| terms.iter().all(|t| self.comparable(t.ty)))
    }

    /// Whether `<` and friends are defined on values of `t`.
    pub fn ordered(&self, t: Idx) -> bool {
        if let Some(info) = self.type_param_info(t) {
            return self.interface_data(info.constraint).is_some_and(|d| {
                d.terms
                    .as_ref()
                    .is_some_and(|terms| terms.iter().all(|term| self.ordered(term.ty)))
            });
        }
        self.basic_kind(t)
            .is_some_and(|k| k.is_numeric() || k.is_string())
    }

    /// Whether `t`'s method set covers every method of interface `iface`.
    pub fn implements(&self, t: Idx, iface: Idx) -> Result<(), Unsatisfied> {
        let Some(data) = self.interface_data(iface) else {
            return Err(Unsatisfied::NotAnInterface);
        };
        for m in &data.methods {
            match self.lookup(t, m.name) {
                Ok(Selection::IfaceMethod { sig, .. }) => {
                    if sig != m.sig {
                        return Err(Unsatisfied::WrongSignature(m.name));
                    }
                }
                Ok(Selection::Method {
                    method, recv_ptr, ..
                }) => {
                    if method.sig != m.sig {
                        return Err(Unsatisfied::WrongSignature(m.name));
                    }
                    if method.ptr_recv && !recv_ptr {
                        return Err(Unsatisfied::PointerReceiver(m.name));
                    }
                }
                _ => return Err(Unsatisfied::MissingMethod(m.name)),
            }
        }
        Ok(())
    }

    /// Whether a type argument `t` satisfies `constraint`.
    pub fn satisfies(&self, t: Idx, constraint: Idx) -> Result<(), Unsatisfied> {
        if self.has_type_params(t) {
            return Ok(());
        }
        let Some(data) = self.interface_data(constraint) else {
            return Err(Unsatisfied::NotAnInterface);
        };
        if let Some(terms) = &data.terms {
            if !terms.iter().any(|term| self.in_term(t, term)) {
                return Err(Unsatisfied::NotInTypeSet);
            }
        }
        if data.comparable && !self.comparable(t) {
            return Err(Unsatisfied::NotComparable);
        }
        self.implements(t, constraint)
    }

    fn in_term(&self, t: Idx, term: &Term) -> bool {
        if term.tilde {
            self.underlying(t) == self.underlying(term.ty)
        } else {
            t == term.ty
        }
    }
}
