//! The type pool.
//!
//! Owns every [`TypeData`] and hands out [`Idx`] handles. Structural types
//! are hash-consed through [`Pool::intern`]; named types and type parameters
//! are created with [`Pool::new_named`] and [`Pool::new_type_param`] and are
//! never deduplicated.

mod format;


use rustc_hash::FxHashMap;
use std::fmt;
use terp_ir::{ChanDir, Name, SharedInterner};

use crate::{
    BasicKind, IfaceMethod, Idx, InterfaceData, MethodSig, NamedInfo, Origin, Signature,
    StructField, Term, TypeData, TypeFlags, TypeParamInfo,
};

/// Error while building an interface from its elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceError {
    /// Two embedded interfaces declare the method with different signatures.
    DuplicateMethod(Name),
    /// An embedded element is not an interface.
    NotAnInterface(Idx),
}

impl fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceError::DuplicateMethod(_) => write!(f, "duplicate method"),
            InterfaceError::NotAnInterface(_) => write!(f, "embedded type is not an interface"),
        }
    }
}

/// Type storage for one compilation context.
#[derive(Clone)]
pub struct Pool {
    types: Vec<TypeData>,
    flags: Vec<TypeFlags>,
    interned: FxHashMap<TypeData, Idx>,
    named: Vec<NamedInfo>,
    params: Vec<TypeParamInfo>,
    interner: SharedInterner,
}

const BASICS: [BasicKind; 22] = [
    BasicKind::Invalid,
    BasicKind::Bool,
    BasicKind::Int,
    BasicKind::Int8,
    BasicKind::Int16,
    BasicKind::Int32,
    BasicKind::Int64,
    BasicKind::Uint,
    BasicKind::Uint8,
    BasicKind::Uint16,
    BasicKind::Uint32,
    BasicKind::Uint64,
    BasicKind::Uintptr,
    BasicKind::Float32,
    BasicKind::Float64,
    BasicKind::String,
    BasicKind::UntypedBool,
    BasicKind::UntypedInt,
    BasicKind::UntypedRune,
    BasicKind::UntypedFloat,
    BasicKind::UntypedString,
    BasicKind::UntypedNil,
];

impl Pool {
    /// Create a pool with every predeclared type at its fixed [`Idx`].
    pub fn new(interner: SharedInterner) -> Self {
        let mut pool = Pool {
            types: Vec::with_capacity(256),
            flags: Vec::with_capacity(256),
            interned: FxHashMap::default(),
            named: Vec::new(),
            params: Vec::new(),
            interner,
        };

        for kind in BASICS {
            pool.intern(TypeData::Basic(kind));
        }
        let empty = pool.intern(TypeData::Interface(InterfaceData::default()));
        debug_assert_eq!(empty, Idx::EMPTY_INTERFACE);

        let sig = pool.func(Vec::new(), vec![Idx::STRING], false);
        debug_assert_eq!(sig, Idx::ERROR_SIG);
        let error_name = pool.interner.intern("Error");
        let iface = pool.intern(TypeData::Interface(InterfaceData {
            methods: vec![IfaceMethod {
                name: error_name,
                sig,
            }],
            terms: None,
            comparable: false,
        }));
        debug_assert_eq!(iface, Idx::ERROR_INTERFACE);

        let name = pool.interner.intern("error");
        let error = pool.new_named(name, None);
        pool.set_underlying(error, iface);
        debug_assert_eq!(error, Idx::ERROR);

        let name = pool.interner.intern("runtime.Error");
        let rt = pool.new_named(name, None);
        pool.set_underlying(rt, Idx::STRING);
        pool.named_info_mut(rt).methods.push(MethodSig {
            name: error_name,
            sig,
            ptr_recv: false,
        });
        debug_assert_eq!(rt, Idx::RUNTIME_ERROR);

        let cmp_iface = pool.intern(TypeData::Interface(InterfaceData {
            methods: Vec::new(),
            terms: None,
            comparable: true,
        }));
        debug_assert_eq!(cmp_iface, Idx::COMPARABLE_INTERFACE);
        let name = pool.interner.intern("comparable");
        let cmp = pool.new_named(name, None);
        pool.set_underlying(cmp, cmp_iface);
        debug_assert_eq!(cmp, Idx::COMPARABLE);

        let unit = pool.tuple(Vec::new());
        debug_assert_eq!(unit, Idx::EMPTY_TUPLE);

        let name = pool.interner.intern("errorString");
        let plain = pool.new_named(name, None);
        pool.set_underlying(plain, Idx::STRING);
        pool.named_info_mut(plain).methods.push(MethodSig {
            name: error_name,
            sig,
            ptr_recv: false,
        });
        debug_assert_eq!(plain, Idx::ERROR_STRING);
        pool
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn push(&mut self, data: TypeData, flags: TypeFlags) -> Idx {
        let idx = Idx::from_raw(u32::try_from(self.types.len()).unwrap_or(u32::MAX));
        self.types.push(data);
        self.flags.push(flags);
        idx
    }

    fn child_flags(&self, ids: impl IntoIterator<Item = Idx>) -> TypeFlags {
        ids.into_iter()
            .fold(TypeFlags::empty(), |acc, c| acc | self.flags(c))
            & TypeFlags::PROPAGATED
    }

    fn compute_flags(&self, data: &TypeData) -> TypeFlags {
        match data {
            TypeData::Basic(kind) => {
                if kind.is_untyped() {
                    TypeFlags::IS_UNTYPED
                } else {
                    TypeFlags::empty()
                }
            }
            TypeData::Pointer(e) | TypeData::Slice(e) => self.child_flags([*e]),
            TypeData::Array { elem, .. } | TypeData::Chan { elem, .. } => {
                self.child_flags([*elem])
            }
            TypeData::Map { key, value } => self.child_flags([*key, *value]),
            TypeData::Struct(fields) => self.child_flags(fields.iter().map(|f| f.ty)),
            TypeData::Interface(data) => {
                let mut flags = self.child_flags(data.methods.iter().map(|m| m.sig));
                if let Some(terms) = &data.terms {
                    flags |= self.child_flags(terms.iter().map(|t| t.ty));
                }
                if !data.is_basic() {
                    flags |= TypeFlags::IS_CONSTRAINT;
                }
                flags
            }
            TypeData::Func(sig) => {
                self.child_flags(sig.params.iter().chain(sig.results.iter()).copied())
            }
            TypeData::Tuple(elems) => self.child_flags(elems.iter().copied()),
            TypeData::Named(_) => TypeFlags::IS_NAMED,
            TypeData::TypeParam(_) => TypeFlags::HAS_TYPE_PARAM,
        }
    }

    /// Intern a structural type.
    pub fn intern(&mut self, data: TypeData) -> Idx {
        if let Some(&idx) = self.interned.get(&data) {
            return idx;
        }
        let flags = self.compute_flags(&data);
        let idx = self.push(data.clone(), flags);
        self.interned.insert(data, idx);
        idx
    }

    #[inline]
    pub fn data(&self, idx: Idx) -> &TypeData {
        &self.types[idx.index()]
    }

    #[inline]
    pub fn flags(&self, idx: Idx) -> TypeFlags {
        self.flags[idx.index()]
    }

    pub fn has_type_params(&self, idx: Idx) -> bool {
        self.flags(idx).contains(TypeFlags::HAS_TYPE_PARAM)
    }

    // === Constructors ===

    pub fn pointer(&mut self, elem: Idx) -> Idx {
        self.intern(TypeData::Pointer(elem))
    }

    pub fn slice(&mut self, elem: Idx) -> Idx {
        self.intern(TypeData::Slice(elem))
    }

    pub fn array(&mut self, len: u64, elem: Idx) -> Idx {
        self.intern(TypeData::Array { len, elem })
    }

    pub fn map(&mut self, key: Idx, value: Idx) -> Idx {
        self.intern(TypeData::Map { key, value })
    }

    pub fn chan(&mut self, dir: ChanDir, elem: Idx) -> Idx {
        self.intern(TypeData::Chan { dir, elem })
    }

    pub fn func(&mut self, params: Vec<Idx>, results: Vec<Idx>, variadic: bool) -> Idx {
        self.intern(TypeData::Func(Signature {
            params,
            results,
            variadic,
        }))
    }

    /// Result tuple; a single result is returned as itself.
    pub fn tuple(&mut self, elems: Vec<Idx>) -> Idx {
        if elems.len() == 1 {
            return elems[0];
        }
        self.intern(TypeData::Tuple(elems))
    }

    pub fn struct_type(&mut self, fields: Vec<StructField>) -> Idx {
        self.intern(TypeData::Struct(fields))
    }

    /// Intern an interface, canonicalizing method order.
    pub fn interface(&mut self, mut data: InterfaceData) -> Idx {
        data.methods.sort_by_key(|m| m.name);
        self.intern(TypeData::Interface(data))
    }

    /// Build an interface from explicit methods, embedded interfaces and
    /// union elements. Type sets of all elements are intersected.
    pub fn make_interface(
        &mut self,
        methods: Vec<IfaceMethod>,
        embedded: &[Idx],
        unions: Vec<Vec<Term>>,
    ) -> Result<Idx, InterfaceError> {
        let mut all: Vec<IfaceMethod> = Vec::new();
        let add = |m: IfaceMethod, all: &mut Vec<IfaceMethod>| -> Result<(), InterfaceError> {
            match all.iter().find(|e| e.name == m.name) {
                Some(existing) if existing.sig != m.sig => {
                    return Err(InterfaceError::DuplicateMethod(m.name))
                }
                Some(_) => {}
                None => all.push(m),
            }
            Ok(())
        };
        for m in methods {
            add(m, &mut all)?;
        }

        let mut terms: Option<Vec<Term>> = None;
        let mut comparable = false;
        for &e in embedded {
            let Some(data) = self.interface_data(e).cloned() else {
                return Err(InterfaceError::NotAnInterface(e));
            };
            for m in data.methods {
                add(m, &mut all)?;
            }
            comparable |= data.comparable;
            if let Some(t) = data.terms {
                terms = Some(match terms {
                    None => t,
                    Some(prev) => self.intersect_terms(&prev, &t),
                });
            }
        }
        for union in unions {
            terms = Some(match terms {
                None => union,
                Some(prev) => self.intersect_terms(&prev, &union),
            });
        }

        Ok(self.interface(InterfaceData {
            methods: all,
            terms,
            comparable,
        }))
    }

    fn intersect_terms(&self, a: &[Term], b: &[Term]) -> Vec<Term> {
        let mut out = Vec::new();
        for x in a {
            for y in b {
                if self.term_includes(y, x) {
                    out.push(*x);
                } else if self.term_includes(x, y) {
                    out.push(*y);
                }
            }
        }
        out.dedup();
        out
    }

    /// Whether every type in `inner` is also in `outer`.
    fn term_includes(&self, outer: &Term, inner: &Term) -> bool {
        match (outer.tilde, inner.tilde) {
            (_, false) if outer.tilde => self.underlying(inner.ty) == outer.ty,
            (false, false) | (true, true) => outer.ty == inner.ty,
            _ => false,
        }
    }

    // === Named types ===

    /// Create a fresh named type with no underlying type yet.
    pub fn new_named(&mut self, name: Name, origin: Option<Origin>) -> Idx {
        let mut flags = TypeFlags::IS_NAMED;
        if let Some(origin) = &origin {
            flags |= TypeFlags::IS_INSTANCE | self.child_flags(origin.args.iter().copied());
        }
        let index = u32::try_from(self.named.len()).unwrap_or(u32::MAX);
        self.named.push(NamedInfo {
            name,
            underlying: Idx::INVALID,
            methods: Vec::new(),
            origin,
        });
        self.push(TypeData::Named(index), flags)
    }

    /// Set a named type's underlying type. Named targets are unwrapped to
    /// their own underlying type.
    pub fn set_underlying(&mut self, named: Idx, underlying: Idx) {
        let underlying = self.underlying(underlying);
        let extra = self.flags(underlying) & TypeFlags::IS_CONSTRAINT;
        self.flags[named.index()] |= extra;
        self.named_info_mut(named).underlying = underlying;
    }

    pub fn named_info(&self, idx: Idx) -> Option<&NamedInfo> {
        match self.data(idx) {
            TypeData::Named(i) => self.named.get(*i as usize),
            _ => None,
        }
    }

    fn named_info_mut(&mut self, idx: Idx) -> &mut NamedInfo {
        let TypeData::Named(i) = self.types[idx.index()] else {
            panic!("named_info_mut on non-named type {idx:?}");
        };
        &mut self.named[i as usize]
    }

    /// Attach a method. Returns false if the name is already declared.
    pub fn add_method(&mut self, named: Idx, method: MethodSig) -> bool {
        if self.named_info(named).is_none() {
            return false;
        }
        let info = self.named_info_mut(named);
        if info.methods.iter().any(|m| m.name == method.name) {
            return false;
        }
        info.methods.push(method);
        true
    }

    // === Type parameters ===

    pub fn new_type_param(&mut self, name: Name, index: u32) -> Idx {
        let i = u32::try_from(self.params.len()).unwrap_or(u32::MAX);
        self.params.push(TypeParamInfo {
            name,
            index,
            constraint: Idx::INVALID,
        });
        self.push(TypeData::TypeParam(i), TypeFlags::HAS_TYPE_PARAM)
    }

    pub fn set_constraint(&mut self, param: Idx, constraint: Idx) {
        if let TypeData::TypeParam(i) = self.types[param.index()] {
            self.params[i as usize].constraint = constraint;
        }
    }

    pub fn type_param_info(&self, idx: Idx) -> Option<&TypeParamInfo> {
        match self.data(idx) {
            TypeData::TypeParam(i) => self.params.get(*i as usize),
            _ => None,
        }
    }

    // === Accessors (through the underlying type) ===

    /// Underlying type: the declared structure of a named type, the type
    /// itself otherwise.
    pub fn underlying(&self, idx: Idx) -> Idx {
        match self.named_info(idx) {
            Some(info) => info.underlying,
            None => idx,
        }
    }

    pub fn underlying_data(&self, idx: Idx) -> &TypeData {
        self.data(self.underlying(idx))
    }

    pub fn basic_kind(&self, idx: Idx) -> Option<BasicKind> {
        match self.underlying_data(idx) {
            TypeData::Basic(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn signature(&self, idx: Idx) -> Option<&Signature> {
        match self.underlying_data(idx) {
            TypeData::Func(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn interface_data(&self, idx: Idx) -> Option<&InterfaceData> {
        match self.underlying_data(idx) {
            TypeData::Interface(data) => Some(data),
            _ => None,
        }
    }

    pub fn struct_fields(&self, idx: Idx) -> Option<&[StructField]> {
        match self.underlying_data(idx) {
            TypeData::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Elements of a result tuple; a non-tuple type is its own single element.
    pub fn results_of(&self, idx: Idx) -> Vec<Idx> {
        match self.data(idx) {
            TypeData::Tuple(elems) => elems.clone(),
            _ => vec![idx],
        }
    }

    /// Pointee of a pointer type.
    pub fn pointer_elem(&self, idx: Idx) -> Option<Idx> {
        match self.underlying_data(idx) {
            TypeData::Pointer(e) => Some(*e),
            _ => None,
        }
    }

    /// Element type of arrays, slices, channels, pointers and map values.
    pub fn elem(&self, idx: Idx) -> Option<Idx> {
        match self.underlying_data(idx) {
            TypeData::Pointer(e) | TypeData::Slice(e) => Some(*e),
            TypeData::Array { elem, .. } | TypeData::Chan { elem, .. } => Some(*elem),
            TypeData::Map { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn map_key(&self, idx: Idx) -> Option<Idx> {
        match self.underlying_data(idx) {
            TypeData::Map { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn chan_dir(&self, idx: Idx) -> Option<ChanDir> {
        match self.underlying_data(idx) {
            TypeData::Chan { dir, .. } => Some(*dir),
            _ => None,
        }
    }

    pub fn array_len(&self, idx: Idx) -> Option<u64> {
        match self.underlying_data(idx) {
            TypeData::Array { len, .. } => Some(*len),
            _ => None,
        }
    }
}
