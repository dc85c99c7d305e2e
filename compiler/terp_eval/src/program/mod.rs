//! Compiled program: CFG node arena, function prototypes and the tables the
//! executor consults at run time.
//!
//! A `Program` only grows. Incremental evaluation clones the previous snapshot
//! and appends to it, so node and function ids handed out earlier stay valid.

mod op;

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use terp_ir::{Name, SharedInterner, Span};
use terp_types::Idx;

pub use op::{
    AssertTarget, Builtin, Callee, Conversion, Loc, NumKind, Op, OpKind, Place, PlaceBase,
    RangeKind, SelectCase, Src, Step,
};

use crate::Value;

/// Index of a CFG node.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct CfgId(u32);

impl CfgId {
    /// No successor: the function ends here.
    pub const NONE: CfgId = CfgId(u32::MAX);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Debug for CfgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "CfgId(none)")
        } else {
            write!(f, "CfgId({})", self.0)
        }
    }
}

/// Index of a function prototype.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct FuncId(u32);

impl FuncId {
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// One CFG node: an operation and its successors.
#[derive(Clone, Debug)]
pub struct CfgNode {
    pub op: Op,
    pub next: CfgId,
    /// False successor of `Branch`, done successor of `RangeNext`.
    pub alt: CfgId,
    pub span: Span,
}

impl CfgNode {
    pub fn new(op: Op, span: Span) -> Self {
        CfgNode {
            op,
            next: CfgId::NONE,
            alt: CfgId::NONE,
            span,
        }
    }
}

/// Frame layout and entry point of a compiled function.
///
/// Slots `0..nresults` hold results, then `nparams` parameters (the receiver
/// first for methods), then locals and temporaries.
#[derive(Clone, Debug)]
pub struct FuncProto {
    pub name: String,
    pub start: CfgId,
    pub frame_size: u32,
    pub nparams: u32,
    pub nresults: u32,
    pub result_zeros: Vec<Value>,
    pub span: Span,
}

/// How an interface method call reaches its implementation from the value
/// stored in the interface.
#[derive(Clone, Debug)]
pub struct Dispatch {
    pub steps: SmallVec<[RecvStep; 2]>,
    pub target: DispatchTarget,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecvStep {
    /// Select a field of a struct value (dereferencing a pointer first).
    Field(u32),
    /// Dereference a pointer receiver for a value method.
    Deref,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchTarget {
    Func(FuncId),
    /// Promoted through an embedded interface: dispatch again on it.
    Iface(Name),
    /// `Error()` of runtime fault values: the message with a
    /// `runtime error: ` prefix.
    RuntimeError,
    /// `Error()` of plain error values: the message itself.
    ErrorString,
}

#[derive(Clone)]
pub struct Program {
    nodes: Vec<CfgNode>,
    funcs: Vec<FuncProto>,
    methods: FxHashMap<(Idx, Name), Dispatch>,
    type_names: FxHashMap<Idx, String>,
    global_zeros: Vec<Value>,
    inits: Vec<FuncId>,
    entries: FxHashMap<String, FuncId>,
    interner: SharedInterner,
}

impl Program {
    pub fn new(interner: SharedInterner) -> Self {
        let mut type_names = FxHashMap::default();
        type_names.insert(Idx::RUNTIME_ERROR, "runtime.Error".to_string());
        type_names.insert(Idx::ERROR_STRING, "*errors.errorString".to_string());
        let error = interner.intern("Error");
        let mut methods = FxHashMap::default();
        for (ty, target) in [
            (Idx::RUNTIME_ERROR, DispatchTarget::RuntimeError),
            (Idx::ERROR_STRING, DispatchTarget::ErrorString),
        ] {
            methods.insert(
                (ty, error),
                Dispatch {
                    steps: SmallVec::new(),
                    target,
                },
            );
        }
        Program {
            nodes: Vec::new(),
            funcs: Vec::new(),
            methods,
            type_names,
            global_zeros: Vec::new(),
            inits: Vec::new(),
            entries: FxHashMap::default(),
            interner,
        }
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    // === Nodes ===

    pub fn push(&mut self, node: CfgNode) -> CfgId {
        let id = CfgId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX - 1));
        self.nodes.push(node);
        id
    }

    #[inline]
    pub fn node(&self, id: CfgId) -> &CfgNode {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn node_mut(&mut self, id: CfgId) -> &mut CfgNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // === Functions ===

    /// Reserve a function id before its body is lowered, so recursive and
    /// forward references can name it.
    pub fn reserve_func(&mut self, name: impl Into<String>, span: Span) -> FuncId {
        let id = FuncId(u32::try_from(self.funcs.len()).unwrap_or(u32::MAX));
        self.funcs.push(FuncProto {
            name: name.into(),
            start: CfgId::NONE,
            frame_size: 0,
            nparams: 0,
            nresults: 0,
            result_zeros: Vec::new(),
            span,
        });
        id
    }

    pub fn func(&self, id: FuncId) -> &FuncProto {
        &self.funcs[id.0 as usize]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut FuncProto {
        &mut self.funcs[id.0 as usize]
    }

    pub fn func_count(&self) -> usize {
        self.funcs.len()
    }

    // === Dispatch ===

    pub fn set_method(&mut self, ty: Idx, name: Name, dispatch: Dispatch) {
        self.methods.insert((ty, name), dispatch);
    }

    pub fn dispatch(&self, ty: Idx, name: Name) -> Option<&Dispatch> {
        self.methods.get(&(ty, name))
    }

    pub fn has_method(&self, ty: Idx, name: Name) -> bool {
        self.methods.contains_key(&(ty, name))
    }

    pub fn set_type_name(&mut self, ty: Idx, name: String) {
        self.type_names.entry(ty).or_insert(name);
    }

    pub fn type_name(&self, ty: Idx) -> &str {
        self.type_names.get(&ty).map_or("?", String::as_str)
    }

    // === Package state ===

    /// Append a package variable slot; returns its index.
    pub fn add_global(&mut self, zero: Value) -> u32 {
        let idx = u32::try_from(self.global_zeros.len()).unwrap_or(u32::MAX);
        self.global_zeros.push(zero);
        idx
    }

    pub fn global_zeros(&self) -> &[Value] {
        &self.global_zeros
    }

    /// Initializers run once, in push order, before any entry function.
    pub fn push_init(&mut self, func: FuncId) {
        self.inits.push(func);
    }

    pub fn inits(&self) -> &[FuncId] {
        &self.inits
    }

    pub fn set_entry(&mut self, name: impl Into<String>, func: FuncId) {
        self.entries.insert(name.into(), func);
    }

    pub fn entry(&self, name: &str) -> Option<FuncId> {
        self.entries.get(name).copied()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("nodes", &self.nodes.len())
            .field("funcs", &self.funcs.len())
            .field("methods", &self.methods.len())
            .field("globals", &self.global_zeros.len())
            .field("inits", &self.inits.len())
            .finish_non_exhaustive()
    }
}
