//! Symbols and lexical scopes.
//!
//! The universe, package and per-file import scopes live in the compile
//! context for the whole session. Function, block and loop scopes are
//! pushed on a stack while a body is lowered; a name is looked up from the
//! innermost local scope outwards, then in the file, package and universe
//! scopes.
//!
//! Every local scope records the frame depth its variables live at. Scopes
//! at the same depth share one frame layout, so slots of a popped block stay
//! reserved and the frame size is the largest index handed out at that depth.

mod universe;


pub(crate) use universe::universe;

use rustc_hash::FxHashMap;
use terp_eval::{FuncId, Value};
use terp_ir::{Name, NodeId, Span};
use terp_types::{ConstValue, Idx};

use crate::error::{fail, Check, Halt};
use crate::CompileContext;
use terp_diagnostic::ErrorCode;

/// Id of a generic function or type declaration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GenericId(pub(crate) u32);

impl GenericId {
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Const,
    Func,
    Type,
    Package,
    Builtin,
    Nil,
    /// Declared by the GTA but not resolved yet.
    Pending,
}

/// Built-in functions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuiltinFn {
    Append,
    Cap,
    Clear,
    Close,
    Copy,
    Delete,
    Len,
    Make,
    Max,
    Min,
    New,
    Panic,
    Print,
    Println,
    Recover,
}

/// Where a symbol's value lives.
#[derive(Clone, Debug)]
pub enum Storage {
    None,
    /// Slot of the root frame.
    Global(u32),
    /// Slot `index` of the frame at absolute depth `depth`.
    Local { depth: u32, index: u32 },
    Func(FuncId),
    Generic(GenericId),
    /// A host function or constant value.
    Host(Value),
    /// Index into the context's imported host packages.
    Package(usize),
    Builtin(BuiltinFn),
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: Name,
    pub kind: SymbolKind,
    pub ty: Idx,
    pub storage: Storage,
    pub value: Option<ConstValue>,
    pub decl: Option<NodeId>,
}

impl Symbol {
    pub fn new(name: Name, kind: SymbolKind, ty: Idx, storage: Storage) -> Self {
        Symbol {
            name,
            kind,
            ty,
            storage,
            value: None,
            decl: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: ConstValue) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn with_decl(mut self, decl: NodeId) -> Self {
        self.decl = Some(decl);
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Universe,
    Package,
    File,
    /// Type parameter names bound to the type arguments of an instance.
    TypeParams,
    Function,
    Block,
    Loop,
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Frame depth of variables declared here.
    pub depth: u32,
    symbols: FxHashMap<Name, Symbol>,
}

impl Scope {
    pub fn new(kind: ScopeKind, depth: u32) -> Self {
        Scope {
            kind,
            depth,
            symbols: FxHashMap::default(),
        }
    }

    pub fn get(&self, name: Name) -> Option<&Symbol> {
        self.symbols.get(&name)
    }

    pub fn contains(&self, name: Name) -> bool {
        self.symbols.contains_key(&name)
    }

    /// Insert, returning the symbol it replaces.
    pub fn insert(&mut self, symbol: Symbol) -> Option<Symbol> {
        self.symbols.insert(symbol.name, symbol)
    }

    pub fn remove(&mut self, name: Name) -> Option<Symbol> {
        self.symbols.remove(&name)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl CompileContext {
    /// Resolve `name` through the local scopes, the current file's imports,
    /// the package and the universe.
    pub(crate) fn find(&self, name: Name) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name))
            .or_else(|| self.files.get(self.file).and_then(|f| f.get(name)))
            .or_else(|| self.package.get(name))
            .or_else(|| self.universe.get(name))
    }

    /// Like [`CompileContext::find`], but a pending or missing name blocks.
    pub(crate) fn resolve_name(&self, name: Name, span: Span) -> Check<Symbol> {
        match self.find(name) {
            Some(sym) if sym.kind == SymbolKind::Pending => Err(Halt::Blocked {
                name,
                span,
                pending: true,
            }),
            Some(sym) => Ok(sym.clone()),
            None => Err(Halt::Blocked {
                name,
                span,
                pending: false,
            }),
        }
    }

    pub(crate) fn push_scope(&mut self, kind: ScopeKind) {
        let depth = self.depth();
        self.scopes.push(Scope::new(kind, depth));
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declare in the innermost local scope (or the package scope when no
    /// local scope is open). Redeclaring in the same scope is an error.
    pub(crate) fn declare(&mut self, symbol: Symbol, span: Span) -> Check<()> {
        let name = symbol.name;
        if name == self.names.blank {
            return Ok(());
        }
        // Top-level statements of an incremental unit may rebind names.
        let rebind = self.replacing && self.scopes.is_empty();
        let scope = match self.scopes.last_mut() {
            Some(scope) => scope,
            None => &mut self.package,
        };
        if scope.contains(name) && !rebind {
            return fail(
                ErrorCode::E1002,
                span,
                format!("{} redeclared in this block", self.interner.lookup(name)),
            );
        }
        scope.insert(symbol);
        Ok(())
    }

    /// Whether `name` is declared directly in the innermost scope.
    pub(crate) fn declared_here(&self, name: Name) -> bool {
        match self.scopes.last() {
            Some(scope) => scope.contains(name),
            None => self.package.contains(name),
        }
    }
}
