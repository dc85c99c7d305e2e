//! The compile context and the per-unit driver.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use terp_diagnostic::{CompileError, Diagnostic, ErrorCode};
use terp_eval::program::{Dispatch, DispatchTarget, RecvStep};
use terp_eval::{FuncId, HostPackage, Program, SymbolProvider};
use terp_ir::{Ast, Name, NodeId, Package, SharedInterner, SourceFile};
use terp_types::{Idx, Pool, Selection, TypeData};
use tracing::{debug, instrument};

use crate::error::Halt;
use crate::generics::GenericDecl;
use crate::lower::FuncState;
use crate::scope::{universe, GenericId, Scope, ScopeKind, Symbol};

/// Names the compiler checks for by identity.
#[derive(Copy, Clone, Debug)]
pub(crate) struct WellKnown {
    pub blank: Name,
    pub iota: Name,
    pub init: Name,
    pub main: Name,
}

/// A function body waiting to be lowered.
#[derive(Clone, Debug)]
pub(crate) struct Job {
    pub func: FuncId,
    /// The `FuncDecl` node.
    pub decl: NodeId,
    pub file: usize,
    /// Type parameter bindings of a generic instance.
    pub env: Vec<(Name, Idx)>,
}

/// Result of compiling an incremental unit.
#[derive(Clone)]
pub struct EvalUnit {
    pub program: Arc<Program>,
    /// Function running the unit's top-level statements, if it has any.
    pub func: Option<FuncId>,
    /// `func` returns the value of a trailing expression statement.
    pub has_value: bool,
}

/// Everything a compile session accumulates.
///
/// Cloning is how a unit is made atomic: the driver snapshots the context
/// before a unit and puts the snapshot back if the unit fails.
#[derive(Clone)]
pub struct CompileContext {
    pub(crate) interner: SharedInterner,
    pub(crate) pool: Pool,
    pub(crate) ast: Ast,
    pub(crate) program: Program,

    pub(crate) universe: Scope,
    pub(crate) package: Scope,
    /// Import scopes, one per source file ever compiled.
    pub(crate) files: Vec<Scope>,
    /// Index of the file whose code is being resolved.
    pub(crate) file: usize,

    pub(crate) providers: Vec<Arc<dyn SymbolProvider>>,
    pub(crate) imports: Vec<Arc<HostPackage>>,
    /// Named types made for host types, by package index and member name.
    pub(crate) host_types: FxHashMap<(usize, String), Idx>,
    /// Root-frame slots holding host variables.
    pub(crate) host_vars: FxHashMap<(usize, String), u32>,

    pub(crate) generics: Vec<GenericDecl>,
    pub(crate) func_instances: FxHashMap<(GenericId, Vec<Idx>), (FuncId, Idx)>,
    pub(crate) type_instances: FxHashMap<(GenericId, Vec<Idx>), Idx>,
    pub(crate) instantiations: usize,

    /// Declared methods by receiver base type and name.
    pub(crate) methods: FxHashMap<(Idx, Name), FuncId>,
    /// Types that may show up as the dynamic type of an interface value.
    pub(crate) dyn_types: FxHashSet<Idx>,
    /// Named types whose underlying type is not resolved yet.
    pub(crate) unresolved: FxHashSet<Idx>,
    /// Methods of the unit not attached yet; selector misses retry until
    /// this drops to zero.
    pub(crate) pending_methods: usize,

    pub(crate) jobs: VecDeque<Job>,
    pub(crate) diagnostics: Vec<Diagnostic>,

    /// Local scopes of the body being lowered.
    pub(crate) scopes: Vec<Scope>,
    /// Functions being lowered, innermost last.
    pub(crate) funcs: Vec<FuncState>,
    /// Fresh initializer chunk for the next variable spec.
    pub(crate) init: Option<FuncState>,
    /// Initializer chunk of each variable spec of the current unit.
    pub(crate) var_inits: Vec<(NodeId, FuncState)>,
    /// Init functions of the current unit, in declaration order.
    pub(crate) init_funcs: Vec<FuncId>,
    /// Value of `iota` inside a constant declaration.
    pub(crate) iota: Option<i128>,
    pub(crate) names: WellKnown,
    /// Incremental units may rebind top-level names.
    pub(crate) replacing: bool,
}

impl CompileContext {
    pub fn new(interner: SharedInterner) -> Self {
        Self::with_providers(interner, Vec::new())
    }

    pub fn with_providers(
        interner: SharedInterner,
        providers: Vec<Arc<dyn SymbolProvider>>,
    ) -> Self {
        let names = WellKnown {
            blank: interner.intern("_"),
            iota: interner.intern("iota"),
            init: interner.intern("init"),
            main: interner.intern("main"),
        };
        CompileContext {
            pool: Pool::new(interner.clone()),
            ast: Ast::new(),
            program: Program::new(interner.clone()),
            universe: universe(&interner),
            package: Scope::new(ScopeKind::Package, 0),
            files: Vec::new(),
            file: 0,
            providers,
            imports: Vec::new(),
            host_types: FxHashMap::default(),
            host_vars: FxHashMap::default(),
            generics: Vec::new(),
            func_instances: FxHashMap::default(),
            type_instances: FxHashMap::default(),
            instantiations: 0,
            methods: FxHashMap::default(),
            dyn_types: FxHashSet::default(),
            unresolved: FxHashSet::default(),
            pending_methods: 0,
            jobs: VecDeque::new(),
            diagnostics: Vec::new(),
            scopes: Vec::new(),
            funcs: Vec::new(),
            init: None,
            var_inits: Vec::new(),
            init_funcs: Vec::new(),
            iota: None,
            names,
            replacing: false,
            interner,
        }
    }

    pub fn add_provider(&mut self, provider: Arc<dyn SymbolProvider>) {
        self.providers.push(provider);
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The program compiled so far.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Package-level symbol named `name`.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.package.get(self.interner.intern(name))
    }

    /// Number of distinct generic instances created in this session.
    pub fn instantiation_count(&self) -> usize {
        self.instantiations
    }

    /// Compile a complete package. Top-level statements are rejected.
    #[instrument(level = "debug", skip_all, fields(files = pkg.files.len()))]
    pub fn compile_package(&mut self, pkg: Package) -> Result<Arc<Program>, CompileError> {
        let snapshot = self.clone();
        match self.compile_unit(pkg, false) {
            Ok(unit) => Ok(unit.program),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    /// Compile an incremental unit on top of everything compiled before.
    ///
    /// Top-level declarations may replace earlier ones; top-level statements
    /// become a function whose locals are package variables, so later units
    /// see them.
    #[instrument(level = "debug", skip_all, fields(files = pkg.files.len()))]
    pub fn compile_eval(&mut self, pkg: Package) -> Result<EvalUnit, CompileError> {
        let snapshot = self.clone();
        match self.compile_unit(pkg, true) {
            Ok(unit) => Ok(unit),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    fn compile_unit(&mut self, pkg: Package, eval: bool) -> Result<EvalUnit, CompileError> {
        let Package { ast, files } = pkg;
        let offset = self.ast.absorb(ast);
        let files: Vec<SourceFile> = files.into_iter().map(|f| f.shifted(offset)).collect();

        self.diagnostics.clear();
        self.replacing = eval;
        self.init = None;
        self.var_inits.clear();
        self.init_funcs.clear();

        let file_base = self.files.len();
        for file in &files {
            self.bind_file(file, eval);
        }
        if !eval {
            for &stmt in files.iter().flat_map(|f| f.stmts.iter()) {
                self.diagnostics.push(
                    Diagnostic::error(ErrorCode::E1008)
                        .with_message("statement outside function body")
                        .with_label(self.ast.span(stmt), "not inside a function"),
                );
            }
        }

        self.run_gta(&files, file_base);

        let (func, has_value) = if eval {
            self.lower_eval(&files, file_base)
        } else {
            (None, false)
        };

        self.drain_jobs();
        self.finish_inits();
        self.publish_types();

        debug!(
            nodes = self.program.node_count(),
            funcs = self.program.func_count(),
            errors = self.diagnostics.len(),
            "unit compiled"
        );

        if !self.diagnostics.is_empty() {
            return Err(CompileError::new(std::mem::take(&mut self.diagnostics)));
        }
        Ok(EvalUnit {
            program: Arc::new(self.program.clone()),
            func,
            has_value,
        })
    }

    /// Record a failure that can no longer be retried.
    pub(crate) fn report(&mut self, halt: Halt) {
        let diag = halt.into_diagnostic(&self.interner);
        self.diagnostics.push(diag);
    }

    /// Mark `ty` as a possible dynamic type of interface values.
    pub(crate) fn record_dyn_type(&mut self, ty: Idx) {
        if !ty.is_untyped() && !self.pool.has_type_params(ty) {
            self.dyn_types.insert(ty);
        }
    }

    /// Publish type names and interface dispatch tables for every recorded
    /// dynamic type. Method sets may have grown since the last unit, so
    /// tables are rebuilt each time.
    fn publish_types(&mut self) {
        let mut types: Vec<Idx> = self.dyn_types.iter().copied().collect();
        types.sort();
        for ty in types {
            let name = self.pool.display(ty);
            self.program.set_type_name(ty, name);
            if self.pool.is_interface(ty) {
                continue;
            }
            for (name, sel) in self.pool.method_set(ty) {
                if let Some(dispatch) = self.dispatch_for(ty, name, &sel) {
                    self.program.set_method(ty, name, dispatch);
                }
            }
        }
    }

    /// How an interface holding a `ty` reaches the method `sel` selects.
    fn dispatch_for(&self, ty: Idx, name: Name, sel: &Selection) -> Option<Dispatch> {
        let mut steps = SmallVec::new();
        let mut at_ptr = matches!(self.pool.data(ty), TypeData::Pointer(_));
        let mut cur = if at_ptr {
            self.pool.pointer_elem(ty)?
        } else {
            ty
        };
        for step in sel.path() {
            let field = self.pool.struct_fields(cur)?.get(step.index as usize)?;
            steps.push(RecvStep::Field(step.index));
            let pointee = self.pool.pointer_elem(field.ty);
            if at_ptr && pointee.is_some() {
                steps.push(RecvStep::Deref);
            }
            at_ptr |= pointee.is_some();
            cur = pointee.unwrap_or(field.ty);
        }
        let target = match sel {
            Selection::Method { recv, method, .. } => {
                let func = *self.methods.get(&(*recv, method.name))?;
                if at_ptr && !method.ptr_recv {
                    steps.push(RecvStep::Deref);
                }
                DispatchTarget::Func(func)
            }
            Selection::IfaceMethod { .. } => {
                if at_ptr {
                    steps.push(RecvStep::Deref);
                }
                DispatchTarget::Iface(name)
            }
            Selection::Field { .. } => return None,
        };
        Some(Dispatch { steps, target })
    }
}

