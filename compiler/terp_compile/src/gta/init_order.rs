//! Initialization order of package variables.
//!
//! A variable initializes after every package variable its initializer
//! refers to, directly or through the bodies of the functions and methods
//! it refers to. Selectors are untyped at this point, so `x.m` counts as a
//! reference to every method named `m` declared in the unit.

use rustc_hash::{FxHashMap, FxHashSet};
use terp_diagnostic::{Diagnostic, ErrorCode};
use terp_ir::{Ast, Name, NodeId, NodeKind, SourceFile, Span};
use tracing::{debug, trace};

use crate::CompileContext;

/// Top-level declarations an initializer can reach.
#[derive(Default)]
struct Decls {
    vars: FxHashMap<Name, NodeId>,
    funcs: FxHashMap<Name, NodeId>,
    /// Every method declared under a name.
    methods: FxHashMap<Name, Vec<NodeId>>,
    /// Variable specs in declaration order.
    specs: Vec<NodeId>,
}

impl Decls {
    fn collect(ast: &Ast, files: &[SourceFile], blank: Name, init: Name) -> Self {
        let mut decls = Decls::default();
        for &decl in files.iter().flat_map(|f| f.decls.iter()) {
            match ast.kind(decl) {
                NodeKind::FuncDecl {
                    name, recv: Some(_), ..
                } => decls.methods.entry(*name).or_default().push(decl),
                NodeKind::FuncDecl { name, .. } if *name != init => {
                    decls.funcs.insert(*name, decl);
                }
                NodeKind::VarDecl(specs) => {
                    for &spec in specs {
                        let NodeKind::ValueSpec { names, .. } = ast.kind(spec) else {
                            continue;
                        };
                        for &name in names.iter().filter(|&&n| n != blank) {
                            decls.vars.insert(name, spec);
                        }
                        decls.specs.push(spec);
                    }
                }
                _ => {}
            }
        }
        decls
    }
}

/// Collects the package-level declarations a subtree refers to. Names
/// declared locally shadow package names for the rest of their scope.
struct Refs<'a> {
    ast: &'a Ast,
    decls: &'a Decls,
    scopes: Vec<FxHashSet<Name>>,
    out: Vec<NodeId>,
}

impl<'a> Refs<'a> {
    fn new(ast: &'a Ast, decls: &'a Decls) -> Self {
        Refs {
            ast,
            decls,
            scopes: vec![FxHashSet::default()],
            out: Vec::new(),
        }
    }

    fn shadowed(&self, name: Name) -> bool {
        self.scopes.iter().any(|scope| scope.contains(&name))
    }

    fn declare(&mut self, name: Name) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name);
        }
    }

    fn declare_ident(&mut self, node: NodeId) {
        if let NodeKind::Ident(name) = *self.ast.kind(node) {
            self.declare(name);
        }
    }

    fn declare_fields(&mut self, fields: &[NodeId]) {
        let ast: &'a Ast = self.ast;
        for &field in fields {
            if let NodeKind::Field { names, ty } = ast.kind(field) {
                self.walk(*ty);
                for &name in names {
                    self.declare(name);
                }
            }
        }
    }

    fn declare_sig(&mut self, sig: NodeId) {
        let ast: &'a Ast = self.ast;
        if let NodeKind::FuncType {
            params, results, ..
        } = ast.kind(sig)
        {
            self.declare_fields(params);
            self.declare_fields(results);
        }
    }

    fn scoped(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(FxHashSet::default());
        f(self);
        self.scopes.pop();
    }

    fn walk_opt(&mut self, node: Option<NodeId>) {
        if let Some(node) = node {
            self.walk(node);
        }
    }

    fn walk_all(&mut self, nodes: &[NodeId]) {
        for &node in nodes {
            self.walk(node);
        }
    }

    fn walk(&mut self, node: NodeId) {
        terp_stack::ensure_sufficient_stack(|| self.walk_inner(node));
    }

    fn walk_inner(&mut self, node: NodeId) {
        let ast: &'a Ast = self.ast;
        match ast.kind(node) {
            NodeKind::Ident(name) => {
                if self.shadowed(*name) {
                    return;
                }
                let decls = self.decls;
                if let Some(&decl) = decls.vars.get(name).or_else(|| decls.funcs.get(name)) {
                    self.out.push(decl);
                }
            }
            NodeKind::Selector { base, sel } => {
                self.walk(*base);
                if let Some(methods) = self.decls.methods.get(sel) {
                    self.out.extend(methods.iter().copied());
                }
            }
            NodeKind::Block(stmts) => self.scoped(|r| r.walk_all(stmts)),
            NodeKind::Define { lhs, rhs } => {
                self.walk_all(rhs);
                for &target in lhs {
                    self.declare_ident(target);
                }
            }
            NodeKind::ValueSpec { names, ty, values } => {
                self.walk_opt(*ty);
                self.walk_all(values);
                for &name in names {
                    self.declare(name);
                }
            }
            NodeKind::TypeSpec { name, ty, .. } => {
                self.declare(*name);
                self.walk(*ty);
            }
            NodeKind::FuncLit { sig, body } => self.scoped(|r| {
                r.declare_sig(*sig);
                r.walk(*body);
            }),
            kind @ (NodeKind::If { .. } | NodeKind::For { .. } | NodeKind::Switch { .. }) => {
                self.scoped(|r| r.walk_all(&kind.children()));
            }
            NodeKind::TypeSwitch {
                init,
                bind,
                expr,
                clauses,
            } => self.scoped(|r| {
                r.walk_opt(*init);
                r.walk(*expr);
                if let Some(bind) = bind {
                    r.declare(*bind);
                }
                r.walk_all(clauses);
            }),
            NodeKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => {
                self.walk(*expr);
                self.scoped(|r| {
                    for target in [key, value].into_iter().flatten() {
                        if *define {
                            r.declare_ident(*target);
                        } else {
                            r.walk(*target);
                        }
                    }
                    r.walk(*body);
                });
            }
            NodeKind::CaseClause { exprs, body, .. } => {
                self.walk_all(exprs);
                self.scoped(|r| r.walk_all(body));
            }
            NodeKind::CommClause { comm, body } => self.scoped(|r| {
                r.walk_opt(*comm);
                r.walk_all(body);
            }),
            NodeKind::Field { ty, .. } => self.walk(*ty),
            kind => self.walk_all(&kind.children()),
        }
    }
}

/// Declarations `decl` refers to, each once, in first-reference order.
fn references(ast: &Ast, decls: &Decls, decl: NodeId) -> Vec<NodeId> {
    let mut refs = Refs::new(ast, decls);
    match ast.kind(decl) {
        NodeKind::ValueSpec { ty, values, .. } => {
            refs.walk_opt(*ty);
            refs.walk_all(values);
        }
        NodeKind::FuncDecl {
            recv,
            type_params,
            sig,
            body,
            ..
        } => {
            if let Some(recv) = recv {
                refs.declare_fields(std::slice::from_ref(recv));
            }
            refs.declare_fields(type_params);
            refs.declare_sig(*sig);
            refs.walk_opt(*body);
        }
        _ => {}
    }
    let mut seen = FxHashSet::default();
    refs.out.retain(|d| seen.insert(*d));
    refs.out
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Visit {
    Active,
    Done,
}

/// Depth-first walk over the reference graph. Variables are emitted after
/// everything they reach.
struct Order<'a> {
    ast: &'a Ast,
    decls: &'a Decls,
    marks: FxHashMap<NodeId, Visit>,
    path: Vec<NodeId>,
    order: Vec<NodeId>,
    cycles: Vec<Vec<NodeId>>,
}

impl<'a> Order<'a> {
    fn new(ast: &'a Ast, decls: &'a Decls) -> Self {
        Order {
            ast,
            decls,
            marks: FxHashMap::default(),
            path: Vec::new(),
            order: Vec::new(),
            cycles: Vec::new(),
        }
    }

    fn is_var(&self, decl: NodeId) -> bool {
        matches!(self.ast.kind(decl), NodeKind::ValueSpec { .. })
    }

    fn visit(&mut self, decl: NodeId) {
        terp_stack::ensure_sufficient_stack(|| self.visit_inner(decl));
    }

    fn visit_inner(&mut self, decl: NodeId) {
        match self.marks.get(&decl).copied() {
            Some(Visit::Done) => return,
            Some(Visit::Active) => {
                self.close_cycle(decl);
                return;
            }
            None => {}
        }
        self.marks.insert(decl, Visit::Active);
        self.path.push(decl);
        for dep in references(self.ast, self.decls, decl) {
            self.visit(dep);
        }
        self.path.pop();
        self.marks.insert(decl, Visit::Done);
        if self.is_var(decl) {
            self.order.push(decl);
        }
    }

    /// Record the cycle ending at `decl`, rotated to start at a variable.
    ///
    /// Cycles among variables alone were already reported while resolving
    /// their types, and recursion among functions is allowed.
    fn close_cycle(&mut self, decl: NodeId) {
        let Some(start) = self.path.iter().position(|&d| d == decl) else {
            return;
        };
        let mut cycle = self.path[start..].to_vec();
        let Some(first_var) = cycle.iter().position(|&d| self.is_var(d)) else {
            return;
        };
        if cycle.iter().all(|&d| self.is_var(d)) {
            return;
        }
        cycle.rotate_left(first_var);
        trace!(len = cycle.len(), "initialization cycle");
        self.cycles.push(cycle);
    }
}

impl CompileContext {
    /// Sort the unit's variable initializers into dependency order and
    /// report variables that depend on themselves through a function body.
    pub(super) fn order_var_inits(&mut self, files: &[SourceFile]) {
        let decls = Decls::collect(&self.ast, files, self.names.blank, self.names.init);
        if decls.specs.is_empty() {
            return;
        }
        let mut walk = Order::new(&self.ast, &decls);
        for &spec in &decls.specs {
            walk.visit(spec);
        }
        let Order { order, cycles, .. } = walk;

        for cycle in &cycles {
            let diag = self.cycle_diagnostic(cycle);
            self.diagnostics.push(diag);
        }
        let rank: FxHashMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, &spec)| (spec, i)).collect();
        self.var_inits
            .sort_by_key(|(spec, _)| rank.get(spec).copied().unwrap_or(usize::MAX));
        debug!(vars = order.len(), cycles = cycles.len(), "initialization order");
    }

    fn cycle_diagnostic(&self, cycle: &[NodeId]) -> Diagnostic {
        let label = |decl: NodeId| match self.ast.kind(decl) {
            NodeKind::ValueSpec { names, .. } => names
                .iter()
                .find(|&&n| n != self.names.blank)
                .map_or("_", |&n| self.interner.lookup(n)),
            NodeKind::FuncDecl { name, .. } => self.interner.lookup(*name),
            _ => "?",
        };
        let mut chain: Vec<&str> = cycle.iter().map(|&d| label(d)).collect();
        let head = chain.first().copied().unwrap_or("?");
        chain.push(head);
        let span = cycle.first().map_or(Span::DUMMY, |&d| self.ast.span(d));
        Diagnostic::error(ErrorCode::E1004)
            .with_message(format!("initialization cycle: {}", chain.join(" refers to ")))
            .with_label(span, "initialized here")
    }
}
