//! Global type analysis: declaring and resolving top-level names.
//!
//! Every top-level name enters the package scope before anything is
//! resolved, so declarations may refer to each other in any order and
//! across files. Resolution is a worklist: each pass tries every item and
//! keeps those blocked on a name that is still pending. The loop stops when
//! the list is empty or a pass makes no progress; what is left is reported
//! as undefined (unknown names) or as a cycle (pending names).

mod init_order;

#[cfg(test)]
mod tests;

use rustc_hash::FxHashSet;
use terp_diagnostic::ErrorCode;
use terp_ir::{Name, NodeId, NodeKind, SourceFile, Span};
use terp_types::{Idx, TypeData};
use tracing::{debug, instrument, trace};

use crate::context::Job;
use crate::error::{fail, Check, Halt};
use crate::scope::{Storage, Symbol, SymbolKind};
use crate::CompileContext;

/// One top-level declaration waiting to be resolved.
#[derive(Clone, Debug)]
enum Item {
    /// Underlying type of a declared named type.
    Type { spec: NodeId, named: Idx },
    Alias { spec: NodeId },
    Const {
        names: Vec<Name>,
        ty: Option<NodeId>,
        values: Vec<NodeId>,
        iota: i128,
        span: Span,
    },
    Var { spec: NodeId },
    Func { decl: NodeId },
    Method { decl: NodeId },
    Init { decl: NodeId },
}

#[derive(Clone, Debug)]
struct Pending {
    item: Item,
    file: usize,
}

impl Pending {
    /// Names the item settles, for poisoning after a hard error.
    fn names(&self, cx: &CompileContext) -> Vec<Name> {
        match &self.item {
            Item::Const { names, .. } => names.clone(),
            Item::Var { spec } => match cx.ast.kind(*spec) {
                NodeKind::ValueSpec { names, .. } => names.clone(),
                _ => Vec::new(),
            },
            Item::Alias { spec } => match cx.ast.kind(*spec) {
                NodeKind::TypeSpec { name, .. } => vec![*name],
                _ => Vec::new(),
            },
            Item::Func { decl } => match cx.ast.kind(*decl) {
                NodeKind::FuncDecl { name, .. } => vec![*name],
                _ => Vec::new(),
            },
            Item::Type { .. } | Item::Method { .. } | Item::Init { .. } => Vec::new(),
        }
    }
}

impl CompileContext {
    /// Declare and resolve the top-level declarations of `files`, whose
    /// import scopes start at `file_base`.
    #[instrument(level = "debug", skip_all, fields(files = files.len()))]
    pub(crate) fn run_gta(&mut self, files: &[SourceFile], file_base: usize) {
        let mut items = Vec::new();
        let mut methods = Vec::new();
        for (i, file) in files.iter().enumerate() {
            let file_index = file_base + i;
            for &decl in &file.decls {
                if let Err(halt) = self.declare_top(decl, file_index, &mut items, &mut methods) {
                    self.report(halt);
                }
            }
        }
        // Methods of generic types attach to the declaration, ahead of any
        // instantiation the worklist may trigger.
        for (decl, file) in methods {
            match self.generic_recv(decl) {
                Some(id) => {
                    if let Err(halt) = self.attach_generic_method(id, decl, file) {
                        self.report(halt);
                    }
                }
                None => {
                    self.pending_methods += 1;
                    items.push(Pending {
                        item: Item::Method { decl },
                        file,
                    });
                }
            }
        }
        self.resolve_items(items);
        self.order_var_inits(files);
    }

    fn resolve_items(&mut self, mut items: Vec<Pending>) {
        let mut pass = 0;
        while !items.is_empty() {
            pass += 1;
            let mut blocked = Vec::new();
            let mut progress = false;
            for pending in items {
                match self.resolve_item(&pending) {
                    Ok(()) => {
                        self.settle(&pending);
                        progress = true;
                    }
                    Err(halt @ Halt::Blocked { .. }) => blocked.push((pending, halt)),
                    Err(halt) => {
                        self.settle(&pending);
                        self.poison(&pending);
                        self.report(halt);
                        progress = true;
                    }
                }
            }
            trace!(pass, blocked = blocked.len(), "worklist pass");
            if !progress {
                self.pending_methods = 0;
                for (pending, halt) in blocked {
                    self.poison(&pending);
                    self.report(halt);
                }
                break;
            }
            items = blocked.into_iter().map(|(pending, _)| pending).collect();
        }
        self.pending_methods = 0;
        debug!(passes = pass, "declarations resolved");
    }

    fn settle(&mut self, pending: &Pending) {
        if matches!(pending.item, Item::Method { .. }) {
            self.pending_methods = self.pending_methods.saturating_sub(1);
        }
    }

    /// Settle names of a failed item so dependents report their own errors
    /// instead of blocking.
    fn poison(&mut self, pending: &Pending) {
        for name in pending.names(self) {
            let still_pending = self
                .package
                .get(name)
                .is_some_and(|sym| sym.kind == SymbolKind::Pending);
            if still_pending {
                self.package.insert(Symbol::new(
                    name,
                    SymbolKind::Const,
                    Idx::INVALID,
                    Storage::None,
                ));
            }
        }
        if let Item::Type { named, .. } = pending.item {
            self.unresolved.remove(&named);
            self.pool.set_underlying(named, Idx::INVALID);
        }
    }

    /// Enter a top-level declaration in the package scope.
    fn declare_top(
        &mut self,
        decl: NodeId,
        file: usize,
        items: &mut Vec<Pending>,
        methods: &mut Vec<(NodeId, usize)>,
    ) -> Check<()> {
        let span = self.ast.span(decl);
        match self.ast.kind(decl).clone() {
            NodeKind::FuncDecl { recv: Some(_), .. } => {
                methods.push((decl, file));
                Ok(())
            }
            NodeKind::FuncDecl {
                name, type_params, ..
            } => {
                if name == self.names.init {
                    if !type_params.is_empty() {
                        return fail(
                            ErrorCode::E2014,
                            span,
                            "func init must have no type parameters",
                        );
                    }
                    items.push(Pending {
                        item: Item::Init { decl },
                        file,
                    });
                    return Ok(());
                }
                if !type_params.is_empty() {
                    let id = self.declare_generic(name, decl, file, &type_params);
                    let sym = Symbol::new(name, SymbolKind::Func, Idx::INVALID, Storage::Generic(id))
                        .with_decl(decl);
                    return self.declare(sym, span);
                }
                self.declare_pending(name, decl, span)?;
                items.push(Pending {
                    item: Item::Func { decl },
                    file,
                });
                Ok(())
            }
            NodeKind::VarDecl(specs) => {
                for spec in specs {
                    if let NodeKind::ValueSpec { names, .. } = self.ast.kind(spec).clone() {
                        for name in names {
                            self.declare_pending(name, spec, self.ast.span(spec))?;
                        }
                        items.push(Pending {
                            item: Item::Var { spec },
                            file,
                        });
                    }
                }
                Ok(())
            }
            NodeKind::ConstDecl(specs) => {
                let mut last: Option<(Option<NodeId>, Vec<NodeId>)> = None;
                for (index, spec) in specs.into_iter().enumerate() {
                    let NodeKind::ValueSpec { names, ty, values } = self.ast.kind(spec).clone()
                    else {
                        continue;
                    };
                    let (ty, values) = match (values.is_empty(), &last) {
                        (true, Some((prev_ty, prev_values))) if ty.is_none() => {
                            (*prev_ty, prev_values.clone())
                        }
                        _ => {
                            last = Some((ty, values.clone()));
                            (ty, values)
                        }
                    };
                    let spec_span = self.ast.span(spec);
                    for &name in &names {
                        self.declare_pending(name, spec, spec_span)?;
                    }
                    items.push(Pending {
                        item: Item::Const {
                            names,
                            ty,
                            values,
                            iota: i128::try_from(index).unwrap_or(i128::MAX),
                            span: spec_span,
                        },
                        file,
                    });
                }
                Ok(())
            }
            NodeKind::TypeDecl(specs) => {
                for spec in specs {
                    self.declare_type(spec, file, items)?;
                }
                Ok(())
            }
            _ => fail(ErrorCode::E9001, span, "unexpected top-level declaration"),
        }
    }

    fn declare_pending(&mut self, name: Name, decl: NodeId, span: Span) -> Check<()> {
        let sym = Symbol::new(name, SymbolKind::Pending, Idx::INVALID, Storage::None).with_decl(decl);
        self.declare(sym, span)
    }

    fn declare_type(&mut self, spec: NodeId, file: usize, items: &mut Vec<Pending>) -> Check<()> {
        let span = self.ast.span(spec);
        let NodeKind::TypeSpec {
            name,
            type_params,
            alias,
            ..
        } = self.ast.kind(spec).clone()
        else {
            return Ok(());
        };
        if !type_params.is_empty() {
            if alias {
                return fail(ErrorCode::E2011, span, "generic type cannot be an alias");
            }
            let id = self.declare_generic(name, spec, file, &type_params);
            let sym = Symbol::new(name, SymbolKind::Type, Idx::INVALID, Storage::Generic(id))
                .with_decl(spec);
            return self.declare(sym, span);
        }
        if alias {
            self.declare_pending(name, spec, span)?;
            items.push(Pending {
                item: Item::Alias { spec },
                file,
            });
            return Ok(());
        }
        let named = self.pool.new_named(name, None);
        self.declare(
            Symbol::new(name, SymbolKind::Type, named, Storage::None).with_decl(spec),
            span,
        )?;
        self.unresolved.insert(named);
        items.push(Pending {
            item: Item::Type { spec, named },
            file,
        });
        Ok(())
    }

    fn resolve_item(&mut self, pending: &Pending) -> Check<()> {
        let file = pending.file;
        match pending.item.clone() {
            Item::Type { spec, named } => self.in_decl_context(file, &[], |cx| cx.resolve_named(spec, named)),
            Item::Alias { spec } => self.in_decl_context(file, &[], |cx| {
                let NodeKind::TypeSpec { name, ty, .. } = *cx.ast.kind(spec) else {
                    return Ok(());
                };
                let target = cx.resolve_type(ty)?;
                cx.package
                    .insert(Symbol::new(name, SymbolKind::Type, target, Storage::None).with_decl(spec));
                Ok(())
            }),
            Item::Const {
                names,
                ty,
                values,
                iota,
                span,
            } => self.in_decl_context(file, &[], |cx| {
                let consts = cx.const_spec(&names, ty, &values, iota, span)?;
                for (name, (ty, value)) in names.into_iter().zip(consts) {
                    if name == cx.names.blank {
                        continue;
                    }
                    cx.package.insert(
                        Symbol::new(name, SymbolKind::Const, ty, Storage::None).with_value(value),
                    );
                }
                Ok(())
            }),
            Item::Var { spec } => self.in_decl_context(file, &[], |cx| {
                let NodeKind::ValueSpec { names, ty, values } = cx.ast.kind(spec).clone() else {
                    return Ok(());
                };
                let span = cx.ast.span(spec);
                cx.with_init(spec, |cx| cx.lower_var_spec(&names, ty, &values, span))
            }),
            Item::Func { decl } => self.in_decl_context(file, &[], |cx| cx.resolve_func(decl, file)),
            Item::Method { decl } => self.in_decl_context(file, &[], |cx| cx.resolve_method(decl, file)),
            Item::Init { decl } => self.in_decl_context(file, &[], |cx| cx.resolve_init(decl, file)),
        }
    }

    fn resolve_named(&mut self, spec: NodeId, named: Idx) -> Check<()> {
        let span = self.ast.span(spec);
        let NodeKind::TypeSpec { ty, .. } = *self.ast.kind(spec) else {
            return Ok(());
        };
        let rhs = self.resolve_type(ty)?;
        self.require_resolved(rhs, span)?;
        let underlying = self.pool.underlying(rhs);
        self.pool.set_underlying(named, underlying);
        self.unresolved.remove(&named);
        self.check_not_recursive(named, span)
    }

    /// Reject a named type that contains itself by value.
    pub(crate) fn check_not_recursive(&self, named: Idx, span: Span) -> Check<()> {
        let mut seen = FxHashSet::default();
        if self.contains_by_value(self.pool.underlying(named), named, &mut seen) {
            return fail(
                ErrorCode::E1004,
                span,
                format!("invalid recursive type {}", self.pool.display(named)),
            );
        }
        Ok(())
    }

    fn contains_by_value(&self, ty: Idx, target: Idx, seen: &mut FxHashSet<Idx>) -> bool {
        if ty == target {
            return true;
        }
        if !seen.insert(ty) {
            return false;
        }
        match self.pool.data(ty) {
            TypeData::Named(_) => self.contains_by_value(self.pool.underlying(ty), target, seen),
            TypeData::Array { elem, .. } => self.contains_by_value(*elem, target, seen),
            TypeData::Struct(fields) => fields
                .iter()
                .any(|f| self.contains_by_value(f.ty, target, seen)),
            _ => false,
        }
    }

    fn resolve_func(&mut self, decl: NodeId, file: usize) -> Check<()> {
        let NodeKind::FuncDecl { name, sig, .. } = *self.ast.kind(decl) else {
            return Ok(());
        };
        let span = self.ast.span(decl);
        let info = self.resolve_signature(sig)?;
        let text = self.interner.lookup(name);
        if name == self.names.main && (!info.params.is_empty() || !info.results.is_empty()) {
            return fail(
                ErrorCode::E2014,
                span,
                "func main must have no arguments and no return values",
            );
        }
        let func = self.program.reserve_func(text, span);
        self.program.set_entry(text, func);
        self.jobs.push_back(Job {
            func,
            decl,
            file,
            env: Vec::new(),
        });
        self.package.insert(
            Symbol::new(name, SymbolKind::Func, info.ty, Storage::Func(func)).with_decl(decl),
        );
        Ok(())
    }

    fn resolve_init(&mut self, decl: NodeId, file: usize) -> Check<()> {
        let NodeKind::FuncDecl { sig, .. } = *self.ast.kind(decl) else {
            return Ok(());
        };
        let span = self.ast.span(decl);
        let info = self.resolve_signature(sig)?;
        if !info.params.is_empty() || !info.results.is_empty() {
            return fail(
                ErrorCode::E2014,
                span,
                "func init must have no arguments and no return values",
            );
        }
        let func = self.program.reserve_func("init", span);
        self.jobs.push_back(Job {
            func,
            decl,
            file,
            env: Vec::new(),
        });
        self.init_funcs.push(func);
        Ok(())
    }

    fn resolve_method(&mut self, decl: NodeId, file: usize) -> Check<()> {
        let NodeKind::FuncDecl {
            name,
            recv: Some(recv),
            sig,
            ..
        } = *self.ast.kind(decl)
        else {
            return Ok(());
        };
        let span = self.ast.span(recv);
        let (base, ptr) = self.recv_base(recv);
        let recv_ty = self.resolve_type(base)?;
        if self.pool.named_info(recv_ty).is_none()
            || self.pool.is_interface(recv_ty)
            || self.pool.pointer_elem(recv_ty).is_some()
        {
            return fail(
                ErrorCode::E2014,
                span,
                format!("invalid receiver type {}", self.pool.display(recv_ty)),
            );
        }
        self.require_resolved(recv_ty, span)?;
        let info = self.resolve_signature(sig)?;
        self.declare_method(recv_ty, name, info.ty, ptr, decl, file, Vec::new())?;
        Ok(())
    }

    /// The generic type a method's receiver names (`func (s *Stack[T]) ...`).
    fn generic_recv(&self, decl: NodeId) -> Option<crate::GenericId> {
        let NodeKind::FuncDecl { recv: Some(recv), .. } = *self.ast.kind(decl) else {
            return None;
        };
        let (base, _) = self.recv_base(recv);
        let head = match self.ast.kind(base) {
            NodeKind::Index { base, .. } => *base,
            _ => base,
        };
        let NodeKind::Ident(name) = *self.ast.kind(head) else {
            return None;
        };
        match self.package.get(name) {
            Some(sym) if sym.kind == SymbolKind::Type => match sym.storage {
                Storage::Generic(id) => Some(id),
                _ => None,
            },
            _ => None,
        }
    }

    fn attach_generic_method(&mut self, id: crate::GenericId, decl: NodeId, file: usize) -> Check<()> {
        self.generics[id.0 as usize].methods.push((decl, file));
        let mut existing: Vec<(Vec<Idx>, Idx)> = self
            .type_instances
            .iter()
            .filter(|((g, args), _)| *g == id && !args.iter().any(|&a| self.pool.has_type_params(a)))
            .map(|((_, args), &inst)| (args.clone(), inst))
            .collect();
        existing.sort_by_key(|(_, inst)| *inst);
        for (args, inst) in existing {
            self.instantiate_method(inst, &args, decl, file)?;
        }
        Ok(())
    }
}
