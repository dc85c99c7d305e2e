//! Generic declarations, memoized instantiation and type argument inference.
//!
//! Generic code is compiled per instance: instantiating a function with
//! concrete type arguments queues a body job whose scope binds each type
//! parameter name to its argument, so the body is lowered like ordinary
//! code. Instances are cached by `(declaration, arguments)`; only the first
//! request for a combination creates anything.

use rustc_hash::FxHashMap;
use terp_diagnostic::ErrorCode;
use terp_eval::FuncId;
use terp_ir::{Name, NodeId, NodeKind, Span};
use terp_types::{Idx, MethodSig, Origin, UnifyError};
use tracing::{debug, trace};

use crate::context::Job;
use crate::error::{fail, Check};
use crate::resolve::SigInfo;
use crate::scope::GenericId;
use crate::CompileContext;

#[derive(Clone, Debug)]
pub(crate) struct GenericDecl {
    pub name: Name,
    /// `FuncDecl` or `TypeSpec`.
    pub node: NodeId,
    pub file: usize,
    /// Type parameter names with their constraint expressions.
    pub params: Vec<(Name, NodeId)>,
    /// Method declarations of a generic type, with their files.
    pub methods: Vec<(NodeId, usize)>,
    /// Signature over fresh type parameters, built on first inference.
    pub open: Option<OpenSig>,
}

#[derive(Clone, Debug)]
pub(crate) struct OpenSig {
    pub params: Vec<Idx>,
    pub sig: SigInfo,
}

/// What inference knows about one call argument.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ArgType {
    pub ty: Idx,
    pub span: Span,
}

impl CompileContext {
    pub(crate) fn declare_generic(
        &mut self,
        name: Name,
        node: NodeId,
        file: usize,
        type_params: &[NodeId],
    ) -> GenericId {
        let mut params = Vec::new();
        for &field in type_params {
            if let NodeKind::Field { names, ty } = self.ast.kind(field) {
                params.extend(names.iter().map(|&n| (n, *ty)));
            }
        }
        let id = GenericId(u32::try_from(self.generics.len()).unwrap_or(u32::MAX));
        self.generics.push(GenericDecl {
            name,
            node,
            file,
            params,
            methods: Vec::new(),
            open: None,
        });
        id
    }

    fn generic(&self, id: GenericId) -> &GenericDecl {
        &self.generics[id.0 as usize]
    }

    fn type_args_text(&self, args: &[Idx]) -> String {
        args.iter()
            .map(|&a| self.pool.display(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn env_of(&self, id: GenericId, args: &[Idx]) -> Vec<(Name, Idx)> {
        self.generic(id)
            .params
            .iter()
            .map(|(name, _)| *name)
            .zip(args.iter().copied())
            .collect()
    }

    fn check_arity(&self, id: GenericId, got: usize, span: Span) -> Check<()> {
        let decl = self.generic(id);
        if got == decl.params.len() {
            return Ok(());
        }
        fail(
            ErrorCode::E2009,
            span,
            format!(
                "got {got} type arguments but {} has {} type parameters",
                self.interner.lookup(decl.name),
                decl.params.len()
            ),
        )
    }

    /// Check arity and constraint satisfaction of concrete type arguments.
    fn check_type_args(&mut self, id: GenericId, args: &[Idx], span: Span) -> Check<()> {
        self.check_arity(id, args.len(), span)?;
        let env = self.env_of(id, args);
        let decl = self.generic(id).clone();
        for (&(_, constraint_node), &arg) in decl.params.iter().zip(args) {
            let constraint =
                self.in_decl_context(decl.file, &env, |cx| cx.resolve_constraint(constraint_node))?;
            if let Err(why) = self.pool.satisfies(arg, constraint) {
                let constraint_text = match self.ast.kind(constraint_node) {
                    NodeKind::Ident(_) | NodeKind::Selector { .. } => {
                        self.expr_text(constraint_node)
                    }
                    _ => self.pool.display(constraint),
                };
                return fail(
                    ErrorCode::E2007,
                    span,
                    format!(
                        "{} does not satisfy {constraint_text} ({})",
                        self.pool.display(arg),
                        why.describe(&self.pool)
                    ),
                );
            }
        }
        Ok(())
    }

    /// The instance of generic function `id` for `args`, creating it on first
    /// use. Returns the function and its signature type.
    pub(crate) fn instantiate_func(
        &mut self,
        id: GenericId,
        args: Vec<Idx>,
        span: Span,
    ) -> Check<(FuncId, Idx)> {
        if let Some(&hit) = self.func_instances.get(&(id, args.clone())) {
            trace!(generic = id.raw(), "instance cache hit");
            return Ok(hit);
        }
        self.check_type_args(id, &args, span)?;
        let decl = self.generic(id).clone();
        let env = self.env_of(id, &args);
        let NodeKind::FuncDecl { sig, .. } = *self.ast.kind(decl.node) else {
            return fail(ErrorCode::E9001, span, "generic function without declaration");
        };
        let info = self.in_decl_context(decl.file, &env, |cx| cx.resolve_signature(sig))?;
        let name = format!(
            "{}[{}]",
            self.interner.lookup(decl.name),
            self.type_args_text(&args)
        );
        debug!(instance = %name, "instantiating generic function");
        let func = self.program.reserve_func(name, self.ast.span(decl.node));
        self.instantiations += 1;
        self.func_instances.insert((id, args), (func, info.ty));
        self.jobs.push_back(Job {
            func,
            decl: decl.node,
            file: decl.file,
            env,
        });
        Ok((func, info.ty))
    }

    /// The named instance of generic type `id` for `args`.
    ///
    /// Instances over type parameters (met while building an open signature
    /// for inference) are cached but neither counted nor given methods.
    pub(crate) fn instantiate_type(
        &mut self,
        id: GenericId,
        args: Vec<Idx>,
        span: Span,
    ) -> Check<Idx> {
        if let Some(&hit) = self.type_instances.get(&(id, args.clone())) {
            return Ok(hit);
        }
        let open = args.iter().any(|&a| self.pool.has_type_params(a));
        if open {
            self.check_arity(id, args.len(), span)?;
        } else {
            self.check_type_args(id, &args, span)?;
        }
        let decl = self.generic(id).clone();
        let env = self.env_of(id, &args);
        let NodeKind::TypeSpec { ty, .. } = *self.ast.kind(decl.node) else {
            return fail(ErrorCode::E9001, span, "generic type without declaration");
        };

        let named = self.pool.new_named(
            decl.name,
            Some(Origin {
                generic: id.raw(),
                args: args.clone(),
            }),
        );
        // Cached before the body resolves so self-references find it.
        self.type_instances.insert((id, args.clone()), named);
        self.unresolved.insert(named);
        let underlying = self.in_decl_context(decl.file, &env, |cx| {
            let rhs = cx.resolve_type(ty)?;
            cx.require_resolved(rhs, span)?;
            Ok(cx.pool.underlying(rhs))
        });
        self.unresolved.remove(&named);
        let underlying = match underlying {
            Ok(u) => u,
            Err(halt) => {
                self.type_instances.remove(&(id, args));
                return Err(halt);
            }
        };
        self.pool.set_underlying(named, underlying);
        if !open {
            self.check_not_recursive(named, span)?;
            self.instantiations += 1;
            debug!(instance = %self.pool.display(named), "instantiated generic type");
            for (method, file) in decl.methods {
                self.instantiate_method(named, &args, method, file)?;
            }
        }
        Ok(named)
    }

    /// Declare method `decl` of a generic type on one of its instances.
    pub(crate) fn instantiate_method(
        &mut self,
        inst: Idx,
        args: &[Idx],
        decl: NodeId,
        file: usize,
    ) -> Check<()> {
        let span = self.ast.span(decl);
        let NodeKind::FuncDecl {
            name,
            recv: Some(recv),
            sig,
            ..
        } = *self.ast.kind(decl)
        else {
            return Ok(());
        };
        let (base, ptr_recv) = self.recv_base(recv);
        let names = self.recv_type_params(base);
        if names.len() != args.len() {
            return fail(
                ErrorCode::E2009,
                span,
                format!(
                    "receiver has {} type parameters but the type has {}",
                    names.len(),
                    args.len()
                ),
            );
        }
        let env: Vec<(Name, Idx)> = names.into_iter().zip(args.iter().copied()).collect();
        let info = self.in_decl_context(file, &env, |cx| cx.resolve_signature(sig))?;
        self.declare_method(inst, name, info.ty, ptr_recv, decl, file, env)?;
        Ok(())
    }

    /// Add a method to a named type and queue its body.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn declare_method(
        &mut self,
        recv: Idx,
        name: Name,
        sig: Idx,
        ptr_recv: bool,
        decl: NodeId,
        file: usize,
        env: Vec<(Name, Idx)>,
    ) -> Check<FuncId> {
        let span = self.ast.span(decl);
        let clash = self
            .pool
            .struct_fields(recv)
            .is_some_and(|fields| fields.iter().any(|f| f.name == name));
        if clash {
            return fail(
                ErrorCode::E2014,
                span,
                format!(
                    "field and method with the same name {}",
                    self.interner.lookup(name)
                ),
            );
        }
        if !self.pool.add_method(
            recv,
            MethodSig {
                name,
                sig,
                ptr_recv,
            },
        ) {
            return fail(
                ErrorCode::E2014,
                span,
                format!(
                    "method {}.{} already declared",
                    self.pool.display(recv),
                    self.interner.lookup(name)
                ),
            );
        }
        let func = self.program.reserve_func(
            format!("{}.{}", self.pool.display(recv), self.interner.lookup(name)),
            span,
        );
        self.methods.insert((recv, name), func);
        self.jobs.push_back(Job {
            func,
            decl,
            file,
            env,
        });
        Ok(func)
    }

    /// Receiver type expression without the pointer, and whether it had one.
    pub(crate) fn recv_base(&self, recv: NodeId) -> (NodeId, bool) {
        let mut node = match self.ast.kind(recv) {
            NodeKind::Field { ty, .. } => *ty,
            _ => recv,
        };
        let mut ptr = false;
        loop {
            match self.ast.kind(node) {
                NodeKind::Paren(inner) => node = *inner,
                NodeKind::PointerType(inner)
                | NodeKind::Unary {
                    op: terp_ir::UnaryOp::Deref,
                    operand: inner,
                } => {
                    ptr = true;
                    node = *inner;
                }
                _ => return (node, ptr),
            }
        }
    }

    /// Type parameter names a generic receiver (`Stack[T]`) introduces.
    fn recv_type_params(&self, base: NodeId) -> Vec<Name> {
        let NodeKind::Index { indices, .. } = self.ast.kind(base) else {
            return Vec::new();
        };
        indices
            .iter()
            .filter_map(|&i| match self.ast.kind(i) {
                NodeKind::Ident(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// The generic function's signature over fresh type parameters.
    fn open_signature(&mut self, id: GenericId) -> Check<OpenSig> {
        if let Some(open) = &self.generic(id).open {
            return Ok(open.clone());
        }
        let decl = self.generic(id).clone();
        let params: Vec<Idx> = decl
            .params
            .iter()
            .enumerate()
            .map(|(i, (name, _))| {
                self.pool
                    .new_type_param(*name, u32::try_from(i).unwrap_or(u32::MAX))
            })
            .collect();
        let env: Vec<(Name, Idx)> = decl
            .params
            .iter()
            .map(|(name, _)| *name)
            .zip(params.iter().copied())
            .collect();
        let NodeKind::FuncDecl { sig, .. } = *self.ast.kind(decl.node) else {
            return fail(
                ErrorCode::E9001,
                self.ast.span(decl.node),
                "generic function without declaration",
            );
        };
        let sig = self.in_decl_context(decl.file, &env, |cx| {
            for (&(_, constraint), &param) in decl.params.iter().zip(&params) {
                let constraint = cx.resolve_constraint(constraint)?;
                cx.pool.set_constraint(param, constraint);
            }
            cx.resolve_signature(sig)
        })?;
        let open = OpenSig { params, sig };
        self.generics[id.0 as usize].open = Some(open.clone());
        Ok(open)
    }

    /// Infer the type arguments of a call to generic function `id`.
    ///
    /// `explicit` holds a prefix of type arguments given with `F[T1](...)`.
    /// Typed arguments are unified first; untyped constants then bind type
    /// parameters still free to the default type of the widest constant
    /// kind; finally single-term constraints (`S ~[]E`) bind parameters
    /// they mention.
    pub(crate) fn infer_type_args(
        &mut self,
        id: GenericId,
        explicit: &[Idx],
        args: &[ArgType],
        span: Span,
    ) -> Check<Vec<Idx>> {
        let open = self.open_signature(id)?;
        if explicit.len() > open.params.len() {
            self.check_arity(id, explicit.len(), span)?;
        }
        let mut subst: FxHashMap<Idx, Idx> = open
            .params
            .iter()
            .copied()
            .zip(explicit.iter().copied())
            .collect();

        let fixed = open.sig.params.len();
        let param_at = |i: usize| -> Option<Idx> {
            if open.sig.variadic && i + 1 >= fixed {
                let last = open.sig.params.last()?.ty;
                self.pool.elem(last)
            } else {
                open.sig.params.get(i).map(|p| p.ty)
            }
        };
        let pairs: Vec<(Idx, ArgType)> = args
            .iter()
            .enumerate()
            .filter_map(|(i, &arg)| param_at(i).map(|p| (p, arg)))
            .collect();

        for &(param, arg) in &pairs {
            if arg.ty.is_untyped() {
                continue;
            }
            match self.pool.unify(param, arg.ty, &mut subst) {
                Ok(()) => {}
                Err(UnifyError::Conflict {
                    param,
                    first,
                    second,
                }) => {
                    return fail(
                        ErrorCode::E2008,
                        arg.span,
                        format!(
                            "type {} of argument does not match inferred type {} for {}",
                            self.pool.display(second),
                            self.pool.display(first),
                            self.pool.display(param)
                        ),
                    )
                }
                Err(UnifyError::Mismatch) => {
                    return fail(
                        ErrorCode::E2008,
                        arg.span,
                        format!(
                            "type {} of argument does not match {}",
                            self.pool.display(arg.ty),
                            self.pool.display(param)
                        ),
                    )
                }
            }
        }

        let mut untyped: Vec<(Idx, Idx)> = Vec::new();
        for &(param, arg) in &pairs {
            if arg.ty == Idx::UNTYPED_NIL
                || !arg.ty.is_untyped()
                || !self.pool.is_type_param(param)
                || subst.contains_key(&param)
            {
                continue;
            }
            match untyped.iter_mut().find(|(p, _)| *p == param) {
                Some((_, kind)) => *kind = self.pool.wider_untyped(*kind, arg.ty),
                None => untyped.push((param, arg.ty)),
            }
        }
        for (param, kind) in untyped {
            subst.insert(param, self.pool.default_type(kind));
        }

        loop {
            let before = subst.len();
            for &param in &open.params {
                let Some(&bound) = subst.get(&param) else {
                    continue;
                };
                let Some(info) = self.pool.type_param_info(param) else {
                    continue;
                };
                let core = self
                    .pool
                    .interface_data(info.constraint)
                    .and_then(|data| data.terms.as_ref())
                    .and_then(|terms| match terms.as_slice() {
                        [term] if self.pool.has_type_params(term.ty) => Some(term.ty),
                        _ => None,
                    });
                if let Some(core) = core {
                    // A failure here resurfaces as a constraint error.
                    let _ = self.pool.unify(core, bound, &mut subst);
                }
            }
            if subst.len() == before {
                break;
            }
        }

        let mut out = Vec::with_capacity(open.params.len());
        for &param in &open.params {
            match subst.get(&param) {
                Some(&ty) => out.push(ty),
                None => {
                    return fail(
                        ErrorCode::E2008,
                        span,
                        format!("cannot infer {}", self.pool.display(param)),
                    )
                }
            }
        }
        Ok(out)
    }
}
