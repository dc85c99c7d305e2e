//! Statements other than control flow: assignments, declarations, returns.

use smallvec::SmallVec;
use terp_diagnostic::ErrorCode;
use terp_eval::program::{Loc, Op, Place, PlaceBase, Src};
use terp_ir::{BinaryOp, BranchKind, Name, NodeId, NodeKind, Span, UnaryOp};
use terp_types::{ConstValue, Idx, TypeData};

use super::expr::strip_parens;
use super::{LValue, Mode, Operand};
use crate::error::{fail, Check};
use crate::scope::{BuiltinFn, ScopeKind, Storage, Symbol, SymbolKind};
use crate::CompileContext;

impl CompileContext {
    pub(crate) fn lower_stmt(&mut self, node: NodeId) -> Check<()> {
        terp_stack::ensure_sufficient_stack(|| self.lower_stmt_inner(node))
    }

    fn lower_stmt_inner(&mut self, node: NodeId) -> Check<()> {
        let span = self.ast.span(node);
        match self.ast.kind(node).clone() {
            NodeKind::Block(stmts) => {
                self.push_scope(ScopeKind::Block);
                for stmt in stmts {
                    self.lower_stmt(stmt)?;
                }
                self.pop_scope();
                Ok(())
            }
            NodeKind::ExprStmt(expr) => self.lower_expr_stmt(expr, span),
            NodeKind::Assign { lhs, rhs, op: None } => self.lower_assign(&lhs, &rhs, span),
            NodeKind::Assign {
                lhs,
                rhs,
                op: Some(op),
            } => {
                let (&[target], &[value]) = (lhs.as_slice(), rhs.as_slice()) else {
                    return fail(
                        ErrorCode::E2010,
                        span,
                        format!("assignment operation {op}= requires single-valued expressions"),
                    );
                };
                let rhs = self.lower_expr(value)?;
                self.op_assign(target, op, rhs, span)
            }
            NodeKind::IncDec { target, inc } => {
                let op = if inc { BinaryOp::Add } else { BinaryOp::Sub };
                let one = Operand::constant(Idx::UNTYPED_INT, ConstValue::Int(1));
                self.op_assign(target, op, one, span)
            }
            NodeKind::Define { lhs, rhs } => self.lower_define(&lhs, &rhs, span),
            NodeKind::Send { chan, value } => self.lower_send(chan, value, span),
            NodeKind::DeclStmt(decl) => self.lower_local_decl(decl),
            NodeKind::If {
                init,
                cond,
                then,
                els,
            } => self.lower_if(init, cond, then, els, span),
            NodeKind::For {
                init,
                cond,
                post,
                body,
            } => self.lower_for(init, cond, post, body, span),
            NodeKind::Range {
                key,
                value,
                define,
                expr,
                body,
            } => self.lower_range(key, value, define, expr, body, span),
            NodeKind::Switch { init, tag, clauses } => self.lower_switch(init, tag, &clauses, span),
            NodeKind::TypeSwitch {
                init,
                bind,
                expr,
                clauses,
            } => self.lower_type_switch(init, bind, expr, &clauses, span),
            NodeKind::Select(clauses) => self.lower_select(&clauses, span),
            NodeKind::Go(call) => self.lower_go_defer(call, true, span),
            NodeKind::Defer(call) => self.lower_go_defer(call, false, span),
            NodeKind::Return(values) => self.lower_return(&values, span),
            NodeKind::Branch { kind, label } => self.lower_branch(kind, label, span),
            NodeKind::Labeled { label, stmt } => {
                let claims = matches!(
                    self.ast.kind(stmt),
                    NodeKind::For { .. }
                        | NodeKind::Range { .. }
                        | NodeKind::Switch { .. }
                        | NodeKind::TypeSwitch { .. }
                        | NodeKind::Select(_)
                );
                if claims {
                    if let Some(state) = self.funcs.last_mut() {
                        state.label = Some(label);
                    }
                }
                self.lower_stmt(stmt)
            }
            NodeKind::Empty => Ok(()),
            _ => fail(ErrorCode::E9001, span, "unexpected node in statement position"),
        }
    }

    fn lower_expr_stmt(&mut self, expr: NodeId, span: Span) -> Check<()> {
        let inner = strip_parens(&self.ast, expr);
        match self.ast.kind(inner) {
            NodeKind::Call { .. } => self.lower_call_stmt(inner, span),
            NodeKind::Unary {
                op: UnaryOp::Recv, ..
            } => self.lower_operand(inner).map(|_| ()),
            _ => {
                let op = self.lower_operand(inner)?;
                let what = match op.mode {
                    Mode::Const(_) => "constant",
                    _ => "value",
                };
                fail(
                    ErrorCode::E2012,
                    span,
                    format!(
                        "{} ({what} of type {}) is not used",
                        self.expr_text(expr),
                        self.pool.display(op.ty)
                    ),
                )
            }
        }
    }

    // === Assignment ===

    /// Values of a multi-value right-hand side: a call, or a comma-ok map
    /// index, type assertion or receive.
    pub(crate) fn lower_multi(&mut self, node: NodeId, n: usize) -> Check<Vec<Operand>> {
        let span = self.ast.span(node);
        let inner = strip_parens(&self.ast, node);
        if n == 2 {
            match self.ast.kind(inner).clone() {
                NodeKind::Index { base, indices } if indices.len() == 1 && self.generic_func_of(base).is_none() => {
                    let m = self.lower_expr(base)?;
                    if let TypeData::Map { key, value } = self.pool.underlying_data(m.ty).clone() {
                        let map = self.value_of(&m, span)?;
                        let k = self.lower_expr(indices[0])?;
                        let key = self.coerce(k, key, self.ast.span(indices[0]), "map index")?;
                        let (dst, ok) = (self.temp(), self.temp());
                        let zero = self.zero_value(value);
                        self.emit(
                            Op::MapIndex {
                                dst,
                                ok: Some(ok),
                                map,
                                key,
                                zero,
                            },
                            span,
                        );
                        return Ok(vec![
                            Operand::value(value, Src::Loc(dst)),
                            Operand::value(Idx::UNTYPED_BOOL, Src::Loc(ok)),
                        ]);
                    }
                    return self.count_mismatch(n, 1, span);
                }
                NodeKind::TypeAssert { base, ty: Some(ty) } => {
                    let (op, ok) = self.lower_assert(base, ty, true, span)?;
                    let ok = ok.map_or(Src::Const(terp_eval::Value::Bool(false)), Src::Loc);
                    return Ok(vec![op, Operand::value(Idx::UNTYPED_BOOL, ok)]);
                }
                NodeKind::Unary {
                    op: UnaryOp::Recv,
                    operand,
                } => {
                    let ch = self.lower_expr(operand)?;
                    let elem = self.recv_elem(&ch, operand)?;
                    let chan = self.value_of(&ch, span)?;
                    let (dst, ok) = (self.temp(), self.temp());
                    let zero = self.zero_value(elem);
                    self.emit(
                        Op::Recv {
                            chan,
                            dst: Some(dst),
                            ok: Some(ok),
                            zero,
                        },
                        span,
                    );
                    return Ok(vec![
                        Operand::value(elem, Src::Loc(dst)),
                        Operand::value(Idx::UNTYPED_BOOL, Src::Loc(ok)),
                    ]);
                }
                _ => {}
            }
        }
        let op = self.lower_operand(inner)?;
        match &op.mode {
            Mode::Tuple(locs) if locs.len() == n => {
                let types = self.pool.results_of(op.ty);
                Ok(types
                    .into_iter()
                    .zip(locs.iter())
                    .map(|(ty, &loc)| Operand::value(ty, Src::Loc(loc)))
                    .collect())
            }
            Mode::Tuple(locs) => self.count_mismatch(n, locs.len(), span),
            Mode::Void => self.count_mismatch(n, 0, span),
            _ => self.count_mismatch(n, 1, span),
        }
    }

    fn count_mismatch<T>(&self, vars: usize, values: usize, span: Span) -> Check<T> {
        let plural = |n: usize, word: &str| {
            if n == 1 {
                format!("{n} {word}")
            } else {
                format!("{n} {word}s")
            }
        };
        fail(
            ErrorCode::E2010,
            span,
            format!(
                "assignment mismatch: {} but {}",
                plural(vars, "variable"),
                plural(values, "value")
            ),
        )
    }

    /// Right-hand side operands for `n` targets.
    fn rhs_operands(&mut self, rhs: &[NodeId], n: usize, span: Span) -> Check<Vec<Operand>> {
        if rhs.len() == n {
            let mut ops = Vec::with_capacity(n);
            for &value in rhs {
                ops.push(self.lower_expr(value)?);
            }
            return Ok(ops);
        }
        if let [single] = rhs {
            return self.lower_multi(*single, n);
        }
        self.count_mismatch(n, rhs.len(), span)
    }

    /// Copy a frame-held value so later stores cannot change it.
    fn snapshot(&mut self, src: Src, span: Span) -> Src {
        match src {
            Src::Loc(loc) => {
                let dst = self.temp();
                self.emit(Op::Move { dst, src: Src::Loc(loc) }, span);
                Src::Loc(dst)
            }
            src => src,
        }
    }

    /// Pin an assignment target so stores to other targets of the same
    /// statement cannot move it.
    fn pin(&mut self, lv: LValue, span: Span) -> LValue {
        match lv {
            LValue::Place(place) => {
                let ptr = self.temp();
                self.emit(Op::Addr { dst: ptr, place }, span);
                LValue::Place(Place {
                    base: PlaceBase::Deref(Src::Loc(ptr)),
                    steps: SmallVec::new(),
                })
            }
            LValue::MapEntry { map, key } => LValue::MapEntry {
                map: self.snapshot(map, span),
                key: self.snapshot(key, span),
            },
            lv => lv,
        }
    }

    fn lower_assign(&mut self, lhs: &[NodeId], rhs: &[NodeId], span: Span) -> Check<()> {
        let mut targets = Vec::with_capacity(lhs.len());
        for &target in lhs {
            targets.push(self.lower_lvalue(target)?);
        }
        let values = self.rhs_operands(rhs, lhs.len(), span)?;
        let many = lhs.len() > 1;
        let mut srcs = Vec::with_capacity(values.len());
        for ((lv, ty), (value, &node)) in targets.iter().zip(values.into_iter().zip(lhs)) {
            let vspan = if many && rhs.len() == 1 { span } else { self.ast.span(node) };
            let src = match lv {
                LValue::Blank => {
                    let value = self.assign_default(value, vspan)?;
                    self.value_of(&value, vspan)?
                }
                _ => self.coerce(value, *ty, vspan, "assignment")?,
            };
            srcs.push(if many { self.snapshot(src, span) } else { src });
        }
        let targets: Vec<LValue> = if many {
            targets.into_iter().map(|(lv, _)| self.pin(lv, span)).collect()
        } else {
            targets.into_iter().map(|(lv, _)| lv).collect()
        };
        for (lv, src) in targets.iter().zip(srcs) {
            self.store(lv, src, span)?;
        }
        Ok(())
    }

    /// Default an untyped value assigned to `_` or a new variable.
    fn assign_default(&mut self, value: Operand, span: Span) -> Check<Operand> {
        if value.is_nil() {
            return fail(ErrorCode::E2019, span, "use of untyped nil in assignment");
        }
        self.default_operand(value, span)
    }

    fn op_assign(&mut self, target: NodeId, op: BinaryOp, rhs: Operand, span: Span) -> Check<()> {
        let (lv, ty) = self.lower_lvalue(target)?;
        let current = match &lv {
            LValue::Blank => {
                return fail(ErrorCode::E2002, span, "cannot use _ as value");
            }
            LValue::MapEntry { map, key } => {
                let dst = self.temp();
                let zero = self.zero_value(ty);
                self.emit(
                    Op::MapIndex {
                        dst,
                        ok: None,
                        map: map.clone(),
                        key: key.clone(),
                        zero,
                    },
                    span,
                );
                Src::Loc(dst)
            }
            lv => self.lvalue_src(lv, span)?,
        };
        let result = self.binary_op(op, Operand::value(ty, current), rhs, span)?;
        let src = self.coerce(result, ty, span, "assignment")?;
        self.store(&lv, src, span)
    }

    fn lower_define(&mut self, lhs: &[NodeId], rhs: &[NodeId], span: Span) -> Check<()> {
        let mut names: Vec<(Name, Span)> = Vec::with_capacity(lhs.len());
        for &target in lhs {
            let NodeKind::Ident(name) = *self.ast.kind(target) else {
                return fail(
                    ErrorCode::E2002,
                    self.ast.span(target),
                    format!("non-name {} on left side of :=", self.expr_text(target)),
                );
            };
            let tspan = self.ast.span(target);
            if name != self.names.blank && names.iter().any(|&(n, _)| n == name) {
                return fail(
                    ErrorCode::E1002,
                    tspan,
                    format!("{} repeated on left side of :=", self.interner.lookup(name)),
                );
            }
            names.push((name, tspan));
        }
        let values = self.rhs_operands(rhs, lhs.len(), span)?;
        let rebind = self.replacing && self.scopes.is_empty();
        let fresh = names
            .iter()
            .filter(|&&(n, _)| n != self.names.blank && (rebind || !self.declared_here(n)))
            .count();
        if fresh == 0 {
            return fail(ErrorCode::E1002, span, "no new variables on left side of :=");
        }
        let many = names.len() > 1;
        let mut pending = Vec::with_capacity(names.len());
        for (&(name, nspan), value) in names.iter().zip(values) {
            let existing = if name == self.names.blank || rebind {
                None
            } else if self.declared_here(name) {
                self.find(name).cloned()
            } else {
                None
            };
            let (ty, src) = match &existing {
                Some(sym) if sym.kind == SymbolKind::Var => {
                    let ty = sym.ty;
                    (ty, self.coerce(value, ty, nspan, "assignment")?)
                }
                Some(_) => {
                    return fail(
                        ErrorCode::E2018,
                        nspan,
                        format!("cannot assign to {}", self.interner.lookup(name)),
                    )
                }
                None => {
                    let value = self.assign_default(value, nspan)?;
                    let ty = value.ty;
                    (ty, self.value_of(&value, nspan)?)
                }
            };
            let src = if many { self.snapshot(src, span) } else { src };
            pending.push((name, nspan, ty, src, existing.is_some()));
        }
        for (name, nspan, ty, src, existing) in pending {
            let dst = if existing {
                let sym = self.resolve_name(name, nspan)?;
                self.loc_of(&sym.storage, nspan)?
            } else {
                self.declare_var(name, ty, nspan)?
            };
            self.emit(Op::Move { dst, src }, nspan);
        }
        Ok(())
    }

    fn lower_send(&mut self, chan: NodeId, value: NodeId, span: Span) -> Check<()> {
        let ch = self.lower_expr(chan)?;
        let elem = match self.pool.underlying_data(ch.ty) {
            TypeData::Chan { dir, elem } if dir.can_send() => *elem,
            TypeData::Chan { .. } => {
                return fail(
                    ErrorCode::E2020,
                    span,
                    format!(
                        "invalid operation: cannot send to receive-only channel {} (variable of type {})",
                        self.expr_text(chan),
                        self.pool.display(ch.ty)
                    ),
                )
            }
            _ => {
                return fail(
                    ErrorCode::E2020,
                    span,
                    format!(
                        "invalid operation: cannot send to non-channel {} (variable of type {})",
                        self.expr_text(chan),
                        self.pool.display(ch.ty)
                    ),
                )
            }
        };
        let chan = self.value_of(&ch, span)?;
        let v = self.lower_expr(value)?;
        let value = self.coerce(v, elem, self.ast.span(value), "send")?;
        self.emit(Op::Send { chan, value }, span);
        Ok(())
    }

    // === Declarations ===

    fn lower_local_decl(&mut self, decl: NodeId) -> Check<()> {
        match self.ast.kind(decl).clone() {
            NodeKind::VarDecl(specs) => {
                for spec in specs {
                    let NodeKind::ValueSpec { names, ty, values } = self.ast.kind(spec).clone()
                    else {
                        continue;
                    };
                    self.lower_var_spec(&names, ty, &values, self.ast.span(spec))?;
                }
                Ok(())
            }
            NodeKind::ConstDecl(specs) => {
                let mut last: Option<(Option<NodeId>, Vec<NodeId>)> = None;
                for (iota, spec) in specs.into_iter().enumerate() {
                    let NodeKind::ValueSpec { names, ty, values } = self.ast.kind(spec).clone()
                    else {
                        continue;
                    };
                    let span = self.ast.span(spec);
                    let (ty, values) = match (values.is_empty(), &last) {
                        (true, Some((prev_ty, prev_values))) if ty.is_none() => {
                            (*prev_ty, prev_values.clone())
                        }
                        _ => {
                            last = Some((ty, values.clone()));
                            (ty, values)
                        }
                    };
                    let iota = i128::try_from(iota).unwrap_or(i128::MAX);
                    let consts = self.const_spec(&names, ty, &values, iota, span)?;
                    for (name, (ty, value)) in names.into_iter().zip(consts) {
                        let sym = Symbol::new(name, SymbolKind::Const, ty, Storage::None)
                            .with_value(value);
                        self.declare(sym, span)?;
                    }
                }
                Ok(())
            }
            NodeKind::TypeDecl(specs) => {
                for spec in specs {
                    self.lower_local_type(spec)?;
                }
                Ok(())
            }
            _ => fail(
                ErrorCode::E9001,
                self.ast.span(decl),
                "unexpected declaration in statement",
            ),
        }
    }

    /// `var names [ty] [= values]` inside a body (or at the top level of an
    /// incremental unit).
    pub(crate) fn lower_var_spec(
        &mut self,
        names: &[Name],
        ty: Option<NodeId>,
        values: &[NodeId],
        span: Span,
    ) -> Check<()> {
        let declared = match ty {
            Some(ty) => Some(self.resolve_type(ty)?),
            None => None,
        };
        let mut inits: Vec<(Idx, Option<Src>)> = Vec::with_capacity(names.len());
        if values.is_empty() {
            let Some(ty) = declared else {
                return fail(ErrorCode::E2010, span, "missing type or init expr");
            };
            inits.extend(names.iter().map(|_| (ty, None)));
        } else {
            let ops = self.rhs_operands(values, names.len(), span)?;
            let many = names.len() > 1;
            for op in ops {
                let (ty, src) = match declared {
                    Some(ty) => (ty, self.coerce(op, ty, span, "variable declaration")?),
                    None => {
                        if op.is_nil() {
                            return fail(
                                ErrorCode::E2019,
                                span,
                                "use of untyped nil in variable declaration",
                            );
                        }
                        let op = self.default_operand(op, span)?;
                        (op.ty, self.value_of(&op, span)?)
                    }
                };
                let src = if many { self.snapshot(src, span) } else { src };
                inits.push((ty, Some(src)));
            }
        }
        for (&name, (ty, src)) in names.iter().zip(inits) {
            let dst = self.var_slot(name, ty, span)?;
            let src = src.unwrap_or_else(|| Src::Const(self.zero_value(ty)));
            self.emit(Op::Move { dst, src }, span);
        }
        Ok(())
    }

    /// Destination of a declared variable. A pending package-level name
    /// gets a fresh root-frame slot.
    fn var_slot(&mut self, name: Name, ty: Idx, span: Span) -> Check<Loc> {
        let pending = self.scopes.is_empty()
            && self
                .package
                .get(name)
                .is_some_and(|sym| sym.kind == SymbolKind::Pending);
        if !pending {
            return self.declare_var(name, ty, span);
        }
        let zero = self.zero_value(ty);
        let slot = self.program.add_global(zero);
        self.package
            .insert(Symbol::new(name, SymbolKind::Var, ty, Storage::Global(slot)));
        Ok(Loc::Global(slot))
    }

    /// Values of one constant spec with `iota` bound.
    pub(crate) fn const_spec(
        &mut self,
        names: &[Name],
        ty: Option<NodeId>,
        values: &[NodeId],
        iota: i128,
        span: Span,
    ) -> Check<Vec<(Idx, ConstValue)>> {
        if values.len() < names.len() {
            return fail(ErrorCode::E2010, span, "missing init expr for const declaration");
        }
        if values.len() > names.len() {
            return fail(ErrorCode::E2010, span, "extra init expr");
        }
        let declared = match ty {
            Some(ty) => {
                let declared = self.resolve_type(ty)?;
                if self.pool.basic_kind(declared).is_none() {
                    return fail(
                        ErrorCode::E2002,
                        self.ast.span(ty),
                        format!("invalid constant type {}", self.pool.display(declared)),
                    );
                }
                Some(declared)
            }
            None => None,
        };
        let saved = self.iota.replace(iota);
        let result = self.const_values(declared, values);
        self.iota = saved;
        result
    }

    fn const_values(
        &mut self,
        declared: Option<Idx>,
        values: &[NodeId],
    ) -> Check<Vec<(Idx, ConstValue)>> {
        let mut out = Vec::with_capacity(values.len());
        for &value in values {
            let vspan = self.ast.span(value);
            let Some((from, v)) = self.const_value(value)? else {
                return fail(
                    ErrorCode::E2002,
                    vspan,
                    format!("{} is not constant", self.expr_text(value)),
                );
            };
            match declared {
                Some(ty) => {
                    if !self.pool.assignable_to(from, ty) {
                        return fail(
                            ErrorCode::E2001,
                            vspan,
                            format!(
                                "cannot use {} (constant of type {}) as {} value in constant declaration",
                                self.expr_text(value),
                                self.pool.display(from),
                                self.pool.display(ty)
                            ),
                        );
                    }
                    out.push((ty, self.to_kind(v, from, ty, vspan)?));
                }
                None => out.push((from, v)),
            }
        }
        Ok(out)
    }

    fn lower_local_type(&mut self, spec: NodeId) -> Check<()> {
        let span = self.ast.span(spec);
        let NodeKind::TypeSpec {
            name,
            type_params,
            alias,
            ty,
        } = self.ast.kind(spec).clone()
        else {
            return Ok(());
        };
        if !type_params.is_empty() {
            return fail(
                ErrorCode::E2011,
                span,
                "generic type cannot be declared inside a function",
            );
        }
        if alias {
            let target = self.resolve_type(ty)?;
            return self.declare(Symbol::new(name, SymbolKind::Type, target, Storage::None), span);
        }
        let named = self.pool.new_named(name, None);
        self.declare(
            Symbol::new(name, SymbolKind::Type, named, Storage::None).with_decl(spec),
            span,
        )?;
        self.unresolved.insert(named);
        let rhs = self.resolve_type(ty);
        self.unresolved.remove(&named);
        let rhs = rhs?;
        if rhs == named || self.unresolved.contains(&rhs) {
            return fail(
                ErrorCode::E1004,
                span,
                format!("invalid recursive type {}", self.interner.lookup(name)),
            );
        }
        let underlying = self.pool.underlying(rhs);
        self.pool.set_underlying(named, underlying);
        self.check_not_recursive(named, span)
    }

    // === Return ===

    fn lower_return(&mut self, values: &[NodeId], span: Span) -> Check<()> {
        let (results, named) = match self.state() {
            Some(state) => (state.results.clone(), state.named_results),
            None => return fail(ErrorCode::E1008, span, "return outside function"),
        };
        let base = self.state().map_or(1, |s| s.base);
        if values.is_empty() {
            if !results.is_empty() && !named {
                return fail(
                    ErrorCode::E2003,
                    span,
                    format!("not enough return values\n\thave ()\n\twant ({})", self.types_text(&results)),
                );
            }
            self.emit(Op::Return, span);
            self.take_tail();
            return Ok(());
        }
        let ops = if values.len() == results.len() {
            let mut ops = Vec::with_capacity(values.len());
            for &value in values {
                ops.push(self.lower_expr(value)?);
            }
            ops
        } else if let ([single], true) = (values, results.len() > 1) {
            let op = self.lower_operand(*single)?;
            match &op.mode {
                Mode::Tuple(locs) if locs.len() == results.len() => self
                    .pool
                    .results_of(op.ty)
                    .into_iter()
                    .zip(locs.iter())
                    .map(|(ty, &loc)| Operand::value(ty, Src::Loc(loc)))
                    .collect(),
                _ => return self.return_count(values.len(), &results, span),
            }
        } else {
            return self.return_count(values.len(), &results, span);
        };
        let many = ops.len() > 1;
        let mut srcs = Vec::with_capacity(ops.len());
        for (i, (op, &ty)) in ops.into_iter().zip(&results).enumerate() {
            let vspan = values.get(i).map_or(span, |&v| self.ast.span(v));
            let src = self.coerce(op, ty, vspan, "return statement")?;
            srcs.push(if many { self.snapshot(src, span) } else { src });
        }
        for (i, src) in srcs.into_iter().enumerate() {
            let index = u32::try_from(i).unwrap_or(u32::MAX);
            let dst = self.loc_of(&Storage::Local { depth: base, index }, span)?;
            self.emit(Op::Move { dst, src }, span);
        }
        self.emit(Op::Return, span);
        self.take_tail();
        Ok(())
    }

    fn types_text(&self, types: &[Idx]) -> String {
        types
            .iter()
            .map(|&t| self.pool.display(t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn return_count<T>(&self, have: usize, want: &[Idx], span: Span) -> Check<T> {
        let which = if have < want.len() {
            "not enough"
        } else {
            "too many"
        };
        fail(
            ErrorCode::E2003,
            span,
            format!(
                "{which} return values\n\thave {have} values\n\twant ({})",
                self.types_text(want)
            ),
        )
    }

    // === Termination ===

    /// Whether a statement list ends in a terminating statement.
    pub(crate) fn terminates_list(&self, stmts: &[NodeId]) -> bool {
        stmts
            .iter()
            .rev()
            .find(|&&s| !matches!(self.ast.kind(s), NodeKind::Empty))
            .is_some_and(|&s| self.terminates(s, None))
    }

    fn terminates(&self, stmt: NodeId, label: Option<Name>) -> bool {
        match self.ast.kind(stmt) {
            NodeKind::Return(_) => true,
            NodeKind::ExprStmt(e) => match self.ast.kind(strip_parens(&self.ast, *e)) {
                NodeKind::Call { func, .. } => self.is_builtin(*func, BuiltinFn::Panic),
                _ => false,
            },
            NodeKind::Block(stmts) => self.terminates_list(stmts),
            NodeKind::If { els: Some(els), then, .. } => {
                self.terminates(*then, None) && self.terminates(*els, None)
            }
            NodeKind::Labeled { label, stmt } => self.terminates(*stmt, Some(*label)),
            NodeKind::For {
                cond: None, body, ..
            } => !self.has_break(*body, label, true),
            NodeKind::Switch { clauses, .. } | NodeKind::TypeSwitch { clauses, .. } => {
                let mut default = false;
                for &clause in clauses {
                    let NodeKind::CaseClause {
                        body, default: d, ..
                    } = self.ast.kind(clause)
                    else {
                        return false;
                    };
                    default |= *d;
                    let falls = body.last().is_some_and(|&s| {
                        matches!(
                            self.ast.kind(s),
                            NodeKind::Branch {
                                kind: BranchKind::Fallthrough,
                                ..
                            }
                        )
                    });
                    if !(falls || self.terminates_list(body))
                        || body.iter().any(|&s| self.has_break(s, label, true))
                    {
                        return false;
                    }
                }
                default
            }
            NodeKind::Select(clauses) => clauses.iter().all(|&clause| {
                let NodeKind::CommClause { body, .. } = self.ast.kind(clause) else {
                    return false;
                };
                self.terminates_list(body) && !body.iter().any(|&s| self.has_break(s, label, true))
            }),
            _ => false,
        }
    }

    /// Whether `stmt` contains a `break` leaving the enclosing statement
    /// labeled `label`. `top` is false once inside a nested breakable
    /// statement, where unlabeled breaks no longer count.
    fn has_break(&self, stmt: NodeId, label: Option<Name>, top: bool) -> bool {
        match self.ast.kind(stmt) {
            NodeKind::Branch {
                kind: BranchKind::Break,
                label: l,
            } => match l {
                None => top,
                Some(l) => Some(*l) == label,
            },
            NodeKind::FuncLit { .. } => false,
            NodeKind::For { body, .. } | NodeKind::Range { body, .. } => {
                self.has_break(*body, label, false)
            }
            NodeKind::Switch { clauses, .. }
            | NodeKind::TypeSwitch { clauses, .. }
            | NodeKind::Select(clauses) => clauses.iter().any(|&c| self.has_break(c, label, false)),
            NodeKind::CaseClause { body, .. } | NodeKind::CommClause { body, .. } => {
                body.iter().any(|&s| self.has_break(s, label, top))
            }
            NodeKind::Block(stmts) => stmts.iter().any(|&s| self.has_break(s, label, top)),
            NodeKind::If { then, els, .. } => {
                self.has_break(*then, label, top)
                    || els.is_some_and(|e| self.has_break(e, label, top))
            }
            NodeKind::Labeled { stmt, .. } => self.has_break(*stmt, label, top),
            _ => false,
        }
    }
}

/// Location of slot `index` in the frame `levels` up from the current one.
pub(crate) fn outer_loc(loc: Loc, levels: u32) -> Loc {
    match loc {
        Loc::Local(index) => Loc::Up {
            level: levels,
            index,
        },
        Loc::Up { level, index } => Loc::Up {
            level: level + levels,
            index,
        },
        global @ Loc::Global(_) => global,
    }
}
