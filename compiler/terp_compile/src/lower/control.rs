//! Branching and looping statements.

use smallvec::SmallVec;
use terp_diagnostic::ErrorCode;
use terp_eval::program::{NumKind, Op, OpKind, RangeKind, SelectCase, Src};
use terp_eval::Value;
use terp_ir::{BinaryOp, BranchKind, Name, NodeId, NodeKind, Span, UnaryOp};
use terp_types::{Idx, TypeData};

use super::expr::strip_parens;
use super::stmt::outer_loc;
use super::{Edge, LValue, Operand, Target};
use crate::error::{fail, Check};
use crate::scope::{ScopeKind, Storage, SymbolKind};
use crate::CompileContext;

/// A lowered `case` of a `select`, before its body.
enum CommBind {
    None,
    Define {
        names: SmallVec<[(Name, Span); 2]>,
        elem: Idx,
    },
    Assign {
        targets: SmallVec<[NodeId; 2]>,
        elem: Idx,
    },
}

impl CompileContext {
    fn take_label(&mut self) -> Option<Name> {
        self.funcs.last_mut().and_then(|s| s.label.take())
    }

    fn push_target(&mut self, label: Option<Name>, loops: bool) {
        let depth = self.depth();
        if let Some(state) = self.funcs.last_mut() {
            state.targets.push(Target {
                label,
                depth,
                breaks: Vec::new(),
                continues: loops.then(Vec::new),
            });
        }
    }

    fn pop_target(&mut self) -> Option<Target> {
        self.funcs.last_mut().and_then(|s| s.targets.pop())
    }

    fn lower_init(&mut self, init: Option<NodeId>) -> Check<()> {
        match init {
            Some(init) => self.lower_stmt(init),
            None => Ok(()),
        }
    }

    /// Lower a condition and branch on it; the tail continues on true.
    fn lower_cond(&mut self, cond: NodeId) -> Check<Vec<Edge>> {
        let span = self.ast.span(cond);
        let c = self.lower_expr(cond)?;
        self.expect_bool(&c, cond)?;
        let src = self.value_of(&c, span)?;
        Ok(self.branch(src, span))
    }

    pub(crate) fn lower_if(
        &mut self,
        init: Option<NodeId>,
        cond: NodeId,
        then: NodeId,
        els: Option<NodeId>,
        _span: Span,
    ) -> Check<()> {
        self.push_scope(ScopeKind::Block);
        self.lower_init(init)?;
        let otherwise = self.lower_cond(cond)?;
        self.lower_stmt(then)?;
        match els {
            Some(els) => {
                let done = self.take_tail();
                self.add_tail(otherwise);
                self.lower_stmt(els)?;
                self.add_tail(done);
            }
            None => self.add_tail(otherwise),
        }
        self.pop_scope();
        Ok(())
    }

    /// Three-clause `for`. Each iteration runs in its own frame; variables
    /// declared by the init statement are copied into the next iteration's
    /// frame before the post statement runs.
    pub(crate) fn lower_for(
        &mut self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        post: Option<NodeId>,
        body: NodeId,
        span: Span,
    ) -> Check<()> {
        let label = self.take_label();
        self.enter_frame(span);
        self.push_scope(ScopeKind::Loop);
        self.lower_init(init)?;

        let depth = self.depth();
        let mut carry: SmallVec<[u32; 4]> = self
            .scopes
            .last()
            .into_iter()
            .flat_map(|s| s.symbols())
            .filter_map(|sym| match sym.storage {
                Storage::Local { depth: d, index } if d == depth => Some(index),
                _ => None,
            })
            .collect();
        carry.sort_unstable();

        let head = self.label_here(span);
        let exits = match cond {
            Some(cond) => self.lower_cond(cond)?,
            None => Vec::new(),
        };
        self.push_target(label, true);
        self.lower_stmt(body)?;
        let target = self.pop_target();
        let (breaks, continues) = target
            .map(|t| (t.breaks, t.continues.unwrap_or_default()))
            .unwrap_or_default();
        self.add_tail(continues);
        self.next_frame(carry, span);
        if let Some(post) = post {
            self.lower_stmt(post)?;
        }
        self.jump_to(head);

        self.add_tail(exits);
        self.add_tail(breaks);
        self.emit(Op::LeaveFrame { levels: 1 }, span);
        self.pop_scope();
        self.leave_frame();
        Ok(())
    }

    pub(crate) fn lower_range(
        &mut self,
        key: Option<NodeId>,
        value: Option<NodeId>,
        define: bool,
        expr: NodeId,
        body: NodeId,
        span: Span,
    ) -> Check<()> {
        let label = self.take_label();
        let x = self.lower_expr(expr)?;
        let x = if self.pool.is_integer(x.ty) && x.ty.is_untyped() {
            self.convert_untyped(x, Idx::INT, span)?
        } else {
            x
        };
        let (kind, key_ty, value_ty) = self.range_shape(&x, expr)?;
        if value.is_some() && value_ty.is_none() {
            return fail(
                ErrorCode::E2020,
                span,
                format!(
                    "range over {} permits only one iteration variable",
                    self.expr_text(expr)
                ),
            );
        }
        let src = self.value_of(&x, span)?;
        let iter = self.temp();
        self.emit(Op::RangeStart { dst: iter, src, kind }, span);

        self.enter_frame(span);
        self.push_scope(ScopeKind::Loop);
        let iter = Src::Loc(outer_loc(iter, 1));
        let value_ty = value_ty.unwrap_or(Idx::INVALID);
        let next = if define {
            let k = self.range_var(key, key_ty)?;
            let v = self.range_var(value, value_ty)?;
            self.emit(
                Op::RangeNext {
                    iter,
                    key: k,
                    value: v,
                },
                span,
            )
        } else {
            let k = key.map(|_| self.temp());
            let v = value.map(|_| self.temp());
            let next = self.emit(Op::RangeNext { iter, key: k, value: v }, span);
            for (node, slot, ty) in [(key, k, key_ty), (value, v, value_ty)] {
                let (Some(node), Some(slot)) = (node, slot) else {
                    continue;
                };
                let (lv, target) = self.lower_lvalue(node)?;
                let from = Operand::value(ty, Src::Loc(slot));
                let src = match lv {
                    LValue::Blank => Src::Loc(slot),
                    _ => self.coerce(from, target, self.ast.span(node), "range")?,
                };
                self.store(&lv, src, span)?;
            }
            next
        };

        self.push_target(label, true);
        self.lower_stmt(body)?;
        let target = self.pop_target();
        let (breaks, continues) = target
            .map(|t| (t.breaks, t.continues.unwrap_or_default()))
            .unwrap_or_default();
        self.add_tail(continues);
        self.next_frame(SmallVec::new(), span);
        self.jump_to(next);

        self.add_tail(vec![Edge {
            from: next,
            alt: true,
        }]);
        self.add_tail(breaks);
        self.emit(Op::LeaveFrame { levels: 1 }, span);
        self.pop_scope();
        self.leave_frame();
        Ok(())
    }

    /// Iteration kind and key/value types of ranging over `x`.
    fn range_shape(&self, x: &Operand, expr: NodeId) -> Check<(RangeKind, Idx, Option<Idx>)> {
        let span = self.ast.span(expr);
        let shape = match self.pool.underlying_data(x.ty) {
            TypeData::Basic(kind) if kind.is_string() => {
                Some((RangeKind::Str, Idx::INT, Some(Idx::RUNE)))
            }
            TypeData::Basic(kind) if kind.is_integer() => Some((RangeKind::Int, x.ty, None)),
            TypeData::Array { elem, .. } | TypeData::Slice(elem) => {
                Some((RangeKind::Seq, Idx::INT, Some(*elem)))
            }
            TypeData::Pointer(target) => match self.pool.underlying_data(*target) {
                TypeData::Array { elem, .. } => Some((RangeKind::Seq, Idx::INT, Some(*elem))),
                _ => None,
            },
            TypeData::Map { key, value } => Some((RangeKind::Map, *key, Some(*value))),
            TypeData::Chan { dir, elem } if dir.can_recv() => Some((RangeKind::Chan, *elem, None)),
            _ => None,
        };
        match shape {
            Some(shape) => Ok(shape),
            None => fail(
                ErrorCode::E2020,
                span,
                format!(
                    "cannot range over {} (value of type {})",
                    self.expr_text(expr),
                    self.pool.display(x.ty)
                ),
            ),
        }
    }

    /// Declare a `for k, v := range` variable.
    fn range_var(&mut self, node: Option<NodeId>, ty: Idx) -> Check<Option<terp_eval::program::Loc>> {
        let Some(node) = node else {
            return Ok(None);
        };
        let span = self.ast.span(node);
        let NodeKind::Ident(name) = *self.ast.kind(node) else {
            return fail(
                ErrorCode::E2002,
                span,
                format!("non-name {} on left side of :=", self.expr_text(node)),
            );
        };
        if name == self.names.blank {
            return Ok(None);
        }
        self.declare_var(name, ty, span).map(Some)
    }

    // === switch ===

    /// Split clauses into `(exprs, body, span)` and the default's index.
    fn switch_clauses(
        &self,
        clauses: &[NodeId],
    ) -> Check<(Vec<(Vec<NodeId>, Vec<NodeId>, Span)>, Option<usize>)> {
        let mut out = Vec::with_capacity(clauses.len());
        let mut default = None;
        for (i, &clause) in clauses.iter().enumerate() {
            let span = self.ast.span(clause);
            let NodeKind::CaseClause {
                exprs,
                default: d,
                body,
            } = self.ast.kind(clause).clone()
            else {
                return fail(ErrorCode::E9001, span, "switch clause expected");
            };
            if d {
                if default.is_some() {
                    return fail(ErrorCode::E1002, span, "multiple defaults in switch");
                }
                default = Some(i);
            }
            out.push((exprs, body, span));
        }
        Ok((out, default))
    }

    pub(crate) fn lower_switch(
        &mut self,
        init: Option<NodeId>,
        tag: Option<NodeId>,
        clauses: &[NodeId],
        _span: Span,
    ) -> Check<()> {
        let label = self.take_label();
        self.push_scope(ScopeKind::Block);
        self.lower_init(init)?;
        let tag = match tag {
            Some(tag) => {
                let tspan = self.ast.span(tag);
                let t = self.lower_expr(tag)?;
                if t.is_nil() {
                    return fail(ErrorCode::E2019, tspan, "use of untyped nil in switch expression");
                }
                let t = self.default_operand(t, tspan)?;
                let src = self.value_of(&t, tspan)?;
                let held = self.temp();
                self.emit(Op::Move { dst: held, src }, tspan);
                Some(Operand::value(t.ty, Src::Loc(held)))
            }
            None => None,
        };
        let (clauses, default) = self.switch_clauses(clauses)?;

        let mut entries: Vec<Vec<Edge>> = vec![Vec::new(); clauses.len()];
        for (i, (exprs, _, _)) in clauses.iter().enumerate() {
            for &e in exprs {
                let espan = self.ast.span(e);
                let cond = match &tag {
                    Some(tag) => {
                        let v = self.lower_expr(e)?;
                        self.binary_op(BinaryOp::Eq, tag.clone(), v, espan)?
                    }
                    None => {
                        let v = self.lower_expr(e)?;
                        self.expect_bool(&v, e)?;
                        v
                    }
                };
                let src = self.value_of(&cond, espan)?;
                let miss = self.branch(src, espan);
                let hit = self.take_tail();
                entries[i].extend(hit);
                self.add_tail(miss);
            }
        }
        let no_match = self.take_tail();
        match default {
            Some(d) => entries[d].extend(no_match),
            None => entries.push(no_match),
        }

        self.push_target(label, false);
        let mut end = Vec::new();
        let mut fall: Vec<Edge> = Vec::new();
        let last = clauses.len().saturating_sub(1);
        for (i, (_, body, cspan)) in clauses.into_iter().enumerate() {
            let edges = std::mem::take(&mut entries[i]);
            self.add_tail(edges);
            self.add_tail(std::mem::take(&mut fall));
            self.push_scope(ScopeKind::Block);
            let falls = body.last().is_some_and(|&s| {
                matches!(
                    self.ast.kind(s),
                    NodeKind::Branch {
                        kind: BranchKind::Fallthrough,
                        ..
                    }
                )
            });
            let stmts = if falls { &body[..body.len() - 1] } else { &body[..] };
            for &stmt in stmts {
                self.lower_stmt(stmt)?;
            }
            if falls {
                if i == last {
                    return fail(
                        ErrorCode::E1007,
                        cspan,
                        "cannot fallthrough final case in switch",
                    );
                }
                fall = self.take_tail();
            } else {
                end.extend(self.take_tail());
            }
            self.pop_scope();
        }
        if default.is_none() {
            end.extend(entries.pop().unwrap_or_default());
        }
        let breaks = self.pop_target().map(|t| t.breaks).unwrap_or_default();
        self.add_tail(end);
        self.add_tail(breaks);
        self.pop_scope();
        Ok(())
    }

    pub(crate) fn lower_type_switch(
        &mut self,
        init: Option<NodeId>,
        bind: Option<Name>,
        expr: NodeId,
        clauses: &[NodeId],
        span: Span,
    ) -> Check<()> {
        let label = self.take_label();
        self.push_scope(ScopeKind::Block);
        self.lower_init(init)?;
        let x = self.lower_expr(expr)?;
        self.expect_interface(&x, expr)?;
        let src = self.value_of(&x, span)?;
        let held = self.temp();
        self.emit(Op::Move { dst: held, src }, span);
        let (clauses, default) = self.switch_clauses(clauses)?;

        // `None` stands for the `nil` case.
        let mut seen: Vec<Option<Idx>> = Vec::new();
        let mut cases: Vec<Vec<Option<Idx>>> = Vec::with_capacity(clauses.len());
        let mut entries: Vec<Vec<Edge>> = vec![Vec::new(); clauses.len()];
        for (i, (exprs, _, _)) in clauses.iter().enumerate() {
            let mut types = Vec::with_capacity(exprs.len());
            for &e in exprs {
                let espan = self.ast.span(e);
                let ok = self.temp();
                let case = if self.is_nil_ident(e) {
                    self.emit(
                        Op::Binary {
                            dst: ok,
                            op: BinaryOp::Eq,
                            kind: OpKind::Any,
                            lhs: Src::Loc(held),
                            rhs: Src::Const(Value::Nil),
                        },
                        espan,
                    );
                    None
                } else {
                    let ty = self.resolve_type(e)?;
                    let target = self.assert_target(x.ty, ty, espan)?;
                    self.emit(
                        Op::TypeAssert {
                            dst: None,
                            ok: Some(ok),
                            src: Src::Loc(held),
                            target,
                            zero: Value::Nil,
                        },
                        espan,
                    );
                    Some(ty)
                };
                if seen.contains(&case) {
                    let what = case.map_or_else(|| "nil".to_owned(), |t| self.pool.display(t));
                    return fail(
                        ErrorCode::E1002,
                        espan,
                        format!("duplicate case {what} in type switch"),
                    );
                }
                seen.push(case);
                types.push(case);
                let miss = self.branch(Src::Loc(ok), espan);
                let hit = self.take_tail();
                entries[i].extend(hit);
                self.add_tail(miss);
            }
            cases.push(types);
        }
        let no_match = self.take_tail();
        match default {
            Some(d) => entries[d].extend(no_match),
            None => entries.push(no_match),
        }

        self.push_target(label, false);
        let mut end = Vec::new();
        for (i, (_, body, cspan)) in clauses.into_iter().enumerate() {
            let edges = std::mem::take(&mut entries[i]);
            self.add_tail(edges);
            self.push_scope(ScopeKind::Block);
            if let Some(name) = bind {
                match cases[i].as_slice() {
                    [Some(ty)] => {
                        let ty = *ty;
                        let dst = self.declare_var(name, ty, cspan)?;
                        let target = self.assert_target(x.ty, ty, cspan)?;
                        let zero = self.zero_value(ty);
                        self.emit(
                            Op::TypeAssert {
                                dst: Some(dst),
                                ok: None,
                                src: Src::Loc(held),
                                target,
                                zero,
                            },
                            cspan,
                        );
                    }
                    _ => {
                        let dst = self.declare_var(name, x.ty, cspan)?;
                        self.emit(
                            Op::Move {
                                dst,
                                src: Src::Loc(held),
                            },
                            cspan,
                        );
                    }
                }
            }
            for &stmt in &body {
                if let NodeKind::Branch {
                    kind: BranchKind::Fallthrough,
                    ..
                } = self.ast.kind(stmt)
                {
                    return fail(
                        ErrorCode::E1007,
                        self.ast.span(stmt),
                        "cannot fallthrough in type switch",
                    );
                }
                self.lower_stmt(stmt)?;
            }
            end.extend(self.take_tail());
            self.pop_scope();
        }
        if default.is_none() {
            end.extend(entries.pop().unwrap_or_default());
        }
        let breaks = self.pop_target().map(|t| t.breaks).unwrap_or_default();
        self.add_tail(end);
        self.add_tail(breaks);
        self.pop_scope();
        Ok(())
    }

    fn is_nil_ident(&self, node: NodeId) -> bool {
        match self.ast.kind(strip_parens(&self.ast, node)) {
            NodeKind::Ident(name) => self
                .find(*name)
                .is_some_and(|sym| sym.kind == SymbolKind::Nil),
            _ => false,
        }
    }

    // === select ===

    pub(crate) fn lower_select(&mut self, clauses: &[NodeId], span: Span) -> Check<()> {
        let label = self.take_label();
        let mut cases = Vec::new();
        // Per clause: case index (or `None` for default), bindings, body.
        let mut arms: Vec<(Option<usize>, CommBind, SmallVec<[terp_eval::program::Loc; 2]>, Vec<NodeId>, Span)> =
            Vec::with_capacity(clauses.len());
        let mut has_default = false;
        for &clause in clauses {
            let cspan = self.ast.span(clause);
            let NodeKind::CommClause { comm, body } = self.ast.kind(clause).clone() else {
                return fail(ErrorCode::E9001, cspan, "select clause expected");
            };
            let Some(comm) = comm else {
                if has_default {
                    return fail(ErrorCode::E1002, cspan, "multiple defaults in select");
                }
                has_default = true;
                arms.push((None, CommBind::None, SmallVec::new(), body, cspan));
                continue;
            };
            let (case, bind, slots) = self.comm_case(comm)?;
            arms.push((Some(cases.len()), bind, slots, body, cspan));
            cases.push(case);
        }

        let chosen = self.temp();
        self.emit(
            Op::Select {
                cases,
                has_default,
                chosen,
            },
            span,
        );

        self.push_target(label, false);
        let mut end = Vec::new();
        let mut default_arm = None;
        for (index, bind, slots, body, cspan) in arms {
            let Some(index) = index else {
                default_arm = Some((body, cspan));
                continue;
            };
            let cond = self.temp();
            self.emit(
                Op::Binary {
                    dst: cond,
                    op: BinaryOp::Eq,
                    kind: OpKind::Num(NumKind::I64),
                    lhs: Src::Loc(chosen),
                    rhs: Src::Const(Value::Int(i64::try_from(index).unwrap_or(i64::MAX))),
                },
                cspan,
            );
            let miss = self.branch(Src::Loc(cond), cspan);
            self.push_scope(ScopeKind::Block);
            self.bind_comm(bind, &slots, cspan)?;
            for &stmt in &body {
                self.lower_stmt(stmt)?;
            }
            end.extend(self.take_tail());
            self.pop_scope();
            self.add_tail(miss);
        }
        match default_arm {
            Some((body, _)) => {
                self.push_scope(ScopeKind::Block);
                for &stmt in &body {
                    self.lower_stmt(stmt)?;
                }
                self.pop_scope();
            }
            // Without a default the select only finishes through a case.
            None => {
                self.take_tail();
            }
        }
        let breaks = self.pop_target().map(|t| t.breaks).unwrap_or_default();
        self.add_tail(end);
        self.add_tail(breaks);
        Ok(())
    }

    /// Lower the communication of a `select` case. Channel operands and
    /// sent values are evaluated here, before the select blocks.
    fn comm_case(
        &mut self,
        comm: NodeId,
    ) -> Check<(SelectCase, CommBind, SmallVec<[terp_eval::program::Loc; 2]>)> {
        let span = self.ast.span(comm);
        let (lhs, rhs, define) = match self.ast.kind(comm).clone() {
            NodeKind::Send { chan, value } => {
                let ch = self.lower_expr(chan)?;
                let elem = match self.pool.underlying_data(ch.ty) {
                    TypeData::Chan { dir, elem } if dir.can_send() => *elem,
                    _ => {
                        return fail(
                            ErrorCode::E2020,
                            span,
                            format!(
                                "invalid operation: cannot send to {} (value of type {})",
                                self.expr_text(chan),
                                self.pool.display(ch.ty)
                            ),
                        )
                    }
                };
                let chan = self.value_of(&ch, span)?;
                let v = self.lower_expr(value)?;
                let value = self.coerce(v, elem, self.ast.span(value), "send")?;
                return Ok((SelectCase::Send { chan, value }, CommBind::None, SmallVec::new()));
            }
            NodeKind::ExprStmt(e) => (SmallVec::new(), e, false),
            NodeKind::Define { lhs, rhs } if rhs.len() == 1 => {
                (lhs.into_iter().collect::<SmallVec<[NodeId; 2]>>(), rhs[0], true)
            }
            NodeKind::Assign { lhs, rhs, op: None } if rhs.len() == 1 => {
                (lhs.into_iter().collect(), rhs[0], false)
            }
            _ => return self.bad_comm(span),
        };
        let NodeKind::Unary {
            op: UnaryOp::Recv,
            operand,
        } = *self.ast.kind(strip_parens(&self.ast, rhs))
        else {
            return self.bad_comm(span);
        };
        if lhs.len() > 2 {
            return fail(
                ErrorCode::E2010,
                span,
                format!("assignment mismatch: {} variables but 2 values", lhs.len()),
            );
        }
        let ch = self.lower_expr(operand)?;
        let elem = self.recv_elem(&ch, operand)?;
        let chan = self.value_of(&ch, span)?;
        let dst = (!lhs.is_empty()).then(|| self.temp());
        let ok = (lhs.len() == 2).then(|| self.temp());
        let slots: SmallVec<[terp_eval::program::Loc; 2]> = dst.into_iter().chain(ok).collect();
        let bind = if lhs.is_empty() {
            CommBind::None
        } else if define {
            let mut names = SmallVec::new();
            for &node in &lhs {
                let NodeKind::Ident(name) = *self.ast.kind(node) else {
                    return fail(
                        ErrorCode::E2002,
                        self.ast.span(node),
                        format!("non-name {} on left side of :=", self.expr_text(node)),
                    );
                };
                names.push((name, self.ast.span(node)));
            }
            CommBind::Define { names, elem }
        } else {
            CommBind::Assign { targets: lhs, elem }
        };
        let zero = self.zero_value(elem);
        Ok((
            SelectCase::Recv {
                chan,
                dst,
                ok,
                zero,
            },
            bind,
            slots,
        ))
    }

    fn bad_comm<T>(&self, span: Span) -> Check<T> {
        fail(
            ErrorCode::E2002,
            span,
            "select case must be receive, send or assign recv",
        )
    }

    /// Move received values into the variables of a `select` case.
    fn bind_comm(
        &mut self,
        bind: CommBind,
        slots: &[terp_eval::program::Loc],
        span: Span,
    ) -> Check<()> {
        match bind {
            CommBind::None => Ok(()),
            CommBind::Define { names, elem } => {
                for (i, ((name, nspan), &slot)) in names.into_iter().zip(slots).enumerate() {
                    let ty = if i == 0 { elem } else { Idx::BOOL };
                    if name == self.names.blank {
                        continue;
                    }
                    let dst = self.declare_var(name, ty, nspan)?;
                    self.emit(Op::Move { dst, src: Src::Loc(slot) }, nspan);
                }
                Ok(())
            }
            CommBind::Assign { targets, elem } => {
                for (i, (&node, &slot)) in targets.iter().zip(slots).enumerate() {
                    let (lv, ty) = self.lower_lvalue(node)?;
                    if let LValue::Blank = lv {
                        continue;
                    }
                    let from = if i == 0 { elem } else { Idx::UNTYPED_BOOL };
                    let src = self.coerce(Operand::value(from, Src::Loc(slot)), ty, span, "assignment")?;
                    self.store(&lv, src, span)?;
                }
                Ok(())
            }
        }
    }

    // === break / continue ===

    pub(crate) fn lower_branch(
        &mut self,
        kind: BranchKind,
        label: Option<Name>,
        span: Span,
    ) -> Check<()> {
        if kind == BranchKind::Fallthrough {
            return fail(ErrorCode::E1007, span, "fallthrough statement out of place");
        }
        let is_break = kind == BranchKind::Break;
        let depth = self.depth();
        let found = self.funcs.last().and_then(|state| match label {
            Some(l) => state
                .targets
                .iter()
                .rposition(|t| t.label == Some(l) && (is_break || t.continues.is_some())),
            None => state
                .targets
                .iter()
                .rposition(|t| is_break || t.continues.is_some()),
        });
        let Some(index) = found else {
            let message = match (label, is_break) {
                (Some(l), _) => format!("invalid {kind} label {}", self.interner.lookup(l)),
                (None, true) => "break is not in a loop, switch, or select".to_owned(),
                (None, false) => "continue is not in a loop".to_owned(),
            };
            let code = if label.is_some() {
                ErrorCode::E1006
            } else {
                ErrorCode::E1007
            };
            return fail(code, span, message);
        };
        let target_depth = self
            .funcs
            .last()
            .and_then(|s| s.targets.get(index))
            .map_or(depth, |t| t.depth);
        let levels = depth.saturating_sub(target_depth);
        if levels > 0 {
            self.emit(Op::LeaveFrame { levels }, span);
        }
        let edges = self.take_tail();
        if let Some(target) = self
            .funcs
            .last_mut()
            .and_then(|s| s.targets.get_mut(index))
        {
            match (&mut target.continues, is_break) {
                (Some(continues), false) => continues.extend(edges),
                _ => target.breaks.extend(edges),
            }
        }
        Ok(())
    }
}
