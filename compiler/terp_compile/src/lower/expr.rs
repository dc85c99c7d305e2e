//! Expressions: identifiers, operators, selectors, indexing and constant
//! evaluation.

use smallvec::SmallVec;
use terp_diagnostic::ErrorCode;
use terp_eval::program::{AssertTarget, Loc, Op, OpKind, Place, PlaceBase, Src, Step};
use terp_eval::{FuncValue, Value};
use terp_ir::{BinaryOp, Literal, Name, NodeId, NodeKind, Span, UnaryOp};
use terp_types::{ConstError, ConstValue, FieldStep, Idx, LookupError, Selection, TypeData};

use super::{Mode, Operand};
use crate::error::{fail, Check, Halt};
use crate::scope::{Storage, SymbolKind};
use crate::CompileContext;

impl CompileContext {
    /// Lower an expression that must produce exactly one value.
    pub(crate) fn lower_expr(&mut self, node: NodeId) -> Check<Operand> {
        let op = self.lower_operand(node)?;
        self.single(op, node)
    }

    /// Reject tuples and calls without results where one value is needed.
    pub(crate) fn single(&self, op: Operand, node: NodeId) -> Check<Operand> {
        let span = self.ast.span(node);
        match op.mode {
            Mode::Tuple(ref locs) => fail(
                ErrorCode::E2010,
                span,
                format!(
                    "multiple-value {} (value of type {}) in single-value context ({} values)",
                    self.expr_text(node),
                    self.pool.display(op.ty),
                    locs.len()
                ),
            ),
            Mode::Void => fail(
                ErrorCode::E2002,
                span,
                format!("{} (no value) used as value", self.expr_text(node)),
            ),
            _ => Ok(op),
        }
    }

    /// Lower any expression, including multi-value and void calls.
    pub(crate) fn lower_operand(&mut self, node: NodeId) -> Check<Operand> {
        terp_stack::ensure_sufficient_stack(|| self.lower_operand_inner(node))
    }

    fn lower_operand_inner(&mut self, node: NodeId) -> Check<Operand> {
        let span = self.ast.span(node);
        match self.ast.kind(node).clone() {
            NodeKind::Ident(name) => self.lower_ident(name, span),
            NodeKind::Lit(lit) => Ok(literal(&lit)),
            NodeKind::Paren(inner) => self.lower_operand(inner),
            NodeKind::Binary { op, left, right } => self.lower_binary(op, left, right, span),
            NodeKind::Unary { op, operand } => self.lower_unary(op, operand, span),
            NodeKind::Call { func, args, spread } => self.lower_call(node, func, &args, spread),
            NodeKind::Selector { base, sel } => self.lower_selector(base, sel, span),
            NodeKind::Index { base, indices } => self.lower_index(base, &indices, span),
            NodeKind::SliceExpr {
                base,
                low,
                high,
                max,
            } => self.lower_slice_expr(base, low, high, max, span),
            NodeKind::TypeAssert { base, ty: Some(ty) } => {
                self.lower_assert(base, ty, false, span).map(|(op, _)| op)
            }
            NodeKind::TypeAssert { ty: None, .. } => fail(
                ErrorCode::E2002,
                span,
                "use of .(type) outside type switch",
            ),
            NodeKind::Composite { .. } => self.lower_composite(node, None),
            NodeKind::FuncLit { sig, body } => self.lower_func_lit(sig, body, span),
            NodeKind::KeyValue { .. } => fail(
                ErrorCode::E2015,
                span,
                "unexpected key:value outside a composite literal",
            ),
            _ => {
                if self.try_type(node)?.is_some() {
                    return fail(
                        ErrorCode::E2011,
                        span,
                        format!("{} (type) is not an expression", self.expr_text(node)),
                    );
                }
                fail(ErrorCode::E9001, span, "unexpected node in expression position")
            }
        }
    }

    fn lower_ident(&mut self, name: Name, span: Span) -> Check<Operand> {
        let text = self.interner.lookup(name);
        if name == self.names.blank {
            return fail(
                ErrorCode::E2002,
                span,
                "cannot use _ as value",
            );
        }
        let sym = self.resolve_name(name, span)?;
        match sym.kind {
            SymbolKind::Var => {
                let loc = self.loc_of(&sym.storage, span)?;
                Ok(Operand::value(sym.ty, Src::Loc(loc)))
            }
            SymbolKind::Const if name == self.names.iota && sym.value.is_none() => {
                match self.iota {
                    Some(iota) => Ok(Operand::constant(Idx::UNTYPED_INT, ConstValue::Int(iota))),
                    None => fail(
                        ErrorCode::E2002,
                        span,
                        "cannot use iota outside constant declaration",
                    ),
                }
            }
            SymbolKind::Const => Ok(match sym.value {
                Some(value) => Operand::constant(sym.ty, value),
                None => Operand::value(Idx::INVALID, Src::Const(Value::Nil)),
            }),
            SymbolKind::Func => match sym.storage {
                Storage::Func(func) => Ok(Operand::value(
                    sym.ty,
                    Src::Const(Value::Func(FuncValue::Closure { func, env: None })),
                )),
                Storage::Host(value) => Ok(Operand::value(sym.ty, Src::Const(value))),
                Storage::Generic(_) => fail(
                    ErrorCode::E2008,
                    span,
                    format!("cannot use generic function {text} without instantiation"),
                ),
                _ => fail(ErrorCode::E9001, span, format!("function {text} has no body")),
            },
            SymbolKind::Type => fail(
                ErrorCode::E2011,
                span,
                format!("{text} (type) is not an expression"),
            ),
            SymbolKind::Package => fail(
                ErrorCode::E2011,
                span,
                format!("use of package {text} without selector"),
            ),
            SymbolKind::Builtin => fail(
                ErrorCode::E2002,
                span,
                format!("{text} (built-in function) must be called"),
            ),
            SymbolKind::Nil => Ok(Operand::nil()),
            SymbolKind::Pending => fail(
                ErrorCode::E1004,
                span,
                format!("invalid recursive reference to {text}"),
            ),
        }
    }

    // === Operators ===

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
        span: Span,
    ) -> Check<Operand> {
        if op.is_logical() {
            return self.lower_logical(op, left, right, span);
        }
        let l = self.lower_expr(left)?;
        let r = self.lower_expr(right)?;
        self.binary_op(op, l, r, span)
    }

    /// `&&` and `||` evaluate their right operand only when needed.
    fn lower_logical(
        &mut self,
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
        span: Span,
    ) -> Check<Operand> {
        let l = self.lower_expr(left)?;
        self.expect_bool(&l, left)?;
        let dst = self.temp();
        let lsrc = self.value_of(&l, span)?;
        self.emit(Op::Move { dst, src: lsrc }, span);
        let falses = self.branch(Src::Loc(dst), span);
        let skip = if op == BinaryOp::LogicalAnd {
            falses
        } else {
            let trues = self.take_tail();
            self.add_tail(falses);
            trues
        };
        let r = self.lower_expr(right)?;
        self.expect_bool(&r, right)?;
        let ty = match (l.ty.is_untyped(), r.ty.is_untyped()) {
            (true, true) => Idx::UNTYPED_BOOL,
            (false, true) => l.ty,
            (true, false) => r.ty,
            (false, false) if l.ty == r.ty => l.ty,
            (false, false) => {
                return fail(
                    ErrorCode::E2001,
                    span,
                    format!(
                        "invalid operation: mismatched types {} and {}",
                        self.pool.display(l.ty),
                        self.pool.display(r.ty)
                    ),
                )
            }
        };
        let rsrc = self.value_of(&r, span)?;
        self.emit(Op::Move { dst, src: rsrc }, span);
        self.add_tail(skip);
        Ok(Operand::value(ty, Src::Loc(dst)))
    }

    pub(crate) fn expect_bool(&self, op: &Operand, node: NodeId) -> Check<()> {
        if self.pool.is_boolean(op.ty) || op.ty.is_invalid() {
            return Ok(());
        }
        fail(
            ErrorCode::E2001,
            self.ast.span(node),
            format!(
                "non-boolean condition {} (type {})",
                self.expr_text(node),
                self.pool.display(op.ty)
            ),
        )
    }

    /// Type-check and emit a non-logical binary operation.
    pub(crate) fn binary_op(
        &mut self,
        op: BinaryOp,
        l: Operand,
        r: Operand,
        span: Span,
    ) -> Check<Operand> {
        if op.is_shift() {
            return self.shift_op(op, l, r, span);
        }
        if let (Some(a), Some(b)) = (l.const_value(), r.const_value()) {
            let (a, b) = (a.clone(), b.clone());
            return self.fold_binary(op, (l.ty, a), (r.ty, b), span);
        }
        let nil_cmp = l.is_nil() || r.is_nil();
        if l.is_nil() && r.is_nil() {
            return fail(
                ErrorCode::E2002,
                span,
                format!("invalid operation: operator {op} not defined on nil"),
            );
        }
        let (l, r) = self.match_operands(op, l, r, span)?;
        let ty = l.ty;
        if op.is_comparison() {
            return self.comparison(op, l, r, nil_cmp, span);
        }
        self.check_arith(op, ty, span)?;
        if matches!(op, BinaryOp::Div | BinaryOp::Rem)
            && self.pool.is_integer(ty)
            && r.const_value().and_then(ConstValue::as_int) == Some(0)
        {
            return fail(ErrorCode::E2017, span, "invalid operation: division by zero");
        }
        let lhs = self.value_of(&l, span)?;
        let rhs = self.value_of(&r, span)?;
        let dst = self.temp();
        let kind = self.op_kind(ty);
        self.emit(
            Op::Binary {
                dst,
                op,
                kind,
                lhs,
                rhs,
            },
            span,
        );
        Ok(Operand::value(ty, Src::Loc(dst)))
    }

    /// Give both operands one type: an untyped side takes the other's type;
    /// for comparisons a side assignable to the other's type is converted.
    fn match_operands(
        &mut self,
        op: BinaryOp,
        l: Operand,
        r: Operand,
        span: Span,
    ) -> Check<(Operand, Operand)> {
        match (l.ty.is_untyped(), r.ty.is_untyped()) {
            (true, false) => {
                let l = self.convert_untyped(l, r.ty, span)?;
                Ok((l, r))
            }
            (false, true) => {
                let r = self.convert_untyped(r, l.ty, span)?;
                Ok((l, r))
            }
            (true, true) => {
                let ty = self.pool.wider_untyped(l.ty, r.ty);
                let ty = self.pool.default_type(ty);
                let l = self.convert_untyped(l, ty, span)?;
                let r = self.convert_untyped(r, ty, span)?;
                Ok((l, r))
            }
            (false, false) if l.ty == r.ty || l.ty.is_invalid() || r.ty.is_invalid() => Ok((l, r)),
            (false, false) => {
                if op.is_comparison() {
                    if self.pool.is_interface(r.ty) && self.pool.assignable_to(l.ty, r.ty) {
                        let src = self.coerce(l, r.ty, span, "comparison")?;
                        return Ok((Operand::value(r.ty, src), r));
                    }
                    if self.pool.is_interface(l.ty) && self.pool.assignable_to(r.ty, l.ty) {
                        let src = self.coerce(r, l.ty, span, "comparison")?;
                        return Ok((l.clone(), Operand::value(l.ty, src)));
                    }
                }
                fail(
                    ErrorCode::E2001,
                    span,
                    format!(
                        "invalid operation: operator {op} on mismatched types {} and {}",
                        self.pool.display(l.ty),
                        self.pool.display(r.ty)
                    ),
                )
            }
        }
    }

    fn comparison(
        &mut self,
        op: BinaryOp,
        l: Operand,
        r: Operand,
        nil_cmp: bool,
        span: Span,
    ) -> Check<Operand> {
        let ty = l.ty;
        let ok = if op.is_ordering() {
            self.pool.ordered(ty)
        } else {
            self.pool.comparable(ty) || (nil_cmp && self.pool.is_nillable(ty))
        };
        if !ok && !ty.is_invalid() {
            let why = if op.is_ordering() {
                format!("operator {op} not defined on {}", self.pool.display(ty))
            } else {
                format!("{} cannot be compared", self.pool.display(ty))
            };
            return fail(ErrorCode::E2002, span, format!("invalid operation: {why}"));
        }
        let kind = if nil_cmp { OpKind::Any } else { self.op_kind(ty) };
        let lhs = self.value_of(&l, span)?;
        let rhs = self.value_of(&r, span)?;
        let dst = self.temp();
        self.emit(
            Op::Binary {
                dst,
                op,
                kind,
                lhs,
                rhs,
            },
            span,
        );
        Ok(Operand::value(Idx::UNTYPED_BOOL, Src::Loc(dst)))
    }

    fn check_arith(&self, op: BinaryOp, ty: Idx, span: Span) -> Check<()> {
        let ok = match op {
            BinaryOp::Add => self.pool.is_numeric(ty) || self.pool.is_string(ty),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => self.pool.is_numeric(ty),
            BinaryOp::Rem
            | BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::Xor
            | BinaryOp::AndNot => self.pool.is_integer(ty),
            _ => false,
        };
        if ok || ty.is_invalid() {
            return Ok(());
        }
        fail(
            ErrorCode::E2002,
            span,
            format!(
                "invalid operation: operator {op} not defined on values of type {}",
                self.pool.display(ty)
            ),
        )
    }

    /// Fold a binary operation on two constants.
    pub(crate) fn fold_binary(
        &self,
        op: BinaryOp,
        (lt, a): (Idx, ConstValue),
        (rt, b): (Idx, ConstValue),
        span: Span,
    ) -> Check<Operand> {
        let ty = match (lt.is_untyped(), rt.is_untyped()) {
            (true, true) if lt == rt => lt,
            (true, true) => {
                let numeric = |t: Idx| {
                    matches!(t, Idx::UNTYPED_INT | Idx::UNTYPED_RUNE | Idx::UNTYPED_FLOAT)
                };
                if !numeric(lt) || !numeric(rt) {
                    return self.mismatched(op, lt, rt, span);
                }
                self.pool.wider_untyped(lt, rt)
            }
            (false, true) => lt,
            (true, false) => rt,
            (false, false) if lt == rt => lt,
            (false, false) => return self.mismatched(op, lt, rt, span),
        };
        let (a, b) = if ty.is_untyped() {
            (a, b)
        } else {
            (self.to_kind(a, lt, ty, span)?, self.to_kind(b, rt, ty, span)?)
        };
        if op.is_comparison() {
            let ok = if op.is_ordering() {
                self.pool.ordered(ty) || (ty.is_untyped() && !matches!(a, ConstValue::Bool(_)))
            } else {
                true
            };
            let result = if ok { a.compare(op, &b).ok() } else { None };
            return match result {
                Some(v) => Ok(Operand::constant(Idx::UNTYPED_BOOL, ConstValue::Bool(v))),
                None => fail(
                    ErrorCode::E2002,
                    span,
                    format!(
                        "invalid operation: operator {op} not defined on {}",
                        self.pool.display(ty)
                    ),
                ),
            };
        }
        if !ty.is_untyped() {
            self.check_arith(op, ty, span)?;
        }
        let value = match a.binary(op, &b) {
            Ok(v) => v,
            Err(err) => return self.const_error(err, op, ty, span),
        };
        if ty.is_untyped() {
            return Ok(Operand::constant(ty, value));
        }
        let value = self.to_kind(value, ty, ty, span)?;
        Ok(Operand::constant(ty, value))
    }

    fn mismatched<T>(&self, op: BinaryOp, a: Idx, b: Idx, span: Span) -> Check<T> {
        fail(
            ErrorCode::E2001,
            span,
            format!(
                "invalid operation: operator {op} on mismatched types {} and {}",
                self.pool.display(a),
                self.pool.display(b)
            ),
        )
    }

    fn const_error<T>(&self, err: ConstError, op: BinaryOp, ty: Idx, span: Span) -> Check<T> {
        match err {
            ConstError::DivByZero => {
                fail(ErrorCode::E2017, span, "invalid operation: division by zero")
            }
            ConstError::Overflow => fail(
                ErrorCode::E2006,
                span,
                format!("constant {op} overflows {}", self.pool.display(ty)),
            ),
            ConstError::NegativeShift => fail(
                ErrorCode::E2002,
                span,
                "invalid shift count (negative)",
            ),
            ConstError::Truncated | ConstError::Mismatch => fail(
                ErrorCode::E2002,
                span,
                format!(
                    "invalid operation: operator {op} not defined on {}",
                    self.pool.display(ty)
                ),
            ),
        }
    }

    /// Convert constant `value` of type `from` to the basic kind of `to`.
    pub(crate) fn to_kind(
        &self,
        value: ConstValue,
        from: Idx,
        to: Idx,
        span: Span,
    ) -> Check<ConstValue> {
        let Some(kind) = self.pool.basic_kind(to) else {
            return Ok(value);
        };
        match value.convert(kind) {
            Ok(v) => Ok(v),
            Err(ConstError::Overflow) => fail(
                ErrorCode::E2006,
                span,
                format!(
                    "cannot use {value} ({} constant) as {} value (overflows)",
                    self.pool.display(from),
                    self.pool.display(to)
                ),
            ),
            Err(ConstError::Truncated) => fail(
                ErrorCode::E2006,
                span,
                format!(
                    "cannot use {value} ({} constant) as {} value (truncated)",
                    self.pool.display(from),
                    self.pool.display(to)
                ),
            ),
            Err(_) => fail(
                ErrorCode::E2001,
                span,
                format!(
                    "cannot use {value} ({} constant) as {} value",
                    self.pool.display(from),
                    self.pool.display(to)
                ),
            ),
        }
    }

    fn shift_op(&mut self, op: BinaryOp, l: Operand, r: Operand, span: Span) -> Check<Operand> {
        let count_ok = self.pool.is_integer(r.ty)
            || r.const_value().is_some_and(|v| v.as_int().is_some());
        if !count_ok && !r.ty.is_invalid() {
            return fail(
                ErrorCode::E2002,
                span,
                format!(
                    "invalid operation: shift count type {}, must be integer",
                    self.pool.display(r.ty)
                ),
            );
        }
        if let Some(n) = r.const_value().and_then(ConstValue::as_int) {
            if n < 0 {
                return fail(ErrorCode::E2002, span, format!("invalid shift count {n}"));
            }
        }
        if let (Some(a), Some(b)) = (l.const_value(), r.const_value()) {
            let value = match a.shift(op, b) {
                Ok(v) => v,
                Err(err) => return self.const_error(err, op, l.ty, span),
            };
            if l.ty.is_untyped() {
                return Ok(Operand::constant(Idx::UNTYPED_INT, value));
            }
            if !self.pool.is_integer(l.ty) {
                return self.not_integer_shift(l.ty, span);
            }
            let value = self.to_kind(value, l.ty, l.ty, span)?;
            return Ok(Operand::constant(l.ty, value));
        }
        let l = if l.ty.is_untyped() {
            self.convert_untyped(l, Idx::INT, span)?
        } else {
            l
        };
        if !self.pool.is_integer(l.ty) && !l.ty.is_invalid() {
            return self.not_integer_shift(l.ty, span);
        }
        let r = if r.ty.is_untyped() {
            self.convert_untyped(r, Idx::UINT, span)?
        } else {
            r
        };
        let lhs = self.value_of(&l, span)?;
        let rhs = self.value_of(&r, span)?;
        let dst = self.temp();
        let kind = self.op_kind(l.ty);
        self.emit(
            Op::Binary {
                dst,
                op,
                kind,
                lhs,
                rhs,
            },
            span,
        );
        Ok(Operand::value(l.ty, Src::Loc(dst)))
    }

    fn not_integer_shift<T>(&self, ty: Idx, span: Span) -> Check<T> {
        fail(
            ErrorCode::E2002,
            span,
            format!(
                "invalid operation: shifted operand of type {} must be integer",
                self.pool.display(ty)
            ),
        )
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: NodeId, span: Span) -> Check<Operand> {
        match op {
            UnaryOp::Addr => self.lower_addr(operand, span),
            UnaryOp::Deref => {
                let p = self.lower_expr(operand)?;
                let Some(elem) = self.pool.pointer_elem(p.ty) else {
                    return fail(
                        ErrorCode::E2002,
                        span,
                        format!(
                            "invalid operation: cannot indirect {} (type {})",
                            self.expr_text(operand),
                            self.pool.display(p.ty)
                        ),
                    );
                };
                let ptr = self.value_of(&p, span)?;
                let dst = self.temp();
                self.emit(
                    Op::Load {
                        dst,
                        place: Place {
                            base: PlaceBase::Deref(ptr),
                            steps: SmallVec::new(),
                        },
                    },
                    span,
                );
                Ok(Operand::value(elem, Src::Loc(dst)))
            }
            UnaryOp::Recv => {
                let ch = self.lower_expr(operand)?;
                let elem = self.recv_elem(&ch, operand)?;
                let chan = self.value_of(&ch, span)?;
                let dst = self.temp();
                let zero = self.zero_value(elem);
                self.emit(
                    Op::Recv {
                        chan,
                        dst: Some(dst),
                        ok: None,
                        zero,
                    },
                    span,
                );
                Ok(Operand::value(elem, Src::Loc(dst)))
            }
            _ => {
                let x = self.lower_expr(operand)?;
                self.unary_op(op, x, span)
            }
        }
    }

    /// Element type of a channel that can be received from.
    pub(crate) fn recv_elem(&self, ch: &Operand, node: NodeId) -> Check<Idx> {
        let span = self.ast.span(node);
        match self.pool.underlying_data(ch.ty) {
            TypeData::Chan { dir, elem } if dir.can_recv() => Ok(*elem),
            TypeData::Chan { .. } => fail(
                ErrorCode::E2020,
                span,
                format!(
                    "invalid operation: cannot receive from send-only channel {}",
                    self.expr_text(node)
                ),
            ),
            _ => fail(
                ErrorCode::E2020,
                span,
                format!(
                    "invalid operation: cannot receive from non-channel {} (type {})",
                    self.expr_text(node),
                    self.pool.display(ch.ty)
                ),
            ),
        }
    }

    pub(crate) fn unary_op(&mut self, op: UnaryOp, x: Operand, span: Span) -> Check<Operand> {
        let ok = match op {
            UnaryOp::Not => self.pool.is_boolean(x.ty),
            UnaryOp::Neg | UnaryOp::Plus => self.pool.is_numeric(x.ty),
            UnaryOp::BitNot => {
                self.pool.is_integer(x.ty)
                    || x.const_value().is_some_and(|v| matches!(v, ConstValue::Int(_)))
            }
            _ => false,
        };
        if !ok && !x.ty.is_invalid() {
            return fail(
                ErrorCode::E2002,
                span,
                format!(
                    "invalid operation: operator {op} not defined on values of type {}",
                    self.pool.display(x.ty)
                ),
            );
        }
        if let Some(v) = x.const_value() {
            let kind = self.pool.basic_kind(x.ty);
            let value = match v.unary(op, kind) {
                Ok(v) => v,
                Err(_) => {
                    return fail(
                        ErrorCode::E2006,
                        span,
                        format!("constant {op}{v} overflows {}", self.pool.display(x.ty)),
                    )
                }
            };
            let value = if x.ty.is_untyped() {
                value
            } else {
                self.to_kind(value, x.ty, x.ty, span)?
            };
            return Ok(Operand::constant(x.ty, value));
        }
        if op == UnaryOp::Plus {
            return Ok(x);
        }
        let src = self.value_of(&x, span)?;
        let dst = self.temp();
        let kind = self.op_kind(x.ty);
        self.emit(Op::Unary { dst, op, kind, src }, span);
        Ok(Operand::value(x.ty, Src::Loc(dst)))
    }

    // === Selectors ===

    fn lower_selector(&mut self, base: NodeId, sel: Name, span: Span) -> Check<Operand> {
        if let Some(pkg) = self.package_of(base) {
            return self.host_member(pkg, sel, span);
        }
        let (x, place) = self.lower_recv_base(base)?;
        let selection = self.select(&x, base, sel, span)?;
        match selection {
            Selection::Field { ref path, ty } => {
                let place = self.field_place(&x, path, span)?;
                let dst = self.temp();
                self.emit(Op::Load { dst, place }, span);
                Ok(Operand::value(ty, Src::Loc(dst)))
            }
            Selection::Method { ref method, recv, .. } => {
                let func = self.method_func(recv, method.name, span)?;
                let sig = method.sig;
                let recv = self.method_recv(&x, place, &selection, span)?;
                let dst = self.temp();
                self.emit(Op::MethodValue { dst, recv, func }, span);
                Ok(Operand::value(sig, Src::Loc(dst)))
            }
            Selection::IfaceMethod { ref path, sig, .. } => {
                let recv = self.embedded_value(&x, path, span)?;
                let dst = self.temp();
                self.emit(
                    Op::IfaceMethodValue {
                        dst,
                        recv,
                        name: sel,
                    },
                    span,
                );
                Ok(Operand::value(sig, Src::Loc(dst)))
            }
        }
    }

    /// Look up `sel` on the type of `x`.
    pub(crate) fn select(
        &self,
        x: &Operand,
        base: NodeId,
        sel: Name,
        span: Span,
    ) -> Check<Selection> {
        let name = self.interner.lookup(sel);
        match self.pool.lookup(x.ty, sel) {
            Ok(selection) => Ok(selection),
            Err(LookupError::NotFound) if self.pending_methods > 0 => Err(Halt::Blocked {
                name: sel,
                span,
                pending: true,
            }),
            Err(LookupError::NotFound) => fail(
                ErrorCode::E1005,
                span,
                format!(
                    "{}.{name} undefined (type {} has no field or method {name})",
                    self.expr_text(base),
                    self.pool.display(x.ty)
                ),
            ),
            Err(LookupError::Ambiguous) => fail(
                ErrorCode::E1005,
                span,
                format!("ambiguous selector {}.{name}", self.expr_text(base)),
            ),
        }
    }

    pub(crate) fn method_func(&self, recv: Idx, name: Name, span: Span) -> Check<terp_eval::FuncId> {
        match self.methods.get(&(recv, name)) {
            Some(&func) => Ok(func),
            None => fail(
                ErrorCode::E9001,
                span,
                format!(
                    "method {}.{} has no body",
                    self.pool.display(recv),
                    self.interner.lookup(name)
                ),
            ),
        }
    }

    /// Place of the field `path` selects, starting from the value `x`.
    pub(crate) fn field_place(
        &mut self,
        x: &Operand,
        path: &[FieldStep],
        span: Span,
    ) -> Check<Place> {
        let src = self.value_of(x, span)?;
        let place = match path.first() {
            Some(step) if step.ptr => Place {
                base: PlaceBase::Deref(src),
                steps: SmallVec::new(),
            },
            _ => Place::loc(self.to_loc(src, span)),
        };
        Ok(self.extend_path(place, path, span))
    }

    /// Follow `path` from `place`, loading through embedded pointers.
    pub(crate) fn extend_path(&mut self, mut place: Place, path: &[FieldStep], span: Span) -> Place {
        for (i, step) in path.iter().enumerate() {
            if i > 0 && step.ptr {
                let ptr = self.temp();
                self.emit(Op::Load { dst: ptr, place }, span);
                place = Place {
                    base: PlaceBase::Deref(Src::Loc(ptr)),
                    steps: SmallVec::new(),
                };
            }
            place.steps.push(Step::Field(step.index));
        }
        place
    }

    /// Value reached from `x` through embedded fields `path`.
    pub(crate) fn embedded_value(
        &mut self,
        x: &Operand,
        path: &[FieldStep],
        span: Span,
    ) -> Check<Src> {
        if path.is_empty() {
            return self.value_of(x, span);
        }
        let place = self.field_place(x, path, span)?;
        let dst = self.temp();
        self.emit(Op::Load { dst, place }, span);
        Ok(Src::Loc(dst))
    }

    /// The receiver argument for calling the method `sel` selects on `x`,
    /// taking its address or dereferencing as the receiver kind requires.
    pub(crate) fn method_recv(
        &mut self,
        x: &Operand,
        place: Option<Place>,
        sel: &Selection,
        span: Span,
    ) -> Check<Src> {
        let Selection::Method {
            path,
            method,
            recv_ptr,
            ..
        } = sel
        else {
            return fail(ErrorCode::E9001, span, "receiver of a non-method");
        };
        match (method.ptr_recv, *recv_ptr) {
            (true, true) | (false, false) => self.embedded_value(x, path, span),
            (false, true) => {
                let ptr = self.embedded_value(x, path, span)?;
                let dst = self.temp();
                self.emit(
                    Op::Load {
                        dst,
                        place: Place {
                            base: PlaceBase::Deref(ptr),
                            steps: SmallVec::new(),
                        },
                    },
                    span,
                );
                Ok(Src::Loc(dst))
            }
            (true, false) => {
                let place = if path.first().is_some_and(|s| s.ptr) {
                    let src = self.value_of(x, span)?;
                    let start = Place {
                        base: PlaceBase::Deref(src),
                        steps: SmallVec::new(),
                    };
                    Some(self.extend_path(start, path, span))
                } else {
                    place.map(|start| self.extend_path(start, path, span))
                };
                let Some(place) = place else {
                    return fail(
                        ErrorCode::E2002,
                        span,
                        format!(
                            "cannot call pointer method {} on {}",
                            self.interner.lookup(method.name),
                            self.pool.display(x.ty)
                        ),
                    );
                };
                let dst = self.temp();
                self.emit(Op::Addr { dst, place }, span);
                Ok(Src::Loc(dst))
            }
        }
    }

    /// A frame location holding `src`.
    pub(crate) fn to_loc(&mut self, src: Src, span: Span) -> Loc {
        match src {
            Src::Loc(loc) => loc,
            src @ Src::Const(_) => {
                let dst = self.temp();
                self.emit(Op::Move { dst, src }, span);
                dst
            }
        }
    }

    // === Indexing ===

    fn lower_index(&mut self, base: NodeId, indices: &[NodeId], span: Span) -> Check<Operand> {
        if let Some(id) = self.generic_func_of(base) {
            let mut args = Vec::with_capacity(indices.len());
            for &index in indices {
                args.push(self.resolve_type(index)?);
            }
            let (func, ty) = self.instantiate_func(id, args, span)?;
            return Ok(Operand::value(
                ty,
                Src::Const(Value::Func(FuncValue::Closure { func, env: None })),
            ));
        }
        if self.generic_type_of(base).is_some() {
            return fail(
                ErrorCode::E2011,
                span,
                format!("{} (type) is not an expression", self.expr_text(base)),
            );
        }
        let &[index] = indices else {
            return fail(
                ErrorCode::E2020,
                span,
                format!("unexpected comma in index of {}", self.expr_text(base)),
            );
        };
        let x = self.lower_expr(base)?;
        let under = self.pool.underlying_data(self.pool.default_type(x.ty)).clone();
        match under {
            TypeData::Basic(kind) if kind.is_string() => {
                let i = self.index_value(index, None)?;
                let text = self.value_of(&x, span)?;
                let dst = self.temp();
                self.emit(Op::StrIndex { dst, text, index: i }, span);
                Ok(Operand::value(Idx::BYTE, Src::Loc(dst)))
            }
            TypeData::Array { len, elem } => {
                let i = self.index_value(index, Some(len))?;
                let src = self.value_of(&x, span)?;
                let place = Place::loc(self.to_loc(src, span)).with(Step::Index { index: i, len });
                self.load(place, elem, span)
            }
            TypeData::Pointer(target) => match self.pool.underlying_data(target).clone() {
                TypeData::Array { len, elem } => {
                    let i = self.index_value(index, Some(len))?;
                    let ptr = self.value_of(&x, span)?;
                    let place = Place {
                        base: PlaceBase::Deref(ptr),
                        steps: SmallVec::new(),
                    }
                    .with(Step::Index { index: i, len });
                    self.load(place, elem, span)
                }
                _ => self.not_indexable(&x, base, span),
            },
            TypeData::Slice(elem) => {
                let i = self.index_value(index, None)?;
                let slice = self.value_of(&x, span)?;
                let place = Place {
                    base: PlaceBase::SliceElem { slice, index: i },
                    steps: SmallVec::new(),
                };
                self.load(place, elem, span)
            }
            TypeData::Map { key, value } => {
                let map = self.value_of(&x, span)?;
                let k = self.lower_expr(index)?;
                let key = self.coerce(k, key, self.ast.span(index), "map index")?;
                let dst = self.temp();
                let zero = self.zero_value(value);
                self.emit(
                    Op::MapIndex {
                        dst,
                        ok: None,
                        map,
                        key,
                        zero,
                    },
                    span,
                );
                Ok(Operand::value(value, Src::Loc(dst)))
            }
            _ => self.not_indexable(&x, base, span),
        }
    }

    pub(crate) fn not_indexable<T>(&self, x: &Operand, base: NodeId, span: Span) -> Check<T> {
        fail(
            ErrorCode::E2020,
            span,
            format!(
                "invalid operation: cannot index {} (value of type {})",
                self.expr_text(base),
                self.pool.display(x.ty)
            ),
        )
    }

    fn load(&mut self, place: Place, ty: Idx, span: Span) -> Check<Operand> {
        let dst = self.temp();
        self.emit(Op::Load { dst, place }, span);
        Ok(Operand::value(ty, Src::Loc(dst)))
    }

    /// The generic function declaration `node` names, if any.
    pub(crate) fn generic_func_of(&self, node: NodeId) -> Option<crate::GenericId> {
        let NodeKind::Ident(name) = self.ast.kind(node) else {
            return None;
        };
        match self.find(*name) {
            Some(sym) if sym.kind == SymbolKind::Func => match sym.storage {
                Storage::Generic(id) => Some(id),
                _ => None,
            },
            _ => None,
        }
    }

    /// An index operand: an integer, checked against `len` when constant.
    pub(crate) fn index_value(&mut self, node: NodeId, len: Option<u64>) -> Check<Src> {
        let span = self.ast.span(node);
        let i = self.lower_expr(node)?;
        if let Some(v) = i.const_value() {
            let Some(n) = v.as_int() else {
                return self.bad_index(&i, node);
            };
            if n < 0 {
                return fail(
                    ErrorCode::E2020,
                    span,
                    format!("invalid argument: index {n} must not be negative"),
                );
            }
            if let Some(len) = len {
                if n >= i128::from(len) {
                    return fail(
                        ErrorCode::E2020,
                        span,
                        format!("invalid argument: index {n} out of bounds [0:{len}]"),
                    );
                }
            }
            if i.ty.is_untyped() {
                return Ok(Src::Const(Value::Int(i64::try_from(n).unwrap_or(i64::MAX))));
            }
        }
        if !self.pool.is_integer(i.ty) && !i.ty.is_invalid() {
            return self.bad_index(&i, node);
        }
        self.value_of(&i, span)
    }

    fn bad_index<T>(&self, i: &Operand, node: NodeId) -> Check<T> {
        fail(
            ErrorCode::E2020,
            self.ast.span(node),
            format!(
                "invalid argument: index {} (value of type {}) must be integer",
                self.expr_text(node),
                self.pool.display(i.ty)
            ),
        )
    }

    fn lower_slice_expr(
        &mut self,
        base: NodeId,
        low: Option<NodeId>,
        high: Option<NodeId>,
        max: Option<NodeId>,
        span: Span,
    ) -> Check<Operand> {
        let x = self.lower_expr(base)?;
        let ty = self.pool.default_type(x.ty);
        let result = match self.pool.underlying_data(ty).clone() {
            TypeData::Basic(kind) if kind.is_string() => {
                if max.is_some() {
                    return fail(
                        ErrorCode::E2020,
                        span,
                        "invalid operation: 3-index slice of string",
                    );
                }
                ty
            }
            TypeData::Slice(_) => ty,
            TypeData::Array { elem, .. } => self.pool.slice(elem),
            TypeData::Pointer(target) => match self.pool.underlying_data(target).clone() {
                TypeData::Array { elem, .. } => self.pool.slice(elem),
                _ => return self.not_sliceable(&x, base, span),
            },
            _ => return self.not_sliceable(&x, base, span),
        };
        let src = self.value_of(&x, span)?;
        let low = low.map(|n| self.index_value(n, None)).transpose()?;
        let high = high.map(|n| self.index_value(n, None)).transpose()?;
        let max = max.map(|n| self.index_value(n, None)).transpose()?;
        let dst = self.temp();
        self.emit(
            Op::SliceExpr {
                dst,
                src,
                low,
                high,
                max,
            },
            span,
        );
        Ok(Operand::value(result, Src::Loc(dst)))
    }

    fn not_sliceable<T>(&self, x: &Operand, base: NodeId, span: Span) -> Check<T> {
        fail(
            ErrorCode::E2020,
            span,
            format!(
                "cannot slice {} (value of type {})",
                self.expr_text(base),
                self.pool.display(x.ty)
            ),
        )
    }

    // === Type assertions ===

    /// `x.(T)`; with `comma_ok` the second result says whether it held.
    pub(crate) fn lower_assert(
        &mut self,
        base: NodeId,
        ty: NodeId,
        comma_ok: bool,
        span: Span,
    ) -> Check<(Operand, Option<Loc>)> {
        let x = self.lower_expr(base)?;
        self.expect_interface(&x, base)?;
        let target = self.resolve_type(ty)?;
        let assert = self.assert_target(x.ty, target, span)?;
        let src = self.value_of(&x, span)?;
        let dst = self.temp();
        let ok = comma_ok.then(|| self.temp());
        let zero = self.zero_value(target);
        self.emit(
            Op::TypeAssert {
                dst: Some(dst),
                ok,
                src,
                target: assert,
                zero,
            },
            span,
        );
        Ok((Operand::value(target, Src::Loc(dst)), ok))
    }

    pub(crate) fn expect_interface(&self, x: &Operand, node: NodeId) -> Check<()> {
        if self.pool.is_interface(x.ty) || x.ty.is_invalid() {
            return Ok(());
        }
        fail(
            ErrorCode::E2022,
            self.ast.span(node),
            format!(
                "invalid operation: {} (value of type {}) is not an interface",
                self.expr_text(node),
                self.pool.display(x.ty)
            ),
        )
    }

    /// How a value of interface type `iface` is tested against `target`.
    pub(crate) fn assert_target(
        &mut self,
        iface: Idx,
        target: Idx,
        span: Span,
    ) -> Check<AssertTarget> {
        if self.pool.is_interface(target) {
            let methods = self
                .pool
                .interface_data(target)
                .map(|d| d.methods.iter().map(|m| m.name).collect())
                .unwrap_or_default();
            return Ok(AssertTarget::Iface {
                ty: target,
                methods,
            });
        }
        if let Err(why) = self.pool.implements(target, iface) {
            return fail(
                ErrorCode::E2021,
                span,
                format!(
                    "impossible type assertion: {} does not implement {} ({})",
                    self.pool.display(target),
                    self.pool.display(iface),
                    why.describe(&self.pool)
                ),
            );
        }
        self.record_dyn_type(target);
        Ok(AssertTarget::Concrete(target))
    }

    // === Constant evaluation ===

    /// Evaluate `node` as a constant expression without emitting code.
    /// `Ok(None)` means the expression is not constant.
    pub(crate) fn const_value(&mut self, node: NodeId) -> Check<Option<(Idx, ConstValue)>> {
        terp_stack::ensure_sufficient_stack(|| self.const_value_inner(node))
    }

    fn const_value_inner(&mut self, node: NodeId) -> Check<Option<(Idx, ConstValue)>> {
        let span = self.ast.span(node);
        let op = match self.ast.kind(node).clone() {
            NodeKind::Lit(lit) => literal(&lit),
            NodeKind::Paren(inner) => return self.const_value(inner),
            NodeKind::Ident(name) => {
                if name == self.names.blank {
                    return Ok(None);
                }
                let sym = self.resolve_name(name, span)?;
                if sym.kind != SymbolKind::Const {
                    return Ok(None);
                }
                match (sym.value, self.iota) {
                    (Some(v), _) => Operand::constant(sym.ty, v),
                    (None, Some(iota)) if name == self.names.iota => {
                        Operand::constant(Idx::UNTYPED_INT, ConstValue::Int(iota))
                    }
                    (None, _) if name == self.names.iota => {
                        return fail(
                            ErrorCode::E2002,
                            span,
                            "cannot use iota outside constant declaration",
                        )
                    }
                    (None, _) => return Ok(None),
                }
            }
            NodeKind::Selector { base, sel } => match self.package_of(base) {
                Some(pkg) => self.host_member(pkg, sel, span)?,
                None => return Ok(None),
            },
            NodeKind::Unary { op, operand } => {
                if matches!(op, UnaryOp::Addr | UnaryOp::Deref | UnaryOp::Recv) {
                    return Ok(None);
                }
                let Some((ty, v)) = self.const_value(operand)? else {
                    return Ok(None);
                };
                self.unary_op(op, Operand::constant(ty, v), span)?
            }
            NodeKind::Binary { op, left, right } => {
                let Some(l) = self.const_value(left)? else {
                    return Ok(None);
                };
                let Some(r) = self.const_value(right)? else {
                    return Ok(None);
                };
                if op.is_shift() {
                    self.shift_op(
                        op,
                        Operand::constant(l.0, l.1),
                        Operand::constant(r.0, r.1),
                        span,
                    )?
                } else if op.is_logical() {
                    let (Some(a), Some(b)) = (l.1.as_bool(), r.1.as_bool()) else {
                        return self.mismatched(op, l.0, r.0, span);
                    };
                    let v = if op == BinaryOp::LogicalAnd { a && b } else { a || b };
                    let ty = if l.0.is_untyped() { r.0 } else { l.0 };
                    Operand::constant(ty, ConstValue::Bool(v))
                } else {
                    self.fold_binary(op, l, r, span)?
                }
            }
            NodeKind::Call { func, args, spread } => {
                if spread || args.len() != 1 {
                    return Ok(None);
                }
                if self.is_builtin(func, crate::BuiltinFn::Len) {
                    return Ok(match self.const_value(args[0])? {
                        Some((_, ConstValue::Str(s))) => Some((
                            Idx::INT,
                            ConstValue::Int(i128::try_from(s.len()).unwrap_or(i128::MAX)),
                        )),
                        _ => None,
                    });
                }
                let Some(target) = self.try_type(func)? else {
                    return Ok(None);
                };
                let Some((ty, v)) = self.const_value(args[0])? else {
                    return Ok(None);
                };
                match self.const_conversion(target, ty, &v, span)? {
                    Some(op) => op,
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        Ok(match op.mode {
            Mode::Const(v) => Some((op.ty, v)),
            _ => None,
        })
    }

    /// `node` names built-in `which`.
    pub(crate) fn is_builtin(&self, node: NodeId, which: crate::BuiltinFn) -> bool {
        let NodeKind::Ident(name) = self.ast.kind(strip_parens(&self.ast, node)) else {
            return false;
        };
        matches!(
            self.find(*name),
            Some(sym) if matches!(sym.storage, Storage::Builtin(b) if b == which)
        )
    }
}

/// `node` with enclosing parentheses removed.
pub(crate) fn strip_parens(ast: &terp_ir::Ast, mut node: NodeId) -> NodeId {
    while let NodeKind::Paren(inner) = ast.kind(node) {
        node = *inner;
    }
    node
}

fn literal(lit: &Literal) -> Operand {
    match lit {
        Literal::Int(v) => Operand::constant(Idx::UNTYPED_INT, ConstValue::Int(*v)),
        Literal::Float(v) => Operand::constant(Idx::UNTYPED_FLOAT, ConstValue::Float(*v)),
        Literal::Rune(c) => {
            Operand::constant(Idx::UNTYPED_RUNE, ConstValue::Int(i128::from(u32::from(*c))))
        }
        Literal::Str(s) => Operand::constant(Idx::UNTYPED_STRING, ConstValue::Str(s.clone())),
    }
}
