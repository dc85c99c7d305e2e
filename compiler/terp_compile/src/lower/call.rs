//! Calls: conversions, built-ins, methods, generic functions and function
//! values, plus `go` and `defer`.

use smallvec::SmallVec;
use terp_diagnostic::ErrorCode;
use terp_eval::program::{Builtin, Callee, Loc, Op, Src};
use terp_eval::{FuncValue, Value};
use terp_ir::{NodeId, NodeKind, Span};
use terp_types::{ConstValue, Idx, Selection, Signature, TypeData};

use super::expr::strip_parens;
use super::{Mode, Operand};
use crate::error::{fail, Check};
use crate::generics::ArgType;
use crate::scope::{BuiltinFn, Storage};
use crate::CompileContext;

/// A call lowered up to the point of emission.
pub(crate) enum CallParts {
    Call {
        callee: Callee,
        args: SmallVec<[Src; 4]>,
        /// Function type of the callee.
        sig: Idx,
    },
    Builtin {
        func: Builtin,
        args: SmallVec<[Src; 4]>,
        result: Option<Idx>,
        name: BuiltinFn,
    },
    /// Conversions and built-ins that are fully lowered already.
    Done(Operand),
}

/// An evaluated argument.
struct Arg {
    op: Operand,
    span: Span,
}

impl CompileContext {
    pub(crate) fn lower_call(
        &mut self,
        node: NodeId,
        func: NodeId,
        args: &[NodeId],
        spread: bool,
    ) -> Check<Operand> {
        let span = self.ast.span(node);
        match self.call_parts(func, args, spread, span)? {
            CallParts::Call { callee, args, sig } => Ok(self.emit_call(callee, args, sig, span)),
            CallParts::Builtin {
                func, args, result, ..
            } => {
                let dst = result.map(|_| self.temp());
                self.emit(Op::Builtin { func, args, dst }, span);
                Ok(match (result, dst) {
                    (Some(ty), Some(dst)) => Operand::value(ty, Src::Loc(dst)),
                    _ => Operand {
                        ty: Idx::EMPTY_TUPLE,
                        mode: Mode::Void,
                    },
                })
            }
            CallParts::Done(op) => Ok(op),
        }
    }

    fn emit_call(
        &mut self,
        callee: Callee,
        args: SmallVec<[Src; 4]>,
        sig: Idx,
        span: Span,
    ) -> Operand {
        let results = self
            .pool
            .signature(sig)
            .map(|s| s.results.clone())
            .unwrap_or_default();
        let rets: SmallVec<[Loc; 2]> = results.iter().map(|_| self.temp()).collect();
        self.emit(
            Op::Call {
                callee,
                args,
                rets: rets.clone(),
            },
            span,
        );
        match results.len() {
            0 => Operand {
                ty: Idx::EMPTY_TUPLE,
                mode: Mode::Void,
            },
            1 => Operand::value(results[0], Src::Loc(rets[0])),
            _ => Operand {
                ty: self.pool.tuple(results),
                mode: Mode::Tuple(rets),
            },
        }
    }

    /// Resolve what is called and evaluate the arguments.
    pub(crate) fn call_parts(
        &mut self,
        func: NodeId,
        args: &[NodeId],
        spread: bool,
        span: Span,
    ) -> Check<CallParts> {
        let func = strip_parens(&self.ast, func);
        if let Some(target) = self.try_type(func)? {
            return self.conversion_call(target, args, spread, span);
        }
        match self.ast.kind(func).clone() {
            NodeKind::Ident(name) => {
                if let Some(sym) = self.find(name) {
                    match sym.storage {
                        Storage::Builtin(builtin) => {
                            return self.lower_builtin(builtin, args, spread, span)
                        }
                        Storage::Generic(id) => {
                            return self.generic_call(id, &[], args, spread, span)
                        }
                        _ => {}
                    }
                }
            }
            NodeKind::Selector { base, sel } if self.package_of(base).is_none() => {
                let (x, place) = self.lower_recv_base(base)?;
                let selection = self.select(&x, base, sel, span)?;
                match selection {
                    Selection::Method { recv, ref method, .. } => {
                        let id = self.method_func(recv, method.name, span)?;
                        let sig = method.sig;
                        let recv = self.method_recv(&x, place, &selection, span)?;
                        let mut srcs = self.call_args(sig, args, spread, &self.expr_text(func), span)?;
                        srcs.insert(0, recv);
                        return Ok(CallParts::Call {
                            callee: Callee::Static(id),
                            args: srcs,
                            sig,
                        });
                    }
                    Selection::IfaceMethod { ref path, sig, .. } => {
                        let recv = self.embedded_value(&x, path, span)?;
                        let srcs = self.call_args(sig, args, spread, &self.expr_text(func), span)?;
                        return Ok(CallParts::Call {
                            callee: Callee::Iface { recv, name: sel },
                            args: srcs,
                            sig,
                        });
                    }
                    Selection::Field { ref path, ty } => {
                        let place = self.field_place(&x, path, span)?;
                        let dst = self.temp();
                        self.emit(Op::Load { dst, place }, span);
                        let f = Operand::value(ty, Src::Loc(dst));
                        return self.value_call(f, func, args, spread, span);
                    }
                }
            }
            NodeKind::Index { base, indices } => {
                if let Some(id) = self.generic_func_of(base) {
                    let mut explicit = Vec::with_capacity(indices.len());
                    for index in indices {
                        explicit.push(self.resolve_type(index)?);
                    }
                    return self.generic_call(id, &explicit, args, spread, span);
                }
            }
            _ => {}
        }
        let f = self.lower_expr(func)?;
        self.value_call(f, func, args, spread, span)
    }

    fn value_call(
        &mut self,
        f: Operand,
        func: NodeId,
        args: &[NodeId],
        spread: bool,
        span: Span,
    ) -> Check<CallParts> {
        if self.pool.signature(f.ty).is_none() {
            return fail(
                ErrorCode::E2004,
                span,
                format!(
                    "invalid operation: cannot call non-function {} (value of type {})",
                    self.expr_text(func),
                    self.pool.display(f.ty)
                ),
            );
        }
        let sig = f.ty;
        let callee = match self.value_of(&f, span)? {
            Src::Const(Value::Func(FuncValue::Closure { func, env: None })) => Callee::Static(func),
            src => Callee::Value(src),
        };
        let args = self.call_args(sig, args, spread, &self.expr_text(func), span)?;
        Ok(CallParts::Call { callee, args, sig })
    }

    fn conversion_call(
        &mut self,
        target: Idx,
        args: &[NodeId],
        spread: bool,
        span: Span,
    ) -> Check<CallParts> {
        let name = self.pool.display(target);
        match args {
            [arg] if !spread => self.lower_conversion(target, *arg, span).map(CallParts::Done),
            [] => fail(
                ErrorCode::E2003,
                span,
                format!("missing argument in conversion to {name}"),
            ),
            _ => fail(
                ErrorCode::E2003,
                span,
                format!("too many arguments in conversion to {name}"),
            ),
        }
    }

    /// Call of generic function `id`, inferring the type arguments
    /// `explicit` leaves open.
    fn generic_call(
        &mut self,
        id: crate::GenericId,
        explicit: &[Idx],
        args: &[NodeId],
        spread: bool,
        span: Span,
    ) -> Check<CallParts> {
        let evaluated = self.eval_args(args)?;
        let types: Vec<ArgType> = evaluated
            .iter()
            .map(|a| ArgType {
                ty: a.op.ty,
                span: a.span,
            })
            .collect();
        let type_args = self.infer_type_args(id, explicit, &types, span)?;
        let (func, sig) = self.instantiate_func(id, type_args, span)?;
        let name = self.interner.lookup(self.generics[id.raw() as usize].name);
        let args = self.pass_args(sig, evaluated, spread, name, span)?;
        Ok(CallParts::Call {
            callee: Callee::Static(func),
            args,
            sig,
        })
    }

    /// Evaluate arguments; a single multi-value call spreads into several.
    fn eval_args(&mut self, args: &[NodeId]) -> Check<Vec<Arg>> {
        if let [only] = args {
            let span = self.ast.span(*only);
            let op = self.lower_operand(*only)?;
            if let Mode::Tuple(locs) = &op.mode {
                let types = self.pool.results_of(op.ty);
                return Ok(types
                    .into_iter()
                    .zip(locs.iter())
                    .map(|(ty, &loc)| Arg {
                        op: Operand::value(ty, Src::Loc(loc)),
                        span,
                    })
                    .collect());
            }
            let op = self.single(op, *only)?;
            return Ok(vec![Arg { op, span }]);
        }
        let mut out = Vec::with_capacity(args.len());
        for &arg in args {
            out.push(Arg {
                op: self.lower_expr(arg)?,
                span: self.ast.span(arg),
            });
        }
        Ok(out)
    }

    fn call_args(
        &mut self,
        sig: Idx,
        args: &[NodeId],
        spread: bool,
        name: &str,
        span: Span,
    ) -> Check<SmallVec<[Src; 4]>> {
        let evaluated = self.eval_args(args)?;
        self.pass_args(sig, evaluated, spread, name, span)
    }

    /// Check arguments against signature `sig`, packing variadic extras
    /// into a slice.
    fn pass_args(
        &mut self,
        sig: Idx,
        args: Vec<Arg>,
        spread: bool,
        name: &str,
        span: Span,
    ) -> Check<SmallVec<[Src; 4]>> {
        let Some(Signature {
            params, variadic, ..
        }) = self.pool.signature(sig).cloned()
        else {
            return fail(ErrorCode::E2004, span, format!("cannot call {name}"));
        };
        let context = format!("argument to {name}");
        let count_error = |have: usize, want: usize| {
            let which = if have < want { "not enough" } else { "too many" };
            fail(
                ErrorCode::E2003,
                span,
                format!("{which} arguments in call to {name}: have {have}, want {want}"),
            )
        };
        let mut out = SmallVec::new();
        if spread {
            if !variadic {
                return fail(
                    ErrorCode::E2003,
                    span,
                    format!("have (...) but {name} is not variadic"),
                );
            }
            if args.len() != params.len() {
                return count_error(args.len(), params.len());
            }
            for (arg, &param) in args.into_iter().zip(&params) {
                out.push(self.coerce(arg.op, param, arg.span, &context)?);
            }
            return Ok(out);
        }
        if !variadic {
            if args.len() != params.len() {
                return count_error(args.len(), params.len());
            }
            for (arg, &param) in args.into_iter().zip(&params) {
                out.push(self.coerce(arg.op, param, arg.span, &context)?);
            }
            return Ok(out);
        }
        let fixed = params.len() - 1;
        if args.len() < fixed {
            return count_error(args.len(), fixed);
        }
        let last = params[fixed];
        let elem = self.pool.elem(last).unwrap_or(Idx::INVALID);
        let mut extra = Vec::new();
        for (i, arg) in args.into_iter().enumerate() {
            if i < fixed {
                out.push(self.coerce(arg.op, params[i], arg.span, &context)?);
            } else {
                extra.push(self.coerce(arg.op, elem, arg.span, &context)?);
            }
        }
        if extra.is_empty() {
            out.push(Src::Const(Value::Nil));
        } else {
            let dst = self.temp();
            self.emit(Op::MakeSlice { dst, elems: extra }, span);
            out.push(Src::Loc(dst));
        }
        Ok(out)
    }

    // === go / defer ===

    /// `go f(x)` or `defer f(x)`: the callee and arguments are evaluated
    /// now, the call happens later.
    pub(crate) fn lower_go_defer(&mut self, call: NodeId, go: bool, span: Span) -> Check<()> {
        let what = if go { "go" } else { "defer" };
        let call = strip_parens(&self.ast, call);
        let NodeKind::Call { func, args, spread } = self.ast.kind(call).clone() else {
            return fail(
                ErrorCode::E2002,
                span,
                format!("expression in {what} must be function call"),
            );
        };
        match self.call_parts(func, &args, spread, span)? {
            CallParts::Call { callee, args, .. } => {
                let op = if go {
                    Op::Go { callee, args }
                } else {
                    Op::Defer { callee, args }
                };
                self.emit(op, span);
                Ok(())
            }
            CallParts::Builtin {
                func, args, name, ..
            } if statement_builtin(name) => {
                self.emit(Op::DeferBuiltin { func, args, go }, span);
                Ok(())
            }
            CallParts::Builtin { .. } | CallParts::Done(_) => fail(
                ErrorCode::E2012,
                span,
                format!("{what} discards result of {}", self.expr_text(call)),
            ),
        }
    }

    /// An expression statement that is a call.
    pub(crate) fn lower_call_stmt(&mut self, call: NodeId, span: Span) -> Check<()> {
        let NodeKind::Call { func, args, spread } = self.ast.kind(call).clone() else {
            return fail(ErrorCode::E9001, span, "call statement without call");
        };
        match self.call_parts(func, &args, spread, span)? {
            CallParts::Call { callee, args, .. } => {
                self.emit(
                    Op::Call {
                        callee,
                        args,
                        rets: SmallVec::new(),
                    },
                    span,
                );
                Ok(())
            }
            CallParts::Builtin {
                func, args, name, ..
            } if statement_builtin(name) => {
                self.emit(Op::Builtin {
                    func,
                    args,
                    dst: None,
                }, span);
                Ok(())
            }
            CallParts::Builtin { .. } | CallParts::Done(_) => fail(
                ErrorCode::E2012,
                span,
                format!("{} (value) is not used", self.expr_text(call)),
            ),
        }
    }

    // === Built-ins ===

    fn builtin_arity(
        &self,
        name: BuiltinFn,
        args: &[NodeId],
        min: usize,
        max: Option<usize>,
        span: Span,
    ) -> Check<()> {
        let text = builtin_name(name);
        if args.len() < min {
            return fail(
                ErrorCode::E2003,
                span,
                format!("not enough arguments for {text}() (expected {min}, found {})", args.len()),
            );
        }
        if let Some(max) = max {
            if args.len() > max {
                return fail(
                    ErrorCode::E2003,
                    span,
                    format!("too many arguments for {text}() (expected {max}, found {})", args.len()),
                );
            }
        }
        Ok(())
    }

    fn builtin_arg_error<T>(&self, name: BuiltinFn, node: NodeId, ty: Idx) -> Check<T> {
        fail(
            ErrorCode::E2023,
            self.ast.span(node),
            format!(
                "invalid argument: {} (value of type {}) for built-in {}",
                self.expr_text(node),
                self.pool.display(ty),
                builtin_name(name)
            ),
        )
    }

    fn lower_builtin(
        &mut self,
        name: BuiltinFn,
        args: &[NodeId],
        spread: bool,
        span: Span,
    ) -> Check<CallParts> {
        if spread && name != BuiltinFn::Append {
            return fail(
                ErrorCode::E2023,
                span,
                format!("invalid use of ... with built-in {}", builtin_name(name)),
            );
        }
        let parts = |func: Builtin, args: SmallVec<[Src; 4]>, result: Option<Idx>| {
            Ok(CallParts::Builtin {
                func,
                args,
                result,
                name,
            })
        };
        match name {
            BuiltinFn::Len | BuiltinFn::Cap => {
                self.builtin_arity(name, args, 1, Some(1), span)?;
                let x = self.lower_expr(args[0])?;
                if let (BuiltinFn::Len, Some(ConstValue::Str(s))) = (name, x.const_value()) {
                    let n = i128::try_from(s.len()).unwrap_or(i128::MAX);
                    return Ok(CallParts::Done(Operand::constant(Idx::INT, ConstValue::Int(n))));
                }
                let ty = self.pool.default_type(x.ty);
                let mut under = self.pool.underlying_data(ty).clone();
                if let TypeData::Pointer(target) = under {
                    if let TypeData::Array { .. } = self.pool.underlying_data(target) {
                        under = self.pool.underlying_data(target).clone();
                    }
                }
                let ok = match &under {
                    TypeData::Array { len, .. } => {
                        let n = i128::from(*len);
                        return Ok(CallParts::Done(Operand::constant(Idx::INT, ConstValue::Int(n))));
                    }
                    TypeData::Basic(kind) => name == BuiltinFn::Len && kind.is_string(),
                    TypeData::Map { .. } => name == BuiltinFn::Len,
                    TypeData::Slice(_) | TypeData::Chan { .. } => true,
                    _ => false,
                };
                if !ok {
                    return self.builtin_arg_error(name, args[0], x.ty);
                }
                let src = self.value_of(&x, span)?;
                let func = if name == BuiltinFn::Len {
                    Builtin::Len
                } else {
                    Builtin::Cap
                };
                parts(func, SmallVec::from_iter([src]), Some(Idx::INT))
            }
            BuiltinFn::Append => {
                self.builtin_arity(name, args, 1, None, span)?;
                let s = self.lower_expr(args[0])?;
                if s.is_nil() {
                    return fail(
                        ErrorCode::E2023,
                        span,
                        "first argument to append must be a typed slice; have untyped nil",
                    );
                }
                let Some(elem) = self.slice_elem(s.ty) else {
                    return self.builtin_arg_error(name, args[0], s.ty);
                };
                let base = self.value_of(&s, span)?;
                let mut srcs: SmallVec<[Src; 4]> = SmallVec::from_iter([base]);
                if spread {
                    if args.len() != 2 {
                        return fail(
                            ErrorCode::E2003,
                            span,
                            "can only use ... with final argument in list",
                        );
                    }
                    let t = self.lower_expr(args[1])?;
                    let bytes_from_string =
                        self.pool.is_string(t.ty) && self.pool.underlying(elem) == Idx::UINT8;
                    let src = if bytes_from_string {
                        self.value_of(&t, span)?
                    } else {
                        let slice = self.pool.slice(elem);
                        self.coerce(t, slice, self.ast.span(args[1]), "argument to append")?
                    };
                    srcs.push(src);
                    return parts(Builtin::AppendSpread, srcs, Some(s.ty));
                }
                for &arg in &args[1..] {
                    let v = self.lower_expr(arg)?;
                    srcs.push(self.coerce(v, elem, self.ast.span(arg), "argument to append")?);
                }
                parts(Builtin::Append, srcs, Some(s.ty))
            }
            BuiltinFn::Copy => {
                self.builtin_arity(name, args, 2, Some(2), span)?;
                let dst = self.lower_expr(args[0])?;
                let src = self.lower_expr(args[1])?;
                let Some(elem) = self.slice_elem(dst.ty) else {
                    return self.builtin_arg_error(name, args[0], dst.ty);
                };
                let ok = match self.slice_elem(src.ty) {
                    Some(e) => e == elem,
                    None => {
                        self.pool.is_string(src.ty) && self.pool.underlying(elem) == Idx::UINT8
                    }
                };
                if !ok {
                    return self.builtin_arg_error(name, args[1], src.ty);
                }
                let a = self.value_of(&dst, span)?;
                let b = self.value_of(&src, span)?;
                parts(Builtin::Copy, SmallVec::from_iter([a, b]), Some(Idx::INT))
            }
            BuiltinFn::Delete => {
                self.builtin_arity(name, args, 2, Some(2), span)?;
                let m = self.lower_expr(args[0])?;
                let TypeData::Map { key, .. } = self.pool.underlying_data(m.ty).clone() else {
                    return self.builtin_arg_error(name, args[0], m.ty);
                };
                let map = self.value_of(&m, span)?;
                let k = self.lower_expr(args[1])?;
                let k = self.coerce(k, key, self.ast.span(args[1]), "argument to delete")?;
                parts(Builtin::Delete, SmallVec::from_iter([map, k]), None)
            }
            BuiltinFn::Make => self.lower_make(args, span),
            BuiltinFn::New => {
                self.builtin_arity(name, args, 1, Some(1), span)?;
                let ty = self.resolve_type(args[0])?;
                let zero = self.zero_value(ty);
                let dst = self.temp();
                self.emit(
                    Op::Box {
                        dst,
                        src: Src::Const(zero),
                    },
                    span,
                );
                let ptr = self.pool.pointer(ty);
                Ok(CallParts::Done(Operand::value(ptr, Src::Loc(dst))))
            }
            BuiltinFn::Panic => {
                self.builtin_arity(name, args, 1, Some(1), span)?;
                let v = self.lower_expr(args[0])?;
                let v = self.coerce(v, Idx::ANY, self.ast.span(args[0]), "argument to panic")?;
                parts(Builtin::Panic, SmallVec::from_iter([v]), None)
            }
            BuiltinFn::Recover => {
                self.builtin_arity(name, args, 0, Some(0), span)?;
                parts(Builtin::Recover, SmallVec::new(), Some(Idx::ANY))
            }
            BuiltinFn::Print | BuiltinFn::Println => {
                let mut srcs = SmallVec::new();
                for &arg in args {
                    let v = self.lower_expr(arg)?;
                    if v.is_nil() {
                        return fail(
                            ErrorCode::E2019,
                            self.ast.span(arg),
                            format!("use of untyped nil in argument to built-in {}", builtin_name(name)),
                        );
                    }
                    let v = self.default_operand(v, span)?;
                    srcs.push(self.value_of(&v, span)?);
                }
                let func = if name == BuiltinFn::Print {
                    Builtin::Print
                } else {
                    Builtin::Println
                };
                parts(func, srcs, None)
            }
            BuiltinFn::Close => {
                self.builtin_arity(name, args, 1, Some(1), span)?;
                let c = self.lower_expr(args[0])?;
                match self.pool.underlying_data(c.ty) {
                    TypeData::Chan { dir, .. } if dir.can_send() => {}
                    TypeData::Chan { .. } => {
                        return fail(
                            ErrorCode::E2023,
                            span,
                            format!(
                                "invalid operation: cannot close receive-only channel {}",
                                self.expr_text(args[0])
                            ),
                        )
                    }
                    _ => return self.builtin_arg_error(name, args[0], c.ty),
                }
                let src = self.value_of(&c, span)?;
                parts(Builtin::Close, SmallVec::from_iter([src]), None)
            }
            BuiltinFn::Min | BuiltinFn::Max => self.lower_min_max(name, args, span),
            BuiltinFn::Clear => {
                self.builtin_arity(name, args, 1, Some(1), span)?;
                let x = self.lower_expr(args[0])?;
                let zero = match self.pool.underlying_data(x.ty).clone() {
                    TypeData::Map { .. } => Value::Nil,
                    TypeData::Slice(elem) => self.zero_value(elem),
                    _ => return self.builtin_arg_error(name, args[0], x.ty),
                };
                let src = self.value_of(&x, span)?;
                parts(Builtin::Clear { zero }, SmallVec::from_iter([src]), None)
            }
        }
    }

    fn slice_elem(&self, ty: Idx) -> Option<Idx> {
        match self.pool.underlying_data(ty) {
            TypeData::Slice(elem) => Some(*elem),
            _ => None,
        }
    }

    fn lower_make(&mut self, args: &[NodeId], span: Span) -> Check<CallParts> {
        let name = BuiltinFn::Make;
        self.builtin_arity(name, args, 1, Some(3), span)?;
        let ty = self.resolve_type(args[0])?;
        let (func, max) = match self.pool.underlying_data(ty).clone() {
            TypeData::Slice(elem) => (
                Builtin::MakeSlice {
                    zero: self.zero_value(elem),
                },
                3,
            ),
            TypeData::Map { .. } => (Builtin::MakeMap, 2),
            TypeData::Chan { .. } => (Builtin::MakeChan, 2),
            _ => {
                return fail(
                    ErrorCode::E2023,
                    span,
                    format!(
                        "invalid argument: cannot make {}; type must be slice, map, or channel",
                        self.pool.display(ty)
                    ),
                )
            }
        };
        let min = if matches!(func, Builtin::MakeSlice { .. }) { 2 } else { 1 };
        self.builtin_arity(name, args, min, Some(max), span)?;
        let mut sizes: SmallVec<[Src; 4]> = SmallVec::new();
        let mut consts = Vec::new();
        for &arg in &args[1..] {
            let v = self.lower_expr(arg)?;
            if let Some(c) = v.const_value() {
                match c.as_int() {
                    Some(n) if n >= 0 => consts.push(n),
                    _ => {
                        return fail(
                            ErrorCode::E2023,
                            self.ast.span(arg),
                            format!("invalid argument: size {} must be a non-negative integer", self.expr_text(arg)),
                        )
                    }
                }
            } else if !self.pool.is_integer(v.ty) {
                return self.builtin_arg_error(name, arg, v.ty);
            }
            let v = if v.ty.is_untyped() {
                self.convert_untyped(v, Idx::INT, span)?
            } else {
                v
            };
            sizes.push(self.value_of(&v, span)?);
        }
        if let [len, cap] = consts[..] {
            if sizes.len() == 2 && len > cap {
                return fail(
                    ErrorCode::E2023,
                    span,
                    format!("invalid argument: length and capacity swapped ({len} > {cap})"),
                );
            }
        }
        if matches!(func, Builtin::MakeMap) {
            sizes.clear();
        }
        Ok(CallParts::Builtin {
            func,
            args: sizes,
            result: Some(ty),
            name,
        })
    }

    fn lower_min_max(&mut self, name: BuiltinFn, args: &[NodeId], span: Span) -> Check<CallParts> {
        self.builtin_arity(name, args, 1, None, span)?;
        let mut ops = Vec::with_capacity(args.len());
        for &arg in args {
            ops.push(self.lower_expr(arg)?);
        }
        let typed = ops.iter().map(|o| o.ty).find(|t| !t.is_untyped());
        if ops.iter().all(|o| o.const_value().is_some()) {
            let op = if name == BuiltinFn::Min {
                terp_ir::BinaryOp::Lt
            } else {
                terp_ir::BinaryOp::Gt
            };
            let mut best = ops[0].clone();
            for next in &ops[1..] {
                let (Some(a), Some(b)) = (best.const_value(), next.const_value()) else {
                    continue;
                };
                let better =
                    self.fold_binary(op, (next.ty, b.clone()), (best.ty, a.clone()), span)?;
                let ty = match typed {
                    Some(t) => t,
                    None => self.pool.wider_untyped(best.ty, next.ty),
                };
                let winner = if better.const_value().and_then(ConstValue::as_bool) == Some(true) {
                    next
                } else {
                    &best
                };
                let v = winner.const_value().cloned().unwrap_or(ConstValue::Int(0));
                let v = if ty.is_untyped() { v } else { self.to_kind(v, winner.ty, ty, span)? };
                best = Operand::constant(ty, v);
            }
            if !self.pool.ordered(best.ty) && !best.ty.is_untyped() {
                return self.builtin_arg_error(name, args[0], best.ty);
            }
            return Ok(CallParts::Done(best));
        }
        let ty = typed.unwrap_or(Idx::INT);
        if !self.pool.ordered(ty) {
            return self.builtin_arg_error(name, args[0], ty);
        }
        let mut srcs = SmallVec::new();
        for (op, &arg) in ops.into_iter().zip(args) {
            srcs.push(self.coerce(op, ty, self.ast.span(arg), &format!("argument to {}", builtin_name(name)))?);
        }
        let func = if name == BuiltinFn::Min {
            Builtin::Min
        } else {
            Builtin::Max
        };
        Ok(CallParts::Builtin {
            func,
            args: srcs,
            result: Some(ty),
            name,
        })
    }
}

/// Built-ins allowed as statements and in `go`/`defer`.
fn statement_builtin(name: BuiltinFn) -> bool {
    matches!(
        name,
        BuiltinFn::Clear
            | BuiltinFn::Close
            | BuiltinFn::Copy
            | BuiltinFn::Delete
            | BuiltinFn::Panic
            | BuiltinFn::Print
            | BuiltinFn::Println
            | BuiltinFn::Recover
    )
}

fn builtin_name(name: BuiltinFn) -> &'static str {
    match name {
        BuiltinFn::Append => "append",
        BuiltinFn::Cap => "cap",
        BuiltinFn::Clear => "clear",
        BuiltinFn::Close => "close",
        BuiltinFn::Copy => "copy",
        BuiltinFn::Delete => "delete",
        BuiltinFn::Len => "len",
        BuiltinFn::Make => "make",
        BuiltinFn::Max => "max",
        BuiltinFn::Min => "min",
        BuiltinFn::New => "new",
        BuiltinFn::Panic => "panic",
        BuiltinFn::Print => "print",
        BuiltinFn::Println => "println",
        BuiltinFn::Recover => "recover",
    }
}
