//! Assignability checks, implicit conversions and explicit `T(x)`.

use terp_diagnostic::ErrorCode;
use terp_eval::program::{Conversion, Op, Src};
use terp_eval::Value;
use terp_ir::{NodeId, Span};
use terp_types::{ConstValue, Idx};

use super::{Mode, Operand};
use crate::error::{fail, Check};
use crate::CompileContext;

impl CompileContext {
    /// Runtime source of a single-valued operand.
    pub(crate) fn value_of(&mut self, op: &Operand, span: Span) -> Check<Src> {
        match &op.mode {
            Mode::Const(v) => Ok(Src::Const(self.const_to_value(op.ty, v))),
            Mode::Value(src) => Ok(src.clone()),
            Mode::Tuple(_) => fail(
                ErrorCode::E2010,
                span,
                "multiple-value expression in single-value context",
            ),
            Mode::Void => fail(ErrorCode::E2002, span, "expression has no value"),
        }
    }

    /// `op` as a value of type `target`, checking assignability. `context`
    /// names the assignment for messages ("argument", "return statement").
    pub(crate) fn coerce(
        &mut self,
        op: Operand,
        target: Idx,
        span: Span,
        context: &str,
    ) -> Check<Src> {
        if op.ty == target || op.ty.is_invalid() || target.is_invalid() {
            return self.value_of(&op, span);
        }
        if op.is_nil() {
            if !self.pool.assignable_to(op.ty, target) {
                return fail(
                    ErrorCode::E2019,
                    span,
                    format!(
                        "cannot use nil as {} value in {context}",
                        self.pool.display(target)
                    ),
                );
            }
            return Ok(Src::Const(Value::Nil));
        }
        if !self.pool.assignable_to(op.ty, target) {
            let mut message = format!(
                "cannot use {} value as {} value in {context}",
                self.pool.display(op.ty),
                self.pool.display(target)
            );
            if self.pool.is_interface(target) {
                if let Err(why) = self.pool.implements(op.ty, target) {
                    message.push_str(&format!(": {}", why.describe(&self.pool)));
                }
            }
            return fail(ErrorCode::E2001, span, message);
        }
        if op.ty.is_untyped() {
            let typed = self.convert_untyped(op, target, span)?;
            return self.value_of(&typed, span);
        }
        let src = self.value_of(&op, span)?;
        if self.pool.is_interface(target) && !self.pool.is_interface(op.ty) {
            return Ok(self.make_iface(src, op.ty, span));
        }
        Ok(src)
    }

    /// Give an untyped operand type `target`. Constants stay constants when
    /// the target is a basic type.
    pub(crate) fn convert_untyped(
        &mut self,
        op: Operand,
        target: Idx,
        span: Span,
    ) -> Check<Operand> {
        if op.is_nil() {
            if !self.pool.is_nillable(target) {
                return fail(
                    ErrorCode::E2019,
                    span,
                    format!("cannot convert nil to type {}", self.pool.display(target)),
                );
            }
            return Ok(Operand::value(target, Src::Const(Value::Nil)));
        }
        if self.pool.is_interface(target) {
            if !self.pool.assignable_to(op.ty, target) {
                return fail(
                    ErrorCode::E2001,
                    span,
                    format!(
                        "cannot use {} value as {} value",
                        self.pool.display(op.ty),
                        self.pool.display(target)
                    ),
                );
            }
            let typed = self.default_operand(op, span)?;
            let dyn_ty = typed.ty;
            let src = self.value_of(&typed, span)?;
            let src = self.make_iface(src, dyn_ty, span);
            return Ok(Operand::value(target, src));
        }
        if !self.pool.assignable_to(op.ty, target) && !target.is_invalid() {
            return fail(
                ErrorCode::E2001,
                span,
                format!(
                    "cannot use {} as {} value",
                    self.untyped_text(&op),
                    self.pool.display(target)
                ),
            );
        }
        match op.mode {
            Mode::Const(v) => {
                let v = self.to_kind(v, op.ty, target, span)?;
                Ok(Operand::constant(target, v))
            }
            mode => Ok(Operand { ty: target, mode }),
        }
    }

    fn untyped_text(&self, op: &Operand) -> String {
        match op.const_value() {
            Some(v) => format!("{v} ({} constant)", self.pool.display(op.ty)),
            None => format!("{} value", self.pool.display(op.ty)),
        }
    }

    /// An untyped operand converted to its default type.
    pub(crate) fn default_operand(&mut self, op: Operand, span: Span) -> Check<Operand> {
        if !op.ty.is_untyped() {
            return Ok(op);
        }
        if op.is_nil() {
            return fail(ErrorCode::E2019, span, "use of untyped nil");
        }
        let ty = self.pool.default_type(op.ty);
        self.convert_untyped(op, ty, span)
    }

    /// Box `src` of concrete type `ty` into an interface value.
    pub(crate) fn make_iface(&mut self, src: Src, ty: Idx, span: Span) -> Src {
        self.record_dyn_type(ty);
        let dst = self.temp();
        self.emit(Op::MakeIface { dst, src, ty }, span);
        Src::Loc(dst)
    }

    /// Explicit conversion `target(arg)`.
    pub(crate) fn lower_conversion(&mut self, target: Idx, arg: NodeId, span: Span) -> Check<Operand> {
        let x = self.lower_expr(arg)?;
        if let Some(v) = x.const_value() {
            let v = v.clone();
            if let Some(op) = self.const_conversion(target, x.ty, &v, span)? {
                return Ok(op);
            }
        }
        if x.is_nil() {
            if self.pool.is_nillable(target) {
                return Ok(Operand::value(target, Src::Const(Value::Nil)));
            }
            return fail(
                ErrorCode::E2005,
                span,
                format!("cannot convert nil to type {}", self.pool.display(target)),
            );
        }
        let x = if x.ty.is_untyped() && !self.pool.is_interface(target) {
            self.default_operand(x, span)?
        } else {
            x
        };
        if !self.pool.convertible_to(x.ty, target) {
            return fail(
                ErrorCode::E2005,
                span,
                format!(
                    "cannot convert {} (value of type {}) to type {}",
                    self.expr_text(arg),
                    self.pool.display(x.ty),
                    self.pool.display(target)
                ),
            );
        }
        if x.ty.is_untyped() {
            // Only interface targets get here.
            let src = self.coerce(x, target, span, "conversion")?;
            return Ok(Operand::value(target, src));
        }
        let from = x.ty;
        let src = self.value_of(&x, span)?;
        Ok(self.convert_value(src, from, target, span))
    }

    /// Constant result of converting constant `v` of type `from`, or `None`
    /// when the conversion happens at run time.
    pub(crate) fn const_conversion(
        &self,
        target: Idx,
        from: Idx,
        v: &ConstValue,
        span: Span,
    ) -> Check<Option<Operand>> {
        let Some(kind) = self.pool.basic_kind(target) else {
            return Ok(None);
        };
        if kind.is_string() {
            return match v {
                ConstValue::Str(_) => Ok(Some(Operand::constant(target, v.clone()))),
                ConstValue::Int(code) if self.pool.is_integer(from) || from == Idx::UNTYPED_INT || from == Idx::UNTYPED_RUNE => {
                    let c = u32::try_from(*code)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    Ok(Some(Operand::constant(target, ConstValue::Str(c.to_string()))))
                }
                _ => self.bad_conversion(v, from, target, span),
            };
        }
        let compatible = match v {
            ConstValue::Bool(_) => kind.is_boolean(),
            ConstValue::Int(_) | ConstValue::Float(_) => kind.is_numeric(),
            ConstValue::Str(_) => false,
        };
        if !compatible {
            if matches!(v, ConstValue::Str(_)) && self.pool.convertible_to(Idx::STRING, target) {
                return Ok(None);
            }
            return self.bad_conversion(v, from, target, span);
        }
        self.to_kind(v.clone(), from, target, span)
            .map(|v| Some(Operand::constant(target, v)))
    }

    fn bad_conversion<T>(&self, v: &ConstValue, from: Idx, target: Idx, span: Span) -> Check<T> {
        fail(
            ErrorCode::E2005,
            span,
            format!(
                "cannot convert {v} ({} constant) to type {}",
                self.pool.display(from),
                self.pool.display(target)
            ),
        )
    }

    /// Emit the runtime conversion of `src` from `from` to `to`.
    pub(crate) fn convert_value(&mut self, src: Src, from: Idx, to: Idx, span: Span) -> Operand {
        if self.pool.is_interface(to) {
            let src = if self.pool.is_interface(from) {
                src
            } else {
                self.make_iface(src, from, span)
            };
            return Operand::value(to, src);
        }
        let conv = if let (Some(a), Some(b)) = (self.num_kind(from), self.num_kind(to)) {
            (a != b).then_some(Conversion::Num { from: a, to: b })
        } else if self.pool.is_string(to) {
            if self.pool.is_integer(from) {
                Some(Conversion::IntToString)
            } else if self.pool.is_byte_slice(from) {
                Some(Conversion::BytesToString)
            } else if self.pool.is_rune_slice(from) {
                Some(Conversion::RunesToString)
            } else {
                None
            }
        } else if self.pool.is_string(from) {
            if self.pool.is_byte_slice(to) {
                Some(Conversion::StringToBytes)
            } else if self.pool.is_rune_slice(to) {
                Some(Conversion::StringToRunes)
            } else {
                None
            }
        } else {
            None
        };
        let Some(conv) = conv else {
            return Operand::value(to, src);
        };
        let dst = self.temp();
        self.emit(Op::Convert { dst, src, conv }, span);
        Operand::value(to, Src::Loc(dst))
    }
}
