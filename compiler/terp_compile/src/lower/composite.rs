//! Composite literals.

use rustc_hash::{FxHashMap, FxHashSet};
use terp_diagnostic::ErrorCode;
use terp_eval::program::{Op, Src};
use terp_ir::{NodeId, NodeKind, Span};
use terp_types::{ConstValue, Idx, TypeData};

use super::Operand;
use crate::error::{fail, Check};
use crate::CompileContext;

impl CompileContext {
    /// Lower a composite literal. `hint` is the element type when the
    /// literal's own type is elided inside an enclosing literal.
    pub(crate) fn lower_composite(&mut self, node: NodeId, hint: Option<Idx>) -> Check<Operand> {
        let span = self.ast.span(node);
        let NodeKind::Composite { ty, elems } = self.ast.kind(node).clone() else {
            return fail(ErrorCode::E9001, span, "composite lowering of a non-literal");
        };
        let ty = match (ty, hint) {
            (Some(t), _) => match self.ast.kind(t).clone() {
                NodeKind::ArrayType { len: None, elem } => {
                    let elem = self.resolve_type(elem)?;
                    let len = self.implied_len(&elems)?;
                    self.pool.array(len, elem)
                }
                _ => self.resolve_type(t)?,
            },
            (None, Some(hint)) => hint,
            (None, None) => {
                return fail(
                    ErrorCode::E2015,
                    span,
                    "invalid composite literal type: missing type",
                )
            }
        };
        self.require_resolved(ty, span)?;
        let dst = self.temp();
        match self.pool.underlying_data(ty).clone() {
            TypeData::Struct(fields) => {
                let fields = self.struct_elems(ty, &fields, &elems, span)?;
                self.emit(Op::MakeStruct { dst, fields }, span);
            }
            TypeData::Array { len, elem } => {
                let elems = self.indexed_elems(elem, &elems, Some(len))?;
                self.emit(Op::MakeArray { dst, elems }, span);
            }
            TypeData::Slice(elem) => {
                let elems = self.indexed_elems(elem, &elems, None)?;
                self.emit(Op::MakeSlice { dst, elems }, span);
            }
            TypeData::Map { key, value } => {
                let entries = self.map_elems(key, value, &elems)?;
                self.emit(Op::MakeMap { dst, entries }, span);
            }
            _ => {
                return fail(
                    ErrorCode::E2015,
                    span,
                    format!("invalid composite literal type {}", self.pool.display(ty)),
                )
            }
        }
        Ok(Operand::value(ty, Src::Loc(dst)))
    }

    fn struct_elems(
        &mut self,
        ty: Idx,
        fields: &[terp_types::StructField],
        elems: &[NodeId],
        span: Span,
    ) -> Check<Vec<Src>> {
        let keyed = elems
            .first()
            .is_some_and(|&e| matches!(self.ast.kind(e), NodeKind::KeyValue { .. }));
        let mut values: Vec<Option<Src>> = vec![None; fields.len()];
        if keyed {
            for &e in elems {
                let NodeKind::KeyValue { key, value } = self.ast.kind(e).clone() else {
                    return self.mixed_struct(e);
                };
                let field = match self.ast.kind(key) {
                    NodeKind::Ident(name) => fields.iter().position(|f| f.name == *name),
                    _ => None,
                };
                let Some(index) = field else {
                    return fail(
                        ErrorCode::E2015,
                        self.ast.span(key),
                        format!(
                            "unknown field {} in struct literal of type {}",
                            self.expr_text(key),
                            self.pool.display(ty)
                        ),
                    );
                };
                if values[index].is_some() {
                    return fail(
                        ErrorCode::E2015,
                        self.ast.span(key),
                        format!("duplicate field name {} in struct literal", self.expr_text(key)),
                    );
                }
                values[index] = Some(self.elem_value(value, fields[index].ty, "struct literal")?);
            }
        } else {
            if !elems.is_empty() && elems.len() < fields.len() {
                return fail(
                    ErrorCode::E2015,
                    span,
                    format!("too few values in struct literal of type {}", self.pool.display(ty)),
                );
            }
            if elems.len() > fields.len() {
                return fail(
                    ErrorCode::E2015,
                    self.ast.span(elems[fields.len()]),
                    format!("too many values in struct literal of type {}", self.pool.display(ty)),
                );
            }
            for (i, &e) in elems.iter().enumerate() {
                if matches!(self.ast.kind(e), NodeKind::KeyValue { .. }) {
                    return self.mixed_struct(e);
                }
                values[i] = Some(self.elem_value(e, fields[i].ty, "struct literal")?);
            }
        }
        Ok(values
            .into_iter()
            .zip(fields)
            .map(|(v, f)| v.unwrap_or_else(|| Src::Const(self.zero_value(f.ty))))
            .collect())
    }

    fn mixed_struct<T>(&self, node: NodeId) -> Check<T> {
        fail(
            ErrorCode::E2015,
            self.ast.span(node),
            "mixture of field:value and value elements in struct literal",
        )
    }

    /// Constant index of a keyed array or slice element.
    fn literal_index(&mut self, key: NodeId) -> Check<u64> {
        let value = self.const_value(key)?;
        match value.as_ref().and_then(|(_, v)| v.as_int()) {
            Some(n) if n >= 0 => Ok(u64::try_from(n).unwrap_or(u64::MAX)),
            _ => fail(
                ErrorCode::E2015,
                self.ast.span(key),
                format!(
                    "index {} must be non-negative integer constant",
                    self.expr_text(key)
                ),
            ),
        }
    }

    /// Length of `[...]T{...}`.
    fn implied_len(&mut self, elems: &[NodeId]) -> Check<u64> {
        let mut next = 0u64;
        let mut len = 0u64;
        for &e in elems {
            if let NodeKind::KeyValue { key, .. } = *self.ast.kind(e) {
                next = self.literal_index(key)?;
            }
            next += 1;
            len = len.max(next);
        }
        Ok(len)
    }

    /// Elements of an array (`len` set) or slice literal, zero-filled.
    fn indexed_elems(&mut self, elem: Idx, elems: &[NodeId], len: Option<u64>) -> Check<Vec<Src>> {
        let mut slots: FxHashMap<u64, Src> = FxHashMap::default();
        let mut next = 0u64;
        let mut max = 0u64;
        for &e in elems {
            let value = match self.ast.kind(e).clone() {
                NodeKind::KeyValue { key, value } => {
                    next = self.literal_index(key)?;
                    value
                }
                _ => e,
            };
            if let Some(len) = len {
                if next >= len {
                    return fail(
                        ErrorCode::E2015,
                        self.ast.span(e),
                        format!("index {next} out of bounds [0:{len}]"),
                    );
                }
            }
            if slots.contains_key(&next) {
                return fail(
                    ErrorCode::E2015,
                    self.ast.span(e),
                    format!("duplicate index {next} in array or slice literal"),
                );
            }
            let src = self.elem_value(value, elem, "array or slice literal")?;
            slots.insert(next, src);
            next += 1;
            max = max.max(next);
        }
        let count = len.unwrap_or(max);
        let zero = self.zero_value(elem);
        Ok((0..count)
            .map(|i| slots.remove(&i).unwrap_or_else(|| Src::Const(zero.clone())))
            .collect())
    }

    fn map_elems(&mut self, key_ty: Idx, value_ty: Idx, elems: &[NodeId]) -> Check<Vec<(Src, Src)>> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut entries = Vec::with_capacity(elems.len());
        for &e in elems {
            let NodeKind::KeyValue { key, value } = self.ast.kind(e).clone() else {
                return fail(
                    ErrorCode::E2015,
                    self.ast.span(e),
                    "missing key in map literal",
                );
            };
            if let Some((_, k)) = self.const_value(key)? {
                let text = match &k {
                    ConstValue::Str(s) => format!("{s:?}"),
                    other => other.to_string(),
                };
                if !seen.insert(text.clone()) {
                    return fail(
                        ErrorCode::E2015,
                        self.ast.span(key),
                        format!("duplicate key {text} in map literal"),
                    );
                }
            }
            let k = self.elem_value(key, key_ty, "map literal")?;
            let v = self.elem_value(value, value_ty, "map literal")?;
            entries.push((k, v));
        }
        Ok(entries)
    }

    /// One element of a composite literal, allowing elided element types
    /// (`{1, 2}` for `[]int`, and `{...}` for `*T` meaning `&T{...}`).
    fn elem_value(&mut self, node: NodeId, ty: Idx, context: &str) -> Check<Src> {
        let span = self.ast.span(node);
        if let NodeKind::Composite { ty: None, .. } = self.ast.kind(node) {
            if let Some(target) = self.pool.pointer_elem(ty) {
                let value = self.lower_composite(node, Some(target))?;
                let src = self.value_of(&value, span)?;
                let dst = self.temp();
                self.emit(Op::Box { dst, src }, span);
                return Ok(Src::Loc(dst));
            }
            let value = self.lower_composite(node, Some(ty))?;
            return self.value_of(&value, span);
        }
        let value = self.lower_expr(node)?;
        self.coerce(value, ty, span, context)
    }
}
