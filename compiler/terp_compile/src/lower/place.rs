//! Assignable and addressable expressions.

use smallvec::SmallVec;
use terp_diagnostic::ErrorCode;
use terp_eval::program::{Loc, Op, Place, PlaceBase, Src, Step};
use terp_eval::Value;
use terp_ir::{NodeId, NodeKind, Span, UnaryOp};
use terp_types::{Idx, Selection, TypeData};

use super::expr::strip_parens;
use super::Operand;
use crate::error::{fail, Check};
use crate::scope::SymbolKind;
use crate::CompileContext;

/// Where an assignment writes.
#[derive(Clone, Debug)]
pub(crate) enum LValue {
    /// `_`
    Blank,
    Loc(Loc),
    Place(Place),
    MapEntry { map: Src, key: Src },
    /// Not addressable; the value has been computed already.
    Value(Src),
}

impl CompileContext {
    /// Lower `node` as a location. `None` means `node` is not shaped like a
    /// location and nothing was emitted; map entries are only produced
    /// when `for_assign` is set.
    pub(crate) fn place_of(
        &mut self,
        node: NodeId,
        for_assign: bool,
    ) -> Check<Option<(LValue, Idx)>> {
        let span = self.ast.span(node);
        match self.ast.kind(node).clone() {
            NodeKind::Paren(inner) => self.place_of(inner, for_assign),
            NodeKind::Ident(name) => {
                if name == self.names.blank {
                    return Ok(for_assign.then_some((LValue::Blank, Idx::INVALID)));
                }
                let sym = self.resolve_name(name, span)?;
                if sym.kind != SymbolKind::Var {
                    return Ok(None);
                }
                let loc = self.loc_of(&sym.storage, span)?;
                Ok(Some((LValue::Loc(loc), sym.ty)))
            }
            NodeKind::Selector { base, sel } => {
                if let Some(pkg) = self.package_of(base) {
                    let op = self.host_member(pkg, sel, span)?;
                    return Ok(self
                        .host_var_slot(pkg, sel)
                        .map(|slot| (LValue::Loc(Loc::Global(slot)), op.ty)));
                }
                let b = self.lower_base(base)?;
                let probe = Operand::value(b.ty(), Src::Const(Value::Nil));
                let Selection::Field { path, ty } = self.select(&probe, base, sel, span)? else {
                    return self.not_assignable(node);
                };
                let first_ptr = path.first().is_some_and(|s| s.ptr);
                match b {
                    Base::Place(start, _) if !first_ptr => {
                        Ok(Some((LValue::Place(self.extend_path(start, &path, span)), ty)))
                    }
                    b => {
                        let x = self.base_value(b, span)?;
                        let place = self.field_place(&x, &path, span)?;
                        if path.iter().any(|s| s.ptr) {
                            Ok(Some((LValue::Place(place), ty)))
                        } else {
                            Ok(Some((self.loaded(place, span), ty)))
                        }
                    }
                }
            }
            NodeKind::Index { base, indices } => {
                if indices.len() != 1
                    || self.generic_func_of(base).is_some()
                    || self.generic_type_of(base).is_some()
                {
                    return Ok(None);
                }
                self.index_place(base, indices[0], for_assign, span).map(Some)
            }
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let x = self.lower_expr(operand)?;
                let Some(elem) = self.pool.pointer_elem(x.ty) else {
                    return fail(
                        ErrorCode::E2002,
                        span,
                        format!(
                            "invalid operation: cannot indirect {} (value of type {})",
                            self.expr_text(operand),
                            self.pool.display(x.ty)
                        ),
                    );
                };
                let ptr = self.value_of(&x, span)?;
                Ok(Some((
                    LValue::Place(Place {
                        base: PlaceBase::Deref(ptr),
                        steps: SmallVec::new(),
                    }),
                    elem,
                )))
            }
            _ => Ok(None),
        }
    }

    fn index_place(
        &mut self,
        base: NodeId,
        index: NodeId,
        for_assign: bool,
        span: Span,
    ) -> Check<(LValue, Idx)> {
        let b = self.lower_base(base)?;
        let under = self.pool.underlying_data(self.pool.default_type(b.ty())).clone();
        if let TypeData::Array { len, elem } = under {
            let i = self.index_value(index, Some(len))?;
            let step = Step::Index { index: i, len };
            return Ok(match b {
                Base::Place(place, _) => (LValue::Place(place.with(step)), elem),
                Base::Value(x) => {
                    let src = self.value_of(&x, span)?;
                    let place = Place::loc(self.to_loc(src, span)).with(step);
                    (self.loaded(place, span), elem)
                }
            });
        }
        let x = self.base_value(b, span)?;
        match under {
            TypeData::Basic(kind) if kind.is_string() => {
                let i = self.index_value(index, None)?;
                let text = self.value_of(&x, span)?;
                let dst = self.temp();
                self.emit(Op::StrIndex { dst, text, index: i }, span);
                Ok((LValue::Value(Src::Loc(dst)), Idx::BYTE))
            }
            TypeData::Pointer(target) => match self.pool.underlying_data(target).clone() {
                TypeData::Array { len, elem } => {
                    let i = self.index_value(index, Some(len))?;
                    let ptr = self.value_of(&x, span)?;
                    let place = Place {
                        base: PlaceBase::Deref(ptr),
                        steps: SmallVec::new(),
                    };
                    Ok((LValue::Place(place.with(Step::Index { index: i, len })), elem))
                }
                _ => self.not_indexable(&x, base, span),
            },
            TypeData::Slice(elem) => {
                let i = self.index_value(index, None)?;
                let slice = self.value_of(&x, span)?;
                Ok((
                    LValue::Place(Place {
                        base: PlaceBase::SliceElem { slice, index: i },
                        steps: SmallVec::new(),
                    }),
                    elem,
                ))
            }
            TypeData::Map { key, value } => {
                let map = self.value_of(&x, span)?;
                let k = self.lower_expr(index)?;
                let key = self.coerce(k, key, self.ast.span(index), "map index")?;
                if for_assign {
                    return Ok((LValue::MapEntry { map, key }, value));
                }
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
                Ok((LValue::Value(Src::Loc(dst)), value))
            }
            _ => self.not_indexable(&x, base, span),
        }
    }

    /// Lower the base of a selector or index, keeping its place when it
    /// has one.
    fn lower_base(&mut self, base: NodeId) -> Check<Base> {
        Ok(match self.place_of(base, false)? {
            Some((LValue::Loc(loc), ty)) => Base::Place(Place::loc(loc), ty),
            Some((LValue::Place(place), ty)) => Base::Place(place, ty),
            Some((LValue::Value(src), ty)) => Base::Value(Operand::value(ty, src)),
            Some((LValue::Blank | LValue::MapEntry { .. }, _)) | None => {
                Base::Value(self.lower_expr(base)?)
            }
        })
    }

    fn base_value(&mut self, base: Base, span: Span) -> Check<Operand> {
        match base {
            Base::Place(place, ty) => {
                let src = self.lvalue_src(&LValue::Place(place), span)?;
                Ok(Operand::value(ty, src))
            }
            Base::Value(x) => Ok(x),
        }
    }

    fn loaded(&mut self, place: Place, span: Span) -> LValue {
        let dst = self.temp();
        self.emit(Op::Load { dst, place }, span);
        LValue::Value(Src::Loc(dst))
    }

    fn not_assignable<T>(&self, node: NodeId) -> Check<T> {
        fail(
            ErrorCode::E2018,
            self.ast.span(node),
            format!(
                "cannot assign to {} (neither addressable nor a map index expression)",
                self.expr_text(node)
            ),
        )
    }

    /// The target of an assignment.
    pub(crate) fn lower_lvalue(&mut self, node: NodeId) -> Check<(LValue, Idx)> {
        match self.place_of(node, true)? {
            Some((LValue::Value(_), _)) | None => self.not_assignable(node),
            Some(target) => Ok(target),
        }
    }

    /// Current value held by `lv`.
    pub(crate) fn lvalue_src(&mut self, lv: &LValue, span: Span) -> Check<Src> {
        match lv {
            LValue::Loc(loc) => Ok(Src::Loc(*loc)),
            LValue::Place(place) => {
                let dst = self.temp();
                self.emit(
                    Op::Load {
                        dst,
                        place: place.clone(),
                    },
                    span,
                );
                Ok(Src::Loc(dst))
            }
            LValue::MapEntry { .. } => fail(
                ErrorCode::E9001,
                span,
                "map entry read through an assignment target",
            ),
            LValue::Value(src) => Ok(src.clone()),
            LValue::Blank => fail(ErrorCode::E2002, span, "cannot use _ as value"),
        }
    }

    /// Write `src` to `lv`.
    pub(crate) fn store(&mut self, lv: &LValue, src: Src, span: Span) -> Check<()> {
        match lv {
            LValue::Blank => {}
            LValue::Loc(loc) => {
                self.emit(Op::Move { dst: *loc, src }, span);
            }
            LValue::Place(place) => {
                self.emit(
                    Op::Store {
                        place: place.clone(),
                        src,
                    },
                    span,
                );
            }
            LValue::MapEntry { map, key } => {
                self.emit(
                    Op::MapStore {
                        map: map.clone(),
                        key: key.clone(),
                        src,
                    },
                    span,
                );
            }
            LValue::Value(_) => {
                return fail(ErrorCode::E9001, span, "store to a computed value");
            }
        }
        Ok(())
    }

    /// Lower the receiver expression of a method call or method value,
    /// keeping its place when it has one.
    pub(crate) fn lower_recv_base(&mut self, base: NodeId) -> Check<(Operand, Option<Place>)> {
        let span = self.ast.span(base);
        match self.place_of(base, false)? {
            Some((LValue::Loc(loc), ty)) => Ok((Operand::value(ty, Src::Loc(loc)), Some(Place::loc(loc)))),
            Some((LValue::Place(place), ty)) => {
                let src = self.lvalue_src(&LValue::Place(place.clone()), span)?;
                Ok((Operand::value(ty, src), Some(place)))
            }
            Some((LValue::Value(src), ty)) => Ok((Operand::value(ty, src), None)),
            Some((LValue::Blank | LValue::MapEntry { .. }, _)) | None => {
                Ok((self.lower_expr(base)?, None))
            }
        }
    }

    /// `&operand`.
    pub(crate) fn lower_addr(&mut self, operand: NodeId, span: Span) -> Check<Operand> {
        let inner = strip_parens(&self.ast, operand);
        if let NodeKind::Composite { .. } = self.ast.kind(inner) {
            let value = self.lower_composite(inner, None)?;
            let src = self.value_of(&value, span)?;
            let dst = self.temp();
            self.emit(Op::Box { dst, src }, span);
            let ptr = self.pool.pointer(value.ty);
            return Ok(Operand::value(ptr, Src::Loc(dst)));
        }
        let place = match self.place_of(inner, false)? {
            Some((LValue::Loc(loc), ty)) => Some((Place::loc(loc), ty)),
            Some((LValue::Place(place), ty)) => Some((place, ty)),
            _ => None,
        };
        let Some((place, ty)) = place else {
            return fail(
                ErrorCode::E2002,
                span,
                format!(
                    "invalid operation: cannot take address of {}",
                    self.expr_text(operand)
                ),
            );
        };
        let dst = self.temp();
        self.emit(Op::Addr { dst, place }, span);
        let ptr = self.pool.pointer(ty);
        Ok(Operand::value(ptr, Src::Loc(dst)))
    }
}

/// A lowered selector or index base.
enum Base {
    Place(Place, Idx),
    Value(Operand),
}

impl Base {
    fn ty(&self) -> Idx {
        match self {
            Base::Place(_, ty) => *ty,
            Base::Value(x) => x.ty,
        }
    }
}
