//! Type expressions: resolving syntax to pool indices.

use rustc_hash::FxHashSet;
use terp_diagnostic::ErrorCode;
use terp_ir::{Literal, Name, NodeId, NodeKind, Span, UnaryOp};
use terp_types::{ConstValue, IfaceMethod, Idx, InterfaceError, StructField, Term};

use crate::error::{fail, Check, Halt};
use crate::scope::{GenericId, Scope, ScopeKind, Storage, Symbol, SymbolKind};
use crate::CompileContext;

/// A parameter or result of a resolved signature.
#[derive(Clone, Debug)]
pub(crate) struct Param {
    pub name: Option<Name>,
    pub ty: Idx,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub(crate) struct SigInfo {
    /// The function type.
    pub ty: Idx,
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    pub variadic: bool,
}

impl SigInfo {
    /// Results are named (and usable by a bare `return`).
    pub fn named_results(&self) -> bool {
        self.results.first().is_some_and(|r| r.name.is_some())
    }
}

impl CompileContext {
    /// Resolve a type expression; anything else is an error.
    pub(crate) fn resolve_type(&mut self, node: NodeId) -> Check<Idx> {
        match self.try_type(node)? {
            Some(ty) => Ok(ty),
            None => fail(
                ErrorCode::E2011,
                self.ast.span(node),
                format!("{} is not a type", self.expr_text(node)),
            ),
        }
    }

    /// Resolve `node` if it denotes a type, `None` if it is a value
    /// expression.
    pub(crate) fn try_type(&mut self, node: NodeId) -> Check<Option<Idx>> {
        let span = self.ast.span(node);
        let ty = match self.ast.kind(node).clone() {
            NodeKind::Ident(name) => {
                let sym = self.resolve_name(name, span)?;
                match (sym.kind, sym.storage) {
                    (SymbolKind::Type, Storage::Generic(_)) => {
                        return fail(
                            ErrorCode::E2009,
                            span,
                            format!(
                                "cannot use generic type {} without instantiation",
                                self.interner.lookup(name)
                            ),
                        )
                    }
                    (SymbolKind::Type, _) => sym.ty,
                    _ => return Ok(None),
                }
            }
            NodeKind::Paren(inner) => return self.try_type(inner),
            NodeKind::Selector { base, sel } => match self.package_of(base) {
                Some(pkg) => return self.host_member_type(pkg, sel, span),
                None => return Ok(None),
            },
            NodeKind::Index { base, indices } => {
                let Some(generic) = self.generic_type_of(base) else {
                    return Ok(None);
                };
                let mut args = Vec::with_capacity(indices.len());
                for index in indices {
                    args.push(self.resolve_type(index)?);
                }
                self.instantiate_type(generic, args, span)?
            }
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => match self.try_type(operand)? {
                Some(elem) => self.pool.pointer(elem),
                None => return Ok(None),
            },
            NodeKind::ArrayType { len: Some(len), elem } => {
                let len = self.array_len(len)?;
                let elem = self.resolve_type(elem)?;
                self.pool.array(len, elem)
            }
            NodeKind::ArrayType { len: None, .. } => {
                return fail(
                    ErrorCode::E2016,
                    span,
                    "invalid use of [...] array outside a composite literal",
                )
            }
            NodeKind::SliceType(elem) => {
                let elem = self.resolve_type(elem)?;
                self.pool.slice(elem)
            }
            NodeKind::MapType { key, value } => {
                let key_ty = self.resolve_type(key)?;
                let value = self.resolve_type(value)?;
                if !self.unresolved.contains(&key_ty) && !self.pool.comparable(key_ty) {
                    return fail(
                        ErrorCode::E2002,
                        self.ast.span(key),
                        format!("invalid map key type {}", self.pool.display(key_ty)),
                    );
                }
                self.pool.map(key_ty, value)
            }
            NodeKind::ChanType { dir, elem } => {
                let elem = self.resolve_type(elem)?;
                self.pool.chan(dir, elem)
            }
            NodeKind::PointerType(elem) => {
                let elem = self.resolve_type(elem)?;
                self.pool.pointer(elem)
            }
            NodeKind::FuncType { .. } => self.resolve_signature(node)?.ty,
            NodeKind::StructType(fields) => self.struct_type(&fields)?,
            NodeKind::InterfaceType(elems) => self.interface_type(&elems, span)?,
            _ => return Ok(None),
        };
        Ok(Some(ty))
    }

    /// The generic type declaration `node` names, if any.
    pub(crate) fn generic_type_of(&self, node: NodeId) -> Option<GenericId> {
        let NodeKind::Ident(name) = self.ast.kind(node) else {
            return None;
        };
        match self.find(*name) {
            Some(Symbol {
                kind: SymbolKind::Type,
                storage: Storage::Generic(id),
                ..
            }) => Some(*id),
            _ => None,
        }
    }

    /// Index of the imported host package `node` names, if any.
    pub(crate) fn package_of(&self, node: NodeId) -> Option<usize> {
        let NodeKind::Ident(name) = self.ast.kind(node) else {
            return None;
        };
        match self.find(*name)?.storage {
            Storage::Package(index) => Some(index),
            _ => None,
        }
    }

    /// Block on a named type whose underlying type is still pending.
    pub(crate) fn require_resolved(&self, ty: Idx, span: Span) -> Check<()> {
        if !self.unresolved.contains(&ty) {
            return Ok(());
        }
        match self.pool.named_info(ty) {
            Some(info) => Err(Halt::Blocked {
                name: info.name,
                span,
                pending: true,
            }),
            None => Ok(()),
        }
    }

    fn array_len(&mut self, node: NodeId) -> Check<u64> {
        let span = self.ast.span(node);
        let value = self.const_value(node)?;
        match value.as_ref().map(|(_, v)| v).and_then(ConstValue::as_int) {
            Some(n) if n >= 0 => Ok(u64::try_from(n).unwrap_or(u64::MAX)),
            Some(n) => fail(
                ErrorCode::E2016,
                span,
                format!("invalid array length {n}"),
            ),
            None => fail(
                ErrorCode::E2016,
                span,
                format!(
                    "array length {} must be a non-negative integer constant",
                    self.expr_text(node)
                ),
            ),
        }
    }

    pub(crate) fn resolve_signature(&mut self, node: NodeId) -> Check<SigInfo> {
        let NodeKind::FuncType {
            params,
            results,
            variadic,
        } = self.ast.kind(node).clone()
        else {
            return fail(
                ErrorCode::E9001,
                self.ast.span(node),
                "expected a function signature",
            );
        };
        let last = params.len().saturating_sub(1);
        let mut resolved = Vec::new();
        for (i, field) in params.into_iter().enumerate() {
            self.fields_into(field, variadic && i == last, &mut resolved)?;
        }
        let mut results_out = Vec::new();
        for field in results {
            self.fields_into(field, false, &mut results_out)?;
        }
        let ty = self.pool.func(
            resolved.iter().map(|p| p.ty).collect(),
            results_out.iter().map(|p| p.ty).collect(),
            variadic,
        );
        Ok(SigInfo {
            ty,
            params: resolved,
            results: results_out,
            variadic,
        })
    }

    fn fields_into(&mut self, field: NodeId, variadic: bool, out: &mut Vec<Param>) -> Check<()> {
        let span = self.ast.span(field);
        let (names, ty_node) = match self.ast.kind(field).clone() {
            NodeKind::Field { names, ty } => (names, ty),
            _ => (Vec::new(), field),
        };
        let mut ty = self.resolve_type(ty_node)?;
        if variadic {
            ty = self.pool.slice(ty);
        }
        if names.is_empty() {
            out.push(Param {
                name: None,
                ty,
                span,
            });
        }
        for name in names {
            out.push(Param {
                name: Some(name),
                ty,
                span,
            });
        }
        Ok(())
    }

    fn struct_type(&mut self, fields: &[NodeId]) -> Check<Idx> {
        let mut out = Vec::with_capacity(fields.len());
        let mut seen = FxHashSet::default();
        for &field in fields {
            let span = self.ast.span(field);
            let NodeKind::Field { names, ty } = self.ast.kind(field).clone() else {
                continue;
            };
            let field_ty = self.resolve_type(ty)?;
            let embedded = names.is_empty();
            let names = if embedded {
                match self.embedded_name(ty) {
                    Some(name) => vec![name],
                    None => {
                        return fail(ErrorCode::E2002, span, "invalid embedded field type")
                    }
                }
            } else {
                names
            };
            for name in names {
                if name != self.names.blank && !seen.insert(name) {
                    return fail(
                        ErrorCode::E1002,
                        span,
                        format!("duplicate field {}", self.interner.lookup(name)),
                    );
                }
                out.push(StructField {
                    name,
                    ty: field_ty,
                    embedded,
                });
            }
        }
        Ok(self.pool.struct_type(out))
    }

    /// Field name of an embedded field: the type's name without pointer,
    /// package qualifier or type arguments.
    fn embedded_name(&self, node: NodeId) -> Option<Name> {
        match self.ast.kind(node) {
            NodeKind::Ident(name) => Some(*name),
            NodeKind::Selector { sel, .. } => Some(*sel),
            NodeKind::PointerType(inner)
            | NodeKind::Paren(inner)
            | NodeKind::Index { base: inner, .. } => self.embedded_name(*inner),
            _ => None,
        }
    }

    fn interface_type(&mut self, elems: &[NodeId], span: Span) -> Check<Idx> {
        let mut methods = Vec::new();
        let mut embedded = Vec::new();
        let mut unions = Vec::new();
        for &elem in elems {
            match self.ast.kind(elem).clone() {
                NodeKind::Field { names, ty } if !names.is_empty() => {
                    let sig = self.resolve_signature(ty)?.ty;
                    methods.extend(names.into_iter().map(|name| IfaceMethod { name, sig }));
                }
                NodeKind::Field { ty, .. } => {
                    self.interface_elem(ty, &mut embedded, &mut unions)?;
                }
                _ => self.interface_elem(elem, &mut embedded, &mut unions)?,
            }
        }
        match self.pool.make_interface(methods, &embedded, unions) {
            Ok(ty) => Ok(ty),
            Err(InterfaceError::DuplicateMethod(name)) => fail(
                ErrorCode::E1002,
                span,
                format!("duplicate method {}", self.interner.lookup(name)),
            ),
            Err(InterfaceError::NotAnInterface(ty)) => fail(
                ErrorCode::E2011,
                span,
                format!("{} is not an interface", self.pool.display(ty)),
            ),
        }
    }

    fn interface_elem(
        &mut self,
        node: NodeId,
        embedded: &mut Vec<Idx>,
        unions: &mut Vec<Vec<Term>>,
    ) -> Check<()> {
        match self.ast.kind(node).clone() {
            NodeKind::Union(terms) => {
                let mut out = Vec::with_capacity(terms.len());
                for term in terms {
                    out.push(self.term(term)?);
                }
                unions.push(out);
            }
            NodeKind::Tilde(_) => unions.push(vec![self.term(node)?]),
            _ => {
                let ty = self.resolve_type(node)?;
                self.require_resolved(ty, self.ast.span(node))?;
                if self.pool.is_interface(ty) {
                    embedded.push(ty);
                } else {
                    unions.push(vec![Term { tilde: false, ty }]);
                }
            }
        }
        Ok(())
    }

    fn term(&mut self, node: NodeId) -> Check<Term> {
        match self.ast.kind(node).clone() {
            NodeKind::Tilde(inner) => Ok(Term {
                tilde: true,
                ty: self.resolve_type(inner)?,
            }),
            _ => Ok(Term {
                tilde: false,
                ty: self.resolve_type(node)?,
            }),
        }
    }

    /// Resolve a type parameter constraint. A bare type or union is shorthand
    /// for an interface with that type set.
    pub(crate) fn resolve_constraint(&mut self, node: NodeId) -> Check<Idx> {
        let span = self.ast.span(node);
        let mut embedded = Vec::new();
        let mut unions = Vec::new();
        self.interface_elem(node, &mut embedded, &mut unions)?;
        if let ([iface], true) = (embedded.as_slice(), unions.is_empty()) {
            return Ok(*iface);
        }
        self.pool
            .make_interface(Vec::new(), &embedded, unions)
            .or_else(|_| fail(ErrorCode::E2011, span, "invalid constraint"))
    }

    /// Run `f` with the scope chain of a top-level declaration in `file`,
    /// with `env` binding type parameter names.
    pub(crate) fn in_decl_context<T>(
        &mut self,
        file: usize,
        env: &[(Name, Idx)],
        f: impl FnOnce(&mut Self) -> Check<T>,
    ) -> Check<T> {
        let scopes = std::mem::take(&mut self.scopes);
        let saved_file = std::mem::replace(&mut self.file, file);
        let iota = self.iota.take();
        if !env.is_empty() {
            let mut scope = Scope::new(ScopeKind::TypeParams, 0);
            for &(name, ty) in env {
                scope.insert(Symbol::new(name, SymbolKind::Type, ty, Storage::None));
            }
            self.scopes.push(scope);
        }
        let result = f(self);
        self.scopes = scopes;
        self.file = saved_file;
        self.iota = iota;
        result
    }

    /// Short source-like rendering of an expression for messages.
    pub(crate) fn expr_text(&self, node: NodeId) -> String {
        match self.ast.kind(node) {
            NodeKind::Ident(name) => self.interner.lookup(*name).to_owned(),
            NodeKind::Selector { base, sel } => {
                format!("{}.{}", self.expr_text(*base), self.interner.lookup(*sel))
            }
            NodeKind::Paren(inner) => format!("({})", self.expr_text(*inner)),
            NodeKind::Call { func, .. } => format!("{}(...)", self.expr_text(*func)),
            NodeKind::Index { base, .. } => format!("{}[...]", self.expr_text(*base)),
            NodeKind::Lit(Literal::Int(v)) => v.to_string(),
            NodeKind::Lit(Literal::Float(v)) => v.to_string(),
            NodeKind::Lit(Literal::Rune(c)) => format!("{c:?}"),
            NodeKind::Lit(Literal::Str(text)) => format!("{text:?}"),
            NodeKind::Unary { op, operand } => {
                format!("{}{}", op.as_str(), self.expr_text(*operand))
            }
            NodeKind::Binary { op, left, right } => format!(
                "{} {} {}",
                self.expr_text(*left),
                op.as_str(),
                self.expr_text(*right)
            ),
            NodeKind::FuncLit { .. } => "func literal".to_owned(),
            NodeKind::Composite { .. } => "composite literal".to_owned(),
            _ => "expression".to_owned(),
        }
    }
}
