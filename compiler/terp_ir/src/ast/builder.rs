//! Ergonomic construction of syntax trees.
//!
//! Front-ends (and tests) build trees through [`AstBuilder`]. Methods take
//! `&self` so calls nest freely:
//!
//! ```text
//! let b = AstBuilder::new(interner);
//! let body = b.block(vec![b.expr_stmt(b.call(b.ident("println"), vec![b.int(1)]))]);
//! let main = b.func("main", vec![], vec![], body);
//! ```

use std::cell::{Cell, RefCell};

use super::{Ast, Import, Literal, NodeId, NodeKind, Package, SourceFile};
use crate::{BinaryOp, BranchKind, ChanDir, Name, SharedInterner, Span, UnaryOp};

/// Builds an [`Ast`] with automatically assigned spans.
///
/// Unless [`AstBuilder::at`] sets an explicit span, every node gets a unique
/// one-byte span derived from its id so diagnostics remain distinguishable.
pub struct AstBuilder {
    ast: RefCell<Ast>,
    interner: SharedInterner,
    span: Cell<Option<Span>>,
}

impl AstBuilder {
    pub fn new(interner: SharedInterner) -> Self {
        AstBuilder {
            ast: RefCell::new(Ast::new()),
            interner,
            span: Cell::new(None),
        }
    }

    pub fn interner(&self) -> &SharedInterner {
        &self.interner
    }

    /// Use `span` for nodes built until the next call (or `None` to resume
    /// automatic spans).
    pub fn at(&self, span: Option<Span>) {
        self.span.set(span);
    }

    pub fn name(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    fn names(&self, names: &[&str]) -> Vec<Name> {
        names.iter().map(|n| self.name(n)).collect()
    }

    /// Push a raw node.
    pub fn node(&self, kind: NodeKind) -> NodeId {
        let mut ast = self.ast.borrow_mut();
        let span = self.span.get().unwrap_or_else(|| {
            let at = u32::try_from(ast.len()).unwrap_or(u32::MAX);
            Span::new(at, at.saturating_add(1))
        });
        ast.push(kind, span)
    }

    pub fn finish(self) -> Ast {
        self.ast.into_inner()
    }

    /// Finish into a single-file package.
    pub fn into_package(self, decls: Vec<NodeId>) -> Package {
        Package::single(self.finish(), decls)
    }

    /// Finish into a single-file unit with imports, declarations and
    /// top-level statements.
    pub fn into_unit(self, imports: &[&str], decls: Vec<NodeId>, stmts: Vec<NodeId>) -> Package {
        let mut file = SourceFile::new("main");
        file.imports = imports
            .iter()
            .map(|path| Import {
                path: (*path).to_owned(),
                alias: None,
                span: Span::DUMMY,
            })
            .collect();
        file.decls = decls;
        file.stmts = stmts;
        Package::new(self.finish(), vec![file])
    }

    // Expressions

    pub fn ident(&self, name: &str) -> NodeId {
        let name = self.name(name);
        self.node(NodeKind::Ident(name))
    }

    pub fn int(&self, v: i128) -> NodeId {
        self.node(NodeKind::Lit(Literal::Int(v)))
    }

    pub fn float(&self, v: f64) -> NodeId {
        self.node(NodeKind::Lit(Literal::Float(v)))
    }

    pub fn rune(&self, c: char) -> NodeId {
        self.node(NodeKind::Lit(Literal::Rune(c)))
    }

    pub fn string(&self, s: &str) -> NodeId {
        self.node(NodeKind::Lit(Literal::Str(s.to_owned())))
    }

    pub fn nil(&self) -> NodeId {
        self.ident("nil")
    }

    pub fn boolean(&self, v: bool) -> NodeId {
        self.ident(if v { "true" } else { "false" })
    }

    pub fn binary(&self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.node(NodeKind::Binary { op, left, right })
    }

    pub fn unary(&self, op: UnaryOp, operand: NodeId) -> NodeId {
        self.node(NodeKind::Unary { op, operand })
    }

    pub fn call(&self, func: NodeId, args: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Call {
            func,
            args,
            spread: false,
        })
    }

    /// `f(args...)`
    pub fn call_spread(&self, func: NodeId, args: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Call {
            func,
            args,
            spread: true,
        })
    }

    /// Call a named function or builtin.
    pub fn call_named(&self, func: &str, args: Vec<NodeId>) -> NodeId {
        let f = self.ident(func);
        self.call(f, args)
    }

    pub fn selector(&self, base: NodeId, sel: &str) -> NodeId {
        let sel = self.name(sel);
        self.node(NodeKind::Selector { base, sel })
    }

    /// `recv.method(args)`
    pub fn method_call(&self, recv: NodeId, method: &str, args: Vec<NodeId>) -> NodeId {
        let f = self.selector(recv, method);
        self.call(f, args)
    }

    pub fn index(&self, base: NodeId, index: NodeId) -> NodeId {
        self.node(NodeKind::Index {
            base,
            indices: vec![index],
        })
    }

    /// Explicit instantiation `base[T1, T2]`.
    pub fn instantiate(&self, base: NodeId, type_args: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Index {
            base,
            indices: type_args,
        })
    }

    pub fn slice_expr(
        &self,
        base: NodeId,
        low: Option<NodeId>,
        high: Option<NodeId>,
        max: Option<NodeId>,
    ) -> NodeId {
        self.node(NodeKind::SliceExpr {
            base,
            low,
            high,
            max,
        })
    }

    pub fn type_assert(&self, base: NodeId, ty: NodeId) -> NodeId {
        self.node(NodeKind::TypeAssert { base, ty: Some(ty) })
    }

    pub fn composite(&self, ty: Option<NodeId>, elems: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Composite { ty, elems })
    }

    pub fn key_value(&self, key: NodeId, value: NodeId) -> NodeId {
        self.node(NodeKind::KeyValue { key, value })
    }

    /// `key: value` where the key is a field name.
    pub fn field_value(&self, field: &str, value: NodeId) -> NodeId {
        let key = self.ident(field);
        self.key_value(key, value)
    }

    pub fn func_lit(&self, sig: NodeId, body: NodeId) -> NodeId {
        self.node(NodeKind::FuncLit { sig, body })
    }

    pub fn paren(&self, inner: NodeId) -> NodeId {
        self.node(NodeKind::Paren(inner))
    }

    pub fn addr(&self, operand: NodeId) -> NodeId {
        self.unary(UnaryOp::Addr, operand)
    }

    pub fn deref(&self, operand: NodeId) -> NodeId {
        self.unary(UnaryOp::Deref, operand)
    }

    pub fn recv(&self, chan: NodeId) -> NodeId {
        self.unary(UnaryOp::Recv, chan)
    }

    // Types

    pub fn array_type(&self, len: Option<NodeId>, elem: NodeId) -> NodeId {
        self.node(NodeKind::ArrayType { len, elem })
    }

    pub fn slice_type(&self, elem: NodeId) -> NodeId {
        self.node(NodeKind::SliceType(elem))
    }

    pub fn map_type(&self, key: NodeId, value: NodeId) -> NodeId {
        self.node(NodeKind::MapType { key, value })
    }

    pub fn chan_type(&self, dir: ChanDir, elem: NodeId) -> NodeId {
        self.node(NodeKind::ChanType { dir, elem })
    }

    pub fn pointer_type(&self, elem: NodeId) -> NodeId {
        self.node(NodeKind::PointerType(elem))
    }

    pub fn func_type(&self, params: Vec<NodeId>, results: Vec<NodeId>, variadic: bool) -> NodeId {
        self.node(NodeKind::FuncType {
            params,
            results,
            variadic,
        })
    }

    /// Shorthand signature: `(name type, ...) (results...)`.
    pub fn sig(&self, params: Vec<NodeId>, results: Vec<NodeId>) -> NodeId {
        self.func_type(params, results, false)
    }

    /// Named parameter, field or type parameter.
    pub fn field(&self, names: &[&str], ty: NodeId) -> NodeId {
        let names = self.names(names);
        self.node(NodeKind::Field { names, ty })
    }

    /// Unnamed parameter/result, or embedded field.
    pub fn anon(&self, ty: NodeId) -> NodeId {
        self.node(NodeKind::Field {
            names: Vec::new(),
            ty,
        })
    }

    pub fn struct_type(&self, fields: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::StructType(fields))
    }

    pub fn interface_type(&self, elems: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::InterfaceType(elems))
    }

    /// Interface method element.
    pub fn method_elem(&self, name: &str, sig: NodeId) -> NodeId {
        self.field(&[name], sig)
    }

    pub fn union(&self, terms: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Union(terms))
    }

    pub fn tilde(&self, ty: NodeId) -> NodeId {
        self.node(NodeKind::Tilde(ty))
    }

    // Statements

    pub fn block(&self, stmts: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Block(stmts))
    }

    pub fn expr_stmt(&self, expr: NodeId) -> NodeId {
        self.node(NodeKind::ExprStmt(expr))
    }

    pub fn assign(&self, lhs: Vec<NodeId>, rhs: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Assign { lhs, rhs, op: None })
    }

    pub fn op_assign(&self, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.node(NodeKind::Assign {
            lhs: vec![lhs],
            rhs: vec![rhs],
            op: Some(op),
        })
    }

    pub fn define(&self, names: &[&str], rhs: Vec<NodeId>) -> NodeId {
        let lhs = names.iter().map(|n| self.ident(n)).collect();
        self.node(NodeKind::Define { lhs, rhs })
    }

    pub fn inc(&self, target: NodeId) -> NodeId {
        self.node(NodeKind::IncDec { target, inc: true })
    }

    pub fn dec(&self, target: NodeId) -> NodeId {
        self.node(NodeKind::IncDec { target, inc: false })
    }

    pub fn send(&self, chan: NodeId, value: NodeId) -> NodeId {
        self.node(NodeKind::Send { chan, value })
    }

    /// Local `var names ty = values`.
    pub fn var_stmt(&self, names: &[&str], ty: Option<NodeId>, values: Vec<NodeId>) -> NodeId {
        let decl = self.var_decl(names, ty, values);
        self.node(NodeKind::DeclStmt(decl))
    }

    /// Local declaration statement wrapping any declaration node.
    pub fn decl_stmt(&self, decl: NodeId) -> NodeId {
        self.node(NodeKind::DeclStmt(decl))
    }

    pub fn if_stmt(
        &self,
        init: Option<NodeId>,
        cond: NodeId,
        then: NodeId,
        els: Option<NodeId>,
    ) -> NodeId {
        self.node(NodeKind::If {
            init,
            cond,
            then,
            els,
        })
    }

    pub fn for_stmt(
        &self,
        init: Option<NodeId>,
        cond: Option<NodeId>,
        post: Option<NodeId>,
        body: NodeId,
    ) -> NodeId {
        self.node(NodeKind::For {
            init,
            cond,
            post,
            body,
        })
    }

    pub fn range(
        &self,
        key: Option<NodeId>,
        value: Option<NodeId>,
        define: bool,
        expr: NodeId,
        body: NodeId,
    ) -> NodeId {
        self.node(NodeKind::Range {
            key,
            value,
            define,
            expr,
            body,
        })
    }

    /// `for key, value := range expr { body }`
    pub fn range_define(
        &self,
        key: &str,
        value: Option<&str>,
        expr: NodeId,
        body: NodeId,
    ) -> NodeId {
        let key = self.ident(key);
        let value = value.map(|v| self.ident(v));
        self.range(Some(key), value, true, expr, body)
    }

    pub fn switch(&self, init: Option<NodeId>, tag: Option<NodeId>, clauses: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Switch { init, tag, clauses })
    }

    pub fn type_switch(&self, bind: Option<&str>, expr: NodeId, clauses: Vec<NodeId>) -> NodeId {
        let bind = bind.map(|b| self.name(b));
        self.node(NodeKind::TypeSwitch {
            init: None,
            bind,
            expr,
            clauses,
        })
    }

    pub fn case(&self, exprs: Vec<NodeId>, body: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::CaseClause {
            exprs,
            default: false,
            body,
        })
    }

    pub fn default_case(&self, body: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::CaseClause {
            exprs: Vec::new(),
            default: true,
            body,
        })
    }

    pub fn select(&self, clauses: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Select(clauses))
    }

    pub fn comm(&self, comm: Option<NodeId>, body: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::CommClause { comm, body })
    }

    pub fn go_stmt(&self, call: NodeId) -> NodeId {
        self.node(NodeKind::Go(call))
    }

    pub fn defer(&self, call: NodeId) -> NodeId {
        self.node(NodeKind::Defer(call))
    }

    pub fn ret(&self, values: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::Return(values))
    }

    pub fn brk(&self, label: Option<&str>) -> NodeId {
        let label = label.map(|l| self.name(l));
        self.node(NodeKind::Branch {
            kind: BranchKind::Break,
            label,
        })
    }

    pub fn cont(&self, label: Option<&str>) -> NodeId {
        let label = label.map(|l| self.name(l));
        self.node(NodeKind::Branch {
            kind: BranchKind::Continue,
            label,
        })
    }

    pub fn fallthrough(&self) -> NodeId {
        self.node(NodeKind::Branch {
            kind: BranchKind::Fallthrough,
            label: None,
        })
    }

    pub fn labeled(&self, label: &str, stmt: NodeId) -> NodeId {
        let label = self.name(label);
        self.node(NodeKind::Labeled { label, stmt })
    }

    // Declarations

    /// `func name(params) results { body }`
    pub fn func(&self, name: &str, params: Vec<NodeId>, results: Vec<NodeId>, body: NodeId) -> NodeId {
        let sig = self.sig(params, results);
        self.func_decl(name, None, Vec::new(), sig, body)
    }

    pub fn func_decl(
        &self,
        name: &str,
        recv: Option<NodeId>,
        type_params: Vec<NodeId>,
        sig: NodeId,
        body: NodeId,
    ) -> NodeId {
        let name = self.name(name);
        self.node(NodeKind::FuncDecl {
            name,
            recv,
            type_params,
            sig,
            body: Some(body),
        })
    }

    /// `func (recv) name sig { body }`
    pub fn method(&self, recv: NodeId, name: &str, sig: NodeId, body: NodeId) -> NodeId {
        self.func_decl(name, Some(recv), Vec::new(), sig, body)
    }

    pub fn value_spec(&self, names: &[&str], ty: Option<NodeId>, values: Vec<NodeId>) -> NodeId {
        let names = self.names(names);
        self.node(NodeKind::ValueSpec { names, ty, values })
    }

    pub fn var_decl(&self, names: &[&str], ty: Option<NodeId>, values: Vec<NodeId>) -> NodeId {
        let spec = self.value_spec(names, ty, values);
        self.node(NodeKind::VarDecl(vec![spec]))
    }

    /// Const declaration group; `iota` counts specs.
    pub fn const_decl(&self, specs: Vec<NodeId>) -> NodeId {
        self.node(NodeKind::ConstDecl(specs))
    }

    pub fn type_spec(&self, name: &str, type_params: Vec<NodeId>, alias: bool, ty: NodeId) -> NodeId {
        let name = self.name(name);
        self.node(NodeKind::TypeSpec {
            name,
            type_params,
            alias,
            ty,
        })
    }

    /// `type name ty`
    pub fn type_decl(&self, name: &str, ty: NodeId) -> NodeId {
        let spec = self.type_spec(name, Vec::new(), false, ty);
        self.node(NodeKind::TypeDecl(vec![spec]))
    }

    /// `type name[type_params] ty`
    pub fn generic_type_decl(&self, name: &str, type_params: Vec<NodeId>, ty: NodeId) -> NodeId {
        let spec = self.type_spec(name, type_params, false, ty);
        self.node(NodeKind::TypeDecl(vec![spec]))
    }

    /// `type name = ty`
    pub fn alias_decl(&self, name: &str, ty: NodeId) -> NodeId {
        let spec = self.type_spec(name, Vec::new(), true, ty);
        self.node(NodeKind::TypeDecl(vec![spec]))
    }
}
