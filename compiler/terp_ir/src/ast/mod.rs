//! Syntax tree arena.
//!
//! Nodes own their children by id (inside [`NodeKind`]) and keep a
//! non-owning back-reference to their parent. The arena is append-only:
//! incremental evaluation absorbs further trees with [`Ast::absorb`], which
//! renumbers the incoming nodes so existing ids stay valid.

mod builder;


pub use builder::AstBuilder;

use crate::{BinaryOp, BranchKind, ChanDir, Name, Span, UnaryOp};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Index;

/// Index of a node in an [`Ast`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        NodeId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn shifted(self, offset: u32) -> Self {
        NodeId(self.0 + offset)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Literal values as written in source.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i128),
    Float(f64),
    Rune(char),
    Str(String),
}

/// Node payload. Children are referenced by id.
///
/// `true`, `false`, `nil` and `iota` are plain identifiers resolved through
/// the universe scope.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    // Expressions
    Ident(Name),
    Lit(Literal),
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    /// `f(args)`; `spread` marks a trailing `...`.
    Call {
        func: NodeId,
        args: Vec<NodeId>,
        spread: bool,
    },
    Selector {
        base: NodeId,
        sel: Name,
    },
    /// Index expression or explicit instantiation `F[int, string]`.
    Index {
        base: NodeId,
        indices: Vec<NodeId>,
    },
    SliceExpr {
        base: NodeId,
        low: Option<NodeId>,
        high: Option<NodeId>,
        max: Option<NodeId>,
    },
    /// `x.(T)`; `ty` is `None` only for the `x.(type)` guard of a type switch.
    TypeAssert {
        base: NodeId,
        ty: Option<NodeId>,
    },
    Composite {
        ty: Option<NodeId>,
        elems: Vec<NodeId>,
    },
    KeyValue {
        key: NodeId,
        value: NodeId,
    },
    FuncLit {
        sig: NodeId,
        body: NodeId,
    },
    Paren(NodeId),

    // Type expressions
    /// `[N]T`, or `[...]T` when `len` is `None`.
    ArrayType {
        len: Option<NodeId>,
        elem: NodeId,
    },
    SliceType(NodeId),
    MapType {
        key: NodeId,
        value: NodeId,
    },
    ChanType {
        dir: ChanDir,
        elem: NodeId,
    },
    PointerType(NodeId),
    /// Parameters and results are [`NodeKind::Field`] nodes. When `variadic`
    /// is set, the last parameter's type is the element type.
    FuncType {
        params: Vec<NodeId>,
        results: Vec<NodeId>,
        variadic: bool,
    },
    StructType(Vec<NodeId>),
    /// Elements are method fields, embedded types or unions.
    InterfaceType(Vec<NodeId>),
    /// Struct field, parameter, result, type parameter or interface method.
    /// No names means an embedded field or an unnamed parameter.
    Field {
        names: Vec<Name>,
        ty: NodeId,
    },
    Union(Vec<NodeId>),
    Tilde(NodeId),

    // Statements
    Block(Vec<NodeId>),
    ExprStmt(NodeId),
    /// `lhs = rhs`, or `lhs op= rhs` when `op` is set.
    Assign {
        lhs: Vec<NodeId>,
        rhs: Vec<NodeId>,
        op: Option<BinaryOp>,
    },
    /// `lhs := rhs`; every lhs is an identifier.
    Define {
        lhs: Vec<NodeId>,
        rhs: Vec<NodeId>,
    },
    IncDec {
        target: NodeId,
        inc: bool,
    },
    Send {
        chan: NodeId,
        value: NodeId,
    },
    DeclStmt(NodeId),
    If {
        init: Option<NodeId>,
        cond: NodeId,
        then: NodeId,
        els: Option<NodeId>,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        post: Option<NodeId>,
        body: NodeId,
    },
    Range {
        key: Option<NodeId>,
        value: Option<NodeId>,
        define: bool,
        expr: NodeId,
        body: NodeId,
    },
    Switch {
        init: Option<NodeId>,
        tag: Option<NodeId>,
        clauses: Vec<NodeId>,
    },
    /// `switch bind := expr.(type) { ... }`
    TypeSwitch {
        init: Option<NodeId>,
        bind: Option<Name>,
        expr: NodeId,
        clauses: Vec<NodeId>,
    },
    CaseClause {
        exprs: Vec<NodeId>,
        default: bool,
        body: Vec<NodeId>,
    },
    Select(Vec<NodeId>),
    /// `comm` is a send, receive expression statement, or a define/assign
    /// with a receive on the right; `None` is the default clause.
    CommClause {
        comm: Option<NodeId>,
        body: Vec<NodeId>,
    },
    Go(NodeId),
    Defer(NodeId),
    Return(Vec<NodeId>),
    Branch {
        kind: BranchKind,
        label: Option<Name>,
    },
    Labeled {
        label: Name,
        stmt: NodeId,
    },
    Empty,

    // Declarations
    FuncDecl {
        name: Name,
        recv: Option<NodeId>,
        type_params: Vec<NodeId>,
        sig: NodeId,
        body: Option<NodeId>,
    },
    VarDecl(Vec<NodeId>),
    ConstDecl(Vec<NodeId>),
    TypeDecl(Vec<NodeId>),
    ValueSpec {
        names: Vec<Name>,
        ty: Option<NodeId>,
        values: Vec<NodeId>,
    },
    TypeSpec {
        name: Name,
        type_params: Vec<NodeId>,
        alias: bool,
        ty: NodeId,
    },
}

fn push_opt(out: &mut SmallVec<[NodeId; 4]>, id: Option<NodeId>) {
    if let Some(id) = id {
        out.push(id);
    }
}

fn shift_opt(id: &mut Option<NodeId>, offset: u32) {
    if let Some(id) = id {
        *id = id.shifted(offset);
    }
}

fn shift_all(ids: &mut [NodeId], offset: u32) {
    for id in ids {
        *id = id.shifted(offset);
    }
}

impl NodeKind {
    /// Direct children in source order.
    pub fn children(&self) -> SmallVec<[NodeId; 4]> {
        let mut out = SmallVec::new();
        match self {
            NodeKind::Ident(_)
            | NodeKind::Lit(_)
            | NodeKind::Branch { .. }
            | NodeKind::Empty => {}
            NodeKind::Binary { left, right, .. } => {
                out.push(*left);
                out.push(*right);
            }
            NodeKind::Unary { operand, .. } => out.push(*operand),
            NodeKind::Call { func, args, .. } => {
                out.push(*func);
                out.extend(args.iter().copied());
            }
            NodeKind::Selector { base, .. } => out.push(*base),
            NodeKind::Index { base, indices } => {
                out.push(*base);
                out.extend(indices.iter().copied());
            }
            NodeKind::SliceExpr {
                base,
                low,
                high,
                max,
            } => {
                out.push(*base);
                push_opt(&mut out, *low);
                push_opt(&mut out, *high);
                push_opt(&mut out, *max);
            }
            NodeKind::TypeAssert { base, ty } => {
                out.push(*base);
                push_opt(&mut out, *ty);
            }
            NodeKind::Composite { ty, elems } => {
                push_opt(&mut out, *ty);
                out.extend(elems.iter().copied());
            }
            NodeKind::KeyValue { key, value } => {
                out.push(*key);
                out.push(*value);
            }
            NodeKind::FuncLit { sig, body } => {
                out.push(*sig);
                out.push(*body);
            }
            NodeKind::Paren(e)
            | NodeKind::SliceType(e)
            | NodeKind::PointerType(e)
            | NodeKind::Tilde(e)
            | NodeKind::ExprStmt(e)
            | NodeKind::DeclStmt(e)
            | NodeKind::Go(e)
            | NodeKind::Defer(e) => out.push(*e),
            NodeKind::ArrayType { len, elem } => {
                push_opt(&mut out, *len);
                out.push(*elem);
            }
            NodeKind::MapType { key, value } => {
                out.push(*key);
                out.push(*value);
            }
            NodeKind::ChanType { elem, .. } => out.push(*elem),
            NodeKind::FuncType {
                params, results, ..
            } => {
                out.extend(params.iter().copied());
                out.extend(results.iter().copied());
            }
            NodeKind::StructType(items)
            | NodeKind::InterfaceType(items)
            | NodeKind::Union(items)
            | NodeKind::Block(items)
            | NodeKind::Return(items)
            | NodeKind::Select(items)
            | NodeKind::VarDecl(items)
            | NodeKind::ConstDecl(items)
            | NodeKind::TypeDecl(items) => out.extend(items.iter().copied()),
            NodeKind::Field { ty, .. } => out.push(*ty),
            NodeKind::Assign { lhs, rhs, .. } | NodeKind::Define { lhs, rhs } => {
                out.extend(lhs.iter().copied());
                out.extend(rhs.iter().copied());
            }
            NodeKind::IncDec { target, .. } => out.push(*target),
            NodeKind::Send { chan, value } => {
                out.push(*chan);
                out.push(*value);
            }
            NodeKind::If {
                init,
                cond,
                then,
                els,
            } => {
                push_opt(&mut out, *init);
                out.push(*cond);
                out.push(*then);
                push_opt(&mut out, *els);
            }
            NodeKind::For {
                init,
                cond,
                post,
                body,
            } => {
                push_opt(&mut out, *init);
                push_opt(&mut out, *cond);
                push_opt(&mut out, *post);
                out.push(*body);
            }
            NodeKind::Range {
                key,
                value,
                expr,
                body,
                ..
            } => {
                push_opt(&mut out, *key);
                push_opt(&mut out, *value);
                out.push(*expr);
                out.push(*body);
            }
            NodeKind::Switch { init, tag, clauses } => {
                push_opt(&mut out, *init);
                push_opt(&mut out, *tag);
                out.extend(clauses.iter().copied());
            }
            NodeKind::TypeSwitch {
                init,
                expr,
                clauses,
                ..
            } => {
                push_opt(&mut out, *init);
                out.push(*expr);
                out.extend(clauses.iter().copied());
            }
            NodeKind::CaseClause { exprs, body, .. } => {
                out.extend(exprs.iter().copied());
                out.extend(body.iter().copied());
            }
            NodeKind::CommClause { comm, body } => {
                push_opt(&mut out, *comm);
                out.extend(body.iter().copied());
            }
            NodeKind::Labeled { stmt, .. } => out.push(*stmt),
            NodeKind::FuncDecl {
                recv,
                type_params,
                sig,
                body,
                ..
            } => {
                push_opt(&mut out, *recv);
                out.extend(type_params.iter().copied());
                out.push(*sig);
                push_opt(&mut out, *body);
            }
            NodeKind::ValueSpec { ty, values, .. } => {
                push_opt(&mut out, *ty);
                out.extend(values.iter().copied());
            }
            NodeKind::TypeSpec {
                type_params, ty, ..
            } => {
                out.extend(type_params.iter().copied());
                out.push(*ty);
            }
        }
        out
    }

    /// Renumber every child reference by `offset`.
    fn shift(&mut self, offset: u32) {
        match self {
            NodeKind::Ident(_)
            | NodeKind::Lit(_)
            | NodeKind::Branch { .. }
            | NodeKind::Empty => {}
            NodeKind::Binary { left, right, .. } => {
                *left = left.shifted(offset);
                *right = right.shifted(offset);
            }
            NodeKind::Unary { operand, .. } => *operand = operand.shifted(offset),
            NodeKind::Call { func, args, .. } => {
                *func = func.shifted(offset);
                shift_all(args, offset);
            }
            NodeKind::Selector { base, .. } => *base = base.shifted(offset),
            NodeKind::Index { base, indices } => {
                *base = base.shifted(offset);
                shift_all(indices, offset);
            }
            NodeKind::SliceExpr {
                base,
                low,
                high,
                max,
            } => {
                *base = base.shifted(offset);
                shift_opt(low, offset);
                shift_opt(high, offset);
                shift_opt(max, offset);
            }
            NodeKind::TypeAssert { base, ty } => {
                *base = base.shifted(offset);
                shift_opt(ty, offset);
            }
            NodeKind::Composite { ty, elems } => {
                shift_opt(ty, offset);
                shift_all(elems, offset);
            }
            NodeKind::KeyValue { key, value } => {
                *key = key.shifted(offset);
                *value = value.shifted(offset);
            }
            NodeKind::FuncLit { sig, body } => {
                *sig = sig.shifted(offset);
                *body = body.shifted(offset);
            }
            NodeKind::Paren(e)
            | NodeKind::SliceType(e)
            | NodeKind::PointerType(e)
            | NodeKind::Tilde(e)
            | NodeKind::ExprStmt(e)
            | NodeKind::DeclStmt(e)
            | NodeKind::Go(e)
            | NodeKind::Defer(e) => *e = e.shifted(offset),
            NodeKind::ArrayType { len, elem } => {
                shift_opt(len, offset);
                *elem = elem.shifted(offset);
            }
            NodeKind::MapType { key, value } => {
                *key = key.shifted(offset);
                *value = value.shifted(offset);
            }
            NodeKind::ChanType { elem, .. } => *elem = elem.shifted(offset),
            NodeKind::FuncType {
                params, results, ..
            } => {
                shift_all(params, offset);
                shift_all(results, offset);
            }
            NodeKind::StructType(items)
            | NodeKind::InterfaceType(items)
            | NodeKind::Union(items)
            | NodeKind::Block(items)
            | NodeKind::Return(items)
            | NodeKind::Select(items)
            | NodeKind::VarDecl(items)
            | NodeKind::ConstDecl(items)
            | NodeKind::TypeDecl(items) => shift_all(items, offset),
            NodeKind::Field { ty, .. } => *ty = ty.shifted(offset),
            NodeKind::Assign { lhs, rhs, .. } | NodeKind::Define { lhs, rhs } => {
                shift_all(lhs, offset);
                shift_all(rhs, offset);
            }
            NodeKind::IncDec { target, .. } => *target = target.shifted(offset),
            NodeKind::Send { chan, value } => {
                *chan = chan.shifted(offset);
                *value = value.shifted(offset);
            }
            NodeKind::If {
                init,
                cond,
                then,
                els,
            } => {
                shift_opt(init, offset);
                *cond = cond.shifted(offset);
                *then = then.shifted(offset);
                shift_opt(els, offset);
            }
            NodeKind::For {
                init,
                cond,
                post,
                body,
            } => {
                shift_opt(init, offset);
                shift_opt(cond, offset);
                shift_opt(post, offset);
                *body = body.shifted(offset);
            }
            NodeKind::Range {
                key,
                value,
                expr,
                body,
                ..
            } => {
                shift_opt(key, offset);
                shift_opt(value, offset);
                *expr = expr.shifted(offset);
                *body = body.shifted(offset);
            }
            NodeKind::Switch { init, tag, clauses } => {
                shift_opt(init, offset);
                shift_opt(tag, offset);
                shift_all(clauses, offset);
            }
            NodeKind::TypeSwitch {
                init,
                expr,
                clauses,
                ..
            } => {
                shift_opt(init, offset);
                *expr = expr.shifted(offset);
                shift_all(clauses, offset);
            }
            NodeKind::CaseClause { exprs, body, .. } => {
                shift_all(exprs, offset);
                shift_all(body, offset);
            }
            NodeKind::CommClause { comm, body } => {
                shift_opt(comm, offset);
                shift_all(body, offset);
            }
            NodeKind::Labeled { stmt, .. } => *stmt = stmt.shifted(offset),
            NodeKind::FuncDecl {
                recv,
                type_params,
                sig,
                body,
                ..
            } => {
                shift_opt(recv, offset);
                shift_all(type_params, offset);
                *sig = sig.shifted(offset);
                shift_opt(body, offset);
            }
            NodeKind::ValueSpec { ty, values, .. } => {
                shift_opt(ty, offset);
                shift_all(values, offset);
            }
            NodeKind::TypeSpec {
                type_params, ty, ..
            } => {
                shift_all(type_params, offset);
                *ty = ty.shifted(offset);
            }
        }
    }
}

/// A tree node.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Enclosing node; `None` for roots (top-level declarations).
    pub parent: Option<NodeId>,
}

/// Append-only node arena.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Ast { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a node and point its children's parent links at it.
    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId::new(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        for child in kind.children() {
            if let Some(node) = self.nodes.get_mut(child.index()) {
                node.parent = Some(id);
            }
        }
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
        });
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    #[inline]
    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Walk parent links from `id` (exclusive) to the first node matching `pred`.
    pub fn enclosing(&self, id: NodeId, pred: impl Fn(&NodeKind) -> bool) -> Option<NodeId> {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if pred(self.kind(p)) {
                return Some(p);
            }
            cur = self.parent(p);
        }
        None
    }

    /// Move every node of `other` into this arena.
    ///
    /// Returns the offset added to the incoming ids; callers shift ids they
    /// hold into `other` with [`NodeId::shifted`] or [`SourceFile::shifted`].
    pub fn absorb(&mut self, other: Ast) -> u32 {
        let offset = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        self.nodes.reserve(other.nodes.len());
        for mut node in other.nodes {
            node.kind.shift(offset);
            node.parent = node.parent.map(|p| p.shifted(offset));
            self.nodes.push(node);
        }
        offset
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.node(id)
    }
}

/// An `import` line of a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    pub path: String,
    /// Explicit local name; `_` binds nothing.
    pub alias: Option<Name>,
    pub span: Span,
}

/// One file of a package.
///
/// `stmts` holds top-level statements and is only accepted by incremental
/// evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SourceFile {
    pub name: String,
    pub imports: Vec<Import>,
    pub decls: Vec<NodeId>,
    pub stmts: Vec<NodeId>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>) -> Self {
        SourceFile {
            name: name.into(),
            ..SourceFile::default()
        }
    }

    #[must_use]
    pub fn shifted(mut self, offset: u32) -> Self {
        shift_all(&mut self.decls, offset);
        shift_all(&mut self.stmts, offset);
        self
    }
}

/// A compilation unit: a tree arena and the files whose roots live in it.
#[derive(Clone, Debug, Default)]
pub struct Package {
    pub ast: Ast,
    pub files: Vec<SourceFile>,
}

impl Package {
    pub fn new(ast: Ast, files: Vec<SourceFile>) -> Self {
        Package { ast, files }
    }

    /// Single-file package.
    pub fn single(ast: Ast, decls: Vec<NodeId>) -> Self {
        let mut file = SourceFile::new("main");
        file.decls = decls;
        Package {
            ast,
            files: vec![file],
        }
    }
}
