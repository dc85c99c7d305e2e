//! CFG construction for function bodies.
//!
//! Lowering walks a body once, type-checking as it goes, and appends
//! [`CfgNode`]s to the program. Every expression becomes an [`Operand`]: an
//! inline constant, a frame location, or (for calls) a tuple of result
//! slots. Nothing is looked up by name at run time.
//!
//! # Frames
//!
//! Frame depth is absolute: the root frame of package variables is depth 0,
//! the frame of a top-level function is depth 1, and every loop iteration
//! and function literal adds a level below the frame it runs in. A local
//! symbol records the depth it was allocated at, so the `Up` level of an
//! access is the difference between the current depth and the symbol's.
//!
//! # Successor wiring
//!
//! [`FuncState::tail`] holds the open edges of the code emitted so far: the
//! next emitted node becomes their successor. Forward jumps take the tail
//! and hand it back where the target is emitted; backward jumps link it to
//! an existing node.

mod call;
mod composite;
mod control;
mod convert;
mod expr;
mod place;
mod stmt;


use smallvec::SmallVec;
use terp_diagnostic::ErrorCode;
use terp_eval::program::{CfgId, Loc, NumKind, Op, OpKind, Src};
use terp_eval::{CfgNode, FuncId, Program, Value};
use terp_ir::{Name, NodeId, NodeKind, SourceFile, Span};
use terp_types::{BasicKind, ConstValue, Idx, TypeData};
use tracing::{debug, instrument};

use crate::context::Job;
use crate::error::{fail, Check};
use crate::resolve::{Param, SigInfo};
use crate::scope::{ScopeKind, Storage, Symbol, SymbolKind};
use crate::CompileContext;

pub(crate) use place::LValue;

/// How an operand's value is available.
#[derive(Clone, Debug)]
pub(crate) enum Mode {
    /// Compile-time constant.
    Const(ConstValue),
    Value(Src),
    /// Result slots of a multi-value call.
    Tuple(SmallVec<[Loc; 2]>),
    /// Call without results.
    Void,
}

/// A lowered expression.
#[derive(Clone, Debug)]
pub(crate) struct Operand {
    pub ty: Idx,
    pub mode: Mode,
}

impl Operand {
    pub fn value(ty: Idx, src: Src) -> Self {
        Operand {
            ty,
            mode: Mode::Value(src),
        }
    }

    pub fn constant(ty: Idx, value: ConstValue) -> Self {
        Operand {
            ty,
            mode: Mode::Const(value),
        }
    }

    pub fn nil() -> Self {
        Operand::value(Idx::UNTYPED_NIL, Src::Const(Value::Nil))
    }

    pub fn is_nil(&self) -> bool {
        self.ty == Idx::UNTYPED_NIL
    }

    pub fn const_value(&self) -> Option<&ConstValue> {
        match &self.mode {
            Mode::Const(v) => Some(v),
            _ => None,
        }
    }
}

/// An open successor edge.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Edge {
    from: CfgId,
    alt: bool,
}

#[derive(Clone, Debug, Default)]
struct FrameLevel {
    size: u32,
    /// `EnterFrame`/`NextFrame` nodes that get this level's final size.
    patches: Vec<CfgId>,
}

/// A `break`/`continue` target.
#[derive(Clone, Debug)]
struct Target {
    label: Option<Name>,
    /// Depth the construct's own code runs at.
    depth: u32,
    breaks: Vec<Edge>,
    /// `None` for `switch` and `select`.
    continues: Option<Vec<Edge>>,
}

/// Lowering state of one function (or function literal) body.
#[derive(Clone, Debug)]
pub(crate) struct FuncState {
    id: FuncId,
    name: String,
    /// Depth of the function's own frame.
    base: u32,
    root: FrameLevel,
    nested: Vec<FrameLevel>,
    start: CfgId,
    tail: Vec<Edge>,
    targets: Vec<Target>,
    results: Vec<Idx>,
    named_results: bool,
    /// Function literals created so far, for naming.
    literals: u32,
    /// Label of the statement being lowered, claimed by the loop, switch or
    /// select it names.
    label: Option<Name>,
}

impl FuncState {
    fn new(id: FuncId, name: String, base: u32) -> Self {
        FuncState {
            id,
            name,
            base,
            root: FrameLevel::default(),
            nested: Vec::new(),
            start: CfgId::NONE,
            tail: Vec::new(),
            targets: Vec::new(),
            results: Vec::new(),
            named_results: false,
            literals: 0,
            label: None,
        }
    }

    fn depth(&self) -> u32 {
        self.base + u32::try_from(self.nested.len()).unwrap_or(u32::MAX)
    }

    fn top(&mut self) -> &mut FrameLevel {
        match self.nested.last_mut() {
            Some(level) => level,
            None => &mut self.root,
        }
    }

    fn alloc(&mut self) -> u32 {
        let level = self.top();
        let index = level.size;
        level.size += 1;
        index
    }
}

fn link(program: &mut Program, edge: Edge, to: CfgId) {
    let node = program.node_mut(edge.from);
    if edge.alt {
        node.alt = to;
    } else {
        node.next = to;
    }
}

/// Stack lengths to restore when lowering bails out part-way.
#[derive(Copy, Clone, Debug)]
struct Mark {
    funcs: usize,
    scopes: usize,
}

impl CompileContext {
    // === Frames and slots ===

    /// Absolute depth of the innermost frame being lowered.
    pub(crate) fn depth(&self) -> u32 {
        self.funcs.last().map_or(0, FuncState::depth)
    }

    /// A fresh slot of the current frame.
    pub(crate) fn temp(&mut self) -> Loc {
        match self.funcs.last_mut() {
            Some(state) => Loc::Local(state.alloc()),
            None => Loc::Global(self.program.add_global(Value::Nil)),
        }
    }

    /// Storage for a new variable: a package slot for top-level statements
    /// of an incremental unit, a slot of the current frame otherwise.
    pub(crate) fn var_storage(&mut self, ty: Idx) -> Storage {
        if self.scopes.is_empty() || self.funcs.is_empty() {
            let zero = self.zero_value(ty);
            return Storage::Global(self.program.add_global(zero));
        }
        let depth = self.depth();
        match self.funcs.last_mut() {
            Some(state) => Storage::Local {
                depth,
                index: state.alloc(),
            },
            None => Storage::None,
        }
    }

    /// Location of a variable as seen from the current frame.
    pub(crate) fn loc_of(&self, storage: &Storage, span: Span) -> Check<Loc> {
        match *storage {
            Storage::Global(index) => Ok(Loc::Global(index)),
            Storage::Local { depth, index } => {
                let cur = self.depth();
                Ok(if depth == cur {
                    Loc::Local(index)
                } else {
                    Loc::Up {
                        level: cur.saturating_sub(depth),
                        index,
                    }
                })
            }
            _ => fail(ErrorCode::E9001, span, "variable without a frame slot"),
        }
    }

    /// Declare a variable of type `ty` and return its location.
    pub(crate) fn declare_var(&mut self, name: Name, ty: Idx, span: Span) -> Check<Loc> {
        if name == self.names.blank {
            return Ok(self.temp());
        }
        let storage = self.var_storage(ty);
        let loc = self.loc_of(&storage, span)?;
        self.declare(Symbol::new(name, SymbolKind::Var, ty, storage), span)?;
        Ok(loc)
    }

    /// Push an iteration frame level and emit the node creating it.
    fn enter_frame(&mut self, span: Span) {
        let node = self.emit(Op::EnterFrame { size: 0 }, span);
        if let Some(state) = self.funcs.last_mut() {
            state.nested.push(FrameLevel {
                size: 0,
                patches: vec![node],
            });
        }
    }

    /// Emit a `NextFrame` for the innermost iteration level.
    fn next_frame(&mut self, carry: SmallVec<[u32; 4]>, span: Span) -> CfgId {
        let node = self.emit(Op::NextFrame { size: 0, carry }, span);
        if let Some(state) = self.funcs.last_mut() {
            state.top().patches.push(node);
        }
        node
    }

    /// Pop the innermost iteration level, fixing up its frame size.
    fn leave_frame(&mut self) {
        let Some(level) = self.funcs.last_mut().and_then(|s| s.nested.pop()) else {
            return;
        };
        for node in level.patches {
            match &mut self.program.node_mut(node).op {
                Op::EnterFrame { size } | Op::NextFrame { size, .. } => *size = level.size,
                _ => {}
            }
        }
    }

    // === Emission ===

    pub(crate) fn emit(&mut self, op: Op, span: Span) -> CfgId {
        let id = self.program.push(CfgNode::new(op, span));
        if let Some(state) = self.funcs.last_mut() {
            for edge in state.tail.drain(..) {
                link(&mut self.program, edge, id);
            }
            if state.start.is_none() {
                state.start = id;
            }
            state.tail.push(Edge {
                from: id,
                alt: false,
            });
        }
        id
    }

    /// Emit `Branch`: the tail continues on the true edge, the false edge is
    /// returned.
    fn branch(&mut self, cond: Src, span: Span) -> Vec<Edge> {
        let node = self.emit(Op::Branch { cond }, span);
        vec![Edge {
            from: node,
            alt: true,
        }]
    }

    fn take_tail(&mut self) -> Vec<Edge> {
        self.funcs
            .last_mut()
            .map(|s| std::mem::take(&mut s.tail))
            .unwrap_or_default()
    }

    fn add_tail(&mut self, edges: Vec<Edge>) {
        if let Some(state) = self.funcs.last_mut() {
            state.tail.extend(edges);
        }
    }

    /// Link the tail to an already emitted node.
    fn jump_to(&mut self, target: CfgId) {
        for edge in self.take_tail() {
            link(&mut self.program, edge, target);
        }
    }

    /// Emit a join point and return it.
    fn label_here(&mut self, span: Span) -> CfgId {
        self.emit(Op::Nop, span)
    }

    fn state(&self) -> Option<&FuncState> {
        self.funcs.last()
    }

    fn mark(&self) -> Mark {
        Mark {
            funcs: self.funcs.len(),
            scopes: self.scopes.len(),
        }
    }

    fn reset_to(&mut self, mark: Mark) {
        self.funcs.truncate(mark.funcs);
        self.scopes.truncate(mark.scopes);
    }

    // === Function bodies ===

    /// Lower queued bodies (including instances queued while lowering).
    #[instrument(level = "debug", skip_all)]
    pub(crate) fn drain_jobs(&mut self) {
        while let Some(job) = self.jobs.pop_front() {
            let Job {
                func,
                decl,
                file,
                env,
            } = job;
            let mark = self.mark();
            let result = self.in_decl_context(file, &env, |cx| cx.lower_func_decl(func, decl));
            self.reset_to(mark);
            if let Err(halt) = result {
                self.report(halt);
            }
        }
    }

    fn lower_func_decl(&mut self, func: FuncId, decl: NodeId) -> Check<()> {
        let span = self.ast.span(decl);
        let NodeKind::FuncDecl {
            recv, sig, body, ..
        } = self.ast.kind(decl).clone()
        else {
            return fail(ErrorCode::E9001, span, "function job without declaration");
        };
        let Some(body) = body else {
            return fail(ErrorCode::E2013, span, "missing function body");
        };
        let info = self.resolve_signature(sig)?;
        let recv = match recv {
            Some(recv) => Some(self.recv_param(recv)?),
            None => None,
        };
        debug!(func = %self.program.func(func).name, "lowering body");
        self.lower_body(func, 1, &info, recv, body, span)
    }

    fn recv_param(&mut self, recv: NodeId) -> Check<Param> {
        let span = self.ast.span(recv);
        let (names, ty) = match self.ast.kind(recv).clone() {
            NodeKind::Field { names, ty } => (names, ty),
            _ => (Vec::new(), recv),
        };
        Ok(Param {
            name: names.first().copied(),
            ty: self.resolve_type(ty)?,
            span,
        })
    }

    /// Lower a body into function `func` whose frame sits at depth `base`.
    fn lower_body(
        &mut self,
        func: FuncId,
        base: u32,
        info: &SigInfo,
        recv: Option<Param>,
        body: NodeId,
        span: Span,
    ) -> Check<()> {
        let name = self.program.func(func).name.clone();
        let mut state = FuncState::new(func, name, base);
        state.results = info.results.iter().map(|r| r.ty).collect();
        state.named_results = info.named_results();
        self.funcs.push(state);
        self.push_scope(ScopeKind::Function);

        for result in &info.results {
            let index = self.funcs.last_mut().map_or(0, FuncState::alloc);
            if let Some(name) = result.name {
                self.declare_slot(name, result.ty, index, result.span)?;
            }
        }
        let mut nparams = 0;
        for param in recv.iter().chain(&info.params) {
            let index = self.funcs.last_mut().map_or(0, FuncState::alloc);
            nparams += 1;
            if let Some(name) = param.name {
                self.declare_slot(name, param.ty, index, param.span)?;
            }
        }
        // Named results start at their zero value.
        for (i, result) in info.results.iter().enumerate() {
            if result.name.is_some() {
                let zero = self.zero_value(result.ty);
                let slot = u32::try_from(i).unwrap_or(u32::MAX);
                self.emit(
                    Op::Move {
                        dst: Loc::Local(slot),
                        src: Src::Const(zero),
                    },
                    span,
                );
            }
        }

        let stmts = match self.ast.kind(body) {
            NodeKind::Block(stmts) => stmts.clone(),
            _ => vec![body],
        };
        for &stmt in &stmts {
            self.lower_stmt(stmt)?;
        }
        if !info.results.is_empty() && !self.terminates_list(&stmts) {
            let end = self.ast.span(body);
            return fail(
                ErrorCode::E2013,
                Span::new(end.end.saturating_sub(1), end.end),
                "missing return",
            );
        }
        self.pop_scope();
        self.finish_func(nparams, span);
        Ok(())
    }

    fn declare_slot(&mut self, name: Name, ty: Idx, index: u32, span: Span) -> Check<()> {
        let depth = self.depth();
        self.declare(
            Symbol::new(name, SymbolKind::Var, ty, Storage::Local { depth, index }),
            span,
        )
    }

    /// Pop the innermost function state and write its prototype.
    fn finish_func(&mut self, nparams: u32, span: Span) {
        if self.state().is_some_and(|s| s.start.is_none()) {
            self.emit(Op::Nop, span);
        }
        let Some(state) = self.funcs.pop() else {
            return;
        };
        let result_zeros: Vec<Value> = state.results.iter().map(|&t| self.zero_value(t)).collect();
        let proto = self.program.func_mut(state.id);
        proto.start = state.start;
        proto.frame_size = state.root.size;
        proto.nparams = nparams;
        proto.nresults = u32::try_from(result_zeros.len()).unwrap_or(u32::MAX);
        proto.result_zeros = result_zeros;
    }

    /// Lower a function literal and create its closure.
    pub(crate) fn lower_func_lit(&mut self, sig: NodeId, body: NodeId, span: Span) -> Check<Operand> {
        let info = self.resolve_signature(sig)?;
        let name = match self.funcs.last_mut() {
            Some(state) => {
                state.literals += 1;
                format!("{}.func{}", state.name, state.literals)
            }
            None => "func".to_owned(),
        };
        let func = self.program.reserve_func(name, span);
        let base = self.depth() + 1;
        self.lower_body(func, base, &info, None, body, span)?;
        let dst = self.temp();
        self.emit(Op::Closure { dst, func }, span);
        Ok(Operand::value(info.ty, Src::Loc(dst)))
    }

    // === Package initialization ===

    /// Run `f` with a fresh initializer chunk for the variable spec `spec`
    /// as the function being lowered. A failed `f` keeps the chunk empty, so
    /// a blocked declaration can be retried.
    pub(crate) fn with_init<T>(
        &mut self,
        spec: NodeId,
        f: impl FnOnce(&mut Self) -> Check<T>,
    ) -> Check<T> {
        let state = match self.init.take() {
            Some(state) => state,
            None => {
                let func = self.program.reserve_func("init.vars", Span::DUMMY);
                FuncState::new(func, "init".to_owned(), 1)
            }
        };
        let saved = state.clone();
        let mark = self.mark();
        self.funcs.push(state);
        let result = f(self);
        match &result {
            Ok(_) => {
                self.funcs.truncate(mark.funcs + 1);
                if let Some(state) = self.funcs.pop() {
                    self.var_inits.push((spec, state));
                }
            }
            Err(_) => self.init = Some(saved),
        }
        self.reset_to(mark);
        result
    }

    /// Close the unit's variable initializers and register them, then the
    /// unit's `init` functions, with the program.
    pub(crate) fn finish_inits(&mut self) {
        for (_, state) in std::mem::take(&mut self.var_inits) {
            let func = state.id;
            self.funcs.push(state);
            self.finish_func(0, Span::DUMMY);
            self.program.push_init(func);
        }
        for func in std::mem::take(&mut self.init_funcs) {
            self.program.push_init(func);
        }
    }

    // === Incremental units ===

    /// Lower the top-level statements of an incremental unit into one
    /// function. Returns the function and whether it yields a value.
    #[instrument(level = "debug", skip_all)]
    pub(crate) fn lower_eval(
        &mut self,
        files: &[SourceFile],
        file_base: usize,
    ) -> (Option<FuncId>, bool) {
        let stmts: Vec<(usize, NodeId)> = files
            .iter()
            .enumerate()
            .flat_map(|(i, f)| f.stmts.iter().map(move |&s| (i, s)))
            .collect();
        let Some(&(_, first)) = stmts.first() else {
            return (None, false);
        };
        let span = self.ast.span(first);
        let func = self.program.reserve_func("eval", span);
        let mark = self.mark();
        self.funcs.push(FuncState::new(func, "eval".to_owned(), 1));
        // Slot 0 receives the value of a trailing expression.
        self.temp();

        let mut value_ty = None;
        let last = stmts.len() - 1;
        for (i, &(file, stmt)) in stmts.iter().enumerate() {
            self.file = file_base + file;
            let result = if i == last {
                self.lower_trailing(stmt)
            } else {
                self.lower_stmt(stmt).map(|()| None)
            };
            match result {
                Ok(ty) => value_ty = ty,
                Err(halt) => {
                    self.report(halt);
                    break;
                }
            }
        }
        self.reset_to(Mark {
            funcs: mark.funcs + 1,
            scopes: mark.scopes,
        });
        if let (Some(ty), Some(state)) = (value_ty, self.funcs.last_mut()) {
            state.results = vec![ty];
        }
        self.finish_func(0, span);
        (Some(func), value_ty.is_some())
    }

    /// The last statement of an incremental unit: an expression statement
    /// yields its value in slot 0.
    fn lower_trailing(&mut self, stmt: NodeId) -> Check<Option<Idx>> {
        let NodeKind::ExprStmt(expr) = *self.ast.kind(stmt) else {
            return self.lower_stmt(stmt).map(|()| None);
        };
        let span = self.ast.span(expr);
        let op = self.lower_operand(expr)?;
        if matches!(op.mode, Mode::Void | Mode::Tuple(_)) {
            return Ok(None);
        }
        let ty = self.pool.default_type(op.ty);
        let src = self.value_of(&op, span)?;
        self.emit(
            Op::Move {
                dst: Loc::Local(0),
                src,
            },
            span,
        );
        Ok(Some(ty))
    }

    // === Values of types ===

    /// Zero value of `ty`.
    pub(crate) fn zero_value(&self, ty: Idx) -> Value {
        match self.pool.underlying_data(ty) {
            TypeData::Basic(kind) => basic_zero(*kind),
            TypeData::Struct(fields) => {
                Value::strukt(fields.iter().map(|f| self.zero_value(f.ty)).collect())
            }
            TypeData::Array { len, elem } => {
                let zero = self.zero_value(*elem);
                Value::array(vec![zero; usize::try_from(*len).unwrap_or(0)])
            }
            _ => Value::Nil,
        }
    }

    /// Runtime value of constant `value` of type `ty` (untyped constants
    /// take their default type).
    pub(crate) fn const_to_value(&self, ty: Idx, value: &ConstValue) -> Value {
        let kind = self.pool.basic_kind(self.pool.default_type(ty));
        match (kind, value) {
            (Some(k), _) if k.is_float() => Value::Float(value.as_float().unwrap_or(0.0)),
            (Some(k), _) if k.is_unsigned() => Value::Uint(value.as_int().map_or(0, |v| v as u64)),
            (Some(k), _) if k.is_integer() => Value::Int(value.as_int().map_or(0, |v| v as i64)),
            (_, ConstValue::Bool(b)) => Value::Bool(*b),
            (_, ConstValue::Int(v)) => Value::Int(*v as i64),
            (_, ConstValue::Float(f)) => Value::Float(*f),
            (_, ConstValue::Str(s)) => Value::string(s.as_str()),
        }
    }

    /// Machine kind of a numeric type.
    pub(crate) fn num_kind(&self, ty: Idx) -> Option<NumKind> {
        Some(match self.pool.basic_kind(self.pool.default_type(ty))? {
            BasicKind::Int | BasicKind::Int64 => NumKind::I64,
            BasicKind::Int8 => NumKind::I8,
            BasicKind::Int16 => NumKind::I16,
            BasicKind::Int32 => NumKind::I32,
            BasicKind::Uint | BasicKind::Uint64 | BasicKind::Uintptr => NumKind::U64,
            BasicKind::Uint8 => NumKind::U8,
            BasicKind::Uint16 => NumKind::U16,
            BasicKind::Uint32 => NumKind::U32,
            BasicKind::Float32 => NumKind::F32,
            BasicKind::Float64 => NumKind::F64,
            _ => return None,
        })
    }

    /// Operand class of values of `ty`.
    pub(crate) fn op_kind(&self, ty: Idx) -> OpKind {
        if let Some(kind) = self.num_kind(ty) {
            return OpKind::Num(kind);
        }
        match self.pool.basic_kind(self.pool.default_type(ty)) {
            Some(k) if k.is_string() => OpKind::Str,
            Some(k) if k.is_boolean() => OpKind::Bool,
            _ => OpKind::Any,
        }
    }
}

fn basic_zero(kind: BasicKind) -> Value {
    if kind.is_boolean() {
        Value::Bool(false)
    } else if kind.is_string() {
        Value::string("")
    } else if kind.is_float() {
        Value::Float(0.0)
    } else if kind.is_unsigned() {
        Value::Uint(0)
    } else if kind.is_integer() {
        Value::Int(0)
    } else {
        Value::Nil
    }
}
