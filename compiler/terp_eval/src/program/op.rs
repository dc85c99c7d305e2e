//! The closed operation set executed by CFG nodes.
//!
//! Every operand is pre-resolved by the compiler: reads are [`Src`] (a frame
//! location or an inline constant), writes are [`Loc`]. The executor never
//! sees names except for interface dispatch.

use smallvec::SmallVec;
use terp_ir::{BinaryOp, Name, UnaryOp};
use terp_types::Idx;

use super::FuncId;
use crate::Value;

/// A frame slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Loc {
    /// Slot of the current frame.
    Local(u32),
    /// Slot of the frame `level` ancestor links up.
    Up { level: u32, index: u32 },
    /// Slot of the root frame holding package variables.
    Global(u32),
}

/// An operand.
#[derive(Clone, Debug)]
pub enum Src {
    Loc(Loc),
    Const(Value),
}

impl From<Loc> for Src {
    fn from(loc: Loc) -> Self {
        Src::Loc(loc)
    }
}

impl From<Value> for Src {
    fn from(value: Value) -> Self {
        Src::Const(value)
    }
}

/// Machine kind of a numeric operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NumKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NumKind {
    pub fn is_float(self) -> bool {
        matches!(self, NumKind::F32 | NumKind::F64)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, NumKind::U8 | NumKind::U16 | NumKind::U32 | NumKind::U64)
    }

    pub fn bits(self) -> u32 {
        match self {
            NumKind::I8 | NumKind::U8 => 8,
            NumKind::I16 | NumKind::U16 => 16,
            NumKind::I32 | NumKind::U32 | NumKind::F32 => 32,
            NumKind::I64 | NumKind::U64 | NumKind::F64 => 64,
        }
    }

    /// Wrap a signed result to this kind's width.
    pub fn wrap_signed(self, v: i64) -> i64 {
        match self {
            NumKind::I8 => i64::from(v as i8),
            NumKind::I16 => i64::from(v as i16),
            NumKind::I32 => i64::from(v as i32),
            _ => v,
        }
    }

    /// Wrap an unsigned result to this kind's width.
    pub fn wrap_unsigned(self, v: u64) -> u64 {
        match self {
            NumKind::U8 => u64::from(v as u8),
            NumKind::U16 => u64::from(v as u16),
            NumKind::U32 => u64::from(v as u32),
            _ => v,
        }
    }

    /// Zero value of this kind.
    pub fn zero(self) -> Value {
        if self.is_float() {
            Value::Float(0.0)
        } else if self.is_unsigned() {
            Value::Uint(0)
        } else {
            Value::Int(0)
        }
    }
}

/// Operand class of a binary or unary operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpKind {
    Num(NumKind),
    Str,
    Bool,
    /// `==`/`!=` on any comparable values (structs, pointers, interfaces...).
    Any,
}

/// Value conversions that change representation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conversion {
    Num { from: NumKind, to: NumKind },
    IntToString,
    BytesToString,
    RunesToString,
    StringToBytes,
    StringToRunes,
}

/// Root of an addressable location.
#[derive(Clone, Debug)]
pub enum PlaceBase {
    Loc(Loc),
    /// `*p`; nil dereference panics.
    Deref(Src),
    /// `s[i]` with bounds check.
    SliceElem { slice: Src, index: Src },
}

/// Step inside a struct or array value.
#[derive(Clone, Debug)]
pub enum Step {
    Field(u32),
    /// Array element with bounds check against `len`.
    Index { index: Src, len: u64 },
}

/// An addressable location: a base plus field/element steps.
#[derive(Clone, Debug)]
pub struct Place {
    pub base: PlaceBase,
    pub steps: SmallVec<[Step; 2]>,
}

impl Place {
    pub fn loc(loc: Loc) -> Self {
        Place {
            base: PlaceBase::Loc(loc),
            steps: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// What a call invokes.
#[derive(Clone, Debug)]
pub enum Callee {
    /// Statically known function or method (receiver passed as first arg).
    Static(FuncId),
    /// A function value; calling nil panics.
    Value(Src),
    /// Interface method dispatched on the receiver's dynamic type.
    Iface { recv: Src, name: Name },
}

/// Built-in functions with runtime behavior.
#[derive(Clone, Debug)]
pub enum Builtin {
    Len,
    Cap,
    /// `append(s, a, b...)`
    Append,
    /// `append(s, t...)` with a slice or string `t`.
    AppendSpread,
    Copy,
    Delete,
    Panic,
    Recover,
    Print,
    Println,
    Close,
    Min,
    Max,
    Clear { zero: Value },
    MakeSlice { zero: Value },
    MakeMap,
    MakeChan,
}

/// Target of a type assertion.
#[derive(Clone, Debug)]
pub enum AssertTarget {
    /// Dynamic type must be exactly this type.
    Concrete(Idx),
    /// Dynamic type must have all these methods; the result stays an
    /// interface value.
    Iface { ty: Idx, methods: Vec<Name> },
}

/// One `select` case.
#[derive(Clone, Debug)]
pub enum SelectCase {
    Send {
        chan: Src,
        value: Src,
    },
    Recv {
        chan: Src,
        dst: Option<Loc>,
        ok: Option<Loc>,
        zero: Value,
    },
}

/// What a `for range` iterates over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RangeKind {
    /// Array, pointer to array, or slice.
    Seq,
    Str,
    Map,
    Chan,
    Int,
}

/// Operation of one CFG node.
#[derive(Clone, Debug)]
pub enum Op {
    /// Jump target or join point.
    Nop,
    Move {
        dst: Loc,
        src: Src,
    },
    Binary {
        dst: Loc,
        op: BinaryOp,
        kind: OpKind,
        lhs: Src,
        rhs: Src,
    },
    Unary {
        dst: Loc,
        op: UnaryOp,
        kind: OpKind,
        src: Src,
    },
    Convert {
        dst: Loc,
        src: Src,
        conv: Conversion,
    },
    /// Wrap a concrete value into an interface with dynamic type `ty`.
    MakeIface {
        dst: Loc,
        src: Src,
        ty: Idx,
    },
    /// Continue at `next` if `cond` is true, else at `alt`.
    Branch {
        cond: Src,
    },
    Load {
        dst: Loc,
        place: Place,
    },
    Store {
        place: Place,
        src: Src,
    },
    Addr {
        dst: Loc,
        place: Place,
    },
    /// Pointer to a fresh heap cell initialized with `src`.
    Box {
        dst: Loc,
        src: Src,
    },
    MapIndex {
        dst: Loc,
        ok: Option<Loc>,
        map: Src,
        key: Src,
        zero: Value,
    },
    MapStore {
        map: Src,
        key: Src,
        src: Src,
    },
    /// Byte of a string.
    StrIndex {
        dst: Loc,
        text: Src,
        index: Src,
    },
    SliceExpr {
        dst: Loc,
        src: Src,
        low: Option<Src>,
        high: Option<Src>,
        max: Option<Src>,
    },
    MakeStruct {
        dst: Loc,
        fields: Vec<Src>,
    },
    MakeArray {
        dst: Loc,
        elems: Vec<Src>,
    },
    MakeSlice {
        dst: Loc,
        elems: Vec<Src>,
    },
    MakeMap {
        dst: Loc,
        entries: Vec<(Src, Src)>,
    },
    /// Function literal closing over the current frame.
    Closure {
        dst: Loc,
        func: FuncId,
    },
    /// Method value with a statically known method.
    MethodValue {
        dst: Loc,
        recv: Src,
        func: FuncId,
    },
    /// Method value taken from an interface.
    IfaceMethodValue {
        dst: Loc,
        recv: Src,
        name: Name,
    },
    /// Call; results are copied to `rets` (which may be shorter than the
    /// result count).
    Call {
        callee: Callee,
        args: SmallVec<[Src; 4]>,
        rets: SmallVec<[Loc; 2]>,
    },
    Go {
        callee: Callee,
        args: SmallVec<[Src; 4]>,
    },
    Defer {
        callee: Callee,
        args: SmallVec<[Src; 4]>,
    },
    /// Deferred or goroutine call of a builtin (`defer close(ch)`).
    DeferBuiltin {
        func: Builtin,
        args: SmallVec<[Src; 4]>,
        go: bool,
    },
    Builtin {
        func: Builtin,
        args: SmallVec<[Src; 4]>,
        dst: Option<Loc>,
    },
    /// End the current function; results are already in slots `0..n`.
    Return,
    TypeAssert {
        dst: Option<Loc>,
        ok: Option<Loc>,
        src: Src,
        target: AssertTarget,
        zero: Value,
    },
    Send {
        chan: Src,
        value: Src,
    },
    Recv {
        chan: Src,
        dst: Option<Loc>,
        ok: Option<Loc>,
        zero: Value,
    },
    /// Writes the chosen case index (or -1 for `default`) to `chosen`.
    Select {
        cases: Vec<SelectCase>,
        has_default: bool,
        chosen: Loc,
    },
    RangeStart {
        dst: Loc,
        src: Src,
        kind: RangeKind,
    },
    /// Produce the next key/value at `next`; continue at `alt` when done.
    RangeNext {
        iter: Src,
        key: Option<Loc>,
        value: Option<Loc>,
    },
    /// Push a loop-iteration frame.
    EnterFrame {
        size: u32,
    },
    /// Replace the iteration frame with a fresh one, copying `carry` slots.
    NextFrame {
        size: u32,
        carry: SmallVec<[u32; 4]>,
    },
    /// Pop `levels` iteration frames.
    LeaveFrame {
        levels: u32,
    },
}
