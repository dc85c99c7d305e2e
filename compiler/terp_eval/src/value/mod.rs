//! Runtime values.
//!
//! Values follow the modeled language's copy semantics: structs and arrays are
//! values (shared `Arc` storage, copied on write through [`Arc::make_mut`]),
//! while slices, maps, channels and pointers are references to shared state.
//! Every heap reference is an `Arc` so values can cross goroutine threads.
//!
//! `Value::Nil` is the zero value of every reference type; operations treat a
//! nil slice as empty and a nil map as an empty read-only map.

mod format;
mod pointer;

#[cfg(test)]
mod tests;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use terp_types::Idx;

use crate::program::FuncId;
use crate::runtime::Channel;
use crate::HostFunc;

pub use format::{format_float, format_value};
pub(crate) use format::order;
pub use pointer::{PtrBase, Pointer};

/// Shared map storage.
pub type MapRef = Arc<Mutex<FxHashMap<Value, Value>>>;

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// All signed integer kinds, already wrapped to their width.
    Int(i64),
    /// All unsigned integer kinds, already wrapped to their width.
    Uint(u64),
    /// `float32` values are stored rounded to single precision.
    Float(f64),
    Str(Arc<str>),
    Struct(Arc<Vec<Value>>),
    Array(Arc<Vec<Value>>),
    Slice(SliceValue),
    Map(MapRef),
    Chan(Arc<Channel>),
    Pointer(Pointer),
    /// Non-nil interface value: dynamic type plus concrete value.
    Iface(Arc<IfaceValue>),
    Func(FuncValue),
    /// Range iterator state held in a frame slot during a `for range` loop.
    Iter(Arc<Mutex<RangeIter>>),
}

/// A window onto a shared backing array.
#[derive(Clone)]
pub struct SliceValue {
    pub data: Arc<Mutex<Vec<Value>>>,
    pub off: usize,
    pub len: usize,
    pub cap: usize,
}

impl SliceValue {
    pub fn from_vec(items: Vec<Value>) -> Self {
        let len = items.len();
        SliceValue {
            data: Arc::new(Mutex::new(items)),
            off: 0,
            len,
            cap: len,
        }
    }

    /// Snapshot of the visible elements.
    pub fn to_vec(&self) -> Vec<Value> {
        let data = self.data.lock();
        data[self.off..self.off + self.len].to_vec()
    }

    pub fn get(&self, i: usize) -> Option<Value> {
        if i >= self.len {
            return None;
        }
        self.data.lock().get(self.off + i).cloned()
    }

    pub fn set(&self, i: usize, value: Value) -> bool {
        if i >= self.len {
            return false;
        }
        let mut data = self.data.lock();
        match data.get_mut(self.off + i) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Dynamic type and value of a non-nil interface.
pub struct IfaceValue {
    pub ty: Idx,
    pub value: Value,
}

/// A callable value.
#[derive(Clone)]
pub enum FuncValue {
    /// Compiled function; `env` is the frame a function literal closed over.
    Closure {
        func: FuncId,
        env: Option<Arc<crate::Frame>>,
    },
    /// Method value: the receiver is passed as the first argument.
    Bound { func: FuncId, recv: Box<Value> },
    /// Host function from a symbol provider.
    Host(Arc<HostFunc>),
}

/// State of a `for range` loop.
pub enum RangeIter {
    Seq { items: SeqSource, pos: usize },
    Str { text: Arc<str>, pos: usize },
    Map { map: MapRef, keys: Vec<Value>, pos: usize },
    /// `None` for a nil channel, which blocks forever.
    Chan(Option<Arc<Channel>>),
    Int { end: i64, next: i64, unsigned: bool },
}

/// Element source of an array or slice range.
pub enum SeqSource {
    Array(Arc<Vec<Value>>),
    Slice(SliceValue),
}

impl SeqSource {
    pub fn len(&self) -> usize {
        match self {
            SeqSource::Array(items) => items.len(),
            SeqSource::Slice(s) => s.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<Value> {
        match self {
            SeqSource::Array(items) => items.get(i).cloned(),
            SeqSource::Slice(s) => s.get(i),
        }
    }
}

// Factory methods

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn slice(items: Vec<Value>) -> Self {
        Value::Slice(SliceValue::from_vec(items))
    }

    pub fn map(entries: FxHashMap<Value, Value>) -> Self {
        Value::Map(Arc::new(Mutex::new(entries)))
    }

    pub fn strukt(fields: Vec<Value>) -> Self {
        Value::Struct(Arc::new(fields))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    pub fn iface(ty: Idx, value: Value) -> Self {
        Value::Iface(Arc::new(IfaceValue { ty, value }))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value of either signedness.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Number of elements for `len`.
    pub fn len(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::Array(items) => items.len(),
            Value::Slice(s) => s.len,
            Value::Map(m) => m.lock().len(),
            Value::Chan(ch) => ch.len(),
            Value::Pointer(p) => match p.load() {
                Value::Array(items) => items.len(),
                _ => 0,
            },
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity for `cap`.
    pub fn cap(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::Slice(s) => s.cap,
            Value::Chan(ch) => ch.cap(),
            Value::Pointer(_) => self.len(),
            _ => 0,
        }
    }

    /// Strip one interface layer.
    pub fn concrete(&self) -> &Value {
        match self {
            Value::Iface(i) => &i.value,
            v => v,
        }
    }

    /// Dynamic type of an interface value.
    pub fn dynamic_type(&self) -> Option<Idx> {
        match self {
            Value::Iface(i) => Some(i.ty),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Iface(i) => write!(f, "iface({:?}, {:?})", i.ty, i.value),
            Value::Func(_) => write!(f, "func"),
            Value::Iter(_) => write!(f, "iter"),
            other => write!(f, "{}", format_value(other)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) | (Value::Array(a), Value::Array(b)) => {
                Arc::ptr_eq(a, b) || a == b
            }
            (Value::Chan(a), Value::Chan(b)) => Arc::ptr_eq(a, b),
            (Value::Pointer(a), Value::Pointer(b)) => a.same_target(b),
            (Value::Iface(a), Value::Iface(b)) => a.ty == b.ty && a.value == b.value,
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Slice(a), Value::Slice(b)) => {
                Arc::ptr_eq(&a.data, &b.data) && a.off == b.off && a.len == b.len
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Uint(v) => v.hash(state),
            // 0.0 and -0.0 compare equal and must hash alike.
            Value::Float(v) => {
                let v = if *v == 0.0 { 0.0 } else { *v };
                v.to_bits().hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Struct(items) | Value::Array(items) => {
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Value::Chan(ch) => (Arc::as_ptr(ch) as usize).hash(state),
            Value::Pointer(p) => p.hash_target(state),
            Value::Iface(i) => {
                i.ty.hash(state);
                i.value.hash(state);
            }
            Value::Map(m) => (Arc::as_ptr(m) as usize).hash(state),
            Value::Slice(s) => (Arc::as_ptr(&s.data) as usize).hash(state),
            Value::Func(_) | Value::Iter(_) => {}
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}
