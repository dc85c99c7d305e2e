//! Pointers into frames, heap cells and slice backing arrays.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::Value;
use crate::Frame;

/// Storage a pointer refers to.
#[derive(Clone)]
pub enum PtrBase {
    /// A variable slot; the frame stays alive as long as the pointer does.
    Slot(Arc<Frame>, u32),
    /// Heap cell from `new(T)` or `&T{...}`.
    Cell(Arc<Mutex<Value>>),
    /// Element of a slice backing array.
    Elem(Arc<Mutex<Vec<Value>>>, usize),
}

/// A pointer: a base location plus a path of struct field / array element
/// indices inside the value stored there.
#[derive(Clone)]
pub struct Pointer {
    base: PtrBase,
    path: SmallVec<[u32; 2]>,
}

impl Pointer {
    pub fn new(base: PtrBase) -> Self {
        Pointer {
            base,
            path: SmallVec::new(),
        }
    }

    /// Pointer to a fresh heap cell holding `value`.
    pub fn cell(value: Value) -> Self {
        Pointer::new(PtrBase::Cell(Arc::new(Mutex::new(value))))
    }

    /// Pointer to a field or element of the pointee.
    #[must_use]
    pub fn child(&self, index: u32) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        Pointer {
            base: self.base.clone(),
            path,
        }
    }

    /// Read the pointee.
    pub fn load(&self) -> Value {
        let root = match &self.base {
            PtrBase::Slot(frame, idx) => frame.get(*idx),
            PtrBase::Cell(cell) => cell.lock().clone(),
            PtrBase::Elem(data, idx) => data.lock().get(*idx).cloned().unwrap_or(Value::Nil),
        };
        descend(&root, &self.path).unwrap_or(Value::Nil)
    }

    /// Overwrite the pointee.
    pub fn store(&self, value: Value) {
        self.update(|slot| *slot = value);
    }

    /// Mutate the pointee in place.
    pub fn update(&self, f: impl FnOnce(&mut Value)) {
        match &self.base {
            PtrBase::Slot(frame, idx) => frame.with_slot(*idx, |root| {
                if let Some(target) = descend_mut(root, &self.path) {
                    f(target);
                }
            }),
            PtrBase::Cell(cell) => {
                let mut root = cell.lock();
                if let Some(target) = descend_mut(&mut root, &self.path) {
                    f(target);
                }
            }
            PtrBase::Elem(data, idx) => {
                let mut data = data.lock();
                if let Some(target) = data
                    .get_mut(*idx)
                    .and_then(|root| descend_mut(root, &self.path))
                {
                    f(target);
                }
            }
        }
    }

    fn base_addr(&self) -> (usize, usize) {
        match &self.base {
            PtrBase::Slot(frame, idx) => (Arc::as_ptr(frame) as usize, *idx as usize),
            PtrBase::Cell(cell) => (Arc::as_ptr(cell) as usize, 0),
            PtrBase::Elem(data, idx) => (Arc::as_ptr(data) as usize, *idx),
        }
    }

    /// Address-like identity used for printing.
    pub fn addr(&self) -> usize {
        let (base, idx) = self.base_addr();
        self.path
            .iter()
            .fold(base.wrapping_add(idx * 8), |acc, &i| acc.wrapping_add(i as usize * 8 + 1))
    }

    /// Pointer equality: same storage and same path.
    pub fn same_target(&self, other: &Pointer) -> bool {
        self.base_addr() == other.base_addr() && self.path == other.path
    }

    pub(crate) fn hash_target<H: Hasher>(&self, state: &mut H) {
        self.base_addr().hash(state);
        self.path.hash(state);
    }
}

/// Follow field/element indices through struct and array values.
pub(crate) fn descend(root: &Value, path: &[u32]) -> Option<Value> {
    let mut cur = root;
    for &i in path {
        cur = match cur {
            Value::Struct(items) | Value::Array(items) => items.get(i as usize)?,
            _ => return None,
        };
    }
    Some(cur.clone())
}

/// Mutable variant of [`descend`]; shared struct/array storage is cloned on
/// the way down so other copies are unaffected.
pub(crate) fn descend_mut<'a>(root: &'a mut Value, path: &[u32]) -> Option<&'a mut Value> {
    let mut cur = root;
    for &i in path {
        cur = match cur {
            Value::Struct(items) | Value::Array(items) => Arc::make_mut(items).get_mut(i as usize)?,
            _ => return None,
        };
    }
    Some(cur)
}
