//! Activation frames.
//!
//! A frame is a fixed-size vector of value slots plus a link to the lexically
//! enclosing frame. Frames are `Arc`-shared: closures, pointers to locals and
//! goroutines keep them alive. The slot lock is held only for single reads and
//! writes, never across a call or a blocking channel operation.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::Value;

pub struct Frame {
    slots: Mutex<Vec<Value>>,
    parent: Option<Arc<Frame>>,
}

impl Frame {
    /// A frame of `size` nil slots.
    pub fn new(size: usize, parent: Option<Arc<Frame>>) -> Arc<Frame> {
        Arc::new(Frame {
            slots: Mutex::new(vec![Value::Nil; size]),
            parent,
        })
    }

    /// A frame starting with `slots`, padded with nil up to `size`.
    pub fn with_slots(mut slots: Vec<Value>, size: usize, parent: Option<Arc<Frame>>) -> Arc<Frame> {
        if slots.len() < size {
            slots.resize(size, Value::Nil);
        }
        Arc::new(Frame {
            slots: Mutex::new(slots),
            parent,
        })
    }

    pub fn parent(&self) -> Option<&Arc<Frame>> {
        self.parent.as_ref()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: u32) -> Value {
        self.slots
            .lock()
            .get(idx as usize)
            .cloned()
            .unwrap_or(Value::Nil)
    }

    pub fn set(&self, idx: u32, value: Value) {
        let mut slots = self.slots.lock();
        let i = idx as usize;
        if i >= slots.len() {
            slots.resize(i + 1, Value::Nil);
        }
        slots[i] = value;
    }

    /// Mutate one slot in place.
    pub fn with_slot<R>(&self, idx: u32, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut slots = self.slots.lock();
        let i = idx as usize;
        if i >= slots.len() {
            slots.resize(i + 1, Value::Nil);
        }
        f(&mut slots[i])
    }

    /// Grow to hold `zeros.len()` slots, initializing only the new ones.
    pub fn extend_to(&self, zeros: &[Value]) {
        let mut slots = self.slots.lock();
        let start = slots.len();
        if zeros.len() > start {
            slots.extend_from_slice(&zeros[start..]);
        }
    }

    /// Copy of the first `n` slots.
    pub fn prefix(&self, n: usize) -> Vec<Value> {
        let slots = self.slots.lock();
        slots.iter().take(n).cloned().collect()
    }

    /// Walk `level` ancestor links.
    pub fn ancestor(self: &Arc<Frame>, level: u32) -> Option<&Arc<Frame>> {
        let mut cur = self;
        for _ in 0..level {
            cur = cur.parent.as_ref()?;
        }
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::Frame;
    use crate::Value;

    #[test]
    fn slots_start_nil_and_grow_on_write() {
        let frame = Frame::new(2, None);
        assert!(frame.get(1).is_nil());
        frame.set(4, Value::Int(9));
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.get(4), Value::Int(9));
    }

    #[test]
    fn ancestor_walks_parent_links() {
        let root = Frame::new(1, None);
        root.set(0, Value::from("root"));
        let mid = Frame::new(1, Some(Arc::clone(&root)));
        let leaf = Frame::new(1, Some(mid));
        assert_eq!(leaf.ancestor(2).map(|f| f.get(0)), Some(Value::from("root")));
        assert!(leaf.ancestor(3).is_none());
    }

    #[test]
    fn extend_keeps_existing_slots() {
        let globals = Frame::new(0, None);
        globals.extend_to(&[Value::Int(0)]);
        globals.set(0, Value::Int(5));
        globals.extend_to(&[Value::Int(0), Value::from("")]);
        assert_eq!(globals.prefix(2), vec![Value::Int(5), Value::from("")]);
    }
}
