//! String interner for identifiers.
//!
//! Compilation and execution both need names: the compiler for scopes and
//! selectors, the runtime for method dispatch keys. The interner is shared
//! between them through [`SharedInterner`].

use super::Name;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Error when interning a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternError {
    /// More strings than fit in a 32-bit index.
    Overflow { count: usize },
}

impl fmt::Display for InternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InternError::Overflow { count } => write!(
                f,
                "interner exceeded capacity: {count} strings, max is {}",
                u32::MAX
            ),
        }
    }
}

impl std::error::Error for InternError {}

#[derive(Default)]
struct Table {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// Thread-safe string interner.
///
/// Strings are leaked so lookups can hand out `&'static str`; an interner
/// lives as long as the interpreter that owns it.
pub struct StringInterner {
    table: RwLock<Table>,
}

impl StringInterner {
    /// Create an interner with the empty string at [`Name::EMPTY`].
    pub fn new() -> Self {
        let mut table = Table::default();
        table.map.insert("", 0);
        table.strings.push("");
        StringInterner {
            table: RwLock::new(table),
        }
    }

    /// Try to intern a string.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        if let Some(&idx) = self.table.read().map.get(s) {
            return Ok(Name::from_raw(idx));
        }

        let mut table = self.table.write();
        // Another writer may have won the race.
        if let Some(&idx) = table.map.get(s) {
            return Ok(Name::from_raw(idx));
        }
        let idx = u32::try_from(table.strings.len()).map_err(|_| InternError::Overflow {
            count: table.strings.len(),
        })?;
        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        table.strings.push(leaked);
        table.map.insert(leaked, idx);
        Ok(Name::from_raw(idx))
    }

    /// Intern a string, returning its Name.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` strings are interned.
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Look up the string for a Name.
    ///
    /// Unknown names resolve to the empty string.
    pub fn lookup(&self, name: Name) -> &'static str {
        self.table
            .read()
            .strings
            .get(name.index())
            .copied()
            .unwrap_or("")
    }

    /// Number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.table.read().strings.len()
    }

    /// Always false: the empty string is pre-interned.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that can turn a [`Name`] back into text.
pub trait StringLookup {
    fn lookup(&self, name: Name) -> &str;
}

impl StringLookup for StringInterner {
    fn lookup(&self, name: Name) -> &str {
        StringInterner::lookup(self, name)
    }
}

/// Interner shared between the compile context, the runtime and hosts.
#[derive(Clone, Default)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl StringLookup for SharedInterner {
    fn lookup(&self, name: Name) -> &str {
        self.0.lookup(name)
    }
}

impl fmt::Debug for SharedInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedInterner({} strings)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_intern_is_idempotent() {
        let interner = StringInterner::new();
        let a = interner.intern("main");
        let b = interner.intern("main");
        assert_eq!(a, b);
        assert_eq!(interner.lookup(a), "main");
    }

    #[test]
    fn test_distinct_strings_get_distinct_names() {
        let interner = StringInterner::new();
        let a = interner.intern("x");
        let b = interner.intern("y");
        assert_ne!(a, b);
        assert_eq!(interner.len(), 3);
    }

    #[test]
    fn test_empty_string_is_preinterned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
    }

    #[test]
    fn test_shared_interner_is_shared() {
        let shared = SharedInterner::new();
        let clone = shared.clone();
        let name = shared.intern("chan");
        assert_eq!(clone.lookup(name), "chan");
    }

    #[test]
    fn test_concurrent_interning() {
        let shared = SharedInterner::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let interner = shared.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|i| interner.intern(&format!("v{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<Name>> = handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
    }
}
