//! Field and method lookup through embedded fields.
//!
//! Lookup is breadth-first over embedding depth: the shallowest match wins,
//! and two matches at the same depth are ambiguous. Named types already seen
//! at a shallower depth are not revisited, which keeps recursive embedding
//! through pointers finite.

#[cfg(test)]
mod tests;

use rustc_hash::FxHashSet;
use terp_ir::Name;

use crate::{Idx, MethodSig, Pool, TypeData};

/// One implicit step through an embedded (or the selected) field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldStep {
    /// Field index within the struct.
    pub index: u32,
    /// The struct holding the field is reached through a pointer and must be
    /// dereferenced first.
    pub ptr: bool,
}

/// Result of a successful selector lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// A struct field. `path` ends with the selected field itself.
    Field { path: Vec<FieldStep>, ty: Idx },
    /// A declared method. `path` leads to the receiver value.
    Method {
        path: Vec<FieldStep>,
        /// Named type declaring the method.
        recv: Idx,
        method: MethodSig,
        /// The receiver value reached through `path` is a pointer.
        recv_ptr: bool,
    },
    /// A method of an interface value reached through `path`.
    IfaceMethod {
        path: Vec<FieldStep>,
        iface: Idx,
        sig: Idx,
    },
}

impl Selection {
    pub fn path(&self) -> &[FieldStep] {
        match self {
            Selection::Field { path, .. }
            | Selection::Method { path, .. }
            | Selection::IfaceMethod { path, .. } => path,
        }
    }

    /// Whether this is a method (declared or interface) rather than a field.
    pub fn is_method(&self) -> bool {
        !matches!(self, Selection::Field { .. })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    /// Several fields or methods with this name at the same depth.
    Ambiguous,
}

struct Candidate {
    ty: Idx,
    ptr: bool,
    path: Vec<FieldStep>,
}

impl Pool {
    /// Look up field or method `name` on values of type `ty`.
    ///
    /// A pointer type is looked through once: `(*T).f` and `(*T).M` resolve
    /// like `T.f` and `T.M` with `ptr` set on the first step.
    pub fn lookup(&self, ty: Idx, name: Name) -> Result<Selection, LookupError> {
        let (base, ptr) = self.lookup_base(ty);
        let mut level = vec![Candidate {
            ty: base,
            ptr,
            path: Vec::new(),
        }];
        let mut seen = FxHashSet::default();

        while !level.is_empty() {
            let mut found: Option<Selection> = None;
            let mut count = 0usize;
            let mut next = Vec::new();

            for cand in level {
                if self.named_info(cand.ty).is_some() && !seen.insert(cand.ty) {
                    continue;
                }
                if let Some((_, m)) = self.named_info(cand.ty).and_then(|info| info.method(name)) {
                    count += 1;
                    found = Some(Selection::Method {
                        path: cand.path.clone(),
                        recv: cand.ty,
                        method: m.clone(),
                        recv_ptr: cand.ptr,
                    });
                    continue;
                }
                match self.underlying_data(cand.ty) {
                    TypeData::Struct(fields) => {
                        for (i, f) in fields.iter().enumerate() {
                            let step = FieldStep {
                                index: u32::try_from(i).unwrap_or(u32::MAX),
                                ptr: cand.ptr,
                            };
                            let mut path = cand.path.clone();
                            path.push(step);
                            if f.name == name {
                                count += 1;
                                found = Some(Selection::Field {
                                    path: path.clone(),
                                    ty: f.ty,
                                });
                            }
                            if f.embedded {
                                let (ty, ptr) = match self.pointer_elem(f.ty) {
                                    Some(elem) => (elem, true),
                                    None => (f.ty, false),
                                };
                                next.push(Candidate { ty, ptr, path });
                            }
                        }
                    }
                    TypeData::Interface(data) if !self.is_type_param(cand.ty) => {
                        if let Some(m) = data.method(name) {
                            count += 1;
                            found = Some(Selection::IfaceMethod {
                                path: cand.path.clone(),
                                iface: cand.ty,
                                sig: m.sig,
                            });
                        }
                    }
                    _ => {}
                }
            }

            match (count, found) {
                (1, Some(sel)) => return Ok(sel),
                (0, _) => level = next,
                _ => return Err(LookupError::Ambiguous),
            }
        }
        Err(LookupError::NotFound)
    }

    fn lookup_base(&self, ty: Idx) -> (Idx, bool) {
        if let TypeData::Pointer(elem) = self.data(ty) {
            if self.pointer_elem(*elem).is_none() {
                return (*elem, true);
            }
        }
        (ty, false)
    }

    /// The method set of `ty`: every method callable through an interface
    /// holding a `ty`, with the selection reaching it.
    ///
    /// Pointer-receiver methods belong to the set only when the receiver is
    /// reached through a pointer.
    pub fn method_set(&self, ty: Idx) -> Vec<(Name, Selection)> {
        let mut names: Vec<Name> = Vec::new();
        let mut seen = FxHashSet::default();
        let (base, _) = self.lookup_base(ty);
        let mut stack = vec![base];
        while let Some(t) = stack.pop() {
            if self.named_info(t).is_some() && !seen.insert(t) {
                continue;
            }
            if let Some(info) = self.named_info(t) {
                names.extend(info.methods.iter().map(|m| m.name));
            }
            match self.underlying_data(t) {
                TypeData::Struct(fields) => {
                    for f in fields.iter().filter(|f| f.embedded) {
                        stack.push(self.pointer_elem(f.ty).unwrap_or(f.ty));
                    }
                }
                TypeData::Interface(data) if !self.is_type_param(t) => {
                    names.extend(data.methods.iter().map(|m| m.name));
                }
                _ => {}
            }
        }
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                let sel = self.lookup(ty, name).ok()?;
                match &sel {
                    Selection::Method {
                        method, recv_ptr, ..
                    } if method.ptr_recv && !recv_ptr => None,
                    Selection::Field { .. } => None,
                    _ => Some((name, sel)),
                }
            })
            .collect()
    }
}
