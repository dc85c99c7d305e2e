//! Human-readable type names for diagnostics and runtime messages.

use std::fmt::Write;

use terp_ir::ChanDir;

use super::Pool;
use crate::{Idx, TypeData};

impl Pool {
    /// Render a type in source syntax.
    pub fn display(&self, idx: Idx) -> String {
        let mut out = String::new();
        self.write_type(&mut out, idx);
        out
    }

    fn write_list(&self, out: &mut String, items: &[Idx]) {
        for (i, &item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_type(out, item);
        }
    }

    fn write_signature(&self, out: &mut String, idx: Idx) {
        let Some(sig) = self.signature(idx) else {
            return;
        };
        out.push('(');
        for (i, &p) in sig.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if sig.variadic && i + 1 == sig.params.len() {
                out.push_str("...");
                self.write_type(out, self.elem(p).unwrap_or(p));
            } else {
                self.write_type(out, p);
            }
        }
        out.push(')');
        match sig.results.len() {
            0 => {}
            1 => {
                out.push(' ');
                self.write_type(out, sig.results[0]);
            }
            _ => {
                out.push_str(" (");
                self.write_list(out, &sig.results);
                out.push(')');
            }
        }
    }

    fn write_type(&self, out: &mut String, idx: Idx) {
        let interner = self.interner();
        match self.data(idx) {
            TypeData::Basic(kind) => out.push_str(kind.name()),
            TypeData::Pointer(e) => {
                out.push('*');
                self.write_type(out, *e);
            }
            TypeData::Array { len, elem } => {
                let _ = write!(out, "[{len}]");
                self.write_type(out, *elem);
            }
            TypeData::Slice(e) => {
                out.push_str("[]");
                self.write_type(out, *e);
            }
            TypeData::Map { key, value } => {
                out.push_str("map[");
                self.write_type(out, *key);
                out.push(']');
                self.write_type(out, *value);
            }
            TypeData::Chan { dir, elem } => {
                out.push_str(match dir {
                    ChanDir::Both => "chan ",
                    ChanDir::Send => "chan<- ",
                    ChanDir::Recv => "<-chan ",
                });
                self.write_type(out, *elem);
            }
            TypeData::Struct(fields) => {
                out.push_str("struct{");
                for (i, f) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    if !f.embedded {
                        out.push_str(interner.lookup(f.name));
                        out.push(' ');
                    }
                    self.write_type(out, f.ty);
                }
                out.push('}');
            }
            TypeData::Interface(data) => {
                if idx == Idx::EMPTY_INTERFACE {
                    out.push_str("interface {}");
                    return;
                }
                out.push_str("interface{");
                let mut first = true;
                let mut sep = |out: &mut String| {
                    if !first {
                        out.push_str("; ");
                    }
                    first = false;
                };
                if data.comparable {
                    sep(out);
                    out.push_str("comparable");
                }
                for m in &data.methods {
                    sep(out);
                    out.push_str(interner.lookup(m.name));
                    self.write_signature(out, m.sig);
                }
                if let Some(terms) = &data.terms {
                    sep(out);
                    for (i, t) in terms.iter().enumerate() {
                        if i > 0 {
                            out.push_str(" | ");
                        }
                        if t.tilde {
                            out.push('~');
                        }
                        self.write_type(out, t.ty);
                    }
                }
                out.push('}');
            }
            TypeData::Func(_) => {
                out.push_str("func");
                self.write_signature(out, idx);
            }
            TypeData::Tuple(elems) => {
                out.push('(');
                self.write_list(out, elems);
                out.push(')');
            }
            TypeData::Named(_) => {
                let Some(info) = self.named_info(idx) else {
                    return;
                };
                out.push_str(interner.lookup(info.name));
                if let Some(origin) = &info.origin {
                    out.push('[');
                    self.write_list(out, &origin.args);
                    out.push(']');
                }
            }
            TypeData::TypeParam(_) => {
                if let Some(info) = self.type_param_info(idx) {
                    out.push_str(interner.lookup(info.name));
                }
            }
        }
    }
}
