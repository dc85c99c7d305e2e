//! Imports of host packages and the mapping of host types onto pool types.

use std::sync::Arc;

use terp_diagnostic::ErrorCode;
use terp_eval::program::{Loc, Src};
use terp_eval::{FuncValue, HostMember, HostSignature, HostType, Value};
use terp_ir::{Import, Name, SourceFile, Span};
use terp_types::{ConstValue, IfaceMethod, Idx};
use tracing::debug;

use crate::error::{fail, Check};
use crate::lower::Operand;
use crate::scope::{Scope, ScopeKind, Storage, Symbol, SymbolKind};
use crate::CompileContext;

impl CompileContext {
    /// Open the import scope of a new source file.
    ///
    /// Imports of an incremental unit are bound in the package scope instead,
    /// so statements of later units can keep using them.
    pub(crate) fn bind_file(&mut self, file: &SourceFile, eval: bool) {
        self.files.push(Scope::new(ScopeKind::File, 0));
        let index = self.files.len() - 1;
        for import in &file.imports {
            if let Err(halt) = self.bind_import(import, index, eval) {
                self.report(halt);
            }
        }
    }

    fn bind_import(&mut self, import: &Import, file: usize, eval: bool) -> Check<()> {
        let Some(pkg) = self
            .providers
            .iter()
            .find_map(|provider| provider.package(&import.path))
        else {
            return fail(
                ErrorCode::E1003,
                import.span,
                format!("could not import {:?}", import.path),
            );
        };
        let name = match import.alias {
            Some(alias) => alias,
            None => self.interner.intern(&pkg.name),
        };
        if name == self.names.blank {
            return Ok(());
        }
        let index = match self.imports.iter().position(|p| p.path == pkg.path) {
            Some(index) => index,
            None => {
                self.imports.push(Arc::clone(&pkg));
                self.imports.len() - 1
            }
        };
        let sym = Symbol::new(name, SymbolKind::Package, Idx::INVALID, Storage::Package(index));
        if eval {
            self.package.insert(sym);
        } else {
            let scope = &mut self.files[file];
            if scope.contains(name) {
                return fail(
                    ErrorCode::E1002,
                    import.span,
                    format!("{} redeclared in this block", self.interner.lookup(name)),
                );
            }
            scope.insert(sym);
        }
        debug!(path = %import.path, "imported host package");
        Ok(())
    }

    fn undefined_member(&self, pkg: usize, sel: Name, span: Span) -> Check<Operand> {
        fail(
            ErrorCode::E1005,
            span,
            format!(
                "undefined: {}.{}",
                self.imports[pkg].name,
                self.interner.lookup(sel)
            ),
        )
    }

    /// Value of `pkg.sel`.
    pub(crate) fn host_member(&mut self, pkg: usize, sel: Name, span: Span) -> Check<Operand> {
        let package = Arc::clone(&self.imports[pkg]);
        let member_name = self.interner.lookup(sel);
        let Some(member) = package.member(member_name) else {
            return self.undefined_member(pkg, sel, span);
        };
        match member {
            HostMember::Func(func) => {
                let ty = self.host_signature(pkg, &func.sig, span)?;
                Ok(Operand::value(
                    ty,
                    Src::Const(Value::Func(FuncValue::Host(Arc::clone(func)))),
                ))
            }
            HostMember::Const { ty, value } => {
                let ty = self.host_type(pkg, ty, span)?;
                Ok(match const_of(value) {
                    Some(cv) => Operand::constant(ty, cv),
                    None => Operand::value(ty, Src::Const(value.clone())),
                })
            }
            HostMember::Var { ty, value } => {
                let ty = self.host_type(pkg, ty, span)?;
                let key = (pkg, member_name.to_owned());
                let slot = match self.host_vars.get(&key) {
                    Some(&slot) => slot,
                    None => {
                        let slot = self.program.add_global(value.clone());
                        self.host_vars.insert(key, slot);
                        slot
                    }
                };
                Ok(Operand::value(ty, Src::Loc(Loc::Global(slot))))
            }
            HostMember::Type(_) | HostMember::Interface(_) => fail(
                ErrorCode::E2011,
                span,
                format!("{}.{member_name} (type) is not an expression", package.name),
            ),
        }
    }

    /// Root-frame slot of host variable `pkg.sel`, if it is one.
    pub(crate) fn host_var_slot(&self, pkg: usize, sel: Name) -> Option<u32> {
        self.host_vars
            .get(&(pkg, self.interner.lookup(sel).to_owned()))
            .copied()
    }

    /// Type denoted by `pkg.sel`, or `None` when the member is not a type.
    pub(crate) fn host_member_type(
        &mut self,
        pkg: usize,
        sel: Name,
        span: Span,
    ) -> Check<Option<Idx>> {
        let member_name = self.interner.lookup(sel);
        match self.imports[pkg].member(member_name) {
            Some(HostMember::Type(_) | HostMember::Interface(_)) => {
                self.host_named(pkg, member_name, span).map(Some)
            }
            Some(_) => Ok(None),
            None => self.undefined_member(pkg, sel, span).map(|_| None),
        }
    }

    /// The named type standing for host type member `name`.
    fn host_named(&mut self, pkg: usize, name: &str, span: Span) -> Check<Idx> {
        let key = (pkg, name.to_owned());
        if let Some(&ty) = self.host_types.get(&key) {
            return Ok(ty);
        }
        let package = Arc::clone(&self.imports[pkg]);
        let qualified = self.interner.intern(&format!("{}.{name}", package.name));
        let named = self.pool.new_named(qualified, None);
        self.host_types.insert(key, named);
        let underlying = match package.member(name) {
            Some(HostMember::Type(ty)) => self.host_type(pkg, ty, span)?,
            Some(HostMember::Interface(iface)) => {
                let mut methods = Vec::with_capacity(iface.methods.len());
                for (method, sig) in &iface.methods {
                    methods.push(IfaceMethod {
                        name: self.interner.intern(method),
                        sig: self.host_signature(pkg, sig, span)?,
                    });
                }
                match self.pool.make_interface(methods, &[], Vec::new()) {
                    Ok(ty) => ty,
                    Err(_) => {
                        return fail(
                            ErrorCode::E1002,
                            span,
                            format!("duplicate method in host interface {name}"),
                        )
                    }
                }
            }
            _ => {
                return fail(
                    ErrorCode::E1005,
                    span,
                    format!("undefined: {}.{name}", package.name),
                )
            }
        };
        self.pool.set_underlying(named, underlying);
        Ok(named)
    }

    pub(crate) fn host_type(&mut self, pkg: usize, ty: &HostType, span: Span) -> Check<Idx> {
        Ok(match ty {
            HostType::Bool => Idx::BOOL,
            HostType::Int => Idx::INT,
            HostType::Int64 => Idx::INT64,
            HostType::Uint8 => Idx::UINT8,
            HostType::Float64 => Idx::FLOAT64,
            HostType::String => Idx::STRING,
            HostType::Error => Idx::ERROR,
            HostType::Any => Idx::ANY,
            HostType::Slice(elem) => {
                let elem = self.host_type(pkg, elem, span)?;
                self.pool.slice(elem)
            }
            HostType::Map(key, value) => {
                let key = self.host_type(pkg, key, span)?;
                let value = self.host_type(pkg, value, span)?;
                self.pool.map(key, value)
            }
            HostType::Func(sig) => self.host_signature(pkg, sig, span)?,
            HostType::Named(name) => self.host_named(pkg, name, span)?,
        })
    }

    pub(crate) fn host_signature(
        &mut self,
        pkg: usize,
        sig: &HostSignature,
        span: Span,
    ) -> Check<Idx> {
        let mut params = Vec::with_capacity(sig.params.len());
        for p in &sig.params {
            params.push(self.host_type(pkg, p, span)?);
        }
        let mut results = Vec::with_capacity(sig.results.len());
        for r in &sig.results {
            results.push(self.host_type(pkg, r, span)?);
        }
        Ok(self.pool.func(params, results, sig.variadic))
    }
}

/// Host constants with a compile-time representation.
fn const_of(value: &Value) -> Option<ConstValue> {
    Some(match value {
        Value::Bool(b) => ConstValue::Bool(*b),
        Value::Int(i) => ConstValue::Int(i128::from(*i)),
        Value::Uint(u) => ConstValue::Int(i128::from(*u)),
        Value::Float(f) => ConstValue::Float(*f),
        Value::Str(s) => ConstValue::Str(s.to_string()),
        _ => return None,
    })
}
