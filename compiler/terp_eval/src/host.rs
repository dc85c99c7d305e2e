//! Host bindings: packages of native functions, constants and types that
//! interpreted code imports.
//!
//! A [`SymbolProvider`] maps an import path to a [`HostPackage`]. Host
//! signatures are written in a small host type vocabulary ([`HostType`]);
//! the compiler maps them onto its own types when the package is imported.
//! Host functions receive a [`HostCtx`] so they can call back into
//! interpreted code, including methods of interface values passed to them.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use terp_types::Idx;

use crate::errors::{ExecResult, Panic, PanicKind, Unwind};
use crate::exec::Task;
use crate::Value;

/// Resolves import paths to host packages.
pub trait SymbolProvider: Send + Sync {
    fn package(&self, path: &str) -> Option<Arc<HostPackage>>;
}

/// Exported members of one importable host package.
#[derive(Debug, Default)]
pub struct HostPackage {
    pub path: String,
    /// Name interpreted code uses when the import has no alias.
    pub name: String,
    pub members: FxHashMap<String, HostMember>,
}

impl HostPackage {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        HostPackage {
            path,
            name,
            members: FxHashMap::default(),
        }
    }

    pub fn member(&self, name: &str) -> Option<&HostMember> {
        self.members.get(name)
    }
}

/// One exported member.
#[derive(Debug, Clone)]
pub enum HostMember {
    Func(Arc<HostFunc>),
    Const { ty: HostType, value: Value },
    /// A package variable; each compiled program gets its own copy.
    Var { ty: HostType, value: Value },
    /// A named type with the given underlying type.
    Type(HostType),
    /// An interface type interpreted values can be passed as.
    Interface(HostInterface),
}

/// Method table of a host interface.
#[derive(Debug, Clone, Default)]
pub struct HostInterface {
    pub methods: Vec<(String, HostSignature)>,
}

/// Host type vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub enum HostType {
    Bool,
    Int,
    Int64,
    Uint8,
    Float64,
    String,
    Error,
    Any,
    Slice(Box<HostType>),
    Map(Box<HostType>, Box<HostType>),
    Func(Box<HostSignature>),
    /// Another type member of the same package.
    Named(String),
}

/// Signature of a host function or interface method.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostSignature {
    pub params: Vec<HostType>,
    pub results: Vec<HostType>,
    /// The last parameter is a slice collecting trailing arguments.
    pub variadic: bool,
}

impl HostSignature {
    pub fn new(params: Vec<HostType>, results: Vec<HostType>) -> Self {
        HostSignature {
            params,
            results,
            variadic: false,
        }
    }

    #[must_use]
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

type HostFn = dyn Fn(&mut HostCtx<'_>, Vec<Value>) -> Result<Vec<Value>, HostError> + Send + Sync;

/// A native function callable from interpreted code.
pub struct HostFunc {
    pub name: String,
    pub sig: HostSignature,
    func: Arc<HostFn>,
}

impl HostFunc {
    pub fn new<F>(name: impl Into<String>, sig: HostSignature, func: F) -> Self
    where
        F: Fn(&mut HostCtx<'_>, Vec<Value>) -> Result<Vec<Value>, HostError> + Send + Sync + 'static,
    {
        HostFunc {
            name: name.into(),
            sig,
            func: Arc::new(func),
        }
    }

    /// Invoke with already-converted arguments. Errors become panics of kind
    /// [`PanicKind::Host`]; unwinds raised by callbacks pass through.
    pub fn call(&self, ctx: &mut HostCtx<'_>, args: Vec<Value>) -> ExecResult<Vec<Value>> {
        match (self.func)(ctx, args) {
            Ok(results) => Ok(results),
            Err(HostError(HostErrorKind::Unwind(unwind))) => Err(unwind),
            Err(HostError(HostErrorKind::Message(msg))) => {
                tracing::debug!(func = %self.name, %msg, "host function failed");
                Err(Unwind::Panic(Box::new(Panic::new(
                    Value::iface(Idx::ERROR_STRING, Value::string(msg)),
                    PanicKind::Host,
                ))))
            }
        }
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc")
            .field("name", &self.name)
            .field("sig", &self.sig)
            .finish_non_exhaustive()
    }
}

/// Failure of a host function.
#[derive(Debug)]
pub struct HostError(HostErrorKind);

#[derive(Debug)]
enum HostErrorKind {
    Message(String),
    /// A callback into interpreted code panicked or the run is stopping.
    Unwind(Unwind),
}

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        HostError(HostErrorKind::Message(msg.into()))
    }

    pub fn message(&self) -> Option<&str> {
        match &self.0 {
            HostErrorKind::Message(msg) => Some(msg),
            HostErrorKind::Unwind(_) => None,
        }
    }

    pub fn into_unwind(self) -> Option<Unwind> {
        match self.0 {
            HostErrorKind::Unwind(u) => Some(u),
            HostErrorKind::Message(_) => None,
        }
    }
}

impl From<Unwind> for HostError {
    fn from(unwind: Unwind) -> Self {
        HostError(HostErrorKind::Unwind(unwind))
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            HostErrorKind::Message(msg) => f.write_str(msg),
            HostErrorKind::Unwind(Unwind::Panic(p) | Unwind::Fatal(p)) => write!(f, "{p}"),
            HostErrorKind::Unwind(Unwind::Exit) => f.write_str("interpreter shutting down"),
        }
    }
}

impl std::error::Error for HostError {}

/// Build the error value a host function returns in an `error` result.
pub fn error_value(msg: impl Into<String>) -> Value {
    Value::iface(Idx::ERROR_STRING, Value::string(msg.into()))
}

/// Access to the calling task from inside a host function.
pub struct HostCtx<'a> {
    pub(crate) task: &'a mut Task,
}

impl HostCtx<'_> {
    /// Call an interpreted function value.
    pub fn call(&mut self, func: &Value, args: Vec<Value>) -> Result<Vec<Value>, HostError> {
        Ok(self.task.call_value(func, args)?)
    }

    /// Call method `name` on the dynamic type of interface value `recv`.
    pub fn call_method(
        &mut self,
        recv: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, HostError> {
        let method = self.task.prog.interner().intern(name);
        Ok(self.task.call_iface(recv, method, args)?)
    }

    /// Write through the run's print handler.
    pub fn print(&self, text: &str) {
        self.task.rt.print(text);
    }

    /// Display name of the dynamic type of an interface value.
    pub fn type_name(&self, value: &Value) -> String {
        match value {
            Value::Iface(i) => self.task.prog.type_name(i.ty).to_string(),
            _ => "nil".to_string(),
        }
    }

    /// `Error()` text of an error value, or its printed form otherwise.
    pub fn error_text(&mut self, value: &Value) -> Result<String, HostError> {
        Ok(self.task.error_text(value)?)
    }
}
