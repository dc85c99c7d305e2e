//! Registering host packages.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use terp_eval::{
    HostCtx, HostError, HostFunc, HostInterface, HostMember, HostPackage, HostSignature,
    HostType, SymbolProvider, Value,
};


/// Symbol provider backed by a map from import path to package.
#[derive(Default, Clone)]
pub struct MapProvider {
    packages: FxHashMap<String, Arc<HostPackage>>,
}

impl MapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `package` under its path, replacing any earlier one.
    pub fn insert(&mut self, package: HostPackage) {
        self.packages.insert(package.path.clone(), Arc::new(package));
    }

    #[must_use]
    pub fn with(mut self, package: HostPackage) -> Self {
        self.insert(package);
        self
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl SymbolProvider for MapProvider {
    fn package(&self, path: &str) -> Option<Arc<HostPackage>> {
        self.packages.get(path).cloned()
    }
}

/// Incrementally assembles a [`HostPackage`].
///
/// ```
/// use terp::{HostPackageBuilder, HostSignature, HostType, Value};
///
/// let strings = HostPackageBuilder::new("strings")
///     .func(
///         "ToUpper",
///         HostSignature::new(vec![HostType::String], vec![HostType::String]),
///         |_, args| {
///             let s = args.first().and_then(Value::as_str).unwrap_or_default();
///             Ok(vec![Value::string(s.to_uppercase())])
///         },
///     )
///     .constant("Version", HostType::Int, Value::Int(2))
///     .build();
/// assert!(strings.member("ToUpper").is_some());
/// ```
pub struct HostPackageBuilder {
    package: HostPackage,
}

impl HostPackageBuilder {
    /// Start a package importable as `path`; its default name is the last
    /// path element.
    pub fn new(path: impl Into<String>) -> Self {
        HostPackageBuilder {
            package: HostPackage::new(path),
        }
    }

    /// Override the name the package is referred to by.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.package.name = name.into();
        self
    }

    #[must_use]
    pub fn func<F>(self, name: &str, sig: HostSignature, func: F) -> Self
    where
        F: Fn(&mut HostCtx<'_>, Vec<Value>) -> Result<Vec<Value>, HostError>
            + Send
            + Sync
            + 'static,
    {
        let func = HostFunc::new(name, sig, func);
        self.member(name, HostMember::Func(Arc::new(func)))
    }

    #[must_use]
    pub fn constant(self, name: &str, ty: HostType, value: Value) -> Self {
        self.member(name, HostMember::Const { ty, value })
    }

    #[must_use]
    pub fn var(self, name: &str, ty: HostType, value: Value) -> Self {
        self.member(name, HostMember::Var { ty, value })
    }

    /// A named type with `underlying` as its underlying type.
    #[must_use]
    pub fn named_type(self, name: &str, underlying: HostType) -> Self {
        self.member(name, HostMember::Type(underlying))
    }

    #[must_use]
    pub fn interface(self, name: &str, methods: Vec<(&str, HostSignature)>) -> Self {
        let methods = methods
            .into_iter()
            .map(|(name, sig)| (name.to_string(), sig))
            .collect();
        self.member(name, HostMember::Interface(HostInterface { methods }))
    }

    #[must_use]
    pub fn member(mut self, name: &str, member: HostMember) -> Self {
        if self.package.members.insert(name.to_string(), member).is_some() {
            tracing::warn!(package = %self.package.path, member = name, "host member replaced");
        }
        self
    }

    pub fn build(self) -> HostPackage {
        self.package
    }
}
