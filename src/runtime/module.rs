//! Module objects and the session's module registry.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    rc::Rc,
};

use super::Value;

// ============================================================================
// MODULE OBJECTS
// ============================================================================

pub struct ModuleObject {
    name: String,
    file: Option<PathBuf>,
    package: String,
    doc: RefCell<Option<String>>,
    namespace: RefCell<HashMap<String, Value>>,
}

impl ModuleObject {
    pub fn new(name: impl Into<String>, file: Option<PathBuf>, package: impl Into<String>) -> Self {
        let name = name.into();
        let package = package.into();
        let mut namespace = HashMap::new();
        namespace.insert("__name__".to_string(), Value::Str(name.clone()));
        namespace.insert("__package__".to_string(), Value::Str(package.clone()));
        Self {
            name,
            file,
            package,
            doc: RefCell::new(None),
            namespace: RefCell::new(namespace),
        }
    }

    /// A module with no source file, standing in for a directory without
    /// `__init__.trl`.
    pub fn namespace_package(name: impl Into<String>) -> Self {
        let name = name.into();
        let package = name.clone();
        Self::new(name, None, package)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// The package relative imports inside this module resolve against.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// The name used for this module in diagnostics.
    pub fn filename(&self) -> String {
        match &self.file {
            Some(path) => path.display().to_string(),
            None => format!("<module '{}'>", self.name),
        }
    }

    pub fn doc(&self) -> Option<String> {
        self.doc.borrow().clone()
    }

    pub fn set_doc(&self, doc: Option<String>) {
        *self.doc.borrow_mut() = doc;
    }

    pub fn get(&self, attr: &str) -> Option<Value> {
        self.namespace.borrow().get(attr).cloned()
    }

    pub fn set(&self, attr: impl Into<String>, value: Value) {
        self.namespace.borrow_mut().insert(attr.into(), value);
    }

    pub fn remove(&self, attr: &str) -> Option<Value> {
        self.namespace.borrow_mut().remove(attr)
    }

    pub fn contains(&self, attr: &str) -> bool {
        self.namespace.borrow().contains_key(attr)
    }

    /// Public attribute names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespace
            .borrow()
            .keys()
            .filter(|k| !k.starts_with("__"))
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ModuleObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module '{}'>", self.name)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Loaded modules by absolute dotted name.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: RefCell<HashMap<String, Rc<ModuleObject>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Rc<ModuleObject>> {
        self.modules.borrow().get(name).cloned()
    }

    pub fn insert(&self, module: Rc<ModuleObject>) {
        self.modules
            .borrow_mut()
            .insert(module.name().to_string(), module);
    }

    pub fn remove(&self, name: &str) -> Option<Rc<ModuleObject>> {
        self.modules.borrow_mut().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.borrow().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.borrow().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trip() {
        let registry = ModuleRegistry::new();
        registry.insert(Rc::new(ModuleObject::new("pkg.mod", None, "pkg")));
        assert!(registry.contains("pkg.mod"));
        let module = registry.get("pkg.mod").unwrap();
        assert_eq!(module.package(), "pkg");
        assert_eq!(module.filename(), "<module 'pkg.mod'>");
        assert!(registry.remove("pkg.mod").is_some());
        assert!(registry.names().is_empty());
    }

    #[test]
    fn dunder_names_are_private() {
        let module = ModuleObject::new("m", None, "");
        module.set("x", Value::Int(1));
        assert_eq!(module.names(), vec!["x".to_string()]);
        assert!(module.contains("__name__"));
    }
}
