//! The host runtime: sessions, modules, values and the interpreter.
//!
//! A [`Session`] owns everything that outlives a single compile: the module registry,
//! the importer caches, the output sink, the configuration and the gensym counter. It
//! is passed by reference through every compile and run call.
//!
//! ## Output
//!
//! `print` and the debug macros write through the session's [`SharedOutput`]. The CLI
//! uses [`StdoutSink`]; tests capture into an [`OutputBuffer`].

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use tracing::trace;

use crate::{
    ast::{Module, Stmt},
    config::Config,
    err_msg,
    importer::Importer,
    macros::expander::check_no_markers_remaining,
    walker::missing_locations,
    TrellisError,
};

pub mod builtins;
pub mod eval;
pub mod module;
pub mod native;
pub mod value;

pub use module::{ModuleObject, ModuleRegistry};
pub use value::Value;

type RuntimeResult<T> = Result<T, TrellisError>;

// ============================================================================
// OUTPUT
// ============================================================================

/// Destination for user-visible output.
pub trait OutputSink {
    fn emit(&mut self, text: &str);
}

/// Discards everything.
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&mut self, _text: &str) {}
}

/// Writes each emission as a line on stdout.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Collects emissions, one per line, with no trailing newline.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    pub buffer: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl OutputSink for OutputBuffer {
    fn emit(&mut self, text: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(text);
    }
}

/// A cloneable handle on an output sink.
#[derive(Clone)]
pub struct SharedOutput(pub Rc<RefCell<dyn OutputSink>>);

impl SharedOutput {
    pub fn new<T: OutputSink + 'static>(sink: T) -> Self {
        SharedOutput(Rc::new(RefCell::new(sink)))
    }

    pub fn stdout() -> Self {
        Self::new(StdoutSink)
    }

    pub fn null() -> Self {
        Self::new(NullSink)
    }

    /// A capturing sink together with the buffer it writes to.
    pub fn buffer() -> (Self, Rc<RefCell<OutputBuffer>>) {
        let buffer = Rc::new(RefCell::new(OutputBuffer::new()));
        (SharedOutput(buffer.clone()), buffer)
    }

    pub fn emit(&self, text: &str) {
        self.0.borrow_mut().emit(text);
    }
}

// ============================================================================
// CODE OBJECTS
// ============================================================================

/// A fully expanded module body, checked and ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    pub filename: String,
    pub body: Vec<Stmt>,
    pub docstring: Option<String>,
}

impl CodeObject {
    /// The host compile step. Every node must carry a location and no `Done` marker may
    /// remain.
    pub fn compile(module: Module, filename: &str) -> RuntimeResult<Self> {
        if let Some(node) = missing_locations(&module).first() {
            return Err(err_msg!(
                Internal,
                "{}: compile: {} node has no location",
                filename,
                node
            ));
        }
        check_no_markers_remaining(&module, filename)?;
        let docstring = module.docstring().map(str::to_string);
        Ok(Self {
            filename: filename.to_string(),
            body: module.body,
            docstring,
        })
    }
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session {
    config: Config,
    registry: ModuleRegistry,
    importer: Importer,
    output: SharedOutput,
    gensym_counter: Cell<u64>,
    call_depth: Cell<usize>,
}

/// Decrements the call depth when a function call returns.
pub(crate) struct CallGuard<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Session {
    /// A session printing to stdout.
    pub fn new(config: Config) -> Self {
        Self::with_output(config, SharedOutput::stdout())
    }

    pub fn with_output(config: Config, output: SharedOutput) -> Self {
        Self {
            config,
            registry: ModuleRegistry::new(),
            importer: Importer::new(),
            output,
            gensym_counter: Cell::new(0),
            call_depth: Cell::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn importer(&self) -> &Importer {
        &self.importer
    }

    pub fn output(&self) -> &SharedOutput {
        &self.output
    }

    /// A name unique within this session, built from `base`.
    pub fn gensym(&self, base: &str) -> String {
        let n = self.gensym_counter.get() + 1;
        self.gensym_counter.set(n);
        if base.is_empty() {
            format!("gs{}", n)
        } else {
            format!("{}_gs{}", base, n)
        }
    }

    // ------------------------------------------------------------------------
    // modules
    // ------------------------------------------------------------------------

    /// Imports module `name`, loading its parents first.
    ///
    /// A registered module is returned as is unless `reload` is set, in which case a
    /// file-backed module is compiled and executed again.
    pub fn import_module(&self, name: &str, reload: bool) -> RuntimeResult<Rc<ModuleObject>> {
        if let Some(module) = self.registry.get(name) {
            if !reload || module.file().is_none() || native::is_native(name) {
                return Ok(module);
            }
        }

        if let Some((parent, _)) = name.rsplit_once('.') {
            self.import_module(parent, false)?;
            // Executing the parent may have imported this module already.
            if !reload {
                if let Some(module) = self.registry.get(name) {
                    return Ok(module);
                }
            }
        }

        let module = if let Some(module) = native::build(name) {
            trace!(target: "trellis::runtime", module = name, "native module");
            self.register_child(module.clone());
            module
        } else if let Some(path) = self.importer.find_module(name, &self.config) {
            let module = self.importer.load(self, name, &path)?;
            self.attach_to_parent(&module);
            module
        } else if self.importer.find_namespace_dir(name, &self.config).is_some() {
            let module = Rc::new(ModuleObject::namespace_package(name));
            self.register_child(module.clone());
            module
        } else {
            return Err(err_msg!(Import, "no module named '{}'", name));
        };
        Ok(module)
    }

    /// Registers `module` and binds it as an attribute of its registered parent.
    pub fn register_child(&self, module: Rc<ModuleObject>) {
        self.registry.insert(module.clone());
        self.attach_to_parent(&module);
    }

    fn attach_to_parent(&self, module: &Rc<ModuleObject>) {
        if let Some((parent, child)) = module.name().rsplit_once('.') {
            if let Some(parent) = self.registry.get(parent) {
                parent.set(child, Value::Module(module.clone()));
            }
        }
    }

    /// Registers empty namespace modules for `name` and each of its parents that is not
    /// registered yet.
    pub fn ensure_namespace(&self, name: &str) -> Rc<ModuleObject> {
        let mut prefix = String::new();
        let mut current = None;
        for part in name.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            let module = match self.registry.get(&prefix) {
                Some(module) => module,
                None => {
                    let module = Rc::new(ModuleObject::namespace_package(prefix.as_str()));
                    self.register_child(module.clone());
                    module
                }
            };
            current = Some(module);
        }
        current.unwrap_or_else(|| Rc::new(ModuleObject::namespace_package(name)))
    }

    /// Runs compiled code in `module`, replacing its docstring.
    pub fn exec_code(&self, code: &CodeObject, module: &Rc<ModuleObject>) -> RuntimeResult<()> {
        module.set_doc(code.docstring.clone());
        eval::exec_module_body(self, module, &code.body)
    }

    // ------------------------------------------------------------------------
    // calls
    // ------------------------------------------------------------------------

    pub fn call_function(&self, function: &Rc<value::Function>, args: Vec<Value>) -> RuntimeResult<Value> {
        eval::call_function(self, function, args)
    }

    pub fn call_value(&self, callee: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, args),
            Value::Builtin(builtin) => (builtin.func)(&args, self),
            Value::Macro(m) => Err(err_msg!(
                Type,
                "macro '{}' can only be invoked at expansion time",
                m.name()
            )),
            other => Err(err_msg!(Type, "'{}' object is not callable", other.type_name())),
        }
    }

    pub(crate) fn enter_call(&self, name: &str) -> RuntimeResult<CallGuard<'_>> {
        let depth = self.call_depth.get() + 1;
        if depth > self.config.max_call_depth {
            return Err(err_msg!(
                Eval,
                "maximum call depth {} exceeded in '{}'",
                self.config.max_call_depth,
                name
            ));
        }
        self.call_depth.set(depth);
        Ok(CallGuard {
            depth: &self.call_depth,
        })
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::builder, diagnostics::ErrorType};

    #[test]
    fn buffer_joins_lines() {
        let (output, buffer) = SharedOutput::buffer();
        output.emit("a");
        output.clone().emit("b");
        assert_eq!(buffer.borrow().as_str(), "a\nb");
    }

    #[test]
    fn gensyms_are_unique() {
        let session = Session::default();
        let a = session.gensym("tmp");
        let b = session.gensym("tmp");
        assert_ne!(a, b);
        assert!(a.starts_with("tmp_"));
    }

    #[test]
    fn namespaces_chain_their_parents() {
        let session = Session::default();
        let leaf = session.ensure_namespace("__phase1__.pkg.mod");
        assert_eq!(leaf.name(), "__phase1__.pkg.mod");
        let root = session.registry().get("__phase1__").unwrap();
        assert!(matches!(root.get("pkg"), Some(Value::Module(_))));
    }

    #[test]
    fn compile_rejects_unlocated_nodes() {
        let module = Module::new(vec![builder::assign("x", builder::int(1))]);
        let err = CodeObject::compile(module, "c.trl").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Internal);
        assert!(err.message().contains("has no location"));
    }

    #[test]
    fn missing_modules_are_import_errors() {
        let session = Session::default();
        let err = session.import_module("no_such_module_here", false).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Import);
    }

    #[test]
    fn calls_are_depth_limited() {
        let session = Session::with_output(
            Config {
                max_call_depth: 1,
                ..Config::default()
            },
            SharedOutput::null(),
        );
        let outer = session.enter_call("f").unwrap();
        assert!(session.enter_call("g").is_err());
        drop(outer);
        assert!(session.enter_call("g").is_ok());
    }
}
