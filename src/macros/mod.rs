//! # Trellis Macro System
//!
//! Macros are compile-time tree transformers bound to names by macro-imports:
//!
//! ```text
//! from mypkg.macros import macros, double, trace as tr
//! ```
//!
//! A bound macro is invoked by one of four syntactic shapes, and the shape is decided
//! by the call site, not by the macro:
//!
//! | Shape       | Surface syntax     | Argument tree                    |
//! |-------------|--------------------|----------------------------------|
//! | `expr`      | `double[21]`       | the index expression             |
//! | `block`     | `with trace: ...`  | the body statements              |
//! | `decorator` | `@trace def f():`  | the definition, macro decorators stripped |
//! | `name`      | `it`               | the `Name` node (opt-in only)    |
//!
//! ## Layout
//!
//! - [`detect`]: the shape matchers shared by the expander and the collector.
//! - [`expander`]: expansion to fixpoint, `Done` markers, location fix-ups.
//! - [`collector`]: side-effect-free inventory of remaining invocations.
//! - [`discovery`]: macro-import scanning, module resolution and import rewriting.

use std::{collections::HashMap, fmt, rc::Rc};

use crate::{
    ast::{Expr, Stmt, StmtKind},
    runtime::{value::Function, Value},
    TrellisError,
};

pub mod collector;
pub mod detect;
pub mod discovery;
pub mod expander;

pub use collector::MacroCollector;
pub use discovery::find_macros;
pub use expander::{expand_macros, MacroContext, MacroExpander};

pub type MacroResult = Result<Option<Tree>, TrellisError>;

// ============================================================================
// CORE DATA STRUCTURES
// ============================================================================

/// What macros consume and produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    Expr(Expr),
    Stmts(Vec<Stmt>),
}

impl Tree {
    /// Statement view: an expression becomes an expression statement.
    pub fn into_stmts(self) -> Vec<Stmt> {
        match self {
            Tree::Stmts(stmts) => stmts,
            Tree::Expr(expr) => {
                let loc = expr.loc;
                vec![Stmt::at(StmtKind::Expr(expr), loc)]
            }
        }
    }

    /// Expression view: a single expression statement unwraps to its value.
    pub fn into_expr(self) -> Option<Expr> {
        match self {
            Tree::Expr(expr) => Some(expr),
            Tree::Stmts(mut stmts) if stmts.len() == 1 => match stmts.pop().map(|s| s.kind) {
                Some(StmtKind::Expr(expr)) => Some(expr),
                _ => None,
            },
            Tree::Stmts(_) => None,
        }
    }

    pub fn as_expr(&self) -> Option<&Expr> {
        match self {
            Tree::Expr(expr) => Some(expr),
            Tree::Stmts(_) => None,
        }
    }
}

/// The syntactic shape that triggered a macro call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyntaxKind {
    Expr,
    Block,
    Decorator,
    Name,
}

impl SyntaxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyntaxKind::Expr => "expr",
            SyntaxKind::Block => "block",
            SyntaxKind::Decorator => "decorator",
            SyntaxKind::Name => "name",
        }
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compile-time tree transformer.
///
/// `Ok(None)` asks for the invocation to be deleted, which is only legal in statement
/// positions.
pub trait MacroFunction {
    fn name(&self) -> &str;

    /// Whether a bare identifier reference invokes this macro.
    fn is_name_macro(&self) -> bool {
        false
    }

    fn expand(&self, tree: Tree, ctx: &mut MacroContext<'_, '_>) -> MacroResult;
}

impl fmt::Debug for dyn MacroFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<macro {}>", self.name())
    }
}

type NativeFn = dyn Fn(Tree, &mut MacroContext<'_, '_>) -> MacroResult;

/// A macro implemented in Rust.
pub struct NativeMacro {
    name: String,
    name_macro: bool,
    func: Box<NativeFn>,
}

impl NativeMacro {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Tree, &mut MacroContext<'_, '_>) -> MacroResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            name_macro: false,
            func: Box::new(func),
        }
    }

    /// Opts the macro in to bare-identifier invocation.
    pub fn name_macro(mut self) -> Self {
        self.name_macro = true;
        self
    }
}

impl MacroFunction for NativeMacro {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_name_macro(&self) -> bool {
        self.name_macro
    }

    fn expand(&self, tree: Tree, ctx: &mut MacroContext<'_, '_>) -> MacroResult {
        (self.func)(tree, ctx)
    }
}

/// A macro written in Trellis: a function taking `(tree, syntax)`.
///
/// The function receives the argument tree and the syntax kind as a string, and returns
/// a tree, a list of trees, a plain constant, or `None`.
pub struct ScriptMacro {
    function: Rc<Function>,
}

impl ScriptMacro {
    pub fn new(function: Rc<Function>) -> Self {
        Self { function }
    }
}

impl MacroFunction for ScriptMacro {
    fn name(&self) -> &str {
        &self.function.name
    }

    fn is_name_macro(&self) -> bool {
        self.function.name_macro
    }

    fn expand(&self, tree: Tree, ctx: &mut MacroContext<'_, '_>) -> MacroResult {
        let args = vec![Value::Tree(tree), Value::Str(ctx.syntax.as_str().into())];
        let result = ctx
            .session()
            .call_function(&self.function, args)
            .map_err(|e| {
                crate::err_at!(
                    Eval,
                    ctx.filename(),
                    ctx.invocation,
                    "in macro '{}': {}",
                    self.name(),
                    e.message()
                )
                .caused_by(e)
            })?;
        result.into_tree()
    }
}

/// Per-module mapping from macro name to macro function.
#[derive(Default, Clone)]
pub struct BindingTable {
    macros: HashMap<String, Rc<dyn MacroFunction>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, function: Rc<dyn MacroFunction>) {
        self.macros.insert(name.into(), function);
    }

    /// Convenience for registering a native macro under its own name.
    pub fn with_native(mut self, native: NativeMacro) -> Self {
        let name = native.name().to_string();
        self.insert(name, Rc::new(native));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Rc<dyn MacroFunction>> {
        self.macros.get(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn extend(&mut self, other: BindingTable) {
        self.macros.extend(other.macros);
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
