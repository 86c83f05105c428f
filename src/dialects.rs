//! Dialects: whole-module transformers applied around macro expansion.
//!
//! A dialect is imported with `from <module> import dialects, <Name>, ...`. Each named
//! attribute must be a [`DialectClass`]; a fresh instance is made per import.
//!
//! Processing runs in two passes:
//!
//! 1. Source: the raw text is rescanned from the top for dialect-import lines. The
//!    first line not seen yet is resolved and every dialect it names rewrites the
//!    whole text. Scanning restarts until no unseen line is left.
//! 2. AST: after parsing, the first top-level dialect-import is rewritten to a plain
//!    `import` and its dialects transform the module. Repeats until none remain.
//!
//! Postprocessors run after macro expansion, in the order the dialects were applied.
//!
//! A dialect that inserts its own dialect-import again never terminates.

use std::{collections::HashSet, fmt, rc::Rc};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::{
    ast::{Module, Stmt, StmtKind},
    err_at, err_msg,
    macros::{
        discovery::{is_macro_import, resolve_import, ImportTarget, DIALECTS_MAGIC, SELF_MODULE},
        Tree,
    },
    runtime::{value::Function, Session, Value},
    syntax::parse_statement,
    TrellisError,
};

type DialectResult<T> = Result<T, TrellisError>;

static DIALECT_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^from\s+([.0-9a-zA-Z_]+)\s+import dialects,\s+([^(\\\n]+)$")
        .expect("dialect-import pattern is valid")
});

/// What a dialect sees besides the tree or text it transforms.
pub struct DialectContext<'a> {
    pub filename: &'a str,
    pub session: &'a Session,
}

/// A whole-module transformer. Every hook defaults to the identity.
pub trait Dialect {
    fn name(&self) -> &str;

    fn transform_source(&self, text: String, _ctx: &DialectContext<'_>) -> DialectResult<String> {
        Ok(text)
    }

    fn transform_ast(&self, module: Module, _ctx: &DialectContext<'_>) -> DialectResult<Module> {
        Ok(module)
    }

    fn postprocess_ast(&self, module: Module, _ctx: &DialectContext<'_>) -> DialectResult<Module> {
        Ok(module)
    }
}

type DialectFactory = dyn Fn() -> Box<dyn Dialect>;

/// A dialect as exported by a module: a factory for fresh instances.
#[derive(Clone)]
pub struct DialectClass {
    name: String,
    factory: Rc<DialectFactory>,
}

impl DialectClass {
    pub fn new(name: impl Into<String>, factory: impl Fn() -> Box<dyn Dialect> + 'static) -> Self {
        Self {
            name: name.into(),
            factory: Rc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Box<dyn Dialect> {
        (self.factory)()
    }
}

impl fmt::Debug for DialectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<dialect {}>", self.name)
    }
}

// ============================================================================
// SCRIPT DIALECTS
// ============================================================================

/// A dialect whose hooks are Trellis functions.
///
/// The source hook takes and returns a string; the AST hooks take the module body as
/// a tree and return a tree or a list of trees.
#[derive(Clone)]
pub struct ScriptDialect {
    pub name: String,
    pub source: Option<Rc<Function>>,
    pub ast: Option<Rc<Function>>,
    pub postprocess: Option<Rc<Function>>,
}

impl ScriptDialect {
    fn call_on_module(&self, hook: &Rc<Function>, module: Module, ctx: &DialectContext<'_>) -> DialectResult<Module> {
        let result = ctx
            .session
            .call_function(hook, vec![Value::Tree(Tree::Stmts(module.body))])
            .map_err(|e| self.hook_error(ctx, e))?;
        match result.into_tree()? {
            Some(tree) => Ok(Module::new(tree.into_stmts())),
            None => Err(err_msg!(
                Type,
                "{}: dialect '{}' returned None instead of a module body",
                ctx.filename,
                self.name
            )),
        }
    }

    fn hook_error(&self, ctx: &DialectContext<'_>, e: TrellisError) -> TrellisError {
        err_msg!(Eval, "{}: in dialect '{}': {}", ctx.filename, self.name, e.message()).caused_by(e)
    }
}

impl Dialect for ScriptDialect {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform_source(&self, text: String, ctx: &DialectContext<'_>) -> DialectResult<String> {
        let Some(hook) = &self.source else {
            return Ok(text);
        };
        let result = ctx
            .session
            .call_function(hook, vec![Value::Str(text)])
            .map_err(|e| self.hook_error(ctx, e))?;
        match result {
            Value::Str(text) => Ok(text),
            other => Err(err_msg!(
                Type,
                "{}: source transformer of dialect '{}' must return a string, not {}",
                ctx.filename,
                self.name,
                other.type_name()
            )),
        }
    }

    fn transform_ast(&self, module: Module, ctx: &DialectContext<'_>) -> DialectResult<Module> {
        match &self.ast {
            Some(hook) => self.call_on_module(hook, module, ctx),
            None => Ok(module),
        }
    }

    fn postprocess_ast(&self, module: Module, ctx: &DialectContext<'_>) -> DialectResult<Module> {
        match &self.postprocess {
            Some(hook) => self.call_on_module(hook, module, ctx),
            None => Ok(module),
        }
    }
}

// ============================================================================
// EXPANDER
// ============================================================================

/// Applies the dialects a module imports. One instance per compiled file.
pub struct DialectExpander<'s> {
    filename: String,
    session: &'s Session,
    seen: HashSet<String>,
}

impl<'s> DialectExpander<'s> {
    pub fn new(filename: impl Into<String>, session: &'s Session) -> Self {
        Self {
            filename: filename.into(),
            session,
            seen: HashSet::new(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    fn context(&self) -> DialectContext<'_> {
        DialectContext {
            filename: &self.filename,
            session: self.session,
        }
    }

    /// Instantiates every dialect `stmt` names, importing the defining module.
    fn instantiate(&self, stmt: &Stmt, self_module: Option<&str>) -> DialectResult<(ImportTarget, Vec<Box<dyn Dialect>>)> {
        let target = resolve_import(stmt, &self.filename, self_module, false, self.session)?;
        let module = self
            .session
            .import_module(&target.module, false)
            .map_err(|e| e.located(&self.filename, stmt.loc))?;

        let mut dialects = Vec::with_capacity(target.names.len());
        for alias in &target.names {
            match module.get(&alias.name) {
                Some(Value::Dialect(class)) => dialects.push(class.instantiate()),
                Some(other) => {
                    return Err(err_at!(
                        Import,
                        self.filename,
                        stmt.loc,
                        "'{}.{}' is not a dialect (got {})",
                        target.module,
                        alias.name,
                        other.type_name()
                    ))
                }
                None => {
                    return Err(err_at!(
                        Import,
                        self.filename,
                        stmt.loc,
                        "module '{}' has no dialect '{}'",
                        target.module,
                        alias.name
                    ))
                }
            }
        }
        Ok((target, dialects))
    }

    fn next_unseen_line(&self, text: &str) -> Option<String> {
        DIALECT_IMPORT
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .find(|line| !self.seen.contains(line))
    }

    /// Applies the source transformers of every dialect-import line in `text`.
    pub fn transform_source(&mut self, mut text: String, self_module: Option<&str>) -> DialectResult<String> {
        while let Some(line) = self.next_unseen_line(&text) {
            self.seen.insert(line.clone());
            let stmt = parse_statement(&line, &self.filename)?;
            // Phase modules do not exist before parsing; self-dialects only get the
            // AST pass.
            if is_self_import(&stmt) {
                debug!(target: "trellis::dialects", line = %line, "skipping self-dialect source pass");
                continue;
            }
            let (target, dialects) = self.instantiate(&stmt, self_module)?;
            for dialect in dialects {
                debug!(
                    target: "trellis::dialects",
                    module = %target.module,
                    dialect = dialect.name(),
                    "applying source transformer"
                );
                text = dialect.transform_source(text, &self.context())?;
            }
        }
        Ok(text)
    }

    /// Applies the AST transformers of every top-level dialect-import, rewriting each
    /// import to `import <module>`. Returns the instances in application order.
    pub fn transform_ast(
        &self,
        mut module: Module,
        self_module: Option<&str>,
    ) -> DialectResult<(Module, Vec<Box<dyn Dialect>>)> {
        let mut applied: Vec<Box<dyn Dialect>> = Vec::new();
        while let Some(index) = module
            .body
            .iter()
            .position(|s| is_macro_import(s, DIALECTS_MAGIC))
        {
            let stmt = &module.body[index];
            let loc = stmt.loc;
            let (target, dialects) = self.instantiate(stmt, self_module)?;
            module.body[index] = Stmt::at(
                StmtKind::Import {
                    module: target.module.clone(),
                    asname: None,
                },
                loc,
            );
            for dialect in dialects {
                debug!(
                    target: "trellis::dialects",
                    module = %target.module,
                    dialect = dialect.name(),
                    "applying AST transformer"
                );
                module = dialect.transform_ast(module, &self.context())?;
                applied.push(dialect);
            }
        }
        Ok((module, applied))
    }

    /// Runs the postprocessors of `dialects`, in order.
    pub fn postprocess_ast(&self, mut module: Module, dialects: &[Box<dyn Dialect>]) -> DialectResult<Module> {
        for dialect in dialects {
            debug!(target: "trellis::dialects", dialect = dialect.name(), "applying postprocessor");
            module = dialect.postprocess_ast(module, &self.context())?;
        }
        Ok(module)
    }
}

fn is_self_import(stmt: &Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::ImportFrom { module: Some(m), level: 0, .. } if m == SELF_MODULE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_lines_match_whole_lines_only() {
        let text = "from a.b import dialects, X, Y\nx = 1\n  from c import dialects, Z\nfrom d import dialects, (W)\n";
        let lines: Vec<&str> = DIALECT_IMPORT.find_iter(text).map(|m| m.as_str()).collect();
        assert_eq!(lines, vec!["from a.b import dialects, X, Y"]);
    }

    struct Upper;

    impl Dialect for Upper {
        fn name(&self) -> &str {
            "Upper"
        }
    }

    #[test]
    fn hooks_default_to_identity() {
        let session = Session::new(Default::default());
        let ctx = DialectContext {
            filename: "t.trl",
            session: &session,
        };
        let class = DialectClass::new("Upper", || Box::new(Upper));
        let dialect = class.instantiate();
        assert_eq!(dialect.transform_source("x = 1\n".into(), &ctx).unwrap(), "x = 1\n");
        assert_eq!(dialect.transform_ast(Module::default(), &ctx).unwrap(), Module::default());
    }

    #[test]
    fn modules_without_dialect_imports_pass_through() {
        let session = Session::new(Default::default());
        let mut expander = DialectExpander::new("t.trl", &session);
        let text = expander.transform_source("x = 1\n".into(), None).unwrap();
        assert_eq!(text, "x = 1\n");
        let (module, applied) = expander.transform_ast(Module::default(), None).unwrap();
        assert!(module.body.is_empty());
        assert!(applied.is_empty());
    }
}
