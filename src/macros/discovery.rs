//! Macro-import discovery.
//!
//! A macro-import is a top-level `from <module> import macros, <name> [as <alias>], ...`
//! whose first imported name is exactly `macros` without an alias. Discovery imports the
//! definition module, binds every following name to the module attribute of that name,
//! and rewrites the statement to a plain `import <module>` so that nothing macro-related
//! is bound at run time.
//!
//! Dialect-imports (`from <module> import dialects, ...`) share the resolution rules and
//! go through [`resolve_import`] as well.

use std::{path::Path, rc::Rc};

use tracing::debug;

use super::{BindingTable, MacroFunction, ScriptMacro};
use crate::{
    ast::{Alias, Module, Stmt, StmtKind},
    err_at, err_msg,
    importer::resolve_name,
    runtime::{Session, Value},
    TrellisError,
};

pub const MACROS_MAGIC: &str = "macros";
pub const DIALECTS_MAGIC: &str = "dialects";
/// Pseudo-module naming the higher-phase version of the module being compiled.
pub const SELF_MODULE: &str = "__self__";

type DiscoveryResult<T> = Result<T, TrellisError>;

/// Where a macro- or dialect-import points.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportTarget {
    /// Absolute dotted module name.
    pub module: String,
    /// The imported names after the magic first name.
    pub names: Vec<Alias>,
    /// Whether the import was `from __self__ import ...`.
    pub is_self: bool,
}

/// Whether `stmt` is `from ... import <magic>, ...`.
pub fn is_macro_import(stmt: &Stmt, magic: &str) -> bool {
    match &stmt.kind {
        StmtKind::ImportFrom { names, .. } => names
            .first()
            .map_or(false, |alias| alias.name == magic && alias.asname.is_none()),
        _ => false,
    }
}

/// Resolves the module a macro- or dialect-import refers to.
pub fn resolve_import(
    stmt: &Stmt,
    filename: &str,
    self_module: Option<&str>,
    allow_asname: bool,
    session: &Session,
) -> DiscoveryResult<ImportTarget> {
    let StmtKind::ImportFrom {
        module,
        level,
        names,
    } = &stmt.kind
    else {
        return Err(err_msg!(Internal, "resolve_import expects a from-import, got {}", stmt.type_name()));
    };

    let Some(module) = module.as_deref().filter(|m| !m.is_empty()) else {
        return Err(err_at!(Syntax, filename, stmt.loc, "missing module name in macro-import"));
    };

    let names: Vec<Alias> = names.iter().skip(1).cloned().collect();
    if !allow_asname {
        if let Some(alias) = names.iter().find(|a| a.asname.is_some()) {
            return Err(err_at!(
                Syntax,
                filename,
                stmt.loc,
                "'{}' may not be imported with 'as' in a dialect-import",
                alias.name
            ));
        }
    }

    if *level == 0 && module == SELF_MODULE {
        let module = self_module.ok_or_else(|| {
            err_at!(
                Import,
                filename,
                stmt.loc,
                "'{}' is only available in multi-phase compilation",
                SELF_MODULE
            )
        })?;
        return Ok(ImportTarget {
            module: module.to_string(),
            names,
            is_self: true,
        });
    }

    let module = if *level > 0 {
        let package = resolve_package(filename, stmt, session)?;
        resolve_name(*level, Some(module), &package).map_err(|e| e.located(filename, stmt.loc))?
    } else {
        module.to_string()
    };

    Ok(ImportTarget {
        module,
        names,
        is_self: false,
    })
}

/// The package containing `filename`, derived from its directory relative to the
/// search roots.
pub fn resolve_package(filename: &str, stmt: &Stmt, session: &Session) -> DiscoveryResult<String> {
    let no_package = || {
        err_at!(
            Import,
            filename,
            stmt.loc,
            "could not determine containing package to resolve relative import"
        )
    };

    let dir = Path::new(filename)
        .parent()
        .and_then(|d| std::fs::canonicalize(if d.as_os_str().is_empty() { Path::new(".") } else { d }).ok())
        .ok_or_else(no_package)?;

    for root in &session.config().search_roots {
        let Ok(root) = std::fs::canonicalize(root) else {
            continue;
        };
        if dir == root {
            return Err(err_at!(Syntax, filename, stmt.loc, "relative import outside any package"));
        }
        if let Ok(relative) = dir.strip_prefix(&root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            return Ok(parts.join("."));
        }
    }
    Err(no_package())
}

/// Collects the macro bindings of `module` and rewrites its macro-imports in place.
///
/// `self_module` is the module `__self__` refers to, when compiling in phases. With
/// `reload`, definition modules are re-executed even when already loaded.
pub fn find_macros(
    module: &mut Module,
    filename: &str,
    self_module: Option<&str>,
    session: &Session,
    reload: bool,
) -> DiscoveryResult<BindingTable> {
    let mut bindings = BindingTable::new();

    for stmt in module.body.iter_mut() {
        if !is_macro_import(stmt, MACROS_MAGIC) {
            continue;
        }
        let target = resolve_import(stmt, filename, self_module, true, session)?;
        let definitions = session
            .import_module(&target.module, reload && !target.is_self)
            .map_err(|e| e.located(filename, stmt.loc))?;

        for alias in &target.names {
            let value = definitions.get(&alias.name).ok_or_else(|| {
                err_at!(
                    MacroBinding,
                    filename,
                    stmt.loc,
                    "module '{}' has no macro '{}'",
                    target.module,
                    alias.name
                )
            })?;
            let function = as_macro(value).ok_or_else(|| {
                err_at!(
                    MacroBinding,
                    filename,
                    stmt.loc,
                    "'{}.{}' is not a macro",
                    target.module,
                    alias.name
                )
            })?;
            bindings.insert(alias.bound_name(), function);
        }

        debug!(
            target: "trellis::discovery",
            module = %target.module,
            names = target.names.len(),
            "bound macro-import"
        );
        *stmt = Stmt::at(
            StmtKind::Import {
                module: target.module,
                asname: None,
            },
            stmt.loc,
        );
    }

    Ok(bindings)
}

/// Macro-imports among the top-level statements of `module`.
pub fn macro_imports<'m>(module: &'m Module, magic: &str) -> Vec<&'m Stmt> {
    module.body.iter().filter(|s| is_macro_import(s, magic)).collect()
}

fn as_macro(value: Value) -> Option<Rc<dyn MacroFunction>> {
    match value {
        Value::Macro(function) => Some(function),
        Value::Function(function) => Some(Rc::new(ScriptMacro::new(function))),
        _ => None,
    }
}
