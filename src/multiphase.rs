//! Multi-phase compilation: macro definitions and their uses in one file.
//!
//! ```text
//! with phase[1]:
//!     from trellis.ast import BinOp, Constant
//!     def triple(tree, syntax):
//!         return BinOp(tree, "*", Constant(3))
//!
//! from __self__ import macros, triple
//! x = triple[7]
//! ```
//!
//! Top-level `with phase[N]:` blocks (`N >= 1`) partition the module. Phase `k` sees
//! the bodies of every phase block numbered `k` or higher, so definitions are
//! inherited downwards; phase 0 additionally holds everything outside phase blocks.
//!
//! Phases run highest first. Each phase `k >= 1` is expanded, compiled and executed as
//! the temporary module `__phase<k>__.<self_module>`. In phase `k`,
//! `from __self__ import macros, ...` refers to the module of phase `k + 1`; in phase 0
//! it refers to phase 1. Temporary modules stay registered, since the rewritten
//! self-macro-import of the final code imports them.

use std::{collections::BTreeMap, rc::Rc};

use tracing::debug;

use crate::{
    ast::{Constant, Expr, ExprKind, Loc, Module, Stmt, StmtKind},
    compiler::{self, singlephase_expand},
    dialects::DialectExpander,
    err_at, err_msg,
    macros::discovery::{is_macro_import, DIALECTS_MAGIC},
    runtime::{ModuleObject, Session},
    walker::{walk_stmt_ref, Visitor},
    TrellisError,
};

type PhaseResult<T> = Result<T, TrellisError>;

/// Name of the phase marker: `with phase[N]:`.
pub const PHASE_MARKER: &str = "phase";

fn marker_index(item: &Expr) -> Option<&Expr> {
    match &item.kind {
        ExprKind::Subscript { value, index } if value.is_name(PHASE_MARKER) => Some(index),
        _ => None,
    }
}

/// Whether `stmt` is a `with phase[...]:` block.
pub fn is_phase_block(stmt: &Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::With { item, .. } if marker_index(item).is_some())
}

/// Whether `module` has any top-level phase block.
pub fn is_multiphase(module: &Module) -> bool {
    module.body.iter().any(is_phase_block)
}

/// The phase number of a top-level phase block.
fn phase_number(stmt: &Stmt, filename: &str) -> PhaseResult<usize> {
    let StmtKind::With { item, alias, .. } = &stmt.kind else {
        return Err(err_msg!(Internal, "phase_number expects a with-statement"));
    };
    let Some(index) = marker_index(item) else {
        return Err(err_msg!(Internal, "phase_number expects a phase marker"));
    };
    if alias.is_some() {
        return Err(err_at!(Syntax, filename, stmt.loc, "a phase marker takes no 'as' name"));
    }
    match &index.kind {
        ExprKind::Constant(Constant::Int(n)) if *n >= 1 => usize::try_from(*n)
            .map_err(|_| err_at!(Syntax, filename, stmt.loc, "phase number {} is too large", n)),
        ExprKind::Constant(Constant::Int(0)) => Err(err_at!(
            Syntax,
            filename,
            stmt.loc,
            "phase[0] is implicit; top-level code outside phase blocks already runs in phase 0"
        )),
        _ => Err(err_at!(
            Syntax,
            filename,
            stmt.loc,
            "phase number must be a positive integer literal"
        )),
    }
}

/// Finds phase markers anywhere below the top level.
#[derive(Default)]
struct NestedMarkers {
    found: Option<Option<Loc>>,
}

impl Visitor for NestedMarkers {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        if self.found.is_none() && is_phase_block(stmt) {
            self.found = Some(stmt.loc);
        }
        walk_stmt_ref(self, stmt);
    }
}

/// Rejects malformed phase markers: bad phase numbers at the top level, and any phase
/// marker nested inside another statement.
pub fn validate_phase_markers(module: &Module, filename: &str) -> PhaseResult<()> {
    let mut nested = NestedMarkers::default();
    for stmt in &module.body {
        match &stmt.kind {
            StmtKind::With { body, .. } if is_phase_block(stmt) => {
                phase_number(stmt, filename)?;
                nested.visit_body(body);
            }
            _ => walk_stmt_ref(&mut nested, stmt),
        }
        if let Some(loc) = nested.found {
            return Err(err_at!(
                Syntax,
                filename,
                loc,
                "phase markers are only allowed at the top level of a module"
            ));
        }
    }
    Ok(())
}

// ============================================================================
// PHASE TABLE
// ============================================================================

/// Phase number to the statements that phase contributes, split on top-level phase
/// blocks. Phase 0 holds the statements outside any phase block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseTable {
    /// `(phase, statement)` in source order.
    entries: Vec<(usize, Stmt)>,
    /// Top-level dialect-imports, prepended to every phase above 0.
    dialect_imports: Vec<Stmt>,
}

impl PhaseTable {
    pub fn split(module: Module, filename: &str) -> PhaseResult<Self> {
        validate_phase_markers(&module, filename)?;
        let mut table = PhaseTable::default();
        for stmt in module.body {
            if is_phase_block(&stmt) {
                let phase = phase_number(&stmt, filename)?;
                if let StmtKind::With { body, .. } = stmt.kind {
                    table.entries.extend(body.into_iter().map(|s| (phase, s)));
                }
            } else {
                if is_macro_import(&stmt, DIALECTS_MAGIC) {
                    table.dialect_imports.push(stmt.clone());
                }
                table.entries.push((0, stmt));
            }
        }
        Ok(table)
    }

    /// The highest phase number; 0 for a single-phase module.
    pub fn max_phase(&self) -> usize {
        self.entries.iter().map(|(phase, _)| *phase).max().unwrap_or(0)
    }

    /// Statement counts per phase.
    pub fn counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for (phase, _) in &self.entries {
            *counts.entry(*phase).or_insert(0) += 1;
        }
        counts
    }

    /// The synthetic module for phase `k`.
    pub fn module_for(&self, k: usize) -> Module {
        let mut body: Vec<Stmt> = if k == 0 {
            Vec::new()
        } else {
            self.dialect_imports.clone()
        };
        body.extend(
            self.entries
                .iter()
                .filter(|(phase, _)| *phase >= k)
                .map(|(_, stmt)| stmt.clone()),
        );
        Module::new(body)
    }
}

/// Dotted name of the temporary module for phase `k`.
pub fn phase_module_name(k: usize, self_module: &str) -> String {
    format!("__phase{}__.{}", k, self_module)
}

/// Expands a multi-phase module: compiles and executes phases down to 1, then returns
/// the expanded phase-0 module.
pub fn multiphase_expand(
    module: Module,
    filename: &str,
    self_module: &str,
    session: &Session,
    dexpander: &DialectExpander<'_>,
) -> PhaseResult<Module> {
    let table = PhaseTable::split(module, filename)?;
    let max_phase = table.max_phase();
    debug!(
        target: "trellis::multiphase",
        module = self_module,
        phases = max_phase + 1,
        "multi-phase compile"
    );

    let package = self_module.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
    for k in (1..=max_phase).rev() {
        let higher = (k < max_phase).then(|| phase_module_name(k + 1, self_module));
        let expanded = singlephase_expand(table.module_for(k), filename, higher.as_deref(), session, dexpander)?;
        let code = compiler::to_code(expanded, filename)?;

        let name = phase_module_name(k, self_module);
        if let Some((parent, _)) = name.rsplit_once('.') {
            session.ensure_namespace(parent);
        }
        let temporary = Rc::new(ModuleObject::new(&name, Some(filename.into()), package));
        session.register_child(temporary.clone());
        debug!(target: "trellis::multiphase", phase = k, module = %name, "executing phase");
        session.exec_code(&code, &temporary)?;
    }

    let lowest = (max_phase >= 1).then(|| phase_module_name(1, self_module));
    singlephase_expand(table.module_for(0), filename, lowest.as_deref(), session, dexpander)
}
