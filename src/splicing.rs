//! Statement splicing for dialect authors.
//!
//! A dialect's AST transformer typically wraps the user's module in a template:
//!
//! ```text
//! from mylib.macros import macros, trace
//! def _main():
//!     __paste_here__
//! _main()
//! ```
//!
//! [`splice_dialect`] pastes the user body at the marker and hoists what must stay at
//! the top of a module: the docstring, `__all__`, and every macro-import.

use crate::{
    ast::{ExprKind, Stmt, StmtKind},
    err_msg,
    macros::discovery::{is_macro_import, MACROS_MAGIC},
    walker::{fix_missing_locations_stmt, walk_stmt, Transformer},
    TrellisError,
};

pub const DEFAULT_TAG: &str = "__paste_here__";

type SpliceResult<T> = Result<T, TrellisError>;

fn is_paste_here(stmt: &Stmt, tag: &str) -> bool {
    matches!(&stmt.kind, StmtKind::Expr(value) if value.is_name(tag))
}

struct StatementSplicer<'a> {
    body: &'a [Stmt],
    tag: &'a str,
    pasted: usize,
}

impl Transformer for StatementSplicer<'_> {
    fn visit_stmt(&mut self, stmt: Stmt) -> SpliceResult<Vec<Stmt>> {
        if is_paste_here(&stmt, self.tag) {
            self.pasted += 1;
            return Ok(self.body.to_vec());
        }
        Ok(vec![walk_stmt(self, stmt)?])
    }
}

/// Replaces every `tag` marker statement in `template`, at any depth, with `body`.
///
/// An empty template yields `body` unchanged. The template must contain the marker.
pub fn splice_statements(body: Vec<Stmt>, template: Vec<Stmt>, tag: &str) -> SpliceResult<Vec<Stmt>> {
    if body.is_empty() {
        return Err(err_msg!(Import, "expected at least one statement in the module body"));
    }
    if template.is_empty() {
        return Ok(body);
    }
    let mut splicer = StatementSplicer {
        body: &body,
        tag,
        pasted: 0,
    };
    let spliced = splicer.visit_body(template)?;
    if splicer.pasted == 0 {
        return Err(err_msg!(Internal, "splice template has no '{}' marker", tag));
    }
    Ok(spliced)
}

/// Removes macro-imports at any depth, collecting them in source order.
#[derive(Default)]
struct MacroImportExtractor {
    collected: Vec<Stmt>,
}

impl Transformer for MacroImportExtractor {
    fn visit_stmt(&mut self, stmt: Stmt) -> SpliceResult<Vec<Stmt>> {
        if is_macro_import(&stmt, MACROS_MAGIC) {
            self.collected.push(stmt);
            return Ok(Vec::new());
        }
        Ok(vec![walk_stmt(self, stmt)?])
    }
}

fn is_magic_all(stmt: &Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::Assign { target, .. } if target.is_name("__all__"))
}

fn is_docstring(stmt: &Stmt) -> bool {
    matches!(
        &stmt.kind,
        StmtKind::Expr(value) if matches!(value.kind, ExprKind::Constant(crate::ast::Constant::Str(_)))
    )
}

/// Splices a module `body` into a dialect `template`.
///
/// The result is, in order: the body's docstring, its top-level `__all__`
/// assignments, the template's macro-imports, the body's macro-imports, and the
/// spliced template. Template statements take their location from the first body
/// statement.
pub fn splice_dialect(body: Vec<Stmt>, template: Vec<Stmt>, tag: &str) -> SpliceResult<Vec<Stmt>> {
    let Some(anchor) = body.first().map(|s| s.loc) else {
        return Err(err_msg!(Import, "expected at least one statement in the module body"));
    };
    if template.is_empty() {
        return Ok(body);
    }

    let template: Vec<Stmt> = template
        .into_iter()
        .map(|mut stmt| {
            stmt.loc = anchor;
            fix_missing_locations_stmt(&mut stmt, anchor);
            stmt
        })
        .collect();

    let mut body = body;
    let docstring: Vec<Stmt> = if is_docstring(&body[0]) {
        vec![body.remove(0)]
    } else {
        Vec::new()
    };

    let (magic_all, body): (Vec<Stmt>, Vec<Stmt>) = body.into_iter().partition(is_magic_all);

    let mut template_imports = MacroImportExtractor::default();
    let template = template_imports.visit_body(template)?;
    let mut user_imports = MacroImportExtractor::default();
    let body = user_imports.visit_body(body)?;

    let spliced = splice_statements(body, template, tag)?;

    let mut out = docstring;
    out.extend(magic_all);
    out.extend(template_imports.collected);
    out.extend(user_imports.collected);
    out.extend(spliced);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        ast::Loc,
        syntax::{parse_module, unparse_stmts},
    };

    fn stmts(source: &str) -> Vec<Stmt> {
        parse_module(source, "s.trl").unwrap().body
    }

    #[test]
    fn every_marker_gets_a_copy() {
        let body = stmts("x = 1\n");
        let template = stmts("__paste_here__\nif c:\n    __paste_here__\n");
        let out = splice_statements(body, template, DEFAULT_TAG).unwrap();
        assert_eq!(unparse_stmts(&out), "x = 1\nif c:\n    x = 1\n");
    }

    #[test]
    fn empty_inputs() {
        assert!(splice_statements(vec![], stmts("__paste_here__\n"), DEFAULT_TAG).is_err());
        let body = stmts("x = 1\n");
        assert_eq!(splice_statements(body.clone(), vec![], DEFAULT_TAG).unwrap(), body);
        assert!(splice_statements(body, stmts("pass\n"), DEFAULT_TAG).is_err());
    }

    #[test]
    fn dialect_splice_hoists_module_header() {
        let body = stmts(
            "\"doc\"\n__all__ = [\"f\"]\nfrom user.macros import macros, u\ndef f():\n    return u[1]\n",
        );
        let mut template = stmts("from lib.macros import macros, t\ndef _wrap():\n    __paste_here__\n");
        for stmt in &mut template {
            stmt.loc = None;
        }
        let out = splice_dialect(body, template, DEFAULT_TAG).unwrap();
        assert_eq!(
            unparse_stmts(&out),
            "\"doc\"\n__all__ = [\"f\"]\nfrom lib.macros import macros, t\nfrom user.macros import macros, u\ndef _wrap():\n    def f():\n        return u[1]\n"
        );
        assert_eq!(out[4].loc, Some(Loc::new(1, 0)));
    }
}
