//! Inventory of the macro invocations still present in a tree.
//!
//! Mirrors the expander's detection (including the asymmetric subscript descent and
//! the `Done` cut-off) but never calls anything.

use std::collections::BTreeSet;

use super::{detect, BindingTable, SyntaxKind, Tree};
use crate::{
    ast::{Expr, ExprKind, Stmt, StmtKind},
    walker::{walk_expr_ref, walk_stmt_ref, Visitor},
};

pub struct MacroCollector<'b> {
    bindings: &'b BindingTable,
    pub collected: BTreeSet<(String, SyntaxKind)>,
}

impl<'b> MacroCollector<'b> {
    pub fn new(bindings: &'b BindingTable) -> Self {
        Self {
            bindings,
            collected: BTreeSet::new(),
        }
    }

    pub fn collect(&mut self, tree: &Tree) {
        match tree {
            Tree::Expr(expr) => self.visit_expr(expr),
            Tree::Stmts(stmts) => self.visit_body(stmts),
        }
    }

    pub fn clear(&mut self) {
        self.collected.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    fn record(&mut self, name: &str, syntax: SyntaxKind) {
        self.collected.insert((name.to_string(), syntax));
    }
}

impl Visitor for MacroCollector<'_> {
    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Done(_) => {}
            ExprKind::Subscript { value, index } if value.as_name().is_some() => {
                if let Some(name) = detect::expr_macro(expr, self.bindings) {
                    self.record(name, SyntaxKind::Expr);
                }
                self.visit_expr(index);
            }
            _ => {
                if let Some(name) = detect::name_macro(expr, self.bindings) {
                    self.record(name, SyntaxKind::Name);
                }
                walk_expr_ref(self, expr);
            }
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Done(_) => {}
            StmtKind::With { item, body, .. } => {
                match detect::block_macro(stmt, self.bindings) {
                    Some(name) => self.record(name, SyntaxKind::Block),
                    None => self.visit_expr(item),
                }
                self.visit_body(body);
            }
            StmtKind::FunctionDef {
                decorators, body, ..
            }
            | StmtKind::ClassDef {
                decorators, body, ..
            } => {
                for decorator in decorators {
                    match decorator.as_name().filter(|id| self.bindings.is_bound(id)) {
                        Some(name) => {
                            let name = name.to_string();
                            self.record(&name, SyntaxKind::Decorator);
                        }
                        None => self.visit_expr(decorator),
                    }
                }
                self.visit_body(body);
            }
            _ => walk_stmt_ref(self, stmt),
        }
    }
}
