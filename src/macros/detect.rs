//! Invocation shape detection.
//!
//! Each matcher recognizes exactly one shape and answers with the bound macro name.
//! They never look below the node they are given; recursion is the caller's business.

use super::BindingTable;
use crate::ast::{Expr, ExprKind, Stmt, StmtKind};

/// `name[...]` with `name` bound.
pub fn expr_macro<'e>(expr: &'e Expr, bindings: &BindingTable) -> Option<&'e str> {
    match &expr.kind {
        ExprKind::Subscript { value, .. } => value.as_name().filter(|id| bindings.is_bound(id)),
        _ => None,
    }
}

/// A bare `name` bound to a macro that opted in to name invocation.
pub fn name_macro<'e>(expr: &'e Expr, bindings: &BindingTable) -> Option<&'e str> {
    let id = expr.as_name()?;
    bindings
        .get(id)
        .filter(|m| m.is_name_macro())
        .map(|_| id)
}

/// `with name [as alias]:` with `name` bound.
pub fn block_macro<'s>(stmt: &'s Stmt, bindings: &BindingTable) -> Option<&'s str> {
    match &stmt.kind {
        StmtKind::With { item, .. } => item.as_name().filter(|id| bindings.is_bound(id)),
        _ => None,
    }
}

/// Bound bare-name decorators of a `def` or `class`, outermost first.
pub fn decorator_macros<'s>(stmt: &'s Stmt, bindings: &BindingTable) -> Vec<&'s str> {
    match &stmt.kind {
        StmtKind::FunctionDef { decorators, .. } | StmtKind::ClassDef { decorators, .. } => {
            decorators
                .iter()
                .filter_map(|d| d.as_name())
                .filter(|id| bindings.is_bound(id))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Splits a decorator list into macro names and the remaining decorators. Order is kept
/// within each part.
pub fn split_decorators(decorators: Vec<Expr>, bindings: &BindingTable) -> (Vec<String>, Vec<Expr>) {
    let mut macros = Vec::new();
    let mut others = Vec::new();
    for decorator in decorators {
        match decorator.as_name() {
            Some(id) if bindings.is_bound(id) => macros.push(id.to_string()),
            _ => others.push(decorator),
        }
    }
    (macros, others)
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        ast::builder,
        macros::{NativeMacro, Tree},
    };

    fn bindings() -> BindingTable {
        let mut table = BindingTable::new();
        table.insert("m", Rc::new(NativeMacro::new("m", |t: Tree, _| Ok(Some(t)))));
        table.insert(
            "it",
            Rc::new(NativeMacro::new("it", |t: Tree, _| Ok(Some(t))).name_macro()),
        );
        table
    }

    #[test]
    fn subscript_with_bound_base() {
        let table = bindings();
        let hit = builder::subscript(builder::name("m"), builder::int(1));
        let miss = builder::subscript(builder::name("x"), builder::int(1));
        let nested = builder::subscript(builder::attribute(builder::name("m"), "a"), builder::int(1));
        assert_eq!(expr_macro(&hit, &table), Some("m"));
        assert_eq!(expr_macro(&miss, &table), None);
        assert_eq!(expr_macro(&nested, &table), None);
    }

    #[test]
    fn names_require_opt_in() {
        let table = bindings();
        assert_eq!(name_macro(&builder::name("it"), &table), Some("it"));
        assert_eq!(name_macro(&builder::name("m"), &table), None);
    }

    #[test]
    fn decorators_split_in_order() {
        let table = bindings();
        let decorators = vec![
            builder::name("m"),
            builder::name("plain"),
            builder::name("it"),
            builder::call(builder::name("m"), vec![]),
        ];
        let (macros, others) = split_decorators(decorators, &table);
        assert_eq!(macros, vec!["m", "it"]);
        assert_eq!(others.len(), 2);
        assert!(others[0].is_name("plain"));
    }

    #[test]
    fn with_items_must_be_bare_names() {
        let table = bindings();
        let hit = builder::with(builder::name("m"), vec![builder::pass()]);
        let miss = builder::with(builder::call(builder::name("m"), vec![]), vec![]);
        assert_eq!(block_macro(&hit, &table), Some("m"));
        assert_eq!(block_macro(&miss, &table), None);
    }
}
