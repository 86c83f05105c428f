//! Generic tree traversal.
//!
//! - [`Transformer`]: owning rewrite. Each hook takes a node by value and returns its
//!   replacement; a statement hook may return zero or many statements.
//! - [`Visitor`]: read-only traversal.
//!
//! The default `walk_*` functions descend into every child, including the contents of
//! `Done` markers. The macro expander overrides the hooks to stop at those.

use crate::{
    ast::{Expr, ExprKind, Loc, Module, Stmt, StmtKind},
    TrellisError,
};

type WalkResult<T> = Result<T, TrellisError>;

// ============================================================================
// OWNING REWRITE
// ============================================================================

pub trait Transformer {
    fn visit_expr(&mut self, expr: Expr) -> WalkResult<Expr> {
        walk_expr(self, expr)
    }

    fn visit_stmt(&mut self, stmt: Stmt) -> WalkResult<Vec<Stmt>> {
        Ok(vec![walk_stmt(self, stmt)?])
    }

    fn visit_body(&mut self, body: Vec<Stmt>) -> WalkResult<Vec<Stmt>> {
        walk_body(self, body)
    }

    fn visit_module(&mut self, module: Module) -> WalkResult<Module> {
        Ok(Module::new(self.visit_body(module.body)?))
    }
}

pub fn walk_body<T: Transformer + ?Sized>(t: &mut T, body: Vec<Stmt>) -> WalkResult<Vec<Stmt>> {
    let mut out = Vec::with_capacity(body.len());
    for stmt in body {
        out.extend(t.visit_stmt(stmt)?);
    }
    Ok(out)
}

fn visit_boxed<T: Transformer + ?Sized>(t: &mut T, expr: Box<Expr>) -> WalkResult<Box<Expr>> {
    Ok(Box::new(t.visit_expr(*expr)?))
}

fn visit_all<T: Transformer + ?Sized>(t: &mut T, exprs: Vec<Expr>) -> WalkResult<Vec<Expr>> {
    exprs.into_iter().map(|e| t.visit_expr(e)).collect()
}

/// Rebuilds `expr` with every child passed through `t.visit_expr`.
pub fn walk_expr<T: Transformer + ?Sized>(t: &mut T, expr: Expr) -> WalkResult<Expr> {
    let Expr { kind, loc } = expr;
    let kind = match kind {
        ExprKind::Name(_) | ExprKind::Constant(_) => kind,
        ExprKind::BinOp { op, left, right } => ExprKind::BinOp {
            op,
            left: visit_boxed(t, left)?,
            right: visit_boxed(t, right)?,
        },
        ExprKind::UnaryOp { op, operand } => ExprKind::UnaryOp {
            op,
            operand: visit_boxed(t, operand)?,
        },
        ExprKind::Call { func, args } => ExprKind::Call {
            func: visit_boxed(t, func)?,
            args: visit_all(t, args)?,
        },
        ExprKind::Attribute { value, attr } => ExprKind::Attribute {
            value: visit_boxed(t, value)?,
            attr,
        },
        ExprKind::Subscript { value, index } => ExprKind::Subscript {
            value: visit_boxed(t, value)?,
            index: visit_boxed(t, index)?,
        },
        ExprKind::List(items) => ExprKind::List(visit_all(t, items)?),
        ExprKind::Tuple(items) => ExprKind::Tuple(visit_all(t, items)?),
        ExprKind::Lambda { params, body } => ExprKind::Lambda {
            params,
            body: visit_boxed(t, body)?,
        },
        ExprKind::IfExp { test, body, orelse } => ExprKind::IfExp {
            test: visit_boxed(t, test)?,
            body: visit_boxed(t, body)?,
            orelse: visit_boxed(t, orelse)?,
        },
        ExprKind::Done(inner) => ExprKind::Done(visit_boxed(t, inner)?),
    };
    Ok(Expr { kind, loc })
}

/// Rebuilds `stmt` with child expressions and bodies passed through `t`.
pub fn walk_stmt<T: Transformer + ?Sized>(t: &mut T, stmt: Stmt) -> WalkResult<Stmt> {
    let Stmt { kind, loc } = stmt;
    let kind = match kind {
        StmtKind::Expr(value) => StmtKind::Expr(t.visit_expr(value)?),
        StmtKind::Assign { target, value } => StmtKind::Assign {
            target: t.visit_expr(target)?,
            value: t.visit_expr(value)?,
        },
        StmtKind::With { item, alias, body } => StmtKind::With {
            item: t.visit_expr(item)?,
            alias,
            body: t.visit_body(body)?,
        },
        StmtKind::FunctionDef {
            name,
            params,
            body,
            decorators,
        } => StmtKind::FunctionDef {
            name,
            params,
            decorators: visit_all(t, decorators)?,
            body: t.visit_body(body)?,
        },
        StmtKind::ClassDef {
            name,
            body,
            decorators,
        } => StmtKind::ClassDef {
            name,
            decorators: visit_all(t, decorators)?,
            body: t.visit_body(body)?,
        },
        StmtKind::Return(value) => StmtKind::Return(value.map(|v| t.visit_expr(v)).transpose()?),
        StmtKind::If { test, body, orelse } => StmtKind::If {
            test: t.visit_expr(test)?,
            body: t.visit_body(body)?,
            orelse: t.visit_body(orelse)?,
        },
        StmtKind::While { test, body } => StmtKind::While {
            test: t.visit_expr(test)?,
            body: t.visit_body(body)?,
        },
        StmtKind::For { target, iter, body } => StmtKind::For {
            target,
            iter: t.visit_expr(iter)?,
            body: t.visit_body(body)?,
        },
        StmtKind::Assert { test, msg } => StmtKind::Assert {
            test: t.visit_expr(test)?,
            msg: msg.map(|m| t.visit_expr(m)).transpose()?,
        },
        StmtKind::Done(stmts) => StmtKind::Done(t.visit_body(stmts)?),
        StmtKind::Import { .. }
        | StmtKind::ImportFrom { .. }
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue => kind,
    };
    Ok(Stmt { kind, loc })
}

// ============================================================================
// READ-ONLY TRAVERSAL
// ============================================================================

pub trait Visitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr_ref(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt_ref(self, stmt);
    }

    fn visit_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }
}

pub fn walk_expr_ref<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    for child in expr_children(expr) {
        v.visit_expr(child);
    }
}

pub fn walk_stmt_ref<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    let (exprs, bodies) = stmt_parts(stmt);
    for expr in exprs {
        v.visit_expr(expr);
    }
    for body in bodies {
        v.visit_body(body);
    }
}

/// Direct child expressions of `expr`, in source order.
pub fn expr_children(expr: &Expr) -> Vec<&Expr> {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Constant(_) => Vec::new(),
        ExprKind::BinOp { left, right, .. } => vec![&**left, &**right],
        ExprKind::UnaryOp { operand, .. } => vec![&**operand],
        ExprKind::Call { func, args } => std::iter::once(&**func).chain(args).collect(),
        ExprKind::Attribute { value, .. } => vec![&**value],
        ExprKind::Subscript { value, index } => vec![&**value, &**index],
        ExprKind::List(items) | ExprKind::Tuple(items) => items.iter().collect(),
        ExprKind::Lambda { body, .. } => vec![&**body],
        ExprKind::IfExp { test, body, orelse } => vec![&**body, &**test, &**orelse],
        ExprKind::Done(inner) => vec![&**inner],
    }
}

/// Child expressions and child statement bodies of `stmt`.
pub fn stmt_parts(stmt: &Stmt) -> (Vec<&Expr>, Vec<&[Stmt]>) {
    match &stmt.kind {
        StmtKind::Expr(value) => (vec![value], vec![]),
        StmtKind::Assign { target, value } => (vec![target, value], vec![]),
        StmtKind::With { item, body, .. } => (vec![item], vec![body.as_slice()]),
        StmtKind::FunctionDef {
            body, decorators, ..
        }
        | StmtKind::ClassDef {
            body, decorators, ..
        } => (decorators.iter().collect(), vec![body.as_slice()]),
        StmtKind::Return(value) => (value.iter().collect(), vec![]),
        StmtKind::If { test, body, orelse } => {
            (vec![test], vec![body.as_slice(), orelse.as_slice()])
        }
        StmtKind::While { test, body } => (vec![test], vec![body.as_slice()]),
        StmtKind::For { iter, body, .. } => (vec![iter], vec![body.as_slice()]),
        StmtKind::Assert { test, msg } => (std::iter::once(test).chain(msg).collect(), vec![]),
        StmtKind::Done(stmts) => (vec![], vec![stmts.as_slice()]),
        StmtKind::Import { .. }
        | StmtKind::ImportFrom { .. }
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue => (vec![], vec![]),
    }
}

fn expr_children_mut(expr: &mut Expr) -> Vec<&mut Expr> {
    match &mut expr.kind {
        ExprKind::Name(_) | ExprKind::Constant(_) => Vec::new(),
        ExprKind::BinOp { left, right, .. } => vec![&mut **left, &mut **right],
        ExprKind::UnaryOp { operand, .. } => vec![&mut **operand],
        ExprKind::Call { func, args } => std::iter::once(&mut **func).chain(args.iter_mut()).collect(),
        ExprKind::Attribute { value, .. } => vec![&mut **value],
        ExprKind::Subscript { value, index } => vec![&mut **value, &mut **index],
        ExprKind::List(items) | ExprKind::Tuple(items) => items.iter_mut().collect(),
        ExprKind::Lambda { body, .. } => vec![&mut **body],
        ExprKind::IfExp { test, body, orelse } => vec![&mut **body, &mut **test, &mut **orelse],
        ExprKind::Done(inner) => vec![&mut **inner],
    }
}

fn stmt_parts_mut(stmt: &mut Stmt) -> (Vec<&mut Expr>, Vec<&mut Vec<Stmt>>) {
    match &mut stmt.kind {
        StmtKind::Expr(value) => (vec![value], vec![]),
        StmtKind::Assign { target, value } => (vec![target, value], vec![]),
        StmtKind::With { item, body, .. } => (vec![item], vec![body]),
        StmtKind::FunctionDef {
            body, decorators, ..
        }
        | StmtKind::ClassDef {
            body, decorators, ..
        } => (decorators.iter_mut().collect(), vec![body]),
        StmtKind::Return(value) => (value.iter_mut().collect(), vec![]),
        StmtKind::If { test, body, orelse } => (vec![test], vec![body, orelse]),
        StmtKind::While { test, body } => (vec![test], vec![body]),
        StmtKind::For { iter, body, .. } => (vec![iter], vec![body]),
        StmtKind::Assert { test, msg } => {
            (std::iter::once(test).chain(msg.iter_mut()).collect(), vec![])
        }
        StmtKind::Done(stmts) => (vec![], vec![stmts]),
        StmtKind::Import { .. }
        | StmtKind::ImportFrom { .. }
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue => (vec![], vec![]),
    }
}

// ============================================================================
// LOCATIONS
// ============================================================================

/// Fills every missing location in `expr` from its nearest located ancestor, with
/// `parent` standing in for the ancestors outside `expr`.
pub fn fix_missing_locations_expr(expr: &mut Expr, parent: Option<Loc>) {
    if expr.loc.is_none() {
        expr.loc = parent;
    }
    let here = expr.loc;
    for child in expr_children_mut(expr) {
        fix_missing_locations_expr(child, here);
    }
}

pub fn fix_missing_locations_stmt(stmt: &mut Stmt, parent: Option<Loc>) {
    if stmt.loc.is_none() {
        stmt.loc = parent;
    }
    let here = stmt.loc;
    let (exprs, bodies) = stmt_parts_mut(stmt);
    for expr in exprs {
        fix_missing_locations_expr(expr, here);
    }
    for body in bodies {
        fix_missing_locations_stmts(body, here);
    }
}

pub fn fix_missing_locations_stmts(stmts: &mut [Stmt], parent: Option<Loc>) {
    for stmt in stmts {
        fix_missing_locations_stmt(stmt, parent);
    }
}

/// Fills missing locations in a whole module. A top-level statement with no location
/// inherits the previous statement's; the first one falls back to `1:0`.
pub fn fix_missing_locations_module(module: &mut Module) {
    let mut previous = Loc::new(1, 0);
    for stmt in &mut module.body {
        fix_missing_locations_stmt(stmt, Some(previous));
        if let Some(loc) = stmt.loc {
            previous = loc;
        }
    }
}

struct MissingLocations(Vec<&'static str>);

impl Visitor for MissingLocations {
    fn visit_expr(&mut self, expr: &Expr) {
        if expr.loc.is_none() {
            self.0.push(expr.type_name());
        }
        walk_expr_ref(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        if stmt.loc.is_none() {
            self.0.push(stmt.type_name());
        }
        walk_stmt_ref(self, stmt);
    }
}

/// Node types of every expression and statement that lacks a location.
pub fn missing_locations(module: &Module) -> Vec<&'static str> {
    missing_locations_stmts(&module.body)
}

pub fn missing_locations_stmts(stmts: &[Stmt]) -> Vec<&'static str> {
    let mut missing = MissingLocations(Vec::new());
    missing.visit_body(stmts);
    missing.0
}

pub fn missing_locations_expr(expr: &Expr) -> Vec<&'static str> {
    let mut missing = MissingLocations(Vec::new());
    missing.visit_expr(expr);
    missing.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder;

    struct Renamer;

    impl Transformer for Renamer {
        fn visit_expr(&mut self, expr: Expr) -> WalkResult<Expr> {
            if expr.is_name("a") {
                Ok(Expr::at(ExprKind::Name("b".into()), expr.loc))
            } else {
                walk_expr(self, expr)
            }
        }
    }

    struct DropPass;

    impl Transformer for DropPass {
        fn visit_stmt(&mut self, stmt: Stmt) -> WalkResult<Vec<Stmt>> {
            match stmt.kind {
                StmtKind::Pass => Ok(vec![]),
                _ => Ok(vec![walk_stmt(self, stmt)?]),
            }
        }
    }

    #[test]
    fn transformer_rewrites_nested_names() {
        let stmt = builder::expr_stmt(builder::call(
            builder::name("f"),
            vec![builder::binop(builder::name("a"), crate::ast::BinOp::Add, builder::int(1))],
        ));
        let out = Renamer.visit_stmt(stmt).unwrap();
        let text = crate::syntax::unparse_stmts(&out);
        assert_eq!(text, "f(b + 1)\n");
    }

    #[test]
    fn statement_hooks_can_delete() {
        let body = vec![
            builder::pass(),
            builder::function_def("f", vec![], vec![builder::pass(), builder::ret(None)]),
        ];
        let out = DropPass.visit_body(body).unwrap();
        assert_eq!(out.len(), 1);
        match &out[0].kind {
            StmtKind::FunctionDef { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_locations_inherit_from_ancestors() {
        let mut stmt = builder::expr_stmt(builder::call(builder::name("f"), vec![builder::int(1)]));
        stmt.loc = Some(Loc::new(4, 2));
        fix_missing_locations_stmt(&mut stmt, None);
        let module = Module::new(vec![stmt]);
        assert!(missing_locations(&module).is_empty());
        match &module.body[0].kind {
            StmtKind::Expr(call) => assert_eq!(call.loc, Some(Loc::new(4, 2))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn top_level_statements_inherit_from_previous() {
        let mut first = builder::pass();
        first.loc = Some(Loc::new(3, 0));
        let mut module = Module::new(vec![builder::pass(), first, builder::pass()]);
        fix_missing_locations_module(&mut module);
        let locs: Vec<_> = module.body.iter().map(|s| s.loc).collect();
        assert_eq!(
            locs,
            vec![Some(Loc::new(1, 0)), Some(Loc::new(3, 0)), Some(Loc::new(3, 0))]
        );
    }
}
