//! Terse constructors for building trees by hand.
//!
//! Macro and dialect authors build their output with these; the resulting nodes carry no
//! location, which the expander fills in from the invocation site.

use super::{Alias, BinOp, Constant, Expr, ExprKind, Stmt, StmtKind, UnaryOp};

pub fn name(id: impl Into<String>) -> Expr {
    Expr::new(ExprKind::Name(id.into()))
}

pub fn int(value: i64) -> Expr {
    Expr::new(ExprKind::Constant(Constant::Int(value)))
}

pub fn string(value: impl Into<String>) -> Expr {
    Expr::new(ExprKind::Constant(Constant::Str(value.into())))
}

pub fn boolean(value: bool) -> Expr {
    Expr::new(ExprKind::Constant(Constant::Bool(value)))
}

pub fn none() -> Expr {
    Expr::new(ExprKind::Constant(Constant::None))
}

pub fn binop(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::new(ExprKind::BinOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::new(ExprKind::UnaryOp {
        op,
        operand: Box::new(operand),
    })
}

pub fn call(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call {
        func: Box::new(func),
        args,
    })
}

pub fn attribute(value: Expr, attr: impl Into<String>) -> Expr {
    Expr::new(ExprKind::Attribute {
        value: Box::new(value),
        attr: attr.into(),
    })
}

pub fn subscript(value: Expr, index: Expr) -> Expr {
    Expr::new(ExprKind::Subscript {
        value: Box::new(value),
        index: Box::new(index),
    })
}

pub fn list(items: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::List(items))
}

pub fn tuple(items: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Tuple(items))
}

pub fn done(expr: Expr) -> Expr {
    Expr::at(ExprKind::Done(Box::new(expr.clone())), expr.loc)
}

pub fn expr_stmt(value: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(value))
}

pub fn assign(target: impl Into<String>, value: Expr) -> Stmt {
    Stmt::new(StmtKind::Assign {
        target: name(target),
        value,
    })
}

pub fn import(module: impl Into<String>) -> Stmt {
    Stmt::new(StmtKind::Import {
        module: module.into(),
        asname: None,
    })
}

pub fn import_from(module: impl Into<String>, names: Vec<Alias>) -> Stmt {
    Stmt::new(StmtKind::ImportFrom {
        module: Some(module.into()),
        level: 0,
        names,
    })
}

pub fn pass() -> Stmt {
    Stmt::new(StmtKind::Pass)
}

pub fn ret(value: Option<Expr>) -> Stmt {
    Stmt::new(StmtKind::Return(value))
}

pub fn function_def(name: impl Into<String>, params: Vec<String>, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::FunctionDef {
        name: name.into(),
        params,
        body,
        decorators: Vec::new(),
    })
}

pub fn with(item: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::With {
        item,
        alias: None,
        body,
    })
}

pub fn done_stmts(stmts: Vec<Stmt>) -> Stmt {
    let loc = stmts.first().and_then(|s| s.loc);
    Stmt::at(StmtKind::Done(stmts), loc)
}
