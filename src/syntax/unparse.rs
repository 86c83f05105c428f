//! Tree -> source text.
//!
//! Output re-parses to an equivalent tree (locations aside). Used by macros through
//! `MacroContext::to_source`, by the `expand` CLI command and by the `ast.unparse`
//! runtime helper. `Done` markers are transparent.

use crate::ast::{Constant, Expr, ExprKind, Module, Stmt, StmtKind, UnaryOp};

const INDENT: &str = "    ";

// Binding strengths, loosest first. Binary operators use `BinOp::precedence`.
const PREC_LAMBDA: u8 = 0;
const PREC_OR: u8 = 1;
const PREC_NOT: u8 = 3;
const PREC_UNARY: u8 = 7;
const PREC_POSTFIX: u8 = 8;
const PREC_ATOM: u8 = 9;

pub fn unparse_module(module: &Module) -> String {
    unparse_stmts(&module.body)
}

pub fn unparse_stmts(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    write_block(&mut out, stmts, 0);
    out
}

pub fn unparse_stmt(stmt: &Stmt) -> String {
    unparse_stmts(std::slice::from_ref(stmt))
}

pub fn unparse_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, PREC_LAMBDA);
    out
}

// ============================================================================
// STATEMENTS
// ============================================================================

fn write_block(out: &mut String, stmts: &[Stmt], depth: usize) {
    let before = out.len();
    for stmt in stmts {
        write_stmt(out, stmt, depth);
    }
    if out.len() == before {
        line(out, depth, "pass");
    }
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    match &stmt.kind {
        StmtKind::Expr(value) => line(out, depth, &unparse_expr(value)),
        StmtKind::Assign { target, value } => line(
            out,
            depth,
            &format!("{} = {}", unparse_expr(target), unparse_expr(value)),
        ),
        StmtKind::Import { module, asname } => match asname {
            Some(asname) => line(out, depth, &format!("import {} as {}", module, asname)),
            None => line(out, depth, &format!("import {}", module)),
        },
        StmtKind::ImportFrom {
            module,
            level,
            names,
        } => {
            let names = names
                .iter()
                .map(|alias| match &alias.asname {
                    Some(asname) => format!("{} as {}", alias.name, asname),
                    None => alias.name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let source = format!("{}{}", ".".repeat(*level), module.as_deref().unwrap_or(""));
            line(out, depth, &format!("from {} import {}", source, names));
        }
        StmtKind::With { item, alias, body } => {
            let header = match alias {
                Some(alias) => format!("with {} as {}:", unparse_expr(item), alias),
                None => format!("with {}:", unparse_expr(item)),
            };
            line(out, depth, &header);
            write_block(out, body, depth + 1);
        }
        StmtKind::FunctionDef {
            name,
            params,
            body,
            decorators,
        } => {
            write_decorators(out, decorators, depth);
            line(out, depth, &format!("def {}({}):", name, params.join(", ")));
            write_block(out, body, depth + 1);
        }
        StmtKind::ClassDef {
            name,
            body,
            decorators,
        } => {
            write_decorators(out, decorators, depth);
            line(out, depth, &format!("class {}:", name));
            write_block(out, body, depth + 1);
        }
        StmtKind::Return(value) => match value {
            Some(value) => line(out, depth, &format!("return {}", unparse_expr(value))),
            None => line(out, depth, "return"),
        },
        StmtKind::If { test, body, orelse } => {
            line(out, depth, &format!("if {}:", unparse_expr(test)));
            write_block(out, body, depth + 1);
            write_orelse(out, orelse, depth);
        }
        StmtKind::While { test, body } => {
            line(out, depth, &format!("while {}:", unparse_expr(test)));
            write_block(out, body, depth + 1);
        }
        StmtKind::For { target, iter, body } => {
            line(
                out,
                depth,
                &format!("for {} in {}:", target, unparse_expr(iter)),
            );
            write_block(out, body, depth + 1);
        }
        StmtKind::Assert { test, msg } => match msg {
            Some(msg) => line(
                out,
                depth,
                &format!("assert {}, {}", unparse_expr(test), unparse_expr(msg)),
            ),
            None => line(out, depth, &format!("assert {}", unparse_expr(test))),
        },
        StmtKind::Pass => line(out, depth, "pass"),
        StmtKind::Break => line(out, depth, "break"),
        StmtKind::Continue => line(out, depth, "continue"),
        StmtKind::Done(stmts) => {
            for stmt in stmts {
                write_stmt(out, stmt, depth);
            }
        }
    }
}

fn write_decorators(out: &mut String, decorators: &[Expr], depth: usize) {
    for decorator in decorators {
        line(out, depth, &format!("@{}", unparse_expr(decorator)));
    }
}

fn write_orelse(out: &mut String, orelse: &[Stmt], depth: usize) {
    match orelse {
        [] => {}
        [Stmt {
            kind: StmtKind::If { test, body, orelse },
            ..
        }] => {
            line(out, depth, &format!("elif {}:", unparse_expr(test)));
            write_block(out, body, depth + 1);
            write_orelse(out, orelse, depth);
        }
        _ => {
            line(out, depth, "else:");
            write_block(out, orelse, depth + 1);
        }
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Lambda { .. } | ExprKind::IfExp { .. } => PREC_LAMBDA,
        ExprKind::BinOp { op, .. } => op.precedence(),
        ExprKind::UnaryOp { op: UnaryOp::Not, .. } => PREC_NOT,
        ExprKind::UnaryOp { .. } => PREC_UNARY,
        ExprKind::Constant(Constant::Int(n)) if *n < 0 => PREC_UNARY,
        ExprKind::Call { .. } | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
            PREC_POSTFIX
        }
        ExprKind::Done(inner) => precedence(inner),
        _ => PREC_ATOM,
    }
}

/// Writes `expr`, parenthesized if it binds looser than `min`.
fn write_expr(out: &mut String, expr: &Expr, min: u8) {
    let parens = precedence(expr) < min;
    if parens {
        out.push('(');
    }
    match &expr.kind {
        ExprKind::Name(id) => out.push_str(id),
        ExprKind::Constant(constant) => write_constant(out, constant),
        ExprKind::BinOp { op, left, right } => {
            let prec = op.precedence();
            write_expr(out, left, prec);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            write_expr(out, right, prec + 1);
        }
        ExprKind::UnaryOp { op, operand } => {
            out.push_str(op.symbol());
            let min = if *op == UnaryOp::Not {
                PREC_NOT
            } else {
                PREC_UNARY
            };
            write_expr(out, operand, min);
        }
        ExprKind::Call { func, args } => {
            write_expr(out, func, PREC_POSTFIX);
            out.push('(');
            write_list(out, args);
            out.push(')');
        }
        ExprKind::Attribute { value, attr } => {
            write_expr(out, value, PREC_POSTFIX);
            out.push('.');
            out.push_str(attr);
        }
        ExprKind::Subscript { value, index } => {
            write_expr(out, value, PREC_POSTFIX);
            out.push('[');
            write_expr(out, index, PREC_LAMBDA);
            out.push(']');
        }
        ExprKind::List(items) => {
            out.push('[');
            write_list(out, items);
            out.push(']');
        }
        ExprKind::Tuple(items) => {
            out.push('(');
            write_list(out, items);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::Lambda { params, body } => {
            if params.is_empty() {
                out.push_str("lambda: ");
            } else {
                out.push_str("lambda ");
                out.push_str(&params.join(", "));
                out.push_str(": ");
            }
            write_expr(out, body, PREC_LAMBDA);
        }
        ExprKind::IfExp { test, body, orelse } => {
            write_expr(out, body, PREC_OR);
            out.push_str(" if ");
            write_expr(out, test, PREC_OR);
            out.push_str(" else ");
            write_expr(out, orelse, PREC_LAMBDA);
        }
        ExprKind::Done(inner) => write_expr(out, inner, min),
    }
    if parens {
        out.push(')');
    }
}

fn write_list(out: &mut String, items: &[Expr]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item, PREC_LAMBDA);
    }
}

fn write_constant(out: &mut String, constant: &Constant) {
    match constant {
        Constant::None => out.push_str("None"),
        Constant::Bool(true) => out.push_str("True"),
        Constant::Bool(false) => out.push_str("False"),
        Constant::Int(n) => out.push_str(&n.to_string()),
        Constant::Str(s) => out.push_str(&quote(s)),
    }
}

/// Renders a string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ast::builder;
    use crate::ast::BinOp;
    use crate::syntax::parse_module;

    fn roundtrip(source: &str) {
        let module = parse_module(source, "rt.trl").unwrap();
        assert_eq!(unparse_module(&module), source);
    }

    #[test]
    fn statements_render_canonically() {
        roundtrip("from mypkg.macros import macros, foo as bar\nimport mypkg.macros\nx = double[21]\n");
        roundtrip("@trace\ndef f(a, b):\n    return a + b\n");
        roundtrip("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        roundtrip("with phase[1]:\n    from __self__ import macros, m\n");
    }

    #[test]
    fn parentheses_follow_precedence() {
        let expr = builder::binop(
            builder::binop(builder::int(1), BinOp::Add, builder::int(2)),
            BinOp::Mul,
            builder::name("x"),
        );
        assert_eq!(unparse_expr(&expr), "(1 + 2) * x");
        let expr = builder::binop(
            builder::name("a"),
            BinOp::Sub,
            builder::binop(builder::name("b"), BinOp::Sub, builder::name("c")),
        );
        assert_eq!(unparse_expr(&expr), "a - (b - c)");
    }

    #[test]
    fn empty_bodies_render_pass() {
        let stmt = builder::function_def("f", vec![], vec![]);
        assert_eq!(unparse_stmt(&stmt), "def f():\n    pass\n");
    }

    #[test]
    fn done_markers_are_transparent() {
        let expr = builder::done(builder::name("x"));
        assert_eq!(unparse_expr(&expr), "x");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
    }
}
