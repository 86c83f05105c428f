//! Modules implemented in Rust.
//!
//! - `trellis`: `gensym` and `dialect`, the constructor for script dialects.
//! - `trellis.ast`: tree constructors, accessors and `splice` for macros and dialects
//!   written in Trellis.
//! - `trellis.debug`: the `step_expansion` and `show_bindings` macros and the
//!   `missing_locations` validator.
//!
//! Native modules have no source file and contribute nothing to dependency mtimes.

use std::rc::Rc;

use super::{
    builtins::expect_arity,
    value::{Builtin, BuiltinFn, Function},
    ModuleObject, Session, Value,
};
use crate::{
    ast::{BinOp, Expr, ExprKind, Stmt, StmtKind},
    debug,
    dialects::{DialectClass, ScriptDialect},
    err_msg,
    macros::Tree,
    splicing::{splice_dialect, DEFAULT_TAG},
    syntax::{parse_expr, parse_module, unparse_expr, unparse_stmts},
    walker::{missing_locations_expr, missing_locations_stmts},
    TrellisError,
};

type NativeResult = Result<Value, TrellisError>;

const MODULES: &[&str] = &["trellis", "trellis.ast", "trellis.debug"];

pub fn is_native(name: &str) -> bool {
    MODULES.contains(&name)
}

const TRELLIS: &[(&str, BuiltinFn)] = &[("dialect", dialect), ("gensym", gensym)];

const TRELLIS_AST: &[(&str, BuiltinFn)] = &[
    ("Assign", ast_assign),
    ("Attribute", ast_attribute),
    ("BinOp", ast_binop),
    ("Call", ast_call),
    ("Constant", ast_constant),
    ("Expr", ast_expr),
    ("List", ast_list),
    ("Name", ast_name),
    ("Return", ast_return),
    ("Subscript", ast_subscript),
    ("Tuple", ast_tuple),
    ("field", ast_field),
    ("kind", ast_kind),
    ("parse", ast_parse),
    ("parse_expr", ast_parse_expr),
    ("splice", ast_splice),
    ("statements", ast_statements),
    ("unparse", ast_unparse),
    ("value", ast_value),
];

const TRELLIS_DEBUG: &[(&str, BuiltinFn)] = &[("missing_locations", missing_locations)];

/// Builds the native module `name`, or `None` if there is no such module.
pub fn build(name: &str) -> Option<Rc<ModuleObject>> {
    let functions = match name {
        "trellis" => TRELLIS,
        "trellis.ast" => TRELLIS_AST,
        "trellis.debug" => TRELLIS_DEBUG,
        _ => return None,
    };

    let package = name.rsplit_once('.').map_or(name, |(p, _)| p);
    let module = Rc::new(ModuleObject::new(name, None, package));
    for (fname, func) in functions {
        module.set(*fname, Value::Builtin(Builtin { name: *fname, func: *func }));
    }
    if name == "trellis.debug" {
        module.set("step_expansion", Value::Macro(Rc::new(debug::step_expansion())));
        module.set("show_bindings", Value::Macro(Rc::new(debug::show_bindings())));
    }
    Some(module)
}

// ============================================================================
// ARGUMENT CONVERSION
// ============================================================================

fn tree(value: Tree) -> Value {
    Value::Tree(value)
}

fn expr_value(expr: Expr) -> Value {
    Value::Tree(Tree::Expr(expr))
}

fn expr_arg(fname: &str, value: &Value) -> Result<Expr, TrellisError> {
    match value {
        Value::Tree(t) => t
            .clone()
            .into_expr()
            .ok_or_else(|| err_msg!(Type, "{}() expects an expression tree, got statements", fname)),
        other => other.to_constant().map(|c| Expr::new(ExprKind::Constant(c))).ok_or_else(|| {
            err_msg!(
                Type,
                "{}() expects a tree or a constant, not {}",
                fname,
                other.type_name()
            )
        }),
    }
}

fn expr_list(fname: &str, value: &Value) -> Result<Vec<Expr>, TrellisError> {
    match value {
        Value::List(items) => items.borrow().iter().map(|v| expr_arg(fname, v)).collect(),
        Value::Tuple(items) => items.iter().map(|v| expr_arg(fname, v)).collect(),
        other => Err(err_msg!(Type, "{}() expects a list, not {}", fname, other.type_name())),
    }
}

fn str_arg<'v>(fname: &str, value: &'v Value) -> Result<&'v str, TrellisError> {
    value
        .as_str()
        .ok_or_else(|| err_msg!(Type, "{}() expects a string, not {}", fname, value.type_name()))
}

fn tree_arg(fname: &str, value: &Value) -> Result<Tree, TrellisError> {
    match value {
        Value::Tree(t) => Ok(t.clone()),
        other => Err(err_msg!(Type, "{}() expects a tree, not {}", fname, other.type_name())),
    }
}

fn hook_arg(fname: &str, value: Option<&Value>) -> Result<Option<Rc<Function>>, TrellisError> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Function(f)) => Ok(Some(f.clone())),
        Some(other) => Err(err_msg!(
            Type,
            "{}() expects a function or None, not {}",
            fname,
            other.type_name()
        )),
    }
}

fn list_of(items: Vec<Value>) -> Value {
    Value::list(items)
}

// ============================================================================
// trellis
// ============================================================================

fn gensym(args: &[Value], session: &Session) -> NativeResult {
    let base = match args {
        [] => "",
        [base] => str_arg("gensym", base)?,
        _ => return Err(err_msg!(Type, "gensym() takes at most 1 argument")),
    };
    Ok(Value::Str(session.gensym(base)))
}

/// `dialect(name, source=None, ast=None, postprocess=None)`
fn dialect(args: &[Value], _session: &Session) -> NativeResult {
    if args.is_empty() || args.len() > 4 {
        return Err(err_msg!(Type, "dialect() takes 1 to 4 arguments but {} were given", args.len()));
    }
    let script = ScriptDialect {
        name: str_arg("dialect", &args[0])?.to_string(),
        source: hook_arg("dialect", args.get(1))?,
        ast: hook_arg("dialect", args.get(2))?,
        postprocess: hook_arg("dialect", args.get(3))?,
    };
    let name = script.name.clone();
    Ok(Value::Dialect(DialectClass::new(name, move || Box::new(script.clone()))))
}

// ============================================================================
// trellis.ast: constructors
// ============================================================================

fn ast_constant(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("Constant", args, 1)?;
    let constant = args[0].to_constant().ok_or_else(|| {
        err_msg!(Type, "Constant() expects None, a bool, an int or a string, not {}", args[0].type_name())
    })?;
    Ok(expr_value(Expr::new(ExprKind::Constant(constant))))
}

fn ast_name(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("Name", args, 1)?;
    Ok(expr_value(Expr::new(ExprKind::Name(str_arg("Name", &args[0])?.to_string()))))
}

fn ast_binop(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("BinOp", args, 3)?;
    let symbol = str_arg("BinOp", &args[1])?;
    let op = BinOp::from_symbol(symbol).ok_or_else(|| err_msg!(Type, "BinOp(): unknown operator '{}'", symbol))?;
    Ok(expr_value(Expr::new(ExprKind::BinOp {
        op,
        left: Box::new(expr_arg("BinOp", &args[0])?),
        right: Box::new(expr_arg("BinOp", &args[2])?),
    })))
}

fn ast_call(args: &[Value], _session: &Session) -> NativeResult {
    let (func, call_args) = match args {
        [func] => (func, Vec::new()),
        [func, call_args] => (func, expr_list("Call", call_args)?),
        _ => return Err(err_msg!(Type, "Call() takes 1 or 2 arguments but {} were given", args.len())),
    };
    Ok(expr_value(Expr::new(ExprKind::Call {
        func: Box::new(expr_arg("Call", func)?),
        args: call_args,
    })))
}

fn ast_attribute(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("Attribute", args, 2)?;
    Ok(expr_value(Expr::new(ExprKind::Attribute {
        value: Box::new(expr_arg("Attribute", &args[0])?),
        attr: str_arg("Attribute", &args[1])?.to_string(),
    })))
}

fn ast_subscript(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("Subscript", args, 2)?;
    Ok(expr_value(Expr::new(ExprKind::Subscript {
        value: Box::new(expr_arg("Subscript", &args[0])?),
        index: Box::new(expr_arg("Subscript", &args[1])?),
    })))
}

fn ast_list(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("List", args, 1)?;
    Ok(expr_value(Expr::new(ExprKind::List(expr_list("List", &args[0])?))))
}

fn ast_tuple(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("Tuple", args, 1)?;
    Ok(expr_value(Expr::new(ExprKind::Tuple(expr_list("Tuple", &args[0])?))))
}

fn ast_assign(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("Assign", args, 2)?;
    let target = match &args[0] {
        Value::Str(name) => Expr::new(ExprKind::Name(name.clone())),
        other => expr_arg("Assign", other)?,
    };
    let value = expr_arg("Assign", &args[1])?;
    Ok(tree(Tree::Stmts(vec![Stmt::new(StmtKind::Assign { target, value })])))
}

fn ast_expr(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("Expr", args, 1)?;
    let value = expr_arg("Expr", &args[0])?;
    Ok(tree(Tree::Stmts(vec![Stmt::new(StmtKind::Expr(value))])))
}

fn ast_return(args: &[Value], _session: &Session) -> NativeResult {
    let value = match args {
        [] => None,
        [value] => Some(expr_arg("Return", value)?),
        _ => return Err(err_msg!(Type, "Return() takes at most 1 argument")),
    };
    Ok(tree(Tree::Stmts(vec![Stmt::new(StmtKind::Return(value))])))
}

// ============================================================================
// trellis.ast: accessors
// ============================================================================

/// The node type of a tree: `BinOp`, `Assign`, ... or `Stmts` for a sequence.
fn ast_kind(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("kind", args, 1)?;
    let t = tree_arg("kind", &args[0])?;
    Ok(Value::Str(kind_of(&t).to_string()))
}

/// The payload of a leaf: a constant's value or a name's identifier.
fn ast_value(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("value", args, 1)?;
    let t = tree_arg("value", &args[0])?;
    match t.as_expr().map(|e| &e.kind) {
        Some(ExprKind::Constant(c)) => Ok(Value::from_constant(c)),
        Some(ExprKind::Name(id)) => Ok(Value::Str(id.clone())),
        _ => Err(err_msg!(Type, "value() expects a Constant or Name node")),
    }
}

fn ast_field(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("field", args, 2)?;
    let t = tree_arg("field", &args[0])?;
    let field = str_arg("field", &args[1])?;
    let found = match &t {
        Tree::Expr(expr) => expr_field(expr, field),
        Tree::Stmts(stmts) if stmts.len() == 1 => stmt_field(&stmts[0], field),
        Tree::Stmts(_) => None,
    };
    found.ok_or_else(|| err_msg!(Type, "'{}' node has no field '{}'", kind_of(&t), field))
}

fn kind_of(t: &Tree) -> &'static str {
    match t {
        Tree::Expr(expr) => expr.type_name(),
        Tree::Stmts(stmts) if stmts.len() == 1 => stmts[0].type_name(),
        Tree::Stmts(_) => "Stmts",
    }
}

fn boxed(expr: &Expr) -> Value {
    expr_value(expr.clone())
}

fn expr_list_value(exprs: &[Expr]) -> Value {
    list_of(exprs.iter().map(boxed).collect())
}

fn stmt_list_value(stmts: &[Stmt]) -> Value {
    tree(Tree::Stmts(stmts.to_vec()))
}

fn names_value(names: &[String]) -> Value {
    list_of(names.iter().map(|n| Value::Str(n.clone())).collect())
}

fn expr_field(expr: &Expr, field: &str) -> Option<Value> {
    let value = match (&expr.kind, field) {
        (ExprKind::Name(id), "id") => Value::Str(id.clone()),
        (ExprKind::Constant(c), "value") => Value::from_constant(c),
        (ExprKind::BinOp { left, .. }, "left") => boxed(left),
        (ExprKind::BinOp { right, .. }, "right") => boxed(right),
        (ExprKind::BinOp { op, .. }, "op") => Value::Str(op.symbol().to_string()),
        (ExprKind::UnaryOp { operand, .. }, "operand") => boxed(operand),
        (ExprKind::UnaryOp { op, .. }, "op") => Value::Str(op.symbol().to_string()),
        (ExprKind::Call { func, .. }, "func") => boxed(func),
        (ExprKind::Call { args, .. }, "args") => expr_list_value(args),
        (ExprKind::Attribute { value, .. }, "value") => boxed(value),
        (ExprKind::Attribute { attr, .. }, "attr") => Value::Str(attr.clone()),
        (ExprKind::Subscript { value, .. }, "value") => boxed(value),
        (ExprKind::Subscript { index, .. }, "index") => boxed(index),
        (ExprKind::List(items) | ExprKind::Tuple(items), "elts") => expr_list_value(items),
        (ExprKind::Lambda { params, .. }, "params") => names_value(params),
        (ExprKind::Lambda { body, .. }, "body") => boxed(body),
        (ExprKind::IfExp { test, .. }, "test") => boxed(test),
        (ExprKind::IfExp { body, .. }, "body") => boxed(body),
        (ExprKind::IfExp { orelse, .. }, "orelse") => boxed(orelse),
        _ => return None,
    };
    Some(value)
}

fn stmt_field(stmt: &Stmt, field: &str) -> Option<Value> {
    let value = match (&stmt.kind, field) {
        (StmtKind::Expr(value), "value") => boxed(value),
        (StmtKind::Assign { target, .. }, "target") => boxed(target),
        (StmtKind::Assign { value, .. }, "value") => boxed(value),
        (StmtKind::Return(value), "value") => value.as_ref().map_or(Value::None, boxed),
        (StmtKind::FunctionDef { name, .. } | StmtKind::ClassDef { name, .. }, "name") => Value::Str(name.clone()),
        (StmtKind::FunctionDef { params, .. }, "params") => names_value(params),
        (
            StmtKind::FunctionDef { body, .. }
            | StmtKind::ClassDef { body, .. }
            | StmtKind::With { body, .. }
            | StmtKind::If { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::For { body, .. },
            "body",
        ) => stmt_list_value(body),
        (StmtKind::With { item, .. }, "item") => boxed(item),
        (StmtKind::If { test, .. } | StmtKind::While { test, .. }, "test") => boxed(test),
        (StmtKind::If { orelse, .. }, "orelse") => stmt_list_value(orelse),
        (StmtKind::For { target, .. }, "target") => Value::Str(target.clone()),
        (StmtKind::For { iter, .. }, "iter") => boxed(iter),
        _ => return None,
    };
    Some(value)
}

/// Splits a statement tree into a list of one-statement trees.
fn ast_statements(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("statements", args, 1)?;
    let stmts = tree_arg("statements", &args[0])?.into_stmts();
    Ok(list_of(
        stmts
            .into_iter()
            .map(|s| tree(Tree::Stmts(vec![s])))
            .collect(),
    ))
}

fn ast_unparse(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("unparse", args, 1)?;
    let source = match tree_arg("unparse", &args[0])? {
        Tree::Expr(expr) => unparse_expr(&expr),
        Tree::Stmts(stmts) => unparse_stmts(&stmts),
    };
    Ok(Value::Str(source))
}

fn ast_parse(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("parse", args, 1)?;
    let module = parse_module(str_arg("parse", &args[0])?, "<parse>")?;
    Ok(tree(Tree::Stmts(module.body)))
}

fn ast_parse_expr(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("parse_expr", args, 1)?;
    Ok(expr_value(parse_expr(str_arg("parse_expr", &args[0])?, "<parse>")?))
}

/// `splice(body, template, tag="__paste_here__")`: pastes `body` into a dialect
/// template, hoisting the docstring and macro-imports.
fn ast_splice(args: &[Value], _session: &Session) -> NativeResult {
    let (body, template, tag) = match args {
        [body, template] => (body, template, DEFAULT_TAG),
        [body, template, tag] => (body, template, str_arg("splice", tag)?),
        _ => return Err(err_msg!(Type, "splice() takes 2 or 3 arguments but {} were given", args.len())),
    };
    let body = tree_arg("splice", body)?.into_stmts();
    let template = tree_arg("splice", template)?.into_stmts();
    Ok(tree(Tree::Stmts(splice_dialect(body, template, tag)?)))
}

// ============================================================================
// trellis.debug
// ============================================================================

/// Node types in a tree that have no location.
fn missing_locations(args: &[Value], _session: &Session) -> NativeResult {
    expect_arity("missing_locations", args, 1)?;
    let missing = match tree_arg("missing_locations", &args[0])? {
        Tree::Expr(expr) => missing_locations_expr(&expr),
        Tree::Stmts(stmts) => missing_locations_stmts(&stmts),
    };
    Ok(list_of(missing.into_iter().map(|n| Value::Str(n.to_string())).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_expr;

    fn call(module: &str, name: &str, args: &[Value]) -> NativeResult {
        let session = Session::default();
        let module = build(module).unwrap();
        session.call_value(&module.get(name).unwrap(), args.to_vec())
    }

    fn expr(source: &str) -> Value {
        Value::Tree(Tree::Expr(parse_expr(source, "t.trl").unwrap()))
    }

    #[test]
    fn constructors_build_trees() {
        let doubled = call("trellis.ast", "BinOp", &[expr("x"), Value::Str("*".into()), Value::Int(2)]).unwrap();
        assert_eq!(doubled.to_string(), "x * 2");
        let called = call("trellis.ast", "Call", &[expr("f"), Value::list(vec![Value::Int(1)])]).unwrap();
        assert_eq!(called.to_string(), "f(1)");
        let assign = call("trellis.ast", "Assign", &[Value::Str("y".into()), called]).unwrap();
        assert_eq!(assign.to_string(), "y = f(1)");
    }

    #[test]
    fn accessors_read_fields() {
        let tree = expr("a + 1");
        assert_eq!(call("trellis.ast", "kind", &[tree.clone()]).unwrap(), Value::Str("BinOp".into()));
        let right = call("trellis.ast", "field", &[tree.clone(), Value::Str("right".into())]).unwrap();
        assert_eq!(call("trellis.ast", "value", &[right]).unwrap(), Value::Int(1));
        assert!(call("trellis.ast", "field", &[tree, Value::Str("nope".into())]).is_err());
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let err = call("trellis.ast", "BinOp", &[Value::Int(1), Value::Str("**".into()), Value::Int(2)]).unwrap_err();
        assert!(err.message().contains("unknown operator"));
    }

    #[test]
    fn splice_pastes_into_templates() {
        let body = Value::Tree(Tree::Stmts(parse_module("x = 1\n", "b.trl").unwrap().body));
        let template = Value::Tree(Tree::Stmts(
            parse_module("def _main():\n    __paste_here__\n_main()\n", "t.trl").unwrap().body,
        ));
        let spliced = call("trellis.ast", "splice", &[body, template]).unwrap();
        assert_eq!(spliced.to_string(), "def _main():\n    x = 1\n_main()");
    }

    #[test]
    fn native_module_names() {
        assert!(is_native("trellis.ast"));
        assert!(!is_native("trellis.other"));
        assert!(build("trellis.other").is_none());
        let debug = build("trellis.debug").unwrap();
        assert!(matches!(debug.get("step_expansion"), Some(Value::Macro(_))));
    }

    #[test]
    fn dialect_classes_carry_their_name() {
        let value = call("trellis", "dialect", &[Value::Str("Shout".into())]).unwrap();
        match value {
            Value::Dialect(class) => assert_eq!(class.instantiate().name(), "Shout"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
