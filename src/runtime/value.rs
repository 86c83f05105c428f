//! Runtime values of the host interpreter.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use super::{module::ModuleObject, Session};
use crate::{
    ast::{Constant, Expr, ExprKind, Stmt},
    dialects::DialectClass,
    err_msg,
    macros::{MacroFunction, MacroResult, Tree},
    syntax::{unparse::quote, unparse_expr, unparse_stmts},
    TrellisError,
};

pub type BuiltinFn = fn(args: &[Value], session: &Session) -> Result<Value, TrellisError>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Module(Rc<ModuleObject>),
    /// What a `class` statement evaluates to.
    Namespace(Rc<Namespace>),
    Macro(Rc<dyn MacroFunction>),
    Dialect(DialectClass),
    Tree(Tree),
}

/// A function defined in Trellis source.
#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub globals: Rc<ModuleObject>,
    /// Enclosing locals, captured at definition time.
    pub closure: im::HashMap<String, Value>,
    /// Set by `namemacro`: bare references invoke the function as a name macro.
    pub name_macro: bool,
}

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

pub struct Namespace {
    pub name: String,
    attrs: RefCell<HashMap<String, Value>>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, attrs: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            attrs: RefCell::new(attrs),
        }
    }

    pub fn get(&self, attr: &str) -> Option<Value> {
        self.attrs.borrow().get(attr).cloned()
    }

    pub fn set(&self, attr: impl Into<String>, value: Value) {
        self.attrs.borrow_mut().insert(attr.into(), value);
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Module(_) => "module",
            Value::Namespace(_) => "class",
            Value::Macro(_) => "macro",
            Value::Dialect(_) => "dialect",
            Value::Tree(_) => "tree",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// `repr()`-style rendering: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => quote(s),
            other => other.to_string(),
        }
    }

    /// Interprets a value returned by a script macro.
    ///
    /// `None` deletes the invocation; a list is a statement sequence; plain scalars
    /// become constants.
    pub fn into_tree(self) -> MacroResult {
        match self {
            Value::None => Ok(None),
            Value::Tree(tree) => Ok(Some(tree)),
            Value::List(items) => {
                let mut stmts = Vec::new();
                for item in items.borrow().iter() {
                    if let Some(tree) = item.clone().into_tree()? {
                        stmts.extend(tree.into_stmts());
                    }
                }
                Ok(Some(Tree::Stmts(stmts)))
            }
            scalar => match scalar.to_constant() {
                Some(constant) => Ok(Some(Tree::Expr(Expr::new(ExprKind::Constant(constant))))),
                None => Err(err_msg!(
                    Type,
                    "a macro must return a tree, a list of trees or None, not {}",
                    scalar.type_name()
                )),
            },
        }
    }

    pub fn to_constant(&self) -> Option<Constant> {
        match self {
            Value::None => Some(Constant::None),
            Value::Bool(b) => Some(Constant::Bool(*b)),
            Value::Int(n) => Some(Constant::Int(*n)),
            Value::Str(s) => Some(Constant::Str(s.clone())),
            _ => None,
        }
    }

    pub fn from_constant(constant: &Constant) -> Self {
        match constant {
            Constant::None => Value::None,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(n) => Value::Int(*n),
            Constant::Str(s) => Value::Str(s.clone()),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => write!(f, "[{}]", join_repr(&items.borrow())),
            Value::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0].repr()),
            Value::Tuple(items) => write!(f, "({})", join_repr(items)),
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name),
            Value::Module(m) => write!(f, "<module '{}'>", m.name()),
            Value::Namespace(ns) => write!(f, "<class '{}'>", ns.name),
            Value::Macro(m) => write!(f, "<macro {}>", m.name()),
            Value::Dialect(d) => write!(f, "<dialect {}>", d.name()),
            Value::Tree(Tree::Expr(expr)) => f.write_str(&unparse_expr(expr)),
            Value::Tree(Tree::Stmts(stmts)) => f.write_str(unparse_stmts(stmts).trim_end()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => Rc::ptr_eq(a, b),
            (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
            (Value::Dialect(a), Value::Dialect(b)) => a.name() == b.name(),
            (Value::Tree(a), Value::Tree(b)) => a == b,
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}({})>", self.name, self.params.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder;

    #[test]
    fn scalars_become_constants() {
        let tree = Value::Int(42).into_tree().unwrap();
        assert_eq!(tree, Some(Tree::Expr(builder::int(42))));
        assert_eq!(Value::None.into_tree().unwrap(), None);
    }

    #[test]
    fn lists_become_statement_sequences() {
        let value = Value::list(vec![
            Value::Tree(Tree::Expr(builder::name("a"))),
            Value::Tree(Tree::Stmts(vec![builder::pass()])),
        ]);
        match value.into_tree().unwrap() {
            Some(Tree::Stmts(stmts)) => assert_eq!(stmts.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn display_follows_surface_syntax() {
        let list = Value::list(vec![Value::Int(1), Value::Str("a".into()), Value::None]);
        assert_eq!(list.to_string(), "[1, \"a\", None]");
        assert_eq!(Value::Tuple(Rc::new(vec![Value::Int(1)])).to_string(), "(1,)");
        assert_eq!(Value::Bool(true), Value::Int(1));
    }
}
