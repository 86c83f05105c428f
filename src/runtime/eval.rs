//! Tree-walking evaluation of expanded modules.
//!
//! The interpreter only ever sees fully expanded trees: by the time a module runs,
//! every macro invocation, dialect import and phase marker is gone. A `with` statement
//! reaching evaluation is therefore an error.
//!
//! ## Scopes
//!
//! Module-level code reads and writes the module namespace directly. Function bodies
//! run in a [`Frame`] of locals seeded from the closure captured at definition time;
//! lookups fall back to the module namespace and then to the builtins. Closures are
//! `im::HashMap` snapshots, so capturing is a cheap clone.

use std::{collections::HashMap, rc::Rc};

use super::{
    builtins,
    module::ModuleObject,
    value::{Function, Namespace},
    Session, Value,
};
use crate::{
    ast::{BinOp, Expr, ExprKind, Loc, Stmt, StmtKind, UnaryOp},
    err_at, err_msg,
    importer::resolve_name,
    TrellisError,
};

type EvalResult<T> = Result<T, TrellisError>;

/// How a statement finished.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Local variables of a function or class body. `None` at module level.
#[derive(Default)]
pub struct Frame {
    locals: Option<im::HashMap<String, Value>>,
}

impl Frame {
    pub fn module_level() -> Self {
        Self { locals: None }
    }

    pub fn with_locals(locals: im::HashMap<String, Value>) -> Self {
        Self {
            locals: Some(locals),
        }
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Runs `body` at the top level of `module`.
pub fn exec_module_body(session: &Session, module: &Rc<ModuleObject>, body: &[Stmt]) -> EvalResult<()> {
    let interpreter = Interpreter::new(session, module.clone());
    let mut frame = Frame::module_level();
    match interpreter.exec_body(body, &mut frame)? {
        Flow::Normal => Ok(()),
        flow => Err(err_msg!(Eval, "{}: {} outside function", module.filename(), flow_keyword(&flow))),
    }
}

/// Calls a Trellis function with positional arguments.
pub fn call_function(session: &Session, function: &Rc<Function>, args: Vec<Value>) -> EvalResult<Value> {
    if args.len() != function.params.len() {
        return Err(err_msg!(
            Type,
            "{}() takes {} argument(s) but {} were given",
            function.name,
            function.params.len(),
            args.len()
        ));
    }

    let _guard = session.enter_call(&function.name)?;
    let mut locals = function.closure.clone();
    for (param, arg) in function.params.iter().zip(args) {
        locals.insert(param.clone(), arg);
    }
    let interpreter = Interpreter::new(session, function.globals.clone());
    let mut frame = Frame::with_locals(locals);
    match interpreter.exec_body(&function.body, &mut frame)? {
        Flow::Return(value) => Ok(value),
        Flow::Normal => Ok(Value::None),
        flow => Err(err_msg!(
            Eval,
            "{} outside loop in '{}'",
            flow_keyword(&flow),
            function.name
        )),
    }
}

fn flow_keyword(flow: &Flow) -> &'static str {
    match flow {
        Flow::Normal => "statement",
        Flow::Return(_) => "'return'",
        Flow::Break => "'break'",
        Flow::Continue => "'continue'",
    }
}

// ============================================================================
// INTERPRETER
// ============================================================================

pub struct Interpreter<'s> {
    session: &'s Session,
    globals: Rc<ModuleObject>,
    filename: String,
}

impl<'s> Interpreter<'s> {
    pub fn new(session: &'s Session, globals: Rc<ModuleObject>) -> Self {
        let filename = globals.filename();
        Self {
            session,
            globals,
            filename,
        }
    }

    fn error(&self, loc: Option<Loc>, message: String) -> TrellisError {
        err_at!(Eval, self.filename, loc, "{}", message)
    }

    fn type_error(&self, loc: Option<Loc>, message: String) -> TrellisError {
        err_at!(Type, self.filename, loc, "{}", message)
    }

    // ------------------------------------------------------------------------
    // names
    // ------------------------------------------------------------------------

    fn lookup(&self, frame: &Frame, name: &str, loc: Option<Loc>) -> EvalResult<Value> {
        if let Some(value) = frame.locals.as_ref().and_then(|l| l.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value);
        }
        builtins::lookup(name).ok_or_else(|| self.error(loc, format!("name '{}' is not defined", name)))
    }

    fn bind(&self, frame: &mut Frame, name: &str, value: Value) {
        match &mut frame.locals {
            Some(locals) => {
                locals.insert(name.to_string(), value);
            }
            None => self.globals.set(name, value),
        }
    }

    // ------------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------------

    pub fn exec_body(&self, body: &[Stmt], frame: &mut Frame) -> EvalResult<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt, frame)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&self, stmt: &Stmt, frame: &mut Frame) -> EvalResult<Flow> {
        let loc = stmt.loc;
        match &stmt.kind {
            StmtKind::Expr(value) => {
                self.eval(value, frame)?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value, frame)?;
                self.assign(target, value, frame)?;
            }
            StmtKind::Import { module, asname } => {
                let imported = self.session.import_module(module, false).map_err(|e| e.located(&self.filename, loc))?;
                match asname {
                    Some(alias) => self.bind(frame, alias, Value::Module(imported)),
                    None => {
                        let top = module.split('.').next().unwrap_or(module);
                        let top_module = self.session.import_module(top, false)?;
                        self.bind(frame, top, Value::Module(top_module));
                    }
                }
            }
            StmtKind::ImportFrom {
                module,
                level,
                names,
            } => {
                let absolute = resolve_name(*level, module.as_deref(), self.globals.package())
                    .map_err(|e| e.located(&self.filename, loc))?;
                let source = self
                    .session
                    .import_module(&absolute, false)
                    .map_err(|e| e.located(&self.filename, loc))?;
                for alias in names {
                    let value = match source.get(&alias.name) {
                        Some(value) => value,
                        None => {
                            let submodule = format!("{}.{}", absolute, alias.name);
                            match self.session.import_module(&submodule, false) {
                                Ok(m) => Value::Module(m),
                                Err(_) => {
                                    return Err(err_at!(
                                        Import,
                                        self.filename,
                                        loc,
                                        "cannot import name '{}' from '{}'",
                                        alias.name,
                                        absolute
                                    ))
                                }
                            }
                        }
                    };
                    self.bind(frame, alias.bound_name(), value);
                }
            }
            StmtKind::With { .. } => {
                return Err(self.error(
                    loc,
                    "'with' is only valid as a block macro invocation or a phase marker".into(),
                ))
            }
            StmtKind::FunctionDef {
                name,
                params,
                body,
                decorators,
            } => {
                let function = Function {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    globals: self.globals.clone(),
                    closure: frame.locals.clone().unwrap_or_default(),
                    name_macro: false,
                };
                let value = self.decorate(Value::Function(Rc::new(function)), decorators, frame, loc)?;
                self.bind(frame, name, value);
            }
            StmtKind::ClassDef {
                name,
                body,
                decorators,
            } => {
                let mut class_frame = Frame::with_locals(im::HashMap::new());
                self.exec_body(body, &mut class_frame)?;
                let attrs: HashMap<String, Value> = class_frame.locals.unwrap_or_default().into_iter().collect();
                let class = Value::Namespace(Rc::new(Namespace::new(name.clone(), attrs)));
                let value = self.decorate(class, decorators, frame, loc)?;
                self.bind(frame, name, value);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, frame)?.truthy() { body } else { orelse };
                return self.exec_body(branch, frame);
            }
            StmtKind::While { test, body } => {
                while self.eval(test, frame)?.truthy() {
                    match self.exec_body(body, frame)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::For { target, iter, body } => {
                let items = self.iterate(self.eval(iter, frame)?, iter.loc)?;
                for item in items {
                    self.bind(frame, target, item);
                    match self.exec_body(body, frame)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, frame)?.truthy() {
                    let detail = match msg {
                        Some(msg) => format!("assertion failed: {}", self.eval(msg, frame)?),
                        None => "assertion failed".to_string(),
                    };
                    return Err(self.error(loc, detail));
                }
            }
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Done(stmts) => return self.exec_body(stmts, frame),
        }
        Ok(Flow::Normal)
    }

    /// Applies run-time decorators bottom-up.
    fn decorate(&self, value: Value, decorators: &[Expr], frame: &mut Frame, loc: Option<Loc>) -> EvalResult<Value> {
        let mut value = value;
        for decorator in decorators.iter().rev() {
            let callee = self.eval(decorator, frame)?;
            value = self
                .session
                .call_value(&callee, vec![value])
                .map_err(|e| e.located(&self.filename, loc))?;
        }
        Ok(value)
    }

    fn assign(&self, target: &Expr, value: Value, frame: &mut Frame) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                self.bind(frame, name, value);
                Ok(())
            }
            ExprKind::Attribute { value: object, attr } => match self.eval(object, frame)? {
                Value::Module(module) => {
                    module.set(attr.clone(), value);
                    Ok(())
                }
                Value::Namespace(ns) => {
                    ns.set(attr.clone(), value);
                    Ok(())
                }
                other => Err(self.type_error(
                    target.loc,
                    format!("cannot set attribute '{}' on {}", attr, other.type_name()),
                )),
            },
            ExprKind::Subscript { value: object, index } => {
                let object = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                match (&object, index.as_int()) {
                    (Value::List(items), Some(i)) => {
                        let mut items = items.borrow_mut();
                        let slot = normalize_index(i, items.len())
                            .ok_or_else(|| self.error(target.loc, "list assignment index out of range".into()))?;
                        items[slot] = value;
                        Ok(())
                    }
                    _ => Err(self.type_error(
                        target.loc,
                        format!("'{}' does not support item assignment", object.type_name()),
                    )),
                }
            }
            _ => Err(self.error(target.loc, format!("cannot assign to {}", target.type_name()))),
        }
    }

    fn iterate(&self, value: Value, loc: Option<Loc>) -> EvalResult<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(self.type_error(loc, format!("'{}' object is not iterable", other.type_name()))),
        }
    }

    // ------------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------------

    pub fn eval(&self, expr: &Expr, frame: &mut Frame) -> EvalResult<Value> {
        let loc = expr.loc;
        match &expr.kind {
            ExprKind::Name(name) => self.lookup(frame, name, loc),
            ExprKind::Constant(constant) => Ok(Value::from_constant(constant)),
            ExprKind::BinOp { op, left, right } => match op {
                BinOp::And => {
                    let left = self.eval(left, frame)?;
                    if left.truthy() {
                        self.eval(right, frame)
                    } else {
                        Ok(left)
                    }
                }
                BinOp::Or => {
                    let left = self.eval(left, frame)?;
                    if left.truthy() {
                        Ok(left)
                    } else {
                        self.eval(right, frame)
                    }
                }
                _ => {
                    let left = self.eval(left, frame)?;
                    let right = self.eval(right, frame)?;
                    binary(*op, left, right).map_err(|e| e.located(&self.filename, loc))
                }
            },
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.eval(operand, frame)?;
                match (op, operand) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.truthy())),
                    (UnaryOp::Neg, value) => match value.as_int() {
                        Some(n) => n
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| self.error(loc, "integer overflow".into())),
                        None => Err(self.type_error(loc, format!("bad operand type for unary -: '{}'", value.type_name()))),
                    },
                    (UnaryOp::Pos, value) => match value.as_int() {
                        Some(n) => Ok(Value::Int(n)),
                        None => Err(self.type_error(loc, format!("bad operand type for unary +: '{}'", value.type_name()))),
                    },
                }
            }
            ExprKind::Call { func, args } => {
                let callee = self.eval(func, frame)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a, frame))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.session
                    .call_value(&callee, args)
                    .map_err(|e| e.located(&self.filename, loc))
            }
            ExprKind::Attribute { value, attr } => {
                let object = self.eval(value, frame)?;
                let found = match &object {
                    Value::Module(module) => module.get(attr),
                    Value::Namespace(ns) => ns.get(attr),
                    _ => None,
                };
                found.ok_or_else(|| {
                    self.error(loc, format!("'{}' object has no attribute '{}'", describe(&object), attr))
                })
            }
            ExprKind::Subscript { value, index } => {
                let object = self.eval(value, frame)?;
                let index = self.eval(index, frame)?;
                self.subscript(object, index, loc)
            }
            ExprKind::List(items) => Ok(Value::list(
                items.iter().map(|i| self.eval(i, frame)).collect::<EvalResult<_>>()?,
            )),
            ExprKind::Tuple(items) => Ok(Value::Tuple(Rc::new(
                items.iter().map(|i| self.eval(i, frame)).collect::<EvalResult<_>>()?,
            ))),
            ExprKind::Lambda { params, body } => Ok(Value::Function(Rc::new(Function {
                name: "<lambda>".to_string(),
                params: params.clone(),
                body: vec![Stmt::at(StmtKind::Return(Some((**body).clone())), loc)],
                globals: self.globals.clone(),
                closure: frame.locals.clone().unwrap_or_default(),
                name_macro: false,
            }))),
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, frame)?.truthy() {
                    self.eval(body, frame)
                } else {
                    self.eval(orelse, frame)
                }
            }
            ExprKind::Done(inner) => self.eval(inner, frame),
        }
    }

    fn subscript(&self, object: Value, index: Value, loc: Option<Loc>) -> EvalResult<Value> {
        let out_of_range = || self.error(loc, format!("{} index out of range", object.type_name()));
        match (&object, index.as_int()) {
            (Value::List(items), Some(i)) => {
                let items = items.borrow();
                normalize_index(i, items.len())
                    .map(|slot| items[slot].clone())
                    .ok_or_else(out_of_range)
            }
            (Value::Tuple(items), Some(i)) => normalize_index(i, items.len())
                .map(|slot| items[slot].clone())
                .ok_or_else(out_of_range),
            (Value::Str(s), Some(i)) => {
                let chars: Vec<char> = s.chars().collect();
                normalize_index(i, chars.len())
                    .map(|slot| Value::Str(chars[slot].to_string()))
                    .ok_or_else(out_of_range)
            }
            _ => Err(self.type_error(
                loc,
                format!(
                    "'{}' object is not subscriptable with {}",
                    object.type_name(),
                    index.type_name()
                ),
            )),
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Module(m) => format!("module '{}'", m.name()),
        other => other.type_name().to_string(),
    }
}

/// Negative indices count from the end.
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

// ============================================================================
// OPERATORS
// ============================================================================

fn binary(op: BinOp, left: Value, right: Value) -> EvalResult<Value> {
    use Value::{Int, Str};

    let unsupported = |left: &Value, right: &Value| {
        err_msg!(
            Type,
            "unsupported operand types for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )
    };
    let overflow = || err_msg!(Eval, "integer overflow in '{}'", op.symbol());

    match op {
        BinOp::Eq => return Ok(Value::Bool(left == right)),
        BinOp::NotEq => return Ok(Value::Bool(left != right)),
        BinOp::Lt | BinOp::LtE | BinOp::Gt | BinOp::GtE => {
            let ordering = match (&left, &right) {
                (Str(a), Str(b)) => a.cmp(b),
                _ => match (left.as_int(), right.as_int()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => return Err(unsupported(&left, &right)),
                },
            };
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::LtE => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            return Ok(Value::Bool(result));
        }
        _ => {}
    }

    match (op, &left, &right) {
        (BinOp::Add, Str(a), Str(b)) => Ok(Str(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::Tuple(Rc::new(a.iter().chain(b.iter()).cloned().collect())))
        }
        (BinOp::Mul, Str(s), Int(n)) | (BinOp::Mul, Int(n), Str(s)) => {
            Ok(Str(s.repeat(usize::try_from(*n).unwrap_or(0))))
        }
        _ => {
            let (Some(a), Some(b)) = (left.as_int(), right.as_int()) else {
                return Err(unsupported(&left, &right));
            };
            let value = match op {
                BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
                BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
                BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
                // Integers only: `/` floors like `//`.
                BinOp::Div | BinOp::FloorDiv => floor_div(a, b)?,
                BinOp::Mod => {
                    let q = floor_div(a, b)?;
                    a - b * q
                }
                _ => return Err(unsupported(&left, &right)),
            };
            Ok(Int(value))
        }
    }
}

fn floor_div(a: i64, b: i64) -> EvalResult<i64> {
    if b == 0 {
        return Err(err_msg!(Eval, "integer division by zero"));
    }
    let q = a.checked_div(b).ok_or_else(|| err_msg!(Eval, "integer overflow in division"))?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_follows_the_divisor_sign() {
        assert_eq!(floor_div(7, 2).unwrap(), 3);
        assert_eq!(floor_div(-7, 2).unwrap(), -4);
        assert_eq!(floor_div(7, -2).unwrap(), -4);
        assert!(floor_div(1, 0).is_err());
    }

    #[test]
    fn mixed_operands_are_type_errors() {
        let err = binary(BinOp::Sub, Value::Str("a".into()), Value::Int(1)).unwrap_err();
        assert_eq!(err.error_type(), crate::diagnostics::ErrorType::Type);
        assert_eq!(
            binary(BinOp::Add, Value::Str("a".into()), Value::Str("b".into())).unwrap(),
            Value::Str("ab".into())
        );
        assert_eq!(binary(BinOp::Mod, Value::Int(-7), Value::Int(3)).unwrap(), Value::Int(2));
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
    }
}
