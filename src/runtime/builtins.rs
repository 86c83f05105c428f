//! Builtin functions visible in every module.
//!
//! Each builtin is a plain `fn(&[Value], &Session) -> Result<Value>`; arity and type
//! checks happen inside. Errors carry no location; the interpreter attaches the call
//! site.

use std::rc::Rc;

use super::{
    value::{Builtin, BuiltinFn, Function},
    Session, Value,
};
use crate::{err_msg, TrellisError};

type BuiltinResult = Result<Value, TrellisError>;

const BUILTINS: &[(&str, BuiltinFn)] = &[
    ("append", append),
    ("int", int),
    ("len", len),
    ("namemacro", namemacro),
    ("print", print),
    ("range", range),
    ("repr", repr),
    ("str", str),
];

pub fn lookup(name: &str) -> Option<Value> {
    BUILTINS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(name, func)| Value::Builtin(Builtin { name: *name, func: *func }))
}

pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _)| *name)
}

pub(crate) fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<(), TrellisError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(err_msg!(
            Type,
            "{}() takes {} argument(s) but {} were given",
            name,
            expected,
            args.len()
        ))
    }
}

// ============================================================================
// IMPLEMENTATIONS
// ============================================================================

fn print(args: &[Value], session: &Session) -> BuiltinResult {
    let text = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
    session.output().emit(&text);
    Ok(Value::None)
}

fn len(args: &[Value], _session: &Session) -> BuiltinResult {
    expect_arity("len", args, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        other => return Err(err_msg!(Type, "object of type '{}' has no len()", other.type_name())),
    };
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| err_msg!(Eval, "length does not fit an integer"))
}

fn range(args: &[Value], _session: &Session) -> BuiltinResult {
    let bounds: Vec<i64> = args
        .iter()
        .map(|a| {
            a.as_int()
                .ok_or_else(|| err_msg!(Type, "range() expects integers, not {}", a.type_name()))
        })
        .collect::<Result<_, _>>()?;
    let (start, stop) = match bounds.as_slice() {
        [stop] => (0, *stop),
        [start, stop] => (*start, *stop),
        _ => return Err(err_msg!(Type, "range() takes 1 or 2 arguments but {} were given", args.len())),
    };
    Ok(Value::list((start..stop).map(Value::Int).collect()))
}

fn str(args: &[Value], _session: &Session) -> BuiltinResult {
    expect_arity("str", args, 1)?;
    Ok(Value::Str(args[0].to_string()))
}

fn repr(args: &[Value], _session: &Session) -> BuiltinResult {
    expect_arity("repr", args, 1)?;
    Ok(Value::Str(args[0].repr()))
}

fn int(args: &[Value], _session: &Session) -> BuiltinResult {
    expect_arity("int", args, 1)?;
    match &args[0] {
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| err_msg!(Eval, "invalid literal for int(): {}", args[0].repr())),
        other => other
            .as_int()
            .map(Value::Int)
            .ok_or_else(|| err_msg!(Type, "int() argument must be a string or a number, not '{}'", other.type_name())),
    }
}

fn append(args: &[Value], _session: &Session) -> BuiltinResult {
    expect_arity("append", args, 2)?;
    match &args[0] {
        Value::List(items) => {
            items.borrow_mut().push(args[1].clone());
            Ok(Value::None)
        }
        other => Err(err_msg!(Type, "append() expects a list, not {}", other.type_name())),
    }
}

/// Decorator marking a macro function as invocable by bare name.
fn namemacro(args: &[Value], _session: &Session) -> BuiltinResult {
    expect_arity("namemacro", args, 1)?;
    match &args[0] {
        Value::Function(function) => Ok(Value::Function(Rc::new(Function {
            name_macro: true,
            ..function.as_ref().clone()
        }))),
        other => Err(err_msg!(Type, "namemacro() expects a function, not {}", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_only_builtins() {
        assert!(matches!(lookup("len"), Some(Value::Builtin(_))));
        assert!(lookup("open").is_none());
        assert_eq!(names().count(), BUILTINS.len());
    }

    #[test]
    fn range_and_len() {
        let session = Session::new(Default::default());
        let values = range(&[Value::Int(2), Value::Int(5)], &session).unwrap();
        assert_eq!(len(&[values], &session).unwrap(), Value::Int(3));
        assert!(range(&[], &session).is_err());
    }

    #[test]
    fn int_parses_strings() {
        let session = Session::new(Default::default());
        assert_eq!(int(&[Value::Str(" 42 ".into())], &session).unwrap(), Value::Int(42));
        assert!(int(&[Value::Str("x".into())], &session).is_err());
    }
}
