// Dialects written in Trellis: source hooks run first, then AST hooks, each dialect
// exactly once.

mod common;

use common::Fixture;
use pretty_assertions::assert_eq;
use trellis::{runtime::Value, ErrorType};

fn strings(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items.borrow().iter().map(|v| v.to_string()).collect(),
        other => panic!("expected a list, got {:?}", other),
    }
}

#[test]
fn dialects_apply_in_import_order_once_each() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.dialects import dialects, A, B\nx = 1\n");
    let (session, _) = fx.session();

    let module = fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(strings(module.get("trace")), vec!["a", "b"]);
    assert_eq!(module.get("count"), Some(Value::Int(1)));
    assert_eq!(module.get("x"), Some(Value::Int(1)));
}

#[test]
fn dialect_imports_are_rewritten_to_module_imports() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.dialects import dialects, B\n");
    let (session, _) = fx.session();

    let expanded = fx.expand_file(&session, "main.trl", "main").unwrap();
    assert_eq!(
        expanded,
        "import mypkg.dialects\ncount = count + 1\nappend(trace, \"b\")\n"
    );
}

#[test]
fn dialect_output_may_use_macros() {
    let fx = Fixture::new();
    fx.write(
        "mypkg/wrap.trl",
        r#"from trellis import dialect
from trellis.ast import parse, splice

TEMPLATE = parse("from mypkg.macros import macros, double\ndef _main():\n    __paste_here__\n    return double[result]\nvalue = _main()\n")

def wrap(body):
    return splice(body, TEMPLATE)

Wrapped = dialect("Wrapped", None, wrap)
"#,
    );
    fx.write(
        "main.trl",
        "\"Wrapped module.\"\nfrom mypkg.wrap import dialects, Wrapped\nresult = 4\n",
    );
    let (session, _) = fx.session();

    let module = fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(module.get("value"), Some(Value::Int(8)));
    assert_eq!(module.doc().as_deref(), Some("Wrapped module."));
}

#[test]
fn dialect_imports_reject_as_names() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.dialects import dialects, A as Z\n");
    let (session, _) = fx.session();

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Syntax);
}

#[test]
fn non_dialect_attributes_are_rejected() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.dialects import dialects, a_source\n");
    let (session, _) = fx.session();

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Import);
}
