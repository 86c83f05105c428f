// Multi-phase modules: macros defined in a phase block of the same file and imported
// through `__self__`.

mod common;

use common::Fixture;
use pretty_assertions::assert_eq;
use trellis::{runtime::Value, ErrorType};

const TRIPLE: &str = r#"with phase[1]:
    from trellis.ast import BinOp
    def triple(tree, syntax):
        return BinOp(tree, "*", 3)

from __self__ import macros, triple
x = triple[7]
"#;

#[test]
fn self_macros_come_from_the_higher_phase() {
    let fx = Fixture::new();
    fx.write("main.trl", TRIPLE);
    let (session, _) = fx.session();

    let module = fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(21)));
    // Phase code is inherited by lower phases.
    assert!(matches!(module.get("triple"), Some(Value::Function(_))));
    assert!(session.registry().contains("__phase1__.main"));
}

#[test]
fn phase_two_macros_are_usable_in_phase_one() {
    let fx = Fixture::new();
    fx.write(
        "main.trl",
        r#"with phase[2]:
    from trellis.ast import BinOp
    def inc(tree, syntax):
        return BinOp(tree, "+", 1)

with phase[1]:
    from __self__ import macros, inc
    from trellis.ast import BinOp
    def twice_inc(tree, syntax):
        return BinOp(tree, "*", inc[1])

from __self__ import macros, twice_inc
x = twice_inc[10]
"#,
    );
    let (session, _) = fx.session();

    let module = fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(20)));
    assert!(session.registry().contains("__phase2__.main"));
}

#[test]
fn self_imports_need_multiphase_compilation() {
    let fx = Fixture::new();
    fx.write("main.trl", "from __self__ import macros, m\n");
    let (session, _) = fx.session();

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Import);
}

#[test]
fn nested_phase_markers_are_rejected() {
    let fx = Fixture::new();
    fx.write("main.trl", "if True:\n    with phase[1]:\n        x = 1\n");
    let (session, _) = fx.session();

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Syntax);
    assert!(err.message().contains("top level"));
}

#[test]
fn multiphase_packages_import_like_any_module() {
    let fx = Fixture::new();
    fx.write("mypkg/phased.trl", TRIPLE);
    let (session, _) = fx.session();

    let module = session.import_module("mypkg.phased", false).unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(21)));
    assert!(session.registry().contains("__phase1__.mypkg.phased"));
}
