// End-to-end expansion through real files: macro-imports resolved on a search root,
// macro definition modules executed, expanded code run.

mod common;

use common::Fixture;
use pretty_assertions::assert_eq;
use trellis::{runtime::Value, ErrorType};

#[test]
fn expr_macro_expands_and_runs() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.macros import macros, double\nx = double[21]\n");
    let (session, _) = fx.session();

    let module = fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(42)));
}

#[test]
fn macro_imports_become_plain_imports() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.macros import macros, double as dbl\nx = dbl[21]\n");
    let (session, _) = fx.session();

    let expanded = fx.expand_file(&session, "main.trl", "main").unwrap();
    assert_eq!(expanded, "import mypkg.macros\nx = 21 * 2\n");
}

#[test]
fn block_macro_receives_the_body() {
    let fx = Fixture::new();
    fx.write(
        "main.trl",
        "from mypkg.macros import macros, twice\nwith twice:\n    print(\"hi\")\n",
    );
    let (session, buffer) = fx.session();

    fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(buffer.borrow().as_str(), "hi\nhi");
}

#[test]
fn name_macros_replace_bare_identifiers() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.macros import macros, answer\nx = answer + 0\n");
    let (session, _) = fx.session();

    let module = fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(42)));
}

#[test]
fn nested_invocations_expand_outside_in() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.macros import macros, double\nx = double[double[1]]\n");
    let (session, _) = fx.session();

    let expanded = fx.expand_file(&session, "main.trl", "main").unwrap();
    assert_eq!(expanded, "import mypkg.macros\nx = 1 * 2 * 2\n");
}

#[test]
fn relative_macro_imports_resolve_inside_packages() {
    let fx = Fixture::new();
    fx.write("mypkg/user.trl", "from .macros import macros, double\nx = double[5]\n");
    let (session, _) = fx.session();

    let module = session.import_module("mypkg.user", false).unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(10)));
}

#[test]
fn relative_macro_imports_fail_outside_packages() {
    let fx = Fixture::new();
    fx.write("main.trl", "from .macros import macros, double\nx = double[5]\n");
    let (session, _) = fx.session();

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Syntax);
    assert!(err.message().contains("relative import outside any package"));
}

#[test]
fn missing_macros_are_binding_errors() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.macros import macros, triple\nx = triple[1]\n");
    let (session, _) = fx.session();

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::MacroBinding);
    assert!(err.message().contains("has no macro 'triple'"));
}

#[test]
fn missing_definition_modules_are_import_errors() {
    let fx = Fixture::new();
    fx.write("main.trl", "from nowhere.macros import macros, m\n");
    let (session, _) = fx.session();

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Import);
}

#[test]
fn runaway_expansion_hits_the_depth_limit() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.macros import macros, forever\nx = forever[0]\n");
    let (output, _) = trellis::runtime::SharedOutput::buffer();
    let session = trellis::runtime::Session::with_output(fx.config().with_max_expansion_depth(Some(5)), output);

    let err = fx.run_file(&session, "main.trl", "main").unwrap_err();
    assert_eq!(err.error_type(), ErrorType::ExpansionDepth);
}

#[test]
fn unbound_names_are_left_alone() {
    let fx = Fixture::new();
    fx.write("main.trl", "from mypkg.macros import macros, double\ny = [1, 2]\nx = y[0]\n");
    let (session, _) = fx.session();

    let module = fx.run_file(&session, "main.trl", "main").unwrap();
    assert_eq!(module.get("x"), Some(Value::Int(1)));
}

#[test]
fn relative_macro_import_outside_every_root_is_an_import_error() {
    let fx = Fixture::new();
    let elsewhere = tempfile::tempdir().unwrap();
    let lone = elsewhere.path().join("lone.trl");
    let text = "from .macros import macros, double\n";
    std::fs::write(&lone, text).unwrap();
    let (session, _) = fx.session();

    let filename = lone.display().to_string();
    let err = trellis::compiler::expand(
        trellis::compiler::Source::Bytes(text.as_bytes().to_vec()),
        &filename,
        Some("lone"),
        &session,
    )
    .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::Import);
    assert!(err.message().contains("could not determine containing package"));
}
