// The `trellis` binary: commands, global options, and miette error rendering.

mod common;

use assert_cmd::Command;
use common::Fixture;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn trellis() -> Command {
    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.env_remove("TRELLIS_PATH").env_remove("TRELLIS_MAX_EXPANSION_DEPTH");
    cmd
}

#[test]
fn run_executes_expanded_code() {
    let fx = Fixture::new();
    let main = fx.write(
        "main.trl",
        "from mypkg.macros import macros, double\nprint(double[21])\n",
    );
    trellis().arg("run").arg(&main).assert().success().stdout("42\n");
}

#[test]
fn expand_prints_expanded_source() {
    let fx = Fixture::new();
    let main = fx.write("main.trl", "from mypkg.macros import macros, double\nx = double[x]\n");
    trellis()
        .arg("expand")
        .arg(&main)
        .assert()
        .success()
        .stdout("import mypkg.macros\nx = x * 2\n");
}

#[test]
fn ast_prints_json() {
    let fx = Fixture::new();
    let main = fx.write("main.trl", "x = double[1]\n");
    trellis()
        .arg("ast")
        .arg(&main)
        .assert()
        .success()
        .stdout(contains("\"Subscript\"").and(contains("\"body\"")));
}

#[test]
fn deps_lists_definition_modules() {
    let fx = Fixture::new();
    let main = fx.write(
        "mypkg/user.trl",
        "from .macros import macros, double\nfrom trellis.debug import macros, show_bindings\n",
    );
    trellis()
        .arg("-I")
        .arg(fx.root())
        .arg("deps")
        .arg(&main)
        .assert()
        .success()
        .stdout(
            contains("mypkg.macros")
                .and(contains("macros.trl"))
                .and(contains("trellis.debug\t<builtin or not found>"))
                .and(contains("xstats\t")),
        );
}

#[test]
fn check_reports_each_file() {
    let fx = Fixture::new();
    fx.write("mypkg/good.trl", "from .macros import macros, double\nx = double[1]\n");
    trellis()
        .arg("check")
        .arg(fx.root())
        .assert()
        .success()
        .stdout(contains("ok").and(contains("checked 4 file(s), 0 failed")));
}

#[test]
fn check_fails_on_broken_files() {
    let fx = Fixture::new();
    fx.write("mypkg/bad.trl", "from .macros import macros, nothere\n");
    trellis()
        .arg("check")
        .arg(fx.root())
        .assert()
        .failure()
        .stdout(contains("FAILED").and(contains("1 failed")))
        .stderr(contains("trellis::MacroBinding"));
}

#[test]
fn errors_render_as_diagnostics() {
    let fx = Fixture::new();
    let main = fx.write("main.trl", "from mypkg.macros import macros, nothere\n");
    trellis()
        .arg("run")
        .arg(&main)
        .assert()
        .failure()
        .stderr(contains("trellis::MacroBinding").and(contains("has no macro 'nothere'")));
}

#[test]
fn expansion_depth_is_configurable() {
    let fx = Fixture::new();
    let main = fx.write("main.trl", "from mypkg.macros import macros, forever\nx = forever[0]\n");
    trellis()
        .arg("--max-expansion-depth")
        .arg("3")
        .arg("expand")
        .arg(&main)
        .assert()
        .failure()
        .stderr(contains("trellis::ExpansionDepthExceeded"));

    trellis()
        .arg("--max-expansion-depth")
        .arg("lots")
        .arg("expand")
        .arg(&main)
        .assert()
        .failure();
}

#[test]
fn step_expansion_traces_to_stdout() {
    let fx = Fixture::new();
    let main = fx.write(
        "main.trl",
        "from mypkg.macros import macros, double\nfrom trellis.debug import macros, step_expansion\nx = step_expansion[double[double[1]]]\n",
    );
    trellis()
        .arg("expand")
        .arg(&main)
        .assert()
        .success()
        .stdout(
            contains("before macro expansion:")
                .and(contains("after step 2:"))
                .and(contains("**Macro expansion complete after 2 steps."))
                .and(contains("x = 1 * 2 * 2")),
        );
}
