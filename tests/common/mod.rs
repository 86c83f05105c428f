// Shared fixtures: a throwaway search root with a small package of macro and dialect
// definitions, and sessions that capture output.

#![allow(dead_code)]

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use tempfile::TempDir;
use trellis::{
    compiler::{self, Source, Target},
    config::Config,
    runtime::{ModuleObject, OutputBuffer, Session, SharedOutput},
    TrellisError,
};

pub const MACROS: &str = r#"from trellis.ast import BinOp, parse_expr

def double(tree, syntax):
    return BinOp(tree, "*", 2)

def twice(tree, syntax):
    return [tree, tree]

@namemacro
def answer(tree, syntax):
    return 42

def forever(tree, syntax):
    return parse_expr("forever[1]")
"#;

pub const DIALECTS: &str = r#"from trellis import dialect
from trellis.ast import parse

def a_source(text):
    return "trace = []\ncount = 0\n" + text

def a_ast(body):
    return [body, parse("append(trace, 'a')")]

def b_source(text):
    return text + "count = count + 1\n"

def b_ast(body):
    return [body, parse("append(trace, 'b')")]

A = dialect("A", a_source, a_ast)
B = dialect("B", b_source, b_ast)
"#;

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// A search root holding `mypkg/__init__.trl`, `mypkg/macros.trl` and
    /// `mypkg/dialects.trl`.
    pub fn new() -> Self {
        let fixture = Fixture {
            dir: tempfile::tempdir().unwrap(),
        };
        fixture.write("mypkg/__init__.trl", "");
        fixture.write("mypkg/macros.trl", MACROS);
        fixture.write("mypkg/dialects.trl", DIALECTS);
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, text).unwrap();
        path
    }

    pub fn config(&self) -> Config {
        Config {
            search_roots: vec![self.root().to_path_buf()],
            ..Config::default()
        }
    }

    pub fn session(&self) -> (Session, Rc<RefCell<OutputBuffer>>) {
        let (output, buffer) = SharedOutput::buffer();
        (Session::with_output(self.config(), output), buffer)
    }

    /// Runs the file at `relative` as the top-level module `name`.
    pub fn run_file(&self, session: &Session, relative: &str, name: &str) -> Result<Rc<ModuleObject>, TrellisError> {
        let path = self.path(relative);
        let filename = path.display().to_string();
        let module = compiler::create_module(Some(name), Some(&filename), session)?;
        compiler::run(Source::Bytes(fs::read(&path).unwrap()), Target::Module(module), session)
    }

    /// Expands the file at `relative` as module `name` and returns the resulting source.
    pub fn expand_file(&self, session: &Session, relative: &str, name: &str) -> Result<String, TrellisError> {
        let path = self.path(relative);
        let filename = path.display().to_string();
        let module = compiler::expand(Source::Bytes(fs::read(&path).unwrap()), &filename, Some(name), session)?;
        Ok(trellis::syntax::unparse_module(&module))
    }
}
