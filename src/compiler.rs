//! Compile orchestration for macro-enabled code.
//!
//! ```text
//! text ──dialect source transforms──▶ text ──parse──▶ Module
//!      ──dialect AST transforms──▶ ──find_macros──▶ ──expand_macros──▶
//!      ──dialect postprocessors──▶ ──marker check──▶ expanded Module
//! ```
//!
//! [`expand`] runs that pipeline once, or per phase for multi-phase modules.
//! [`compile`] then fills any location still missing and hands the tree to the host
//! compile step; [`run`] also executes it in a module.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::{
    ast::{Loc, Module, Stmt},
    dialects::DialectExpander,
    err_msg,
    macros::{expander::check_no_markers_remaining, expand_macros, find_macros},
    multiphase::{is_multiphase, multiphase_expand, validate_phase_markers},
    runtime::{CodeObject, ModuleObject, Session},
    syntax::parse_module,
    walker::fix_missing_locations_stmts,
    TrellisError,
};

type CompileResult<T> = Result<T, TrellisError>;

/// Location given to nodes that reach the compile step without one.
pub const DUMMY_LOC: Loc = Loc { line: 9999, col: 0 };

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Input to [`expand`], [`compile`] and [`run`].
#[derive(Debug, Clone)]
pub enum Source {
    Text(String),
    /// UTF-8 encoded source text.
    Bytes(Vec<u8>),
    Module(Module),
    Stmts(Vec<Stmt>),
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Source::Text(text.to_string())
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::Text(text)
    }
}

impl From<Module> for Source {
    fn from(module: Module) -> Self {
        Source::Module(module)
    }
}

impl From<Vec<Stmt>> for Source {
    fn from(stmts: Vec<Stmt>) -> Self {
        Source::Stmts(stmts)
    }
}

/// Expands dialects and macros in `source`.
///
/// `self_module` is the dotted name of the module being compiled. It is required for
/// multi-phase modules, where it names the temporary phase modules; single-phase
/// modules ignore it.
pub fn expand(
    source: Source,
    filename: &str,
    self_module: Option<&str>,
    session: &Session,
) -> CompileResult<Module> {
    let mut dexpander = DialectExpander::new(filename, session);

    let module = match source {
        Source::Text(text) => parse_transformed(&mut dexpander, text, filename, self_module)?,
        Source::Bytes(data) => {
            let text = String::from_utf8(data)
                .map_err(|e| err_msg!(Import, "{}: source is not valid UTF-8: {}", filename, e))?;
            parse_transformed(&mut dexpander, text, filename, self_module)?
        }
        Source::Module(module) => module,
        Source::Stmts(stmts) => Module::new(stmts),
    };

    validate_phase_markers(&module, filename)?;
    if !is_multiphase(&module) {
        // `__self__` only names something while compiling in phases.
        return singlephase_expand(module, filename, None, session, &dexpander);
    }
    let Some(self_module) = self_module else {
        return Err(err_msg!(
            Internal,
            "{}: the module name must be given when compiling a multi-phase module",
            filename
        ));
    };
    multiphase_expand(module, filename, self_module, session, &dexpander)
}

fn parse_transformed(
    dexpander: &mut DialectExpander<'_>,
    text: String,
    filename: &str,
    self_module: Option<&str>,
) -> CompileResult<Module> {
    let text = dexpander.transform_source(text, self_module)?;
    parse_module(&text, filename).map_err(|e| {
        err_msg!(
            Import,
            "Failed to parse {} after applying all dialect source transformers",
            filename
        )
        .caused_by(e)
    })
}

/// Expands one phase: dialect AST transforms, macro discovery and expansion, dialect
/// postprocessors. The result holds no `Done` markers.
///
/// `self_module` is what `__self__` resolves to: the next higher phase module, if any.
pub fn singlephase_expand(
    module: Module,
    filename: &str,
    self_module: Option<&str>,
    session: &Session,
    dexpander: &DialectExpander<'_>,
) -> CompileResult<Module> {
    let (mut module, dialects) = dexpander.transform_ast(module, self_module)?;
    let bindings = find_macros(&mut module, filename, self_module, session, false)?;
    debug!(
        target: "trellis::compiler",
        file = filename,
        macros = bindings.len(),
        dialects = dialects.len(),
        "expanding"
    );
    let expansion = expand_macros(module, Rc::new(bindings), filename, session)?;
    let expansion = dexpander.postprocess_ast(expansion, &dialects)?;
    check_no_markers_remaining(&expansion, filename)?;
    Ok(expansion)
}

/// Fills leftover missing locations with [`DUMMY_LOC`] and runs the host compile step.
pub fn to_code(mut expansion: Module, filename: &str) -> CompileResult<CodeObject> {
    fix_missing_locations_stmts(&mut expansion.body, Some(DUMMY_LOC));
    CodeObject::compile(expansion, filename)
}

/// Expands and compiles `source`. The code object carries the module docstring.
pub fn compile(
    source: Source,
    filename: &str,
    self_module: Option<&str>,
    session: &Session,
) -> CompileResult<CodeObject> {
    let expansion = expand(source, filename, self_module, session)?;
    to_code(expansion, filename)
}

/// Where [`run`] executes code.
pub enum Target {
    /// A fresh module with a generated name.
    Fresh,
    /// A registered module, by dotted name.
    Named(String),
    Module(Rc<ModuleObject>),
}

/// Compiles `source` and executes it in the module `target` designates.
///
/// The module docstring is replaced by that of `source`, or cleared when it has none.
pub fn run(source: Source, target: Target, session: &Session) -> CompileResult<Rc<ModuleObject>> {
    let module = match target {
        Target::Fresh => create_module(None, None, session)?,
        Target::Named(name) => session
            .registry()
            .get(&name)
            .ok_or_else(|| err_msg!(Import, "module '{}' not found in the module registry", name))?,
        Target::Module(module) => module,
    };
    let filename = module.filename();
    let code = compile(source, &filename, Some(module.name()), session)?;
    session.exec_code(&code, &module)?;
    Ok(module)
}

/// Creates a blank module and registers it.
///
/// A dotted name needs its parent package registered already; the new module becomes an
/// attribute of the parent. Without a name, a unique one is generated. Without a
/// filename, a description of the module stands in for one.
pub fn create_module(
    dotted_name: Option<&str>,
    filename: Option<&str>,
    session: &Session,
) -> CompileResult<Rc<ModuleObject>> {
    if let Some(name) = dotted_name {
        if !name.split('.').all(|part| IDENTIFIER.is_match(part)) {
            return Err(err_msg!(
                Type,
                "each component of a module name must be a valid identifier, got '{}'",
                name
            ));
        }
    }

    let uuid = session.gensym("");
    let filename = match (filename, dotted_name) {
        (Some(filename), _) => filename.to_string(),
        (None, Some(name)) => format!("<dynamically created module '{}'>", name),
        (None, None) => format!("<dynamically created module {}>", uuid),
    };
    let name = dotted_name
        .map(str::to_string)
        .unwrap_or_else(|| format!("dynamically_created_module_{}", uuid));

    let package = match name.rsplit_once('.') {
        Some((parent, _)) => {
            if !session.registry().contains(parent) {
                return Err(err_msg!(
                    Import,
                    "while dynamically creating module '{}': its parent package '{}' not found",
                    name,
                    parent
                ));
            }
            parent.to_string()
        }
        None => String::new(),
    };

    let module = Rc::new(ModuleObject::new(&name, Some(filename.into()), package));
    session.register_child(module.clone());
    debug!(target: "trellis::compiler", module = %name, "created module");
    Ok(module)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        diagnostics::ErrorType,
        runtime::{SharedOutput, Value},
        syntax::unparse_module,
    };

    fn session() -> Session {
        Session::with_output(Default::default(), SharedOutput::null())
    }

    #[test]
    fn plain_code_runs_in_a_fresh_module() {
        let session = session();
        let module = run("\"Doc.\"\nx = 21\ny = x * 2\n".into(), Target::Fresh, &session).unwrap();
        assert_eq!(module.get("y"), Some(Value::Int(42)));
        assert_eq!(module.doc().as_deref(), Some("Doc."));
        assert!(module.name().starts_with("dynamically_created_module_"));
        assert!(session.registry().contains(module.name()));
    }

    #[test]
    fn run_in_an_existing_module_keeps_its_namespace() {
        let session = session();
        let module = run("x = 21\n".into(), Target::Fresh, &session).unwrap();
        run("x = 2 * x\n".into(), Target::Named(module.name().to_string()), &session).unwrap();
        assert_eq!(module.get("x"), Some(Value::Int(42)));
        assert_eq!(module.doc(), None);
    }

    #[test]
    fn created_modules_hang_off_their_parent() {
        let session = session();
        let parent = create_module(Some("outer"), None, &session).unwrap();
        let child = create_module(Some("outer.inner"), Some("inner.trl"), &session).unwrap();
        assert_eq!(child.package(), "outer");
        assert_eq!(child.filename(), "inner.trl");
        assert!(matches!(parent.get("inner"), Some(Value::Module(_))));
        assert_eq!(parent.filename(), "<dynamically created module 'outer'>");

        let err = create_module(Some("missing.child"), None, &session).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Import);
        let err = create_module(Some("not-valid"), None, &session).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Type);
    }

    #[test]
    fn statement_lists_expand_like_modules() {
        let session = session();
        let stmts = parse_module("x = 1\n", "s.trl").unwrap().body;
        let expanded = expand(stmts.into(), "s.trl", None, &session).unwrap();
        assert_eq!(unparse_module(&expanded), "x = 1\n");
    }

    #[test]
    fn multiphase_needs_a_module_name() {
        let session = session();
        let err = expand("with phase[1]:\n    x = 1\n".into(), "m.trl", None, &session).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Internal);
    }

    #[test]
    fn invalid_utf8_is_an_import_error() {
        let session = session();
        let err = expand(Source::Bytes(vec![0xff, 0xfe]), "b.trl", None, &session).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Import);
    }

    #[test]
    fn unparseable_text_names_the_dialect_pass() {
        let session = session();
        let err = expand("x = = 1\n".into(), "bad.trl", None, &session).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Import);
        assert!(err.message().contains("after applying all dialect source transformers"));
    }

    #[test]
    fn built_statements_are_located_before_compiling() {
        let session = session();
        let stmts = vec![crate::ast::builder::assign("x", crate::ast::builder::int(1))];
        let code = compile(stmts.into(), "q.trl", None, &session).unwrap();
        assert_eq!(code.body[0].loc, Some(Loc::new(1, 0)));
    }

    #[test]
    fn to_code_uses_the_dummy_location() {
        let stmts = vec![crate::ast::builder::assign("x", crate::ast::builder::int(1))];
        let code = to_code(Module::new(stmts), "q.trl").unwrap();
        assert_eq!(code.body[0].loc, Some(DUMMY_LOC));
    }

    #[test]
    fn output_goes_to_the_session_sink() {
        let (output, buffer) = SharedOutput::buffer();
        let session = Session::with_output(Default::default(), output);
        run("print(1 + 1)\nprint(\"a\", 2)\n".into(), Target::Fresh, &session).unwrap();
        assert_eq!(buffer.borrow().buffer, "2\na 2");
    }
}
