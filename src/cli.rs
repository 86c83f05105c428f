//! The Trellis command-line interface.
//!
//! ```text
//! trellis run hello.trl            # expand, compile and execute
//! trellis expand hello.trl         # print the fully expanded source
//! trellis ast hello.trl            # print the parsed tree as JSON
//! trellis deps hello.trl           # macro and dialect dependencies, dependency mtime
//! trellis check src/               # expand every .trl file below a directory
//! ```
//!
//! Global options apply on top of the configuration file and the environment:
//! `-I/--search-root` (repeatable), `--config <yaml>`, `--max-expansion-depth <n|none>`.

use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use miette::Report;
use walkdir::WalkDir;

use crate::{
    compiler::{self, Source, Target},
    config::{parse_depth, Config},
    err_msg, init_tracing,
    runtime::Session,
    syntax::{parse_module, unparse_module},
    TrellisError,
};

/// Dotted name the file given to `run` and `expand` is compiled as.
pub const MAIN_MODULE: &str = "__main__";

// ============================================================================
// CLI ARGUMENTS
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "trellis",
    version,
    about = "Macro expansion with dialects and multi-phase compilation."
)]
pub struct TrellisArgs {
    /// Extra directory to search for modules; searched before configured roots.
    #[arg(short = 'I', long = "search-root", global = true)]
    pub search_roots: Vec<PathBuf>,

    /// YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Bound on nested macro applications: an integer, or `none`.
    #[arg(long, global = true)]
    pub max_expansion_depth: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Expand, compile and execute a file.
    Run {
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Print the fully macro-expanded source of a file.
    Expand {
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Print the parsed tree of a file as JSON, before any expansion.
    Ast {
        #[arg(required = true)]
        file: PathBuf,
    },
    /// List the macro and dialect modules a file depends on.
    Deps {
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Expand every source file below a directory and report failures.
    Check {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

pub fn run() {
    init_tracing();
    let args = TrellisArgs::parse();
    match execute(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            print_error(e);
            process::exit(1);
        }
    }
}

/// Runs one CLI command. `Ok(false)` means failures were already reported.
pub fn execute(args: TrellisArgs) -> Result<bool, TrellisError> {
    let base = base_config(&args)?;
    match &args.command {
        Command::Run { file } => {
            let session = Session::new(config_for_file(base, file));
            let filename = file.display().to_string();
            let module = compiler::create_module(Some(MAIN_MODULE), Some(&filename), &session)?;
            compiler::run(Source::Bytes(read(file)?), Target::Module(module), &session)?;
        }
        Command::Expand { file } => {
            let session = Session::new(config_for_file(base, file));
            let filename = file.display().to_string();
            let expanded = compiler::expand(Source::Bytes(read(file)?), &filename, Some(MAIN_MODULE), &session)?;
            print!("{}", unparse_module(&expanded));
        }
        Command::Ast { file } => {
            let text = String::from_utf8(read(file)?)
                .map_err(|e| err_msg!(Io, "{}: not valid UTF-8: {}", file.display(), e))?;
            let module = parse_module(&text, &file.display().to_string())?;
            let json = serde_json::to_string_pretty(&module)
                .map_err(|e| err_msg!(Internal, "cannot serialize tree: {}", e))?;
            println!("{}", json);
        }
        Command::Deps { file } => {
            let session = Session::new(config_for_file(base, file));
            let importer = session.importer();
            for dependency in importer.dependencies(&session, file)? {
                let location = match &dependency.path {
                    Some(path) => path.display().to_string(),
                    None => "<builtin or not found>".to_string(),
                };
                println!("{}\t{}", dependency.module, location);
            }
            println!("xstats\t{}", importer.path_xstats(&session, file)?);
        }
        Command::Check { dir } => return check(base.with_search_root(dir.clone()), dir),
    }
    Ok(true)
}

fn base_config(args: &TrellisArgs) -> Result<Config, TrellisError> {
    let mut config = match &args.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides()?;
    for root in args.search_roots.iter().rev() {
        config = config.with_search_root(root.clone());
    }
    if let Some(depth) = &args.max_expansion_depth {
        config = config.with_max_expansion_depth(parse_depth(depth)?);
    }
    Ok(config)
}

/// The directory of the file being compiled is searched after the configured roots, so
/// a root further up still decides the package of files inside packages.
fn config_for_file(mut config: Config, file: &Path) -> Config {
    let dir = match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !config.search_roots.contains(&dir) {
        config.search_roots.push(dir);
    }
    config
}

fn read(path: &Path) -> Result<Vec<u8>, TrellisError> {
    fs::read(path).map_err(|e| err_msg!(Io, "cannot read {}: {}", path.display(), e))
}

// ============================================================================
// CHECK
// ============================================================================

fn check(config: Config, dir: &Path) -> Result<bool, TrellisError> {
    let extension = config.source_extension.clone();
    let cache_dir = config.cache_dir_name.clone();
    let session = Session::new(config);

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != cache_dir.as_str())
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map_or(false, |ext| ext == extension.as_str()))
        .collect();
    files.sort();

    let mut failed = 0usize;
    for file in &files {
        let filename = file.display().to_string();
        let name = module_name(dir, file);
        let result = read(file)
            .and_then(|data| compiler::expand(Source::Bytes(data), &filename, Some(&name), &session));
        match result {
            Ok(_) => println!("ok      {}", filename),
            Err(e) => {
                failed += 1;
                println!("FAILED  {}", filename);
                print_error(e);
            }
        }
    }
    println!("checked {} file(s), {} failed", files.len(), failed);
    Ok(failed == 0)
}

/// Dotted module name of `file` relative to the search root `root`.
fn module_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file).with_extension("");
    let mut parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.len() > 1 && parts.last().map_or(false, |p| p == "__init__") {
        parts.pop();
    }
    parts.join(".")
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Renders `error` with miette, attaching the source text when the error names a
/// readable file.
pub fn print_error(error: TrellisError) {
    let filename = error.context().filename.clone();
    let error = match filename {
        Some(filename) if error.context().source.is_none() => match fs::read_to_string(&filename) {
            Ok(text) => error.with_source(&filename, text),
            Err(_) => error,
        },
        _ => error,
    };
    eprintln!("{:?}", Report::new(error));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_follow_directories() {
        let root = Path::new("src");
        assert_eq!(module_name(root, Path::new("src/a/b.trl")), "a.b");
        assert_eq!(module_name(root, Path::new("src/a/__init__.trl")), "a");
        assert_eq!(module_name(root, Path::new("src/top.trl")), "top");
    }

    #[test]
    fn file_directories_are_searched_last() {
        let config = config_for_file(Config::default(), Path::new("pkg/mod.trl"));
        assert_eq!(config.search_roots.last().map(PathBuf::as_path), Some(Path::new("pkg")));
        let config = config_for_file(Config::default(), Path::new("top.trl"));
        assert_eq!(config.search_roots, vec![PathBuf::from(".")]);
    }

    #[test]
    fn global_options_layer_over_defaults() {
        let args = TrellisArgs::parse_from([
            "trellis",
            "-I",
            "first",
            "--search-root",
            "second",
            "--max-expansion-depth",
            "none",
            "check",
        ]);
        let config = base_config(&args).unwrap();
        let first = config.search_roots.iter().position(|p| p == Path::new("first"));
        let second = config.search_roots.iter().position(|p| p == Path::new("second"));
        assert!(first < second);
        assert_eq!(config.max_expansion_depth, None);
    }
}
