//! Module finding, loading and dependency-aware caching.
//!
//! Modules are looked up as `a/b/c.trl` or `a/b/c/__init__.trl` under each search root
//! in order. Compiled code is cached per path, keyed by [`Importer::path_xstats`]: the
//! latest modification time over the file and every macro or dialect definition file
//! its macro-imports reach. Editing a macro definition therefore invalidates the
//! compiled code of every module that uses it.
//!
//! The macro-import statements of each file are kept in a JSON side-cache next to the
//! file, so computing the dependency mtime of an unchanged file needs no parse:
//!
//! ```text
//! pkg/__trellis_cache__/mod.trl.deps.json
//! ```

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    time::UNIX_EPOCH,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    ast::{Module, Stmt, StmtKind},
    compiler::{self, Source},
    config::Config,
    err_at, err_msg,
    macros::discovery::{is_macro_import, resolve_package, DIALECTS_MAGIC, MACROS_MAGIC, SELF_MODULE},
    multiphase::is_phase_block,
    runtime::{native, CodeObject, ModuleObject, Session},
    syntax::{parse_module, parse_statement},
    TrellisError,
};

type ImportResult<T> = Result<T, TrellisError>;

static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^from\s+[.0-9A-Za-z_]+\s+import\s+(?:macros|dialects),[^\n]*$")
        .expect("import-line pattern is valid")
});

// ============================================================================
// NAME RESOLUTION
// ============================================================================

/// Resolves a possibly relative module reference against `package`.
///
/// `level` is the number of leading dots: one means `package` itself, two its parent.
pub fn resolve_name(level: usize, module: Option<&str>, package: &str) -> ImportResult<String> {
    if level == 0 {
        return module
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .ok_or_else(|| err_msg!(Import, "empty module name"));
    }
    if package.is_empty() {
        return Err(err_msg!(Import, "attempted relative import with no known parent package"));
    }
    let parts: Vec<&str> = package.split('.').collect();
    if level > parts.len() {
        return Err(err_msg!(Import, "attempted relative import beyond top-level package"));
    }
    let base = parts[..parts.len() - (level - 1)].join(".");
    Ok(match module {
        Some(m) if !m.is_empty() => format!("{}.{}", base, m),
        _ => base,
    })
}

// ============================================================================
// SIDE-CACHE
// ============================================================================

/// On-disk record of a file's macro- and dialect-imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepsRecord {
    pub source: PathBuf,
    pub mtime_ns: u64,
    pub macroimports: Vec<Stmt>,
    pub dialectimports: Vec<Stmt>,
    pub has_relative_macroimports: bool,
}

impl DepsRecord {
    fn scan(source: &Path, mtime_ns: u64, text: &str) -> Self {
        let filename = source.display().to_string();
        let stmts = match parse_module(text, &filename) {
            Ok(module) => import_candidates(&module),
            // Dialect source transforms may make the raw text unparseable; the import
            // lines themselves are always plain single lines.
            Err(_) => IMPORT_LINE
                .find_iter(text)
                .filter_map(|m| parse_statement(m.as_str(), &filename).ok())
                .collect(),
        };
        let macroimports: Vec<Stmt> = stmts
            .iter()
            .filter(|s| is_macro_import(s, MACROS_MAGIC))
            .cloned()
            .collect();
        let dialectimports: Vec<Stmt> = stmts
            .iter()
            .filter(|s| is_macro_import(s, DIALECTS_MAGIC))
            .cloned()
            .collect();
        let has_relative_macroimports = macroimports
            .iter()
            .any(|s| matches!(s.kind, StmtKind::ImportFrom { level, .. } if level > 0));
        Self {
            source: source.to_path_buf(),
            mtime_ns,
            macroimports,
            dialectimports,
            has_relative_macroimports,
        }
    }
}

/// Top-level statements plus the bodies of top-level phase blocks.
fn import_candidates(module: &Module) -> Vec<Stmt> {
    let mut out = Vec::new();
    for stmt in &module.body {
        match &stmt.kind {
            StmtKind::With { body, .. } if is_phase_block(stmt) => out.extend(body.iter().cloned()),
            _ => out.push(stmt.clone()),
        }
    }
    out
}

pub fn side_cache_path(path: &Path, config: &Config) -> Option<PathBuf> {
    let dir = path.parent()?;
    let name = path.file_name()?.to_string_lossy();
    Some(dir.join(&config.cache_dir_name).join(format!("{}.deps.json", name)))
}

fn mtime_ns(path: &Path) -> ImportResult<u64> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| err_msg!(Io, "cannot stat {}: {}", path.display(), e))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0))
}

// ============================================================================
// IMPORTER
// ============================================================================

struct CachedCode {
    mtime_ns: u64,
    code: Rc<CodeObject>,
}

/// A direct macro or dialect dependency of a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub module: String,
    /// `None` for native modules and modules not found on the search roots.
    pub path: Option<PathBuf>,
}

#[derive(Default)]
pub struct Importer {
    code_cache: RefCell<HashMap<PathBuf, CachedCode>>,
    xstats: RefCell<HashMap<PathBuf, u64>>,
    in_progress: RefCell<HashSet<PathBuf>>,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the source file of module `name` on the search roots.
    pub fn find_module(&self, name: &str, config: &Config) -> Option<PathBuf> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        config.search_roots.iter().find_map(|root| {
            let base = parts.iter().fold(root.clone(), |dir, part| dir.join(part));
            let mut file = base.clone();
            file.set_extension(&config.source_extension);
            if file.is_file() {
                return Some(file);
            }
            let init = base.join(format!("__init__.{}", config.source_extension));
            init.is_file().then_some(init)
        })
    }

    /// Finds a directory standing in for package `name` when it has no `__init__` file.
    pub fn find_namespace_dir(&self, name: &str, config: &Config) -> Option<PathBuf> {
        config.search_roots.iter().find_map(|root| {
            let dir = name.split('.').fold(root.clone(), |dir, part| dir.join(part));
            dir.is_dir().then_some(dir)
        })
    }

    /// Compiles and executes the module at `path`, registering it as `name`.
    pub fn load(&self, session: &Session, name: &str, path: &Path) -> ImportResult<Rc<ModuleObject>> {
        let is_package = path
            .file_stem()
            .map_or(false, |stem| stem == "__init__");
        let package = if is_package {
            name.to_string()
        } else {
            name.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default()
        };

        let code = self.get_code(session, name, path)?;
        let module = Rc::new(ModuleObject::new(name, Some(path.to_path_buf()), package));
        session.registry().insert(module.clone());
        debug!(target: "trellis::importer", module = name, path = %path.display(), "executing module");
        if let Err(e) = session.exec_code(&code, &module) {
            session.registry().remove(name);
            return Err(e);
        }
        Ok(module)
    }

    fn get_code(&self, session: &Session, name: &str, path: &Path) -> ImportResult<Rc<CodeObject>> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let mtime = self.path_xstats(session, path)?;
        if let Some(cached) = self.code_cache.borrow().get(&key) {
            if cached.mtime_ns == mtime {
                trace!(target: "trellis::importer", module = name, "compiled code cache hit");
                return Ok(cached.code.clone());
            }
        }
        let code = Rc::new(self.source_to_xcode(session, path, name)?);
        self.code_cache.borrow_mut().insert(
            key,
            CachedCode {
                mtime_ns: mtime,
                code: code.clone(),
            },
        );
        Ok(code)
    }

    /// Reads, expands and compiles the source file at `path` as module `name`.
    pub fn source_to_xcode(&self, session: &Session, path: &Path, name: &str) -> ImportResult<CodeObject> {
        let data = fs::read(path).map_err(|e| err_msg!(Io, "cannot read {}: {}", path.display(), e))?;
        compiler::compile(Source::Bytes(data), &path.display().to_string(), Some(name), session)
    }

    pub fn is_code_cached(&self, path: &Path) -> bool {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.code_cache.borrow().contains_key(&key)
    }

    /// Modification time of `path` in nanoseconds, combined (latest wins) with that of
    /// every macro and dialect definition file reachable through its macro-imports.
    pub fn path_xstats(&self, session: &Session, path: &Path) -> ImportResult<u64> {
        let path = fs::canonicalize(path).map_err(|e| err_msg!(Io, "cannot resolve {}: {}", path.display(), e))?;
        if let Some(&mtime) = self.xstats.borrow().get(&path) {
            return Ok(mtime);
        }
        if !self.in_progress.borrow_mut().insert(path.clone()) {
            // Cycle: the file is already being accounted for further up.
            return Ok(0);
        }
        let result = self.compute_xstats(session, &path);
        self.in_progress.borrow_mut().remove(&path);
        let mtime = result?;
        self.xstats.borrow_mut().insert(path, mtime);
        Ok(mtime)
    }

    fn compute_xstats(&self, session: &Session, path: &Path) -> ImportResult<u64> {
        let mut latest = mtime_ns(path)?;
        for dependency in self.dependencies(session, path)? {
            if let Some(dep_path) = dependency.path {
                latest = latest.max(self.path_xstats(session, &dep_path)?);
            }
        }
        trace!(target: "trellis::importer", path = %path.display(), mtime_ns = latest, "xstats");
        Ok(latest)
    }

    /// Direct macro and dialect dependencies of the source file at `path`, in import
    /// order. Self-macro-imports are left out.
    pub fn dependencies(&self, session: &Session, path: &Path) -> ImportResult<Vec<Dependency>> {
        let record = self.deps_record(session, path)?;
        let filename = path.display().to_string();
        let mut out = Vec::new();
        for stmt in record.macroimports.iter().chain(&record.dialectimports) {
            let StmtKind::ImportFrom { module, level, .. } = &stmt.kind else {
                continue;
            };
            let Some(module) = module.as_deref() else {
                return Err(err_at!(Syntax, filename, stmt.loc, "missing module name in macro-import"));
            };
            if *level == 0 && module == SELF_MODULE {
                continue;
            }
            let absolute = if *level > 0 {
                let package = resolve_package(&filename, stmt, session)?;
                resolve_name(*level, Some(module), &package).map_err(|e| e.located(&filename, stmt.loc))?
            } else {
                module.to_string()
            };
            let dep_path = if native::is_native(&absolute) {
                None
            } else {
                self.find_module(&absolute, session.config())
            };
            out.push(Dependency {
                module: absolute,
                path: dep_path,
            });
        }
        Ok(out)
    }

    /// Reads the side-cache for `path`, rebuilding it when missing or stale.
    pub fn deps_record(&self, session: &Session, path: &Path) -> ImportResult<DepsRecord> {
        let config = session.config();
        let own_mtime = mtime_ns(path)?;
        let cache_path = side_cache_path(path, config);

        if let Some(cache_path) = &cache_path {
            let cached = fs::read_to_string(cache_path)
                .ok()
                .and_then(|text| serde_json::from_str::<DepsRecord>(&text).ok());
            match cached {
                Some(record) if record.mtime_ns == own_mtime && record.source == path => {
                    trace!(target: "trellis::importer", path = %path.display(), "side-cache hit");
                    return Ok(record);
                }
                _ => {}
            }
        }

        let text = fs::read_to_string(path).map_err(|e| err_msg!(Io, "cannot read {}: {}", path.display(), e))?;
        let record = DepsRecord::scan(path, own_mtime, &text);

        if config.write_side_cache {
            if let Some(cache_path) = &cache_path {
                if let Err(e) = write_side_cache(cache_path, &record) {
                    debug!(target: "trellis::importer", path = %cache_path.display(), error = %e, "side-cache not written");
                }
            }
        }
        Ok(record)
    }

    /// Forgets memoized dependency mtimes and all compiled code.
    pub fn invalidate_xcaches(&self) {
        self.xstats.borrow_mut().clear();
        self.code_cache.borrow_mut().clear();
        debug!(target: "trellis::importer", "caches invalidated");
    }
}

fn write_side_cache(cache_path: &Path, record: &DepsRecord) -> std::io::Result<()> {
    if let Some(dir) = cache_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(record).map_err(std::io::Error::other)?;
    fs::write(cache_path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_names_walk_up_the_package() {
        assert_eq!(resolve_name(1, Some("m"), "a.b").unwrap(), "a.b.m");
        assert_eq!(resolve_name(2, Some("m"), "a.b").unwrap(), "a.m");
        assert_eq!(resolve_name(1, None, "a.b").unwrap(), "a.b");
        assert!(resolve_name(3, Some("m"), "a.b").is_err());
        assert!(resolve_name(1, Some("m"), "").is_err());
        assert_eq!(resolve_name(0, Some("x.y"), "").unwrap(), "x.y");
    }

    #[test]
    fn unparseable_sources_still_yield_import_lines() {
        let text = "from defs import macros, m\n$$ not syntax $$\nfrom .dia import dialects, D\n";
        let record = DepsRecord::scan(Path::new("x.trl"), 1, text);
        assert_eq!(record.macroimports.len(), 1);
        assert_eq!(record.dialectimports.len(), 1);
        assert!(!record.has_relative_macroimports);
    }

    #[test]
    fn only_macro_imports_count_as_relative() {
        let text = "from defs import macros, m
from .dia import dialects, D
";
        let record = DepsRecord::scan(Path::new("x.trl"), 1, text);
        assert!(!record.has_relative_macroimports);

        let text = "from .defs import macros, m
from dia import dialects, D
";
        let record = DepsRecord::scan(Path::new("x.trl"), 1, text);
        assert!(record.has_relative_macroimports);
    }

    #[test]
    fn phase_blocks_contribute_imports() {
        let text = "with phase[1]:\n    from defs import macros, m\n    x = 1\n";
        let record = DepsRecord::scan(Path::new("x.trl"), 1, text);
        assert_eq!(record.macroimports.len(), 1);
        assert!(!record.has_relative_macroimports);
    }

    #[test]
    fn side_cache_lives_beside_the_source() {
        let path = side_cache_path(Path::new("pkg/mod.trl"), &Config::default()).unwrap();
        assert_eq!(path, Path::new("pkg/__trellis_cache__/mod.trl.deps.json"));
    }
}
