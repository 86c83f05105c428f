//! Engine configuration.
//!
//! Layered the usual way: built-in defaults, then an optional YAML file, then
//! environment overrides, then whatever the CLI sets explicitly.
//!
//! ```yaml
//! search_roots: [lib, vendor]
//! max_expansion_depth: 200
//! write_side_cache: false
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{err_msg, TrellisError};

pub const ENV_SEARCH_PATH: &str = "TRELLIS_PATH";
pub const ENV_MAX_EXPANSION_DEPTH: &str = "TRELLIS_MAX_EXPANSION_DEPTH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directories searched, in order, for `a/b/c.trl` and `a/b/c/__init__.trl`.
    pub search_roots: Vec<PathBuf>,
    /// Source file extension, without the dot.
    pub source_extension: String,
    /// Bound on nested macro applications; `None` means unbounded.
    pub max_expansion_depth: Option<usize>,
    /// Bound on nested host function calls.
    pub max_call_depth: usize,
    /// Whether `path_xstats` persists macro-import data next to source files.
    pub write_side_cache: bool,
    pub cache_dir_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_roots: vec![PathBuf::from(".")],
            source_extension: "trl".to_string(),
            max_expansion_depth: Some(1000),
            max_call_depth: 200,
            write_side_cache: true,
            cache_dir_name: "__trellis_cache__".to_string(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Self, TrellisError> {
        serde_yaml::from_str(text).map_err(|e| err_msg!(Io, "invalid configuration: {}", e))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, TrellisError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| err_msg!(Io, "cannot read configuration {}: {}", path.display(), e))?;
        Self::from_yaml_str(&text)
    }

    /// Applies `TRELLIS_PATH` and `TRELLIS_MAX_EXPANSION_DEPTH` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Result<Self, TrellisError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// `TRELLIS_PATH` entries are prepended to the search roots. The depth accepts an
    /// integer or `none`.
    pub fn apply_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, TrellisError> {
        if let Some(paths) = lookup(ENV_SEARCH_PATH) {
            let mut roots: Vec<PathBuf> = std::env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            roots.append(&mut self.search_roots);
            self.search_roots = roots;
        }
        if let Some(depth) = lookup(ENV_MAX_EXPANSION_DEPTH) {
            self.max_expansion_depth = parse_depth(&depth)?;
        }
        Ok(self)
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_roots.insert(0, root.into());
        self
    }

    pub fn with_max_expansion_depth(mut self, depth: Option<usize>) -> Self {
        self.max_expansion_depth = depth;
        self
    }
}

/// Parses a depth setting: a non-negative integer, or `none` for unbounded.
pub fn parse_depth(text: &str) -> Result<Option<usize>, TrellisError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    text.parse::<usize>()
        .map(Some)
        .map_err(|_| err_msg!(Io, "invalid expansion depth '{}': expected an integer or 'none'", text))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn yaml_overrides_defaults() {
        let config = Config::from_yaml_str("search_roots: [lib]\nmax_expansion_depth: 7\n").unwrap();
        assert_eq!(config.search_roots, vec![PathBuf::from("lib")]);
        assert_eq!(config.max_expansion_depth, Some(7));
        assert_eq!(config.source_extension, "trl");
    }

    #[test]
    fn yaml_null_depth_is_unbounded() {
        let config = Config::from_yaml_str("max_expansion_depth: null\n").unwrap();
        assert_eq!(config.max_expansion_depth, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_yaml_str("serch_roots: [lib]\n").is_err());
    }

    #[test]
    fn environment_prepends_roots_and_sets_depth() {
        let config = Config::default()
            .apply_env(|key| match key {
                ENV_SEARCH_PATH => Some("vendor".to_string()),
                ENV_MAX_EXPANSION_DEPTH => Some("none".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.search_roots, vec![PathBuf::from("vendor"), PathBuf::from(".")]);
        assert_eq!(config.max_expansion_depth, None);
    }

    #[test]
    fn bad_depth_is_an_error() {
        assert!(parse_depth("deep").is_err());
        assert_eq!(parse_depth(" 12 ").unwrap(), Some(12));
    }
}
