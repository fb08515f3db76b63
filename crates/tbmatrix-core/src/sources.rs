//! Source glob expansion.
//!
//! Patterns support `*`, `?` and `**` (any number of directories). Matches
//! are returned sorted so that compilation order is reproducible.

use crate::error::{MatrixError, Result};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const WILDCARDS: &[char] = &['*', '?'];

/// A compiled source glob anchored at a base directory.
#[derive(Debug, Clone)]
pub struct SourceGlob {
    pattern: String,
    root: PathBuf,
    matcher: Option<Regex>,
    depth: Option<usize>,
}

impl SourceGlob {
    /// Compile `pattern`, resolving relative patterns against `base`.
    pub fn new(base: &Path, pattern: &str) -> Result<Self> {
        let full = base.join(pattern);

        let mut root = PathBuf::new();
        let mut rest: Vec<String> = Vec::new();
        for component in full.components() {
            let text = component.as_os_str().to_string_lossy().to_string();
            if rest.is_empty() && !text.contains(WILDCARDS) {
                root.push(component.as_os_str());
            } else {
                if matches!(component, Component::ParentDir) {
                    return Err(MatrixError::InvalidGlob {
                        pattern: pattern.to_string(),
                        reason: "'..' after a wildcard".to_string(),
                    });
                }
                rest.push(text);
            }
        }

        if rest.is_empty() {
            return Ok(Self {
                pattern: pattern.to_string(),
                root,
                matcher: None,
                depth: Some(0),
            });
        }

        let depth = if rest.iter().any(|c| c == "**") {
            None
        } else {
            Some(rest.len())
        };
        let matcher = Regex::new(&glob_to_regex(&rest)).map_err(|e| MatrixError::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            root,
            matcher: Some(matcher),
            depth,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Expand the glob against the filesystem.
    ///
    /// A missing root directory yields no matches rather than an error.
    pub fn expand(&self) -> Vec<PathBuf> {
        let Some(matcher) = &self.matcher else {
            return if self.root.is_file() {
                vec![self.root.clone()]
            } else {
                Vec::new()
            };
        };
        if !self.root.is_dir() {
            return Vec::new();
        }

        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name();
        if let Some(depth) = self.depth {
            walker = walker.max_depth(depth);
        }

        let mut matches: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .map(|rel| matcher.is_match(&to_slash(rel)))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();
        matches.sort();
        matches
    }
}

/// Translate glob path components into an anchored regex over `/`-joined paths.
fn glob_to_regex(components: &[String]) -> String {
    let mut re = String::from("^");
    for (i, component) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        if component == "**" {
            re.push_str(if last { ".*" } else { "(?:[^/]+/)*" });
            continue;
        }
        for c in component.chars() {
            match c {
                '*' => re.push_str("[^/]*"),
                '?' => re.push_str("[^/]"),
                other => re.push_str(&regex::escape(&other.to_string())),
            }
        }
        if !last {
            re.push('/');
        }
    }
    re.push('$');
    re
}

/// Wildcard matcher for run identities (`project.abc2dq_tb.*`).
pub fn wildcard_matcher(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| MatrixError::InvalidGlob {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "-- vhdl").unwrap();
    }

    #[test]
    fn test_star_matches_single_directory_level() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/b.vhd");
        touch(dir.path(), "src/a.vhd");
        touch(dir.path(), "src/notes.txt");
        touch(dir.path(), "src/nested/c.vhd");

        let glob = SourceGlob::new(dir.path(), "src/*.vhd").unwrap();
        let files = glob.expand();
        assert_eq!(
            files,
            vec![dir.path().join("src/a.vhd"), dir.path().join("src/b.vhd")]
        );
    }

    #[test]
    fn test_double_star_recurses() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "hdl/top.vhd");
        touch(dir.path(), "hdl/transforms/src/abc2dq.vhd");
        touch(dir.path(), "hdl/transforms/test/abc2dq_tb.vhd");

        let glob = SourceGlob::new(dir.path(), "hdl/**/*.vhd").unwrap();
        assert_eq!(glob.expand().len(), 3);
    }

    #[test]
    fn test_literal_path() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "project_pkg.vhd");

        let glob = SourceGlob::new(dir.path(), "project_pkg.vhd").unwrap();
        assert_eq!(glob.expand(), vec![dir.path().join("project_pkg.vhd")]);

        let missing = SourceGlob::new(dir.path(), "missing.vhd").unwrap();
        assert!(missing.expand().is_empty());
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let glob = SourceGlob::new(dir.path(), "lib/open-logic/*.vhd").unwrap();
        assert!(glob.expand().is_empty());
    }

    #[test]
    fn test_parent_dir_before_wildcard_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "lib/x.vhd");
        let base = dir.path().join("test");
        fs::create_dir_all(&base).unwrap();

        let glob = SourceGlob::new(&base, "../lib/*.vhd").unwrap();
        assert_eq!(glob.expand().len(), 1);
    }

    #[test]
    fn test_wildcard_matcher() {
        let re = wildcard_matcher("project.abc2dq_tb.*").unwrap();
        assert!(re.is_match("project.abc2dq_tb.d_negative"));
        assert!(!re.is_match("project.dq2abc_tb.d"));
    }
}
