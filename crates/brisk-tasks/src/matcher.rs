//! Glob expansion against an explicit working directory

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::TaskError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Expand `patterns` relative to `cwd`.
///
/// Returns absolute paths of regular files in first-match order with
/// duplicates removed. Blank patterns are skipped and a pattern matching
/// nothing is not an error.
pub fn match_patterns<S: AsRef<str>>(patterns: &[S], cwd: &Path) -> Result<Vec<PathBuf>, TaskError> {
    let base = Pattern::escape(&cwd.to_string_lossy());
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref().trim();
        if pattern.is_empty() {
            continue;
        }

        let full = if Path::new(pattern).is_absolute() {
            pattern.to_string()
        } else {
            format!("{}/{}", base.trim_end_matches('/'), pattern.trim_start_matches("./"))
        };

        let entries = glob::glob_with(&full, MATCH_OPTIONS).map_err(|e| TaskError::Glob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        for entry in entries {
            let path = entry.map_err(|e| TaskError::io(e.path(), e.error()))?;
            if path.is_file() && seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// A pattern matching exactly `path`, for re-resolving recorded files
pub fn literal_pattern(path: &Path) -> String {
    Pattern::escape(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, rel).unwrap();
        path
    }

    #[test]
    fn test_relative_patterns_resolve_against_cwd() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "src/a.c");
        let b = touch(temp.path(), "src/nested/b.c");
        touch(temp.path(), "src/readme.md");

        let flat = match_patterns(&["src/*.c"], temp.path()).unwrap();
        assert_eq!(flat, vec![a.clone()]);

        let mut deep = match_patterns(&["src/**/*.c"], temp.path()).unwrap();
        deep.sort();
        assert_eq!(deep, vec![a, b]);
    }

    #[test]
    fn test_duplicates_and_blank_patterns() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.txt");

        let files = match_patterns(&["", "a.txt", "*.txt", "  "], temp.path()).unwrap();
        assert_eq!(files, vec![a]);
    }

    #[test]
    fn test_directories_and_missing_matches_are_ignored() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("build")).unwrap();

        assert!(match_patterns(&["build", "nothing/*.o"], temp.path())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_malformed_pattern() {
        let temp = TempDir::new().unwrap();
        let err = match_patterns(&["src/[.c"], temp.path()).unwrap_err();
        assert!(matches!(err, TaskError::Glob { ref pattern, .. } if pattern == "src/[.c"));
    }

    #[test]
    fn test_literal_pattern_round_trip() {
        let temp = TempDir::new().unwrap();
        let odd = touch(temp.path(), "out/[v1]*.js");

        let files = match_patterns(&[literal_pattern(&odd)], temp.path()).unwrap();
        assert_eq!(files, vec![odd]);
    }
}
