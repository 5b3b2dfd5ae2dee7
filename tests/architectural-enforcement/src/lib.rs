//! Architectural Enforcement Integration Tests
//!
//! Shared source scanning for the integration tests in `tests/`:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//!
//! Production code is every `.rs` file under [`PRODUCTION_DIRS`], up to the
//! file's `#[cfg(test)]` module.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["suggest/core/src", "suggest/relay/src", "console/src"];

/// Workspace root (two levels above this package)
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// A rule broken on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: PathBuf,
    pub line: usize,
    pub rule: &'static str,
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.text
        )
    }
}

/// Kind of function enclosing a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    Sync,
    Async,
}

/// One production source file
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub lines: Vec<String>,
}

impl SourceFile {
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        Self {
            path: path.into(),
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    /// Lines before the test module, with comments stripped
    ///
    /// Yields `(index, code)`; the line number is `index + 1`.
    pub fn production_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .take_while(|(_, line)| !line.trim_start().starts_with("#[cfg(test)]"))
            .map(|(idx, line)| (idx, line.split("//").next().unwrap_or(line)))
            .filter(|(_, code)| !code.trim().is_empty())
    }

    /// Kind of the nearest function declared at or above `idx`
    pub fn enclosing_fn(&self, idx: usize) -> Option<FnKind> {
        let refs: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        enclosing_fn(&refs, idx)
    }

    pub fn violation(&self, idx: usize, rule: &'static str) -> Violation {
        Violation {
            path: self.path.clone(),
            line: idx + 1,
            rule,
            text: self.lines[idx].trim().to_string(),
        }
    }
}

/// Strip a leading visibility qualifier
fn strip_visibility(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix("pub(crate) ") {
        return rest;
    }
    if let Some(rest) = line.strip_prefix("pub(super) ") {
        return rest;
    }
    line.strip_prefix("pub ").unwrap_or(line)
}

/// Kind of the nearest function declared at or above `current_idx`
///
/// Scans backwards and stops at module and impl boundaries.
pub fn enclosing_fn(lines: &[&str], current_idx: usize) -> Option<FnKind> {
    for i in (0..=current_idx.min(lines.len().saturating_sub(1))).rev() {
        let line = strip_visibility(lines[i].trim());

        if line.starts_with("async fn ") {
            return Some(FnKind::Async);
        }
        if line.starts_with("fn ") || line.starts_with("const fn ") {
            return Some(FnKind::Sync);
        }

        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return None;
        }
    }
    None
}

/// Load every production source file of the workspace
pub fn production_files() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        assert!(path.exists(), "missing production directory {}", path.display());

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(entry.path()) {
                files.push(SourceFile::parse(entry.path(), &content));
            }
        }
    }

    files
}

/// Print violations and fail the test
pub fn fail_on_violations(title: &str, violations: &[Violation], guidance: &[&str]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ CRITICAL: {title}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in guidance {
        eprintln!("  {line}");
    }

    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enclosing_fn_detects_async() {
        let lines = [
            "pub async fn open(&self) -> Result<()> {",
            "    let x = 1;",
            "}",
        ];
        assert_eq!(enclosing_fn(&lines, 1), Some(FnKind::Async));
    }

    #[test]
    fn test_enclosing_fn_detects_sync_with_visibility() {
        let lines = [
            "pub(crate) fn load(path: &Path) -> String {",
            "    std::fs::read_to_string(path).unwrap_or_default()",
            "}",
        ];
        assert_eq!(enclosing_fn(&lines, 1), Some(FnKind::Sync));
    }

    #[test]
    fn test_enclosing_fn_stops_at_impl() {
        let lines = ["impl Foo {", "    const X: u8 = 1;", "}"];
        assert_eq!(enclosing_fn(&lines, 1), None);
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let file = SourceFile::parse(
            "x.rs",
            "fn a() {}\n// comment only\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n",
        );
        let lines: Vec<usize> = file.production_lines().map(|(idx, _)| idx).collect();
        assert_eq!(lines, vec![0]);
    }

    #[test]
    fn test_workspace_root_has_production_dirs() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_root().join(dir).exists(), "{dir}");
        }
    }
}
