//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::io`, async `reqwest`
//!
//! Blocking calls in plain functions (configuration loading before the
//! runtime does real work) are accepted.

use architectural_enforcement::{
    fail_on_violations, production_files, FnKind, SourceFile, Violation,
};

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations: Vec<Violation> = production_files().iter().flat_map(check_file).collect();

    fail_on_violations(
        "Blocking I/O calls found in production code!",
        &violations,
        &[
            "❌ FORBIDDEN in async functions:",
            "  - std::fs::*, std::net::*, std::process::Command",
            "  - std::io::stdin() / std::io::stdout()",
            "❌ FORBIDDEN everywhere:",
            "  - reqwest::blocking::*",
            "✅ REQUIRED async I/O:",
            "  - tokio::fs, tokio::net, tokio::io::stdout()",
        ],
    );
}

fn check_file(file: &SourceFile) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (idx, code) in file.production_lines() {
        if code.contains("reqwest::blocking") {
            violations.push(file.violation(idx, "Blocking HTTP client"));
        }

        if file.enclosing_fn(idx) != Some(FnKind::Async) {
            continue;
        }

        if code.contains("std::fs::") {
            violations.push(file.violation(idx, "Blocking file I/O"));
        }
        if code.contains("std::net::") {
            violations.push(file.violation(idx, "Blocking network I/O"));
        }
        if code.contains("std::process::Command") {
            violations.push(file.violation(idx, "Blocking process I/O"));
        }
        let stdio = ["io::stdin()", "io::stdout()"];
        if stdio
            .iter()
            .any(|call| code.contains(call) && !code.contains(&format!("tokio::{call}")))
        {
            violations.push(file.violation(idx, "Blocking stdin/stdout in async"));
        }
    }

    violations
}

#[test]
fn test_detector_flags_blocking_read_in_async_fn() {
    let file = SourceFile::parse(
        "bad.rs",
        "pub async fn load() -> String {\n    std::fs::read_to_string(\"x\").unwrap()\n}\n",
    );
    let violations = check_file(&file);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].line, 2);
}

#[test]
fn test_detector_accepts_blocking_read_in_sync_fn() {
    let file = SourceFile::parse(
        "ok.rs",
        "pub fn load() -> String {\n    std::fs::read_to_string(\"x\").unwrap()\n}\n",
    );
    assert!(check_file(&file).is_empty());
}

#[test]
fn test_detector_accepts_tokio_stdout() {
    let file = SourceFile::parse(
        "ok.rs",
        "async fn main() {\n    let out = tokio::io::stdout();\n}\n",
    );
    assert!(check_file(&file).is_empty());
}
