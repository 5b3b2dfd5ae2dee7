//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Waiting is done
//! on I/O, channels, cancellation tokens or `tokio::time::timeout`.
//! **Exceptions**: test code

use architectural_enforcement::{fail_on_violations, production_files, Violation};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    fail_on_violations(
        "Sleep calls found in production code!",
        &violations,
        &[
            "✅ ACCEPTABLE waits:",
            "  - tokio::time::timeout around the awaited operation",
            "  - CancellationToken::cancelled() in a select!",
            "  - Test code (#[cfg(test)] modules, tests/ directories)",
            "❌ FORBIDDEN:",
            "  - Sleep in polling loops",
            "  - Sleep as poor man's synchronization",
        ],
    );
}

fn find_sleep_violations() -> Vec<Violation> {
    let mut violations = Vec::new();

    for file in production_files() {
        for (idx, code) in file.production_lines() {
            if code.contains("::sleep(") || code.contains(".sleep(") {
                violations.push(file.violation(idx, "Sleep call"));
            }
        }
    }

    violations
}
