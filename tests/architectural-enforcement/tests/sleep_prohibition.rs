//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code waits on events, cancellation tokens and
//! deadlines. It never sleeps.

use architectural_enforcement::{scan_production, scan_sleep};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_production(scan_sleep);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("  - Deadlines through RouteContext::with_timeout");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
