//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Production code in the node crates MUST NOT use blocking I/O
//! inside async code.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::process`.

use architectural_enforcement::{production_files, scan_blocking_io, scan_production};

#[test]
fn test_production_sources_found() {
    let files = production_files();
    assert!(
        files.iter().any(|p| p.ends_with("router/core_router.rs")),
        "scanner did not find the core sources: {files:?}"
    );
}

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan_production(scan_blocking_io);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await");
        eprintln!("  - tokio::net::TcpStream::connect().await");
        eprintln!("  - tokio::process::Command::output().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
