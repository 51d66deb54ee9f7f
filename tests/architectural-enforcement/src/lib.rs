//! Architectural Enforcement
//!
//! Source scanners shared by the integration tests in `tests/`. They walk the
//! production sources of the node crates and report lines that break the
//! async rules:
//! - no blocking file, network or process I/O inside async code
//! - no sleeping in production code
//!
//! Test code (`#[test]`, `#[tokio::test]`, `#[cfg(test)]`) and test-only
//! files are skipped.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["node/core/src", "node/daemon/src"];

/// Files that only exist for tests
pub const TEST_ONLY_FILES: &[&str] = &["test_utils.rs"];

/// One offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: PathBuf,
    pub line: usize,
    pub kind: &'static str,
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}: {}", self.path.display(), self.line, self.kind, self.text)
    }
}

/// Workspace root, found from this crate's manifest directory
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every production `.rs` file under [`PRODUCTION_DIRS`]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            if TEST_ONLY_FILES.contains(&name) {
                continue;
            }
            files.push(p.to_path_buf());
        }
    }

    files.sort();
    files
}

/// Blocking I/O inside async functions
pub fn scan_blocking_io(path: &Path, content: &str) -> Vec<Violation> {
    let lines: Vec<&str> = content.lines().collect();
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if code.trim().is_empty() || is_in_test_code(&lines, idx) || is_in_non_async_function(&lines, idx) {
            continue;
        }

        let kind = if code.contains("std::fs::") || code.contains("use std::fs") {
            Some("Blocking file I/O")
        } else if code.contains("std::net::") || code.contains("use std::net") {
            Some("Blocking network I/O")
        } else if code.contains("std::process::Command") {
            Some("Blocking process I/O")
        } else if (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
            && is_in_async_function(&lines, idx)
        {
            Some("Blocking stdin/stdout in async")
        } else {
            None
        };

        if let Some(kind) = kind {
            violations.push(Violation {
                path: path.to_path_buf(),
                line: idx + 1,
                kind,
                text: line.trim().to_string(),
            });
        }
    }

    violations
}

/// Any sleep outside test code
///
/// `sleep_until` is allowed: it is how deadlines are awaited.
pub fn scan_sleep(path: &Path, content: &str) -> Vec<Violation> {
    let lines: Vec<&str> = content.lines().collect();
    let mut violations = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !(code.contains("::sleep(") || code.contains(".sleep(")) {
            continue;
        }
        if is_in_test_code(&lines, idx) {
            continue;
        }
        violations.push(Violation {
            path: path.to_path_buf(),
            line: idx + 1,
            kind: "Sleep in production code",
            text: line.trim().to_string(),
        });
    }

    violations
}

/// Run `scan` over every production file
pub fn scan_production<F>(scan: F) -> Vec<Violation>
where
    F: Fn(&Path, &str) -> Vec<Violation>,
{
    production_files()
        .iter()
        .filter_map(|p| fs::read_to_string(p).ok().map(|c| scan(p, &c)))
        .flatten()
        .collect()
}

fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether the line sits in a `#[cfg(test)]` module or a test function
pub fn is_in_test_code(lines: &[&str], current_idx: usize) -> bool {
    // a cfg(test) module runs to the end of the file by convention
    if lines[..current_idx]
        .iter()
        .any(|l| l.trim().starts_with("#[cfg(test)]"))
    {
        return true;
    }

    let mut fn_idx = None;
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();
        if line.starts_with("fn ") || line.contains(" fn ") {
            fn_idx = Some(i);
            break;
        }
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }

    let Some(fn_idx) = fn_idx else {
        return false;
    };
    for i in (0..fn_idx).rev() {
        let line = lines[i].trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }
    false
}

/// Whether the nearest enclosing function is `async`
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();
        if line.contains("async fn ") {
            return true;
        }
        if line.contains("fn ") {
            return false;
        }
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }
    false
}

/// Whether the nearest enclosing function is a plain `fn`
pub fn is_in_non_async_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();
        if line.contains("async fn ") {
            return false;
        }
        if line.starts_with("fn ") || line.starts_with("pub fn ") || line.starts_with("pub(crate) fn ") {
            return true;
        }
        if line.starts_with("mod ") || (line.starts_with("impl ") && line.contains('{')) {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_function_detection() {
        let code = vec![
            "async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_non_async_function(&code, 1));
        assert_eq!(scan_blocking_io(Path::new("x.rs"), &code.join("\n")).len(), 1);
    }

    #[test]
    fn test_non_async_function_allowed() {
        let code = vec![
            "fn main() {",
            "    let contents = std::fs::read_to_string(\"node.toml\")?;",
            "}",
        ];
        assert!(is_in_non_async_function(&code, 1));
        assert!(scan_blocking_io(Path::new("x.rs"), &code.join("\n")).is_empty());
    }

    #[test]
    fn test_test_code_skipped() {
        let code = vec![
            "#[tokio::test]",
            "async fn test_something() {",
            "    tokio::time::sleep(Duration::from_millis(5)).await;",
            "}",
        ];
        assert!(is_in_test_code(&code, 2));
        assert!(scan_sleep(Path::new("x.rs"), &code.join("\n")).is_empty());

        let module = vec![
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() { std::thread::sleep(D); }",
            "}",
        ];
        assert!(scan_sleep(Path::new("x.rs"), &module.join("\n")).is_empty());
    }

    #[test]
    fn test_sleep_detected() {
        let code = vec!["async fn poll() {", "    tokio::time::sleep(D).await;", "}"];
        let found = scan_sleep(Path::new("x.rs"), &code.join("\n"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
    }
}
