//! `glob` — finds files matching a glob pattern.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::SystemTime;

use serde_json::Value;
use walkdir::WalkDir;

use crate::BuiltinTool;

/// Finds files matching a glob pattern, sorted by modification time (most
/// recent first). FileRead category (spec.md §4.1).
pub struct GlobTool;

impl BuiltinTool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn run(&self, arguments: &Value) -> Result<String, String> {
        let pattern = arguments
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or("pattern is required")?;
        let search_dir = arguments.get("path").and_then(Value::as_str).map_or_else(
            || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            PathBuf::from,
        );

        if !search_dir.exists() {
            return Err(format!("{}: no such directory", search_dir.display()));
        }
        let search_dir = search_dir.canonicalize().map_err(|e| e.to_string())?;

        let glob = globset::GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| format!("invalid glob pattern: {e}"))?
            .compile_matcher();

        let mut matches: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in WalkDir::new(&search_dir).follow_links(false).into_iter().filter_entry(|e| {
            e.depth() == 0 || e.file_name().to_str().is_none_or(|s| !s.starts_with('.'))
        }) {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_dir() {
                continue;
            }
            let rel_path = entry.path().strip_prefix(&search_dir).unwrap_or(entry.path());
            if glob.is_match(rel_path) {
                let mtime = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((entry.path().to_path_buf(), mtime));
            }
        }
        matches.sort_by(|a, b| b.1.cmp(&a.1));

        if matches.is_empty() {
            return Ok(format!("No files matching \"{pattern}\" found"));
        }

        let mut output = String::new();
        for (path, _) in &matches {
            output.push_str(&path.display().to_string());
            output.push('\n');
        }
        let _ = write!(output, "\n({} files matched)", matches.len());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn matches_flat_pattern() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main(){}").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn test(){}").unwrap();
        std::fs::write(dir.path().join("c.txt"), "hello").unwrap();

        let result = GlobTool.run(&serde_json::json!({"pattern": "*.rs", "path": dir.path()})).unwrap();

        assert!(result.contains("a.rs"));
        assert!(result.contains("b.rs"));
        assert!(!result.contains("c.txt"));
        assert!(result.contains("2 files matched"));
    }

    #[test]
    fn matches_recursive_pattern() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src").join("sub")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/sub/lib.rs"), "").unwrap();

        let result = GlobTool.run(&serde_json::json!({"pattern": "**/*.rs", "path": dir.path()})).unwrap();

        assert!(result.contains("main.rs"));
        assert!(result.contains("lib.rs"));
    }

    #[test]
    fn reports_no_matches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let result = GlobTool.run(&serde_json::json!({"pattern": "*.rs", "path": dir.path()})).unwrap();
        assert!(result.contains("No files matching"));
    }

    #[test]
    fn rejects_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let result = GlobTool.run(&serde_json::json!({"pattern": "[invalid", "path": dir.path()}));
        assert!(result.is_err());
    }

    #[test]
    fn skips_hidden_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/config"), "").unwrap();
        std::fs::write(dir.path().join("visible.rs"), "").unwrap();

        let result = GlobTool.run(&serde_json::json!({"pattern": "**/*", "path": dir.path()})).unwrap();

        assert!(result.contains("visible.rs"));
        assert!(!result.contains(".git"));
    }
}
