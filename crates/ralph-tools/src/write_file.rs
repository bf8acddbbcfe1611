//! `write_file` — writes content to a file, TOCTOU-verified at open time.

use std::io::Write as _;

use serde_json::Value;

use ralph_policy::{verify_and_open, ApprovedPath};

use crate::BuiltinTool;

/// Writes content to a file, creating parent directories as needed.
/// FileWrite category (spec.md §4.1) — protected-file rejection and
/// approval happen upstream in the batch executor; this tool closes the
/// TOCTOU window between that approval and the actual write via
/// [`verify_and_open`].
pub struct WriteFileTool;

impl BuiltinTool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn is_thread_safe(&self) -> bool {
        false
    }

    fn run(&self, arguments: &Value) -> Result<String, String> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .ok_or("path is required")?;
        let content = arguments
            .get("content")
            .and_then(Value::as_str)
            .ok_or("content is required")?;

        let path = std::path::Path::new(path);
        if !path.is_absolute() {
            return Err("path must be absolute".to_string());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let approved = ApprovedPath::capture(path).ok_or_else(|| format!("{}: parent directory unreachable", path.display()))?;
        let mut file = verify_and_open(&approved, true).map_err(|e| e.to_string())?;
        file.set_len(0).map_err(|e| e.to_string())?;
        file.write_all(content.as_bytes()).map_err(|e| e.to_string())?;

        Ok(format!("Wrote {} bytes to {}", content.len(), path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");

        let result = WriteFileTool
            .run(&serde_json::json!({"path": path.to_str().unwrap(), "content": "hello world"}))
            .unwrap();

        assert!(result.contains("11 bytes"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("c").join("test.txt");

        WriteFileTool
            .run(&serde_json::json!({"path": path.to_str().unwrap(), "content": "nested"}))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "nested");
    }

    #[test]
    fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, "old content").unwrap();

        WriteFileTool
            .run(&serde_json::json!({"path": path.to_str().unwrap(), "content": "new content"}))
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new content");
    }

    #[test]
    fn rejects_relative_paths() {
        let err = WriteFileTool.run(&serde_json::json!({"path": "relative.txt", "content": "x"})).unwrap_err();
        assert!(err.contains("absolute"));
    }

    #[test]
    fn missing_arguments_fail() {
        assert!(WriteFileTool.run(&serde_json::json!({"path": "/tmp/x.txt"})).is_err());
        assert!(WriteFileTool.run(&serde_json::json!({"content": "hello"})).is_err());
    }
}
