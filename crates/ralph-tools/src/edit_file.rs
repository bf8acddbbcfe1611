//! `edit_file` — exact string replacement, TOCTOU-verified at open time.

use std::io::Write as _;

use serde_json::Value;

use ralph_policy::{verify_and_open, ApprovedPath};

use crate::BuiltinTool;

/// Performs exact string replacements in a file. FileWrite category
/// (spec.md §4.1); `old_string` must be unique unless `replace_all` is
/// set. Re-verifies the target path at open time via [`verify_and_open`],
/// the same TOCTOU guard `write_file` uses.
pub struct EditFileTool;

impl BuiltinTool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn is_thread_safe(&self) -> bool {
        false
    }

    fn run(&self, arguments: &Value) -> Result<String, String> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .ok_or("path is required")?;
        let old_string = arguments
            .get("old_string")
            .and_then(Value::as_str)
            .ok_or("old_string is required")?;
        let new_string = arguments
            .get("new_string")
            .and_then(Value::as_str)
            .ok_or("new_string is required")?;
        let replace_all = arguments.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        let path = std::path::Path::new(path);
        if !path.exists() {
            return Err(format!("{}: no such file", path.display()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let count = content.matches(old_string).count();
        if count == 0 {
            return Err(format!("old_string not found in {}", path.display()));
        }
        if count > 1 && !replace_all {
            return Err(format!(
                "old_string found {count} times in {} — use replace_all or provide more context to make it unique",
                path.display()
            ));
        }

        let new_content =
            if replace_all { content.replace(old_string, new_string) } else { content.replacen(old_string, new_string, 1) };

        let approved = ApprovedPath::capture(path).ok_or_else(|| format!("{}: parent directory unreachable", path.display()))?;
        let mut file = verify_and_open(&approved, true).map_err(|e| e.to_string())?;
        file.set_len(0).map_err(|e| e.to_string())?;
        file.write_all(new_content.as_bytes()).map_err(|e| e.to_string())?;

        if replace_all && count > 1 {
            Ok(format!("Replaced {count} occurrences in {}", path.display()))
        } else {
            Ok(format!("Edited {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn replaces_unique_match() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "hello world").unwrap();

        let result = EditFileTool
            .run(&serde_json::json!({"path": f.path().to_str().unwrap(), "old_string": "hello", "new_string": "goodbye"}))
            .unwrap();

        assert!(result.contains("Edited"));
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "goodbye world");
    }

    #[test]
    fn missing_file_fails() {
        let result = EditFileTool.run(
            &serde_json::json!({"path": "/nonexistent/ralph_test.txt", "old_string": "a", "new_string": "b"}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn old_string_not_found_fails() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "hello world").unwrap();

        let err = EditFileTool
            .run(&serde_json::json!({"path": f.path().to_str().unwrap(), "old_string": "foobar", "new_string": "baz"}))
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn non_unique_match_without_replace_all_fails() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "aaa bbb aaa").unwrap();

        let err = EditFileTool
            .run(&serde_json::json!({"path": f.path().to_str().unwrap(), "old_string": "aaa", "new_string": "ccc"}))
            .unwrap_err();
        assert!(err.contains("2 times"));
    }

    #[test]
    fn replace_all_replaces_every_occurrence() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "aaa bbb aaa").unwrap();

        let result = EditFileTool
            .run(&serde_json::json!({
                "path": f.path().to_str().unwrap(),
                "old_string": "aaa",
                "new_string": "ccc",
                "replace_all": true
            }))
            .unwrap();

        assert!(result.contains("2 occurrences"));
        assert_eq!(std::fs::read_to_string(f.path()).unwrap(), "ccc bbb ccc");
    }
}
