//! `read_file` — reads a file with line numbers (cat -n style).

use std::fmt::Write as _;

use serde_json::Value;

use crate::BuiltinTool;

/// Default maximum lines to read.
const DEFAULT_LINE_LIMIT: usize = 2000;
/// Maximum line length before truncation.
const MAX_LINE_LENGTH: usize = 2000;

/// Reads a file from the filesystem, FileRead category (spec.md §4.1).
pub struct ReadFileTool;

impl BuiltinTool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn run(&self, arguments: &Value) -> Result<String, String> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .ok_or("path is required")?;

        let offset = arguments.get("offset").and_then(Value::as_u64).map(|v| v as usize);
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_LINE_LIMIT, |v| v as usize);

        let path = std::path::Path::new(path);
        if !path.exists() {
            return Err(format!("{}: no such file", path.display()));
        }

        let raw = std::fs::read(path).map_err(|e| e.to_string())?;
        let check_len = raw.len().min(8192);
        if raw[..check_len].contains(&0) {
            return Err(format!("{}: appears to be a binary file", path.display()));
        }

        let content = String::from_utf8(raw).map_err(|_| format!("{}: not valid UTF-8", path.display()))?;
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();

        let start = offset.map_or(0, |o| o.saturating_sub(1));
        let end = start.saturating_add(limit).min(total_lines);

        if start >= total_lines {
            return Ok(format!("(file has {total_lines} lines, offset {start} is past end)"));
        }

        let mut output = String::new();
        for (idx, &line) in lines[start..end].iter().enumerate() {
            let line_num = start + idx + 1;
            let display_line = if line.len() > MAX_LINE_LENGTH { &line[..MAX_LINE_LENGTH] } else { line };
            let _ = writeln!(output, "{line_num:>6}\t{display_line}");
        }

        if end < total_lines {
            let _ = write!(
                output,
                "\n(showing lines {}-{end} of {total_lines}; use offset/limit for more)",
                start + 1,
            );
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_lines_with_cat_n_numbering() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "line one").unwrap();
        writeln!(f, "line two").unwrap();
        writeln!(f, "line three").unwrap();

        let result = ReadFileTool
            .run(&serde_json::json!({"path": f.path().to_str().unwrap()}))
            .unwrap();

        assert!(result.contains("line one"));
        assert!(result.contains("     1\t"));
        assert!(result.contains("     3\t"));
    }

    #[test]
    fn missing_file_fails() {
        let result = ReadFileTool.run(&serde_json::json!({"path": "/nonexistent/path/ralph_test.txt"}));
        assert!(result.is_err());
    }

    #[test]
    fn honors_offset_and_limit() {
        let mut f = NamedTempFile::new().unwrap();
        for i in 1..=20 {
            writeln!(f, "line {i}").unwrap();
        }

        let result = ReadFileTool
            .run(&serde_json::json!({"path": f.path().to_str().unwrap(), "offset": 5, "limit": 3}))
            .unwrap();

        assert!(result.contains("line 5"));
        assert!(result.contains("line 7"));
        assert!(!result.contains("line 8"));
    }

    #[test]
    fn rejects_binary_files() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&[0x00, 0x01, 0x02, 0xFF]).unwrap();

        let err = ReadFileTool.run(&serde_json::json!({"path": f.path().to_str().unwrap()})).unwrap_err();
        assert!(err.contains("binary file"));
    }

    #[test]
    fn missing_path_argument_fails() {
        assert!(ReadFileTool.run(&serde_json::json!({})).is_err());
    }
}
