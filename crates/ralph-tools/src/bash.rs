//! `bash` — executes shell commands with a persistent working directory.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::BuiltinTool;

/// Default timeout in milliseconds (2 minutes).
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
/// Maximum timeout in milliseconds (10 minutes).
const MAX_TIMEOUT_MS: u64 = 600_000;
/// How often the watchdog polls the child for exit / deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Sentinel used to extract the post-command working directory.
const CWD_SENTINEL: &str = "__RALPH_CWD__";

/// Executes a shell command via `bash -c`, Shell category (spec.md
/// §4.1) — always gated or denied by default policy, never thread-safe
/// since commands may have arbitrary side effects (spec.md §4.4, §5).
/// The working directory persists across calls on this tool instance.
pub struct BashTool;

impl BuiltinTool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn is_thread_safe(&self) -> bool {
        false
    }

    fn run(&self, arguments: &Value) -> Result<String, String> {
        let command = arguments.get("command").and_then(Value::as_str).ok_or("command is required")?;
        let timeout_ms = arguments
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);

        let cwd = { cwd_cell().lock().expect("bash cwd mutex poisoned").clone() };
        let wrapped = format!("{command}\n__RALPH_EXIT__=$?\necho \"{CWD_SENTINEL}\"\npwd\nexit $__RALPH_EXIT__");

        let (stdout, stderr, exit_code) = run_with_timeout(&wrapped, &cwd, Duration::from_millis(timeout_ms))?;
        let (output, new_cwd) = parse_sentinel_output(&stdout);

        if let Some(new_cwd) = new_cwd {
            *cwd_cell().lock().expect("bash cwd mutex poisoned") = new_cwd;
        }

        let mut result_text = String::new();
        if !output.is_empty() {
            result_text.push_str(&output);
        }
        if !stderr.is_empty() {
            if !result_text.is_empty() {
                result_text.push('\n');
            }
            result_text.push_str("STDERR:\n");
            result_text.push_str(&stderr);
        }
        if exit_code != 0 {
            if !result_text.is_empty() {
                result_text.push('\n');
            }
            result_text.push_str(&format!("(exit code: {exit_code})"));
        }
        if result_text.is_empty() {
            result_text.push_str("(no output)");
        }

        Ok(result_text)
    }
}

fn cwd_cell() -> &'static Mutex<PathBuf> {
    use std::sync::OnceLock;
    static CELL: OnceLock<Mutex<PathBuf>> = OnceLock::new();
    CELL.get_or_init(|| Mutex::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))))
}

/// Runs `command` under `bash -c`, killing it if it outlives `timeout`.
/// Polling rather than `wait_timeout` (not in std) keeps this dependency-free;
/// the poll interval is short enough not to matter against minute-scale timeouts.
fn run_with_timeout(command: &str, cwd: &std::path::Path, timeout: Duration) -> Result<(String, String, i32), String> {
    let mut child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| e.to_string())?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait().map_err(|e| e.to_string())? {
            Some(status) => {
                let output = child.wait_with_output().map_err(|e| e.to_string())?;
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                return Ok((stdout, stderr, status.code().unwrap_or(-1)));
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(format!("timed out after {}ms", timeout.as_millis()));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Splits stdout into the command's own output and the trailing cwd line
/// printed after [`CWD_SENTINEL`].
fn parse_sentinel_output(stdout: &str) -> (String, Option<PathBuf>) {
    if let Some(sentinel_pos) = stdout.find(CWD_SENTINEL) {
        let output = stdout[..sentinel_pos].trim_end().to_string();
        let after_sentinel = &stdout[sentinel_pos + CWD_SENTINEL.len()..];
        let new_cwd = after_sentinel.lines().find(|l| !l.is_empty()).map(|l| PathBuf::from(l.trim()));
        (output, new_cwd)
    } else {
        (stdout.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_stdout() {
        let result = BashTool.run(&serde_json::json!({"command": "echo hello"})).unwrap();
        assert!(result.contains("hello"));
    }

    #[test]
    fn reports_nonzero_exit_code() {
        let result = BashTool.run(&serde_json::json!({"command": "exit 42"})).unwrap();
        assert!(result.contains("exit code: 42"));
    }

    #[test]
    fn captures_stderr() {
        let result = BashTool.run(&serde_json::json!({"command": "echo error >&2"})).unwrap();
        assert!(result.contains("STDERR:"));
        assert!(result.contains("error"));
    }

    #[test]
    fn times_out_long_running_commands() {
        let result = BashTool.run(&serde_json::json!({"command": "sleep 10", "timeout": 100}));
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("timed out"));
    }

    #[test]
    fn missing_command_argument_fails() {
        assert!(BashTool.run(&serde_json::json!({})).is_err());
    }

    #[test]
    fn parses_sentinel_and_trailing_cwd() {
        let stdout = format!("hello world\n{CWD_SENTINEL}\n/tmp/test\n");
        let (output, cwd) = parse_sentinel_output(&stdout);
        assert_eq!(output, "hello world");
        assert_eq!(cwd, Some(PathBuf::from("/tmp/test")));
    }

    #[test]
    fn missing_sentinel_returns_raw_stdout() {
        let (output, cwd) = parse_sentinel_output("hello world\n");
        assert_eq!(output, "hello world\n");
        assert!(cwd.is_none());
    }
}
