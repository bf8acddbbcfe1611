use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent};
use crossterm::terminal;

use ralph_core::interrupt_flag;

use crate::allowlist::{contains_shell_metacharacters, tokenize_shell_command, ShellAllowlistEntry};
use crate::category::Category;
use crate::config::ApprovalResult;

/// Draws a single-keypress approval dialog on the process's controlling
/// terminal (spec.md §4.1). Recognized keys: `y` Allowed, `n` Denied, `a`
/// AllowedAlways, `?` show details then re-prompt. SIGINT during the
/// prompt yields `Aborted` with terminal state restored.
///
/// Polls the shared interrupt flag between keystroke reads rather than
/// relying solely on a raw-mode Ctrl-C keycode, so a SIGINT delivered
/// while this thread is blocked elsewhere in the process (e.g. a
/// concurrent batch worker) is still observed promptly.
pub fn prompt_tty(tool_name: &str, summary: &str, details: &str) -> io::Result<ApprovalResult> {
    terminal::enable_raw_mode()?;
    let result = run_prompt_loop(tool_name, summary, details);
    // Always restore terminal mode, even if the loop returned an error,
    // so a failure here never leaves the user's shell in raw mode.
    let _ = terminal::disable_raw_mode();
    result
}

fn run_prompt_loop(tool_name: &str, summary: &str, details: &str) -> io::Result<ApprovalResult> {
    let flag = interrupt_flag();
    print!("\r\n{tool_name}: {summary} [y/n/a/?] ");
    io::stdout().flush()?;

    loop {
        if flag.load(std::sync::atomic::Ordering::SeqCst) {
            ralph_core::clear_interrupt(flag);
            return Ok(ApprovalResult::Aborted);
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }

        match event::read()? {
            Event::Key(KeyEvent {
                code: KeyCode::Char('c'),
                modifiers,
                ..
            }) if modifiers.contains(crossterm::event::KeyModifiers::CONTROL) => {
                return Ok(ApprovalResult::Aborted);
            }
            Event::Key(KeyEvent {
                code: KeyCode::Char('y'),
                ..
            }) => return Ok(ApprovalResult::Allowed),
            Event::Key(KeyEvent {
                code: KeyCode::Char('n'),
                ..
            }) => return Ok(ApprovalResult::Denied),
            Event::Key(KeyEvent {
                code: KeyCode::Char('a'),
                ..
            }) => return Ok(ApprovalResult::AllowedAlways),
            Event::Key(KeyEvent {
                code: KeyCode::Char('?'),
                ..
            }) => {
                print!("\r\n{details}\r\n{tool_name}: {summary} [y/n/a/?] ");
                io::stdout().flush()?;
            }
            _ => {}
        }
    }
}

/// Synthesizes a session-allowlist pattern from an `AllowedAlways`
/// decision (spec.md §4.1). For file-targeted calls, the directory
/// prefix with a globbed extension; for shell, the parsed command-prefix
/// tokens (falling back to an exact match if the command contains pipes,
/// redirects, or chaining); for network, `scheme://host/` with a
/// mandatory trailing path boundary, so `http://evil.com.attacker.net`
/// cannot be confused with an allowed `http://evil.com/`.
pub enum SynthesizedPattern {
    /// A regex to install into the regex allowlist, with the literal
    /// text it was derived from for display.
    Regex { tool_name: String, pattern: String },
    /// A shell-prefix entry.
    Shell(ShellAllowlistEntry),
}

/// Builds the pattern to install for an `AllowedAlways` decision on
/// `category`, given the tool name and raw argument text.
pub fn synthesize_pattern(category: Category, tool_name: &str, arguments: &serde_json::Value) -> SynthesizedPattern {
    match category {
        Category::Shell => {
            let command = arguments
                .get("command")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if contains_shell_metacharacters(command) {
                SynthesizedPattern::Shell(ShellAllowlistEntry {
                    prefix_tokens: tokenize_shell_command(command),
                    shell_flavor: None,
                })
            } else {
                let tokens = tokenize_shell_command(command);
                let prefix_len = tokens.len().min(2).max(1);
                SynthesizedPattern::Shell(ShellAllowlistEntry {
                    prefix_tokens: tokens.into_iter().take(prefix_len).collect(),
                    shell_flavor: None,
                })
            }
        }
        Category::Network => {
            let url = arguments.get("url").and_then(|v| v.as_str()).unwrap_or_default();
            let boundary = match url::Url::parse(url) {
                Ok(parsed) => format!("^{}://{}/", regex::escape(parsed.scheme()), regex::escape(parsed.host_str().unwrap_or(""))),
                Err(_) => regex::escape(url),
            };
            SynthesizedPattern::Regex {
                tool_name: tool_name.to_string(),
                pattern: boundary,
            }
        }
        _ => {
            let path = arguments
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let dir = std::path::Path::new(path)
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            let ext = std::path::Path::new(path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("*");
            SynthesizedPattern::Regex {
                tool_name: tool_name.to_string(),
                pattern: format!("\"path\":\"{}/[^/]*\\.{}\"", regex::escape(&dir), regex::escape(ext)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowlist::{Allowlist, RegexAllowlistEntry};

    /// A synthesized file-write pattern must actually match the call it
    /// was derived from, and a subsequent call in the same directory with
    /// the same extension, once installed in an `Allowlist` — otherwise
    /// `AllowedAlways` silently never fires (the bug this guards).
    #[test]
    fn synthesized_file_pattern_matches_a_later_call_in_the_allowlist() {
        let args = serde_json::json!({ "path": "/tmp/work/notes.txt" });
        let SynthesizedPattern::Regex { tool_name, pattern } =
            synthesize_pattern(Category::FileWrite, "write_file", &args)
        else {
            panic!("expected a regex pattern for a file-targeted call");
        };

        let mut allowlist = Allowlist::new();
        allowlist.add_regex(RegexAllowlistEntry::new(&tool_name, &pattern).unwrap());

        let next_args = serde_json::json!({ "path": "/tmp/work/other.txt" }).to_string();
        assert!(allowlist.matches_regex("write_file", &next_args));

        let different_dir = serde_json::json!({ "path": "/tmp/elsewhere/notes.txt" }).to_string();
        assert!(!allowlist.matches_regex("write_file", &different_dir));
    }
}
