use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which shell a `ShellAllowlistEntry`'s tokens were parsed under, since
/// prefix matching must account for different quoting/chaining rules
/// (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellFlavor {
    /// A POSIX-family shell (`sh`, `bash`, `zsh`).
    PosixShell,
    /// Windows `cmd.exe`.
    Cmd,
    /// Windows PowerShell.
    PowerShell,
}

/// A non-shell allowlist entry: a tool name paired with a compiled regex
/// matched against the call's JSON arguments text.
pub struct RegexAllowlistEntry {
    /// The tool this entry applies to.
    pub tool_name: String,
    /// Matched against the call's serialized arguments.
    pub pattern: Regex,
}

impl RegexAllowlistEntry {
    /// Builds an entry, compiling `pattern`.
    pub fn new(tool_name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            tool_name: tool_name.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    fn matches(&self, tool_name: &str, arguments: &str) -> bool {
        self.tool_name == tool_name && self.pattern.is_match(arguments)
    }
}

/// A shell allowlist entry: an approved command prefix, optionally scoped
/// to one shell flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellAllowlistEntry {
    /// The leading tokens of an approved command, e.g. `["git", "status"]`.
    pub prefix_tokens: Vec<String>,
    /// Restricts the match to one flavor, or `None` to match any.
    pub shell_flavor: Option<ShellFlavor>,
}

impl ShellAllowlistEntry {
    fn matches(&self, tokens: &[String]) -> bool {
        if tokens.len() < self.prefix_tokens.len() {
            return false;
        }
        tokens
            .iter()
            .zip(self.prefix_tokens.iter())
            .all(|(a, b)| a == b)
    }
}

/// Splits a shell command into whitespace-separated tokens for prefix
/// matching. Deliberately naive (no quote-awareness): a command
/// containing shell metacharacters is never eligible for prefix-based
/// allowlisting in the first place (see `contains_shell_metacharacters`),
/// so by the time this runs the command is known to be a simple
/// `argv`-shaped invocation.
pub fn tokenize_shell_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

/// Whether `command` contains pipes, redirects, or command chaining —
/// constructs that make prefix-based matching unsafe (spec.md §4.1's
/// `AllowedAlways` rule: "aborts and uses exact-match if the command
/// contains pipes, redirects, or command chaining").
pub fn contains_shell_metacharacters(command: &str) -> bool {
    command.contains('|')
        || command.contains('&')
        || command.contains(';')
        || command.contains('>')
        || command.contains('<')
        || command.contains('`')
        || command.contains('$')
}

/// The set of allowlist entries consulted by `PolicyEngine::check`.
#[derive(Default)]
pub struct Allowlist {
    regex_entries: Vec<RegexAllowlistEntry>,
    shell_entries: Vec<ShellAllowlistEntry>,
}

impl Allowlist {
    /// An empty allowlist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a regex entry (config-loaded or session-installed).
    pub fn add_regex(&mut self, entry: RegexAllowlistEntry) {
        self.regex_entries.push(entry);
    }

    /// Appends a shell-prefix entry.
    pub fn add_shell(&mut self, entry: ShellAllowlistEntry) {
        self.shell_entries.push(entry);
    }

    /// Whether a non-shell call matches any regex entry.
    pub fn matches_regex(&self, tool_name: &str, arguments: &str) -> bool {
        self.regex_entries
            .iter()
            .any(|e| e.matches(tool_name, arguments))
    }

    /// Whether a shell call's tokens match any shell-prefix entry.
    pub fn matches_shell(&self, tokens: &[String], flavor: Option<ShellFlavor>) -> bool {
        self.shell_entries.iter().any(|e| {
            e.matches(tokens) && (e.shell_flavor.is_none() || e.shell_flavor == flavor)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_entry_matches_tool_and_pattern() {
        let mut list = Allowlist::new();
        list.add_regex(RegexAllowlistEntry::new("read_file", r#""path":"/tmp/.*"#).unwrap());
        assert!(list.matches_regex("read_file", r#"{"path":"/tmp/x"}"#));
        assert!(!list.matches_regex("read_file", r#"{"path":"/etc/passwd"}"#));
        assert!(!list.matches_regex("write_file", r#"{"path":"/tmp/x"}"#));
    }

    #[test]
    fn shell_prefix_requires_full_prefix_match() {
        let mut list = Allowlist::new();
        list.add_shell(ShellAllowlistEntry {
            prefix_tokens: vec!["git".into(), "status".into()],
            shell_flavor: None,
        });
        assert!(list.matches_shell(&tokenize_shell_command("git status"), None));
        assert!(list.matches_shell(
            &tokenize_shell_command("git status --short"),
            None
        ));
        assert!(!list.matches_shell(&tokenize_shell_command("git push"), None));
    }

    #[test]
    fn detects_shell_metacharacters() {
        assert!(contains_shell_metacharacters("ls | grep foo"));
        assert!(contains_shell_metacharacters("rm -rf / && echo done"));
        assert!(!contains_shell_metacharacters("git status"));
    }
}
