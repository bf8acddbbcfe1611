//! Configuration structs, deserialized from layered TOML (see [`crate::loader`]).
//!
//! Every section implements [`Default`] so a config file may omit it entirely
//! and still produce a working configuration; `#[serde(default)]` on each
//! field makes partial sections (a `[model]` table with only `model` set)
//! equally valid.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the ralph agent execution engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider/model selection.
    pub model: ModelConfig,
    /// Context-window and compaction behaviour.
    pub runtime: RuntimeSection,
    /// Approval policy: categories, allowlist, protected paths.
    pub security: SecurityConfig,
    /// Soft session-level token budget, surfaced as a warning.
    pub budget: BudgetSection,
    /// Log level/format and per-target directives.
    pub logging: LoggingSection,
    /// Subagent pool sizing and timeouts.
    pub subagents: SubagentsSection,
    /// Conversation transcript persistence.
    pub sessions: SessionsSection,
}

/// LLM provider selection and request shaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider identifier, e.g. `"anthropic"`.
    pub provider: String,
    /// Model name sent to the provider API.
    pub model: String,
    /// Name of the environment variable holding the API key (never the
    /// key itself — config files are not a safe place for secrets).
    pub api_key_env: String,
    /// Overrides the provider's default endpoint.
    pub api_url: Option<String>,
    /// Maximum tokens requested per completion.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            api_url: None,
            max_tokens: 8192,
            temperature: 1.0,
        }
    }
}

/// Context-window accounting consulted by `ConversationStore::compute_budget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Total tokens the model's context window holds.
    pub context_window_tokens: usize,
    /// Tokens always reserved for the model's response, subtracted from
    /// `context_window_tokens` before comparing against history size.
    pub response_reserve_tokens: usize,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            context_window_tokens: 200_000,
            response_reserve_tokens: 8192,
        }
    }
}

/// Approval policy: master switch, per-category dispositions, allowlist,
/// and the roots scanned for protected files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Approval policy knobs.
    pub policy: PolicySection,
}

/// One `[[security.policy.allowlist]]` entry: either a regex matched
/// against a non-shell tool's serialized arguments, or an approved shell
/// command prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllowlistEntryConfig {
    /// Matches `tool`'s arguments (as compact JSON) against `pattern`.
    Regex {
        /// The tool this entry applies to.
        tool: String,
        /// A regular expression.
        pattern: String,
    },
    /// Matches a shell command's leading tokens against `prefix`.
    Shell {
        /// Leading tokens, e.g. `["git", "status"]`.
        prefix: Vec<String>,
        /// Restricts the match to one shell flavor (`"posix"`, `"cmd"`,
        /// `"powershell"`), or any flavor if unset.
        flavor: Option<String>,
    },
}

/// Per-category approval dispositions, the allowlist, and protected-file
/// scan roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Master switch; when false every gate resolves to allow.
    pub enabled: bool,
    /// Category name (`"file_write"`, `"shell"`, ...) to action name
    /// (`"allow"`, `"gate"`, `"deny"`). Unknown names are skipped with a
    /// warning rather than failing the load.
    pub categories: HashMap<String, String>,
    /// Pre-approved patterns installed at startup.
    pub allowlist: Vec<AllowlistEntryConfig>,
    /// Directories scanned for protected files (in addition to the
    /// built-in basenames/globs every scan always checks).
    pub protected_roots: Vec<String>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: HashMap::new(),
            allowlist: Vec::new(),
            protected_roots: Vec::new(),
        }
    }
}

/// A soft, session-level token budget. Purely advisory: nothing in this
/// workspace enforces it, but a CLI surfaces a warning once crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    /// Cumulative prompt+completion tokens before a warning is logged.
    /// `None` disables the warning.
    pub warn_at_tokens: Option<usize>,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            warn_at_tokens: None,
        }
    }
}

/// Output format for [`tracing-subscriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized when attached to a terminal.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration, applied once at process startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level (`"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Per-target overrides folded into the `EnvFilter` directive string,
    /// e.g. `{"ralph_policy": "debug"}`.
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            targets: HashMap::new(),
        }
    }
}

/// Subagent pool sizing and default/maximum per-call timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubagentsSection {
    /// Concurrency cap, clamped to the supervisor's hard cap (32).
    pub max_concurrent: usize,
    /// Default wall-clock timeout applied when a `subagent` call omits
    /// `timeout_seconds`.
    pub default_timeout_secs: u64,
    /// Ceiling a `subagent` call's `timeout_seconds` is clamped to.
    pub max_timeout_secs: u64,
}

impl Default for SubagentsSection {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            default_timeout_secs: 300,
            max_timeout_secs: 3600,
        }
    }
}

/// Conversation transcript persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsSection {
    /// Directory JSONL transcripts are written under. `None` disables
    /// persistence (transcript lives only in memory for the process).
    pub transcript_dir: Option<String>,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            transcript_dir: None,
        }
    }
}
