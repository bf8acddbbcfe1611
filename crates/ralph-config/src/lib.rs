#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
//! Layered TOML configuration for the ralph agent execution engine.
//!
//! [`Config::load`] merges, in increasing precedence: embedded defaults,
//! `/etc/ralph/config.toml`, `~/.ralph/config.toml`, and
//! `{workspace}/.ralph/config.toml`. [`policy_bridge::build_approval_config`]
//! converts the loaded `[security.policy]` section into a runtime
//! `ralph_policy::ApprovalConfig` — the only other crate this one depends
//! on.

mod error;
mod loader;
mod merge;
/// Converts a loaded [`Config`]'s policy section into an `ApprovalConfig`.
pub mod policy_bridge;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::{
    AllowlistEntryConfig, BudgetSection, Config, LogFormat, LoggingSection, ModelConfig,
    PolicySection, RuntimeSection, SecurityConfig, SessionsSection, SubagentsSection,
};

impl Config {
    /// Loads the layered configuration rooted at `workspace_root` (the
    /// workspace layer is skipped when `None`).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any present layer is malformed or the
    /// merged result fails validation.
    pub fn load(workspace_root: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(workspace_root, None)
    }

    /// Loads the layered configuration with an explicit home-directory
    /// override for user-layer discovery (used by tests and by callers
    /// that manage their own home directory resolution).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any present layer is malformed or the
    /// merged result fails validation.
    pub fn load_with_home(workspace_root: Option<&std::path::Path>, home_dir: &std::path::Path) -> ConfigResult<Self> {
        loader::load(workspace_root, Some(home_dir))
    }

    /// Loads configuration from a single explicit file, with no layering.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
