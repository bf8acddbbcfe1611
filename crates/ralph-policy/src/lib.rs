#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
//! The approval policy engine (spec.md §4.1): classifies tool calls,
//! consults allowlists and the rate limiter, enforces protected-file
//! rules, and — when a call is gated — either draws a TTY dialog or
//! proxies the request to a parent process over an `ApprovalChannel`.
//!
//! One module, [`config::ApprovalChannel`], carries the crate's only
//! unsafe code: claiming ownership of inherited pipe fds, and polling one
//! of them with a deadline. Everything else here is safe and this
//! crate's `#![deny(unsafe_code)]` holds everywhere except those two
//! `#[allow]`-annotated methods.

mod allowlist;
mod category;
mod config;
mod engine;
mod error;
mod prompt;
mod protected_files;
mod rate_limiter;
mod verify;

pub use allowlist::{
    contains_shell_metacharacters, tokenize_shell_command, Allowlist, RegexAllowlistEntry,
    ShellAllowlistEntry, ShellFlavor,
};
pub use category::{classify, Category};
pub use config::{Action, ApprovalChannel, ApprovalConfig, ApprovalResult, CheckOutcome};
pub use engine::{parse_shell_flavor, shell_entry, PolicyEngine, APPROVAL_PROXY_TIMEOUT};
pub use error::{PolicyError, VerifyError};
pub use protected_files::ProtectedFileCache;
pub use rate_limiter::RateLimiter;
pub use verify::{verify_and_open, ApprovedPath};
