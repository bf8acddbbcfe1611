use thiserror::Error;

/// Failure kinds the policy engine can produce, named to match spec.md
/// §7's taxonomy exactly (`PolicyError::kind()` returns the wire string).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The call targets a protected file (spec.md §4.1's protected-file set).
    #[error("refusing to write protected file: {0}")]
    ProtectedFile(String),
    /// The user denied the prompt.
    #[error("operation denied by user")]
    OperationDenied,
    /// The tool is in backoff after repeated denials.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds remaining until `is_rate_limited` returns false.
        retry_after_secs: u64,
    },
    /// The category requires a prompt but stdin is not a terminal.
    #[error("gated action requires a terminal, none attached")]
    NonInteractiveGated,
    /// TOCTOU re-verification at open time found the path had changed.
    #[error("path changed between approval and use: {0}")]
    PathChanged(String),
    /// SIGINT during the approval prompt.
    #[error("aborted by user")]
    Aborted,
}

impl PolicyError {
    /// The stable wire name for this error kind (spec.md §6, §7).
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyError::ProtectedFile(_) => "protected_file",
            PolicyError::OperationDenied => "operation_denied",
            PolicyError::RateLimited { .. } => "rate_limited",
            PolicyError::NonInteractiveGated => "non_interactive_gated",
            PolicyError::PathChanged(_) => "path_changed",
            PolicyError::Aborted => "aborted",
        }
    }
}

/// Failure opening a path re-verified at use time (spec.md §4.1's
/// `verify_and_open`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The final path component is a symlink (no-follow open rejected it).
    #[error("path is a symlink")]
    Symlink,
    /// The file existed at approval time but is gone now.
    #[error("file was deleted since approval")]
    Deleted,
    /// The open syscall itself failed.
    #[error("open failed: {0}")]
    Open(String),
    /// fstat on the opened handle failed.
    #[error("stat failed: {0}")]
    Stat(String),
    /// `(device, inode)` no longer matches what was approved.
    #[error("file identity changed since approval")]
    InodeMismatch,
    /// The parent directory's `(device, inode)` changed since approval.
    #[error("parent directory changed since approval")]
    ParentChanged,
    /// A new-file create raced with another writer.
    #[error("file already exists")]
    AlreadyExists,
    /// The exclusive-create syscall failed for a reason other than the above.
    #[error("create failed: {0}")]
    Create(String),
}
