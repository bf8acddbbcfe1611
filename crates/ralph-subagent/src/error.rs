use thiserror::Error;

/// Failure kinds surfaced by the subagent supervisor (spec.md §4.2, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubagentError {
    /// fork/pipe/exec failed; the caller never got a running child.
    #[error("failed to spawn subagent: {0}")]
    SpawnFailed(String),
    /// The pool is already at its configured concurrency limit.
    #[error("subagent pool is full ({running}/{max})")]
    PoolFull {
        /// Currently running subagents.
        running: usize,
        /// Configured maximum.
        max: usize,
    },
    /// No subagent with this id is known to the manager.
    #[error("no such subagent: {0}")]
    NotFound(String),
    /// This process is itself a subagent and subagents may not recurse.
    #[error("subagents may not spawn further subagents")]
    NoRecursion,
    /// A second `subagent` call landed in the same batch.
    #[error("at most one subagent may be spawned per batch")]
    DuplicateSubagent,
}

impl SubagentError {
    /// The stable wire name for this error kind (spec.md §7).
    pub fn kind(&self) -> &'static str {
        match self {
            SubagentError::SpawnFailed(_) | SubagentError::PoolFull { .. } => "subagent_spawn_failed",
            SubagentError::NotFound(_) => "subagent_spawn_failed",
            SubagentError::NoRecursion => "subagent_spawn_failed",
            SubagentError::DuplicateSubagent => "duplicate_subagent",
        }
    }
}
