use thiserror::Error;

use crate::traits::TransportError;

/// Top-level error aggregating every crate's error enum, the way a binary
/// entrypoint needs one type to `?` through. Library code in
/// `ralph-policy`, `ralph-subagent`, and `ralph-orchestrator` returns its
/// own `thiserror` enum; this type exists for `ralph-cli` and tests that
/// need to handle all of them uniformly.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An LLM transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The context window is exhausted and compaction did not help.
    #[error("context window exhausted")]
    ContextFull,
    /// The iterative loop exceeded `MAX_ITERATIONS` for a single turn.
    #[error("iteration limit exceeded")]
    IterationLimitExceeded,
    /// A catch-all for errors surfaced by other crates, carried as text
    /// so this crate does not need a dependency edge onto them.
    #[error("{0}")]
    Other(String),
}
