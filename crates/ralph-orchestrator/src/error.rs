use thiserror::Error;

/// Failures surfaced by the orchestration layer itself (spec.md §7's
/// "Orchestration"/"Safety" kinds not already owned by `ralph-policy` or
/// `ralph-subagent`).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The iterative loop ran `MAX_ITERATIONS` rounds without ending.
    #[error("exceeded {0} iterations for a single turn")]
    IterationLimitExceeded(u32),
    /// The LLM transport failed; the loop ends this turn but the session
    /// is left intact (spec.md §7's propagation policy).
    #[error("transport error: {0}")]
    Transport(#[from] ralph_core::TransportError),
}

impl OrchestratorError {
    /// The stable wire name for this error kind (spec.md §7).
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::IterationLimitExceeded(_) => "iteration_limit_exceeded",
            OrchestratorError::Transport(e) => e.kind(),
        }
    }
}
