/// Outcome of `ConversationStore::compute_budget`, consulted at the top of
/// every iterative-loop pass (spec.md §4.5 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetOutcome {
    /// Tokens available for the model's response after accounting for
    /// the conversation history and system prompt already committed.
    pub available_response_tokens: usize,
    /// Whether the history still fits, or compaction is required.
    pub status: BudgetStatus,
}

/// Whether a `ConversationStore` can still accept another round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// There is room for another round-trip.
    Ok,
    /// The context window is exhausted; the loop should end with
    /// `S_End{context-full}` rather than attempt another round-trip.
    ContextFull,
}
