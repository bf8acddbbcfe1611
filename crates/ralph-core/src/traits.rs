use thiserror::Error;

use crate::budget::BudgetOutcome;
use crate::message::Message;
use crate::tool::{ToolCall, ToolResult};

/// Transport-layer failure from a `RoundTripClient`. The core treats all
/// of these as non-fatal to the session per spec.md §7 — the current
/// turn ends but the initial batch's successes remain in conversation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The provider returned an empty/unparseable response.
    #[error("empty response from model")]
    Empty,
    /// The response body could not be parsed into a `ParsedResponse`.
    #[error("failed to parse model response: {0}")]
    Parse(String),
    /// Authentication with the provider failed.
    #[error("authentication failed")]
    Auth,
    /// A transient network failure; callers may retry.
    #[error("retryable network error: {0}")]
    RetryableNetwork(String),
    /// The provider rate-limited this request; callers may retry.
    #[error("retryable rate limit: {0}")]
    RetryableRateLimit(String),
}

impl TransportError {
    /// The stable wire name for this error kind (spec.md §7).
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Empty => "api_empty",
            TransportError::Parse(_) => "api_parse",
            TransportError::Auth => "api_auth",
            TransportError::RetryableNetwork(_) => "api_retryable_network",
            TransportError::RetryableRateLimit(_) => "api_retryable_rate_limit",
        }
    }
}

/// One LLM round-trip. Implemented out-of-core by the provider-specific
/// transport (spec.md §1); the engine is agnostic to which provider
/// produced a response.
pub trait RoundTripClient {
    /// Sends the current conversation and returns the parsed response.
    /// `budget` bounds `available_response_tokens` for this call.
    fn round_trip(
        &self,
        history: &[Message],
        budget: &BudgetOutcome,
    ) -> Result<crate::response::ParsedResponse, TransportError>;
}

/// Observable state of the iterative loop, surfaced to the `OutputSink`
/// at each state transition (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Awaiting user input.
    Idle,
    /// LLM round-trip in flight.
    Requesting,
    /// Response being emitted to the UI.
    Displaying,
    /// Batch executor running.
    Batching,
    /// Token budget refused; compaction attempted.
    Compacting,
    /// Terminal: no more tool calls were requested.
    EndNoMoreTools,
    /// Terminal: the safety limit (`MAX_ITERATIONS`) was hit.
    EndSafetyLimit,
    /// Terminal: SIGINT interrupted the batch.
    EndInterrupt,
    /// Terminal: the user denied/aborted an approval prompt.
    EndAbort,
    /// Terminal: the context window is exhausted.
    EndContextFull,
    /// Terminal: the LLM transport failed.
    EndApiError,
}

/// The UI/output surface the core emits events to. Implemented out-of-core
/// by the terminal UI or JSON-structured output mode (spec.md §1).
pub trait OutputSink {
    /// The model's chain-of-thought, if any.
    fn on_thinking(&self, text: &str);
    /// The model's user-visible text, if any.
    fn on_text(&self, text: &str);
    /// A summary of the tool calls about to be executed.
    fn on_tool_call_summary(&self, calls: &[ToolCall]);
    /// One tool's result, as it becomes available.
    fn on_tool_result(&self, call: &ToolCall, result: &ToolResult);
    /// A loop state transition.
    fn on_state(&self, state: LoopState);
    /// A named error surfaced to the user.
    fn on_error(&self, kind: &str, message: &str);
}

/// Per-call execution context handed to `ToolRegistry::execute`. Carries
/// the pieces a tool implementation needs that are not part of the wire
/// arguments (e.g. a handle back into the subagent manager for `subagent`
/// calls is routed by the batch executor directly, not through this
/// context — see ralph-orchestrator's grounding notes).
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolExecCtx {
    /// True when this process is itself a subagent (affects tools that
    /// must refuse to recurse, e.g. spawning further subagents).
    pub is_subagent: bool,
}

/// The set of tool implementations available to the batch executor
/// (spec.md §1). Implemented out-of-core; file I/O, shell, web fetch,
/// PDF extraction, vector-DB, MCP, and messaging tools all live behind
/// this one trait from the engine's perspective.
pub trait ToolRegistry {
    /// Executes one call and returns its result. Must not panic; dispatch
    /// failures are reported as a `ToolResult` with `success: false`.
    fn execute(&self, call: &ToolCall, ctx: &ToolExecCtx) -> ToolResult;
    /// Whether `name` is safe to run concurrently with other thread-safe
    /// tools in the same batch (spec.md §4.4's parallelism rule).
    fn is_thread_safe(&self, name: &str) -> bool;
}

/// Conversation persistence and token-budget management (spec.md §1).
/// Implemented out-of-core; the engine only ever appends, reads, and asks
/// for the current budget.
pub trait ConversationStore {
    /// Appends a `User` message.
    fn append_user(&mut self, text: &str);
    /// Appends an `Assistant` message, with its tool calls if any.
    fn append_assistant(&mut self, text: Option<&str>, tool_calls: &[ToolCall]);
    /// Appends one `Tool` result message.
    fn append_tool(&mut self, tool_call_id: &str, tool_name: &str, result: &ToolResult);
    /// Compacts history in place if `budget` demands it.
    fn compact_if_needed(&mut self, budget: &BudgetOutcome);
    /// Computes the current token budget.
    fn compute_budget(&self) -> BudgetOutcome;
    /// Returns the full message history in insertion order.
    fn messages(&self) -> &[Message];
    /// Wipes history and re-appends a stub assistant message carrying
    /// `tool_calls`, preserving the assistant→tool pairing invariant
    /// after a tool sets `ToolResult::clear_history` (spec.md §4.5 step 9).
    fn clear_with_stub(&mut self, tool_calls: &[ToolCall]);
}
