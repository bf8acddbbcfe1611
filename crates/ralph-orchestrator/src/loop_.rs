use ralph_core::{BudgetStatus, ConversationStore, LoopState, OutputSink, RoundTripClient, ToolCall, ToolResult};

use crate::batch::{BatchExecutor, BatchOutcome};
use crate::context::OrchestrationContext;

/// Hard cap on LLM round-trips per user message (spec.md §4.5). A buggy
/// tool loop must not be allowed to burn tokens indefinitely.
pub const MAX_ITERATIONS: u32 = 200;

/// Why the iterative loop stopped (spec.md §4.5's `S_End{reason}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The model stopped requesting tool calls.
    NoMoreTools,
    /// `MAX_ITERATIONS` was exceeded.
    SafetyLimit,
    /// SIGINT fired during a batch.
    UserInterrupt,
    /// The user denied/aborted an approval prompt.
    UserAbort,
    /// The conversation store reported `ContextFull`.
    ContextFull,
    /// The LLM transport failed.
    ApiError,
}

impl EndReason {
    /// The `LoopState` variant an `OutputSink` should be told about.
    pub fn as_loop_state(self) -> LoopState {
        match self {
            EndReason::NoMoreTools => LoopState::EndNoMoreTools,
            EndReason::SafetyLimit => LoopState::EndSafetyLimit,
            EndReason::UserInterrupt => LoopState::EndInterrupt,
            EndReason::UserAbort => LoopState::EndAbort,
            EndReason::ContextFull => LoopState::EndContextFull,
            EndReason::ApiError => LoopState::EndApiError,
        }
    }
}

/// The top-level agent state machine (spec.md §4.5). Drives one user
/// turn: repeated round-trip → display → batch cycles, bounded by
/// `MAX_ITERATIONS`, ending in one `EndReason`.
pub struct IterativeLoop<'a> {
    client: &'a dyn RoundTripClient,
    output: &'a dyn OutputSink,
    executor: &'a BatchExecutor<'a>,
    context: &'a OrchestrationContext,
}

impl<'a> IterativeLoop<'a> {
    /// Builds a loop over one turn's collaborators. `context` must be the
    /// same `OrchestrationContext` `executor` was built over.
    pub fn new(
        client: &'a dyn RoundTripClient,
        output: &'a dyn OutputSink,
        executor: &'a BatchExecutor<'a>,
        context: &'a OrchestrationContext,
    ) -> Self {
        Self { client, output, executor, context }
    }

    /// Runs `calls` in direct mode (no deduplication), so every call the
    /// LLM just requested gets a result, then appends the results to
    /// `store`. This is spec.md §4.5's "initial batch variant" — used
    /// only for the very first batch of a turn, by [`Self::run`] below,
    /// to guarantee the assistant→tool pairing invariant holds even if
    /// the LLM re-emits an id no one has seen executed yet. Returns
    /// `None` to continue the loop, or `Some(reason)` if the batch itself
    /// ended the turn (abort/interrupt).
    fn run_initial_batch(&self, store: &mut dyn ConversationStore, calls: &[ToolCall]) -> Option<EndReason> {
        self.output.on_state(LoopState::Batching);
        self.output.on_tool_call_summary(calls);
        let (results, outcome) = self.executor.run_direct(calls);
        self.append_results(store, calls, &results);
        self.scan_clear_history(store, calls, &results);

        match outcome {
            BatchOutcome::Ok => None,
            BatchOutcome::Aborted => Some(EndReason::UserAbort),
            BatchOutcome::Interrupted => Some(EndReason::UserInterrupt),
        }
    }

    /// Runs the loop to completion over one user turn. The caller has
    /// already appended the triggering user message to `store` (spec.md's
    /// ordering guarantee: user → assistant → tool_results → next
    /// assistant).
    ///
    /// Iteration 0 is the session entrypoint's "one LLM round-trip, then
    /// invoke the initial batch" step (spec.md §2, §4.5): its batch runs
    /// in direct mode via [`Self::run_initial_batch`], with no
    /// deduplication. Every iteration after that is the ordinary loop
    /// body, batching in compact mode. Both kinds of iteration count
    /// against `MAX_ITERATIONS`.
    pub fn run(&self, store: &mut dyn ConversationStore) -> EndReason {
        for iteration in 0..MAX_ITERATIONS {
            tracing::debug!(iteration, "starting loop iteration");
            // Step 1.
            self.context.reset_batch();

            // Step 2. A `ContextFull` budget first gets one compaction
            // attempt before the turn gives up (spec.md §7: "callers
            // typically invoke compaction and retry"); only a budget
            // that is still full afterwards ends the turn.
            let mut budget = store.compute_budget();
            if budget.status == BudgetStatus::ContextFull {
                self.output.on_state(LoopState::Compacting);
                store.compact_if_needed(&budget);
                budget = store.compute_budget();
                if budget.status == BudgetStatus::ContextFull {
                    tracing::warn!(iteration, "context full after compaction, ending turn");
                    self.output.on_state(LoopState::EndContextFull);
                    return EndReason::ContextFull;
                }
            }

            // Step 3-4.
            self.output.on_state(LoopState::Requesting);
            let response = match self.client.round_trip(store.messages(), &budget) {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(kind = err.kind(), error = %err, "round-trip failed");
                    self.output.on_error(err.kind(), &err.to_string());
                    self.output.on_state(LoopState::EndApiError);
                    return EndReason::ApiError;
                }
            };

            // Step 5.
            self.output.on_state(LoopState::Displaying);
            if let Some(thinking) = response.thinking.as_deref().filter(|t| !t.is_empty()) {
                self.output.on_thinking(thinking);
            }
            if let Some(text) = response.text.as_deref().filter(|t| !t.is_empty()) {
                self.output.on_text(text);
            }
            if !response.tool_calls.is_empty() {
                self.output.on_tool_call_summary(&response.tool_calls);
            }
            store.append_assistant(response.text.as_deref(), &response.tool_calls);

            // Step 6.
            if response.tool_calls.is_empty() {
                self.output.on_state(LoopState::EndNoMoreTools);
                return EndReason::NoMoreTools;
            }

            // Initial batch variant: the first batch after the user
            // message always runs direct (no dedup), per spec.md §4.5.
            if iteration == 0 {
                if let Some(reason) = self.run_initial_batch(store, &response.tool_calls) {
                    return reason;
                }
                continue;
            }

            // Step 7.
            let has_new_calls = response.tool_calls.iter().any(|c| !self.context.is_duplicate(&c.id));
            if !has_new_calls {
                self.output.on_state(LoopState::EndNoMoreTools);
                return EndReason::NoMoreTools;
            }

            // Step 8.
            self.output.on_state(LoopState::Batching);
            let (results, call_indices, outcome) = self.executor.run_compact(&response.tool_calls);
            for (k, result) in results.iter().enumerate() {
                let idx = call_indices[k];
                self.output.on_tool_result(&response.tool_calls[idx], result);
            }
            self.append_results_by_index(store, &response.tool_calls, &call_indices, &results);

            match outcome {
                BatchOutcome::Aborted => {
                    self.output.on_state(LoopState::EndAbort);
                    return EndReason::UserAbort;
                }
                BatchOutcome::Interrupted => {
                    self.output.on_state(LoopState::EndInterrupt);
                    return EndReason::UserInterrupt;
                }
                BatchOutcome::Ok => {}
            }

            // Step 9.
            self.scan_clear_history_by_index(store, &response.tool_calls, &call_indices, &results);
        }

        tracing::warn!(MAX_ITERATIONS, "safety limit reached, ending turn");
        self.output.on_state(LoopState::EndSafetyLimit);
        EndReason::SafetyLimit
    }

    fn append_results(&self, store: &mut dyn ConversationStore, calls: &[ToolCall], results: &[ToolResult]) {
        for (call, result) in calls.iter().zip(results.iter()) {
            self.output.on_tool_result(call, result);
            store.append_tool(&result.tool_call_id, &call.name, result);
        }
    }

    fn append_results_by_index(
        &self,
        store: &mut dyn ConversationStore,
        calls: &[ToolCall],
        call_indices: &[usize],
        results: &[ToolResult],
    ) {
        for (k, result) in results.iter().enumerate() {
            let call = &calls[call_indices[k]];
            store.append_tool(&result.tool_call_id, &call.name, result);
        }
    }

    fn scan_clear_history(&self, store: &mut dyn ConversationStore, calls: &[ToolCall], results: &[ToolResult]) {
        if results.iter().any(|r| r.clear_history) {
            store.clear_with_stub(calls);
        }
    }

    fn scan_clear_history_by_index(
        &self,
        store: &mut dyn ConversationStore,
        calls: &[ToolCall],
        call_indices: &[usize],
        results: &[ToolResult],
    ) {
        if results.iter().any(|r| r.clear_history) {
            let executed: Vec<ToolCall> = call_indices.iter().map(|&i| calls[i].clone()).collect();
            store.clear_with_stub(&executed);
        }
    }
}
