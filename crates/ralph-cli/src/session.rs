//! Wires the data-model traits (`RoundTripClient`, `OutputSink`,
//! `ToolRegistry`, `ConversationStore`) and the orchestration layer
//! (`OrchestrationContext`, `BatchExecutor`, `IterativeLoop`) together
//! into a single user-turn entry point.

use ralph_core::{ConversationStore, OutputSink, RoundTripClient, ToolExecCtx, ToolRegistry};
use ralph_orchestrator::{BatchExecutor, EndReason, IterativeLoop, OrchestrationContext};
use ralph_policy::ApprovalConfig;
use ralph_subagent::SubagentManager;

/// Runs one user turn to completion: appends `user_text`, drives the
/// iterative loop, and returns why it stopped.
///
/// `subagents` is `None` when this process must not spawn further
/// subagents (because it is itself one — `tool_ctx.is_subagent` carries
/// the same fact into tool dispatch).
#[allow(clippy::too_many_arguments)]
pub fn run_turn(
    user_text: &str,
    store: &mut dyn ConversationStore,
    client: &dyn RoundTripClient,
    sink: &dyn OutputSink,
    approval: &ApprovalConfig,
    registry: &(dyn ToolRegistry + Sync),
    subagents: Option<&SubagentManager>,
    tool_ctx: ToolExecCtx,
) -> EndReason {
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(approval, registry, &context, subagents, tool_ctx);
    let iterative_loop = IterativeLoop::new(client, sink, &executor, &context);

    store.append_user(user_text);
    iterative_loop.run(store)
}

/// The text of the last `Assistant` message in `store`, used as a
/// subagent's final result (spec.md §6: "stdout of the subagent is its
/// final result").
pub fn last_assistant_text(store: &dyn ConversationStore) -> Option<String> {
    store
        .messages()
        .iter()
        .rev()
        .find(|m| m.role == ralph_core::Role::Assistant)
        .map(|m| m.content.clone())
        .filter(|text| !text.is_empty())
}
