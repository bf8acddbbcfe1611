use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ralph_core::{clear_interrupt, interrupt_flag, ToolCall, ToolExecCtx, ToolRegistry, ToolResult};
use ralph_policy::{ApprovalConfig, PolicyEngine, PolicyError};
use ralph_subagent::SubagentManager;

use crate::context::OrchestrationContext;

/// Upper bound on concurrently dispatched thread-safe tool calls within
/// one batch (spec.md §4.4, §5).
const MAX_PARALLEL_WORKERS: usize = 8;

/// The result of running one batch (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every call ran (or was denied/rate-limited with a result emitted).
    Ok,
    /// The user denied/aborted an approval prompt; remaining calls in the
    /// batch were filled with an `aborted` placeholder.
    Aborted,
    /// SIGINT fired; remaining calls were filled with an `interrupted`
    /// placeholder.
    Interrupted,
}

/// Executes one batch of `ToolCall`s against the policy engine, the tool
/// registry, and (for `subagent`/`subagent_status`) the subagent
/// supervisor, producing one `ToolResult` per call (spec.md §4.4).
///
/// `subagent`/`subagent_status` are dispatched directly by this executor
/// rather than routed through `ToolRegistry`, since the supervisor is a
/// process-level collaborator the general tool registry has no business
/// holding a reference to (see DESIGN.md).
pub struct BatchExecutor<'a> {
    config: &'a ApprovalConfig,
    registry: &'a (dyn ToolRegistry + Sync),
    context: &'a OrchestrationContext,
    subagents: Option<&'a SubagentManager>,
    tool_ctx: ToolExecCtx,
}

impl<'a> BatchExecutor<'a> {
    /// Builds an executor over one session's shared collaborators.
    /// `subagents` is `None` when this process has no subagent supervisor
    /// wired up (e.g. a subagent itself, which is forbidden from spawning
    /// further subagents regardless — see `tool_ctx.is_subagent`).
    pub fn new(
        config: &'a ApprovalConfig,
        registry: &'a (dyn ToolRegistry + Sync),
        context: &'a OrchestrationContext,
        subagents: Option<&'a SubagentManager>,
        tool_ctx: ToolExecCtx,
    ) -> Self {
        Self { config, registry, context, subagents, tool_ctx }
    }

    /// Direct mode: one result slot per call, no deduplication. Used for
    /// the initial batch after a user message.
    pub fn run_direct(&self, calls: &[ToolCall]) -> (Vec<ToolResult>, BatchOutcome) {
        let (results, _indices, outcome) = self.run(calls, false);
        (results, outcome)
    }

    /// Compact mode: skips calls whose id is already in `executed_ids`.
    /// `call_indices[k]` is the index into `calls` that produced
    /// `results[k]`. Used inside the iterative loop.
    pub fn run_compact(&self, calls: &[ToolCall]) -> (Vec<ToolResult>, Vec<usize>, BatchOutcome) {
        self.run(calls, true)
    }

    fn run(&self, calls: &[ToolCall], compact: bool) -> (Vec<ToolResult>, Vec<usize>, BatchOutcome) {
        self.config.protected_files.refresh_now();

        if calls.is_empty() {
            return (Vec::new(), Vec::new(), BatchOutcome::Ok);
        }

        if interrupt_flag().load(Ordering::SeqCst) {
            clear_interrupt(interrupt_flag());
            return self.fill_interrupted(calls, compact);
        }

        // Steps 1-3 (interrupt already checked above; dup check; mark
        // executed) run as a single serialized pre-pass, per spec.md
        // §4.4's "steps 1, 2, 3 ... are always serialized".
        let mut work: Vec<(usize, &ToolCall)> = Vec::with_capacity(calls.len());
        for (i, call) in calls.iter().enumerate() {
            if compact && self.context.is_duplicate(&call.id) {
                continue;
            }
            self.context.mark_executed(&call.id);
            work.push((i, call));
        }

        let all_thread_safe = work.len() > 1
            && work
                .iter()
                .all(|(_, call)| call.name != "subagent" && call.name != "subagent_status" && self.registry.is_thread_safe(&call.name));

        let (pairs, outcome) = if all_thread_safe { self.run_parallel(&work) } else { self.run_sequential(&work) };

        let mut results = Vec::with_capacity(pairs.len());
        let mut call_indices = Vec::with_capacity(pairs.len());
        for (idx, result) in pairs {
            results.push(result);
            if compact {
                call_indices.push(idx);
            }
        }
        (results, call_indices, outcome)
    }

    fn fill_interrupted(&self, calls: &[ToolCall], compact: bool) -> (Vec<ToolResult>, Vec<usize>, BatchOutcome) {
        let mut results = Vec::new();
        let mut call_indices = Vec::new();
        for (i, call) in calls.iter().enumerate() {
            if compact && self.context.is_duplicate(&call.id) {
                continue;
            }
            results.push(ToolResult::error(&call.id, "interrupted", "Cancelled by user"));
            if compact {
                call_indices.push(i);
            }
        }
        (results, call_indices, BatchOutcome::Interrupted)
    }

    /// Sequential path: the default, and the only path when any call's
    /// tool is not thread-safe or the batch has a single call. Stops at
    /// the first interrupt or abort, filling every later slot with the
    /// matching placeholder (spec.md §4.4 scenario 4).
    fn run_sequential(&self, work: &[(usize, &ToolCall)]) -> (Vec<(usize, ToolResult)>, BatchOutcome) {
        let mut out = Vec::with_capacity(work.len());
        let mut outcome = BatchOutcome::Ok;
        let mut stopped = false;

        for (idx, call) in work {
            if stopped {
                let (kind, message) = match outcome {
                    BatchOutcome::Interrupted => ("interrupted", "Cancelled by user"),
                    _ => ("aborted", "aborted by user"),
                };
                out.push((*idx, ToolResult::error(&call.id, kind, message)));
                continue;
            }

            if interrupt_flag().load(Ordering::SeqCst) {
                clear_interrupt(interrupt_flag());
                out.push((*idx, ToolResult::error(&call.id, "interrupted", "Cancelled by user")));
                outcome = BatchOutcome::Interrupted;
                stopped = true;
                continue;
            }

            match self.execute_call(call) {
                CallOutcome::Result(result) => out.push((*idx, result)),
                CallOutcome::Abort(result) => {
                    out.push((*idx, result));
                    outcome = BatchOutcome::Aborted;
                    stopped = true;
                }
            }
        }

        (out, outcome)
    }

    /// Parallel path: every call's tool is thread-safe, so steps 4-6 run
    /// concurrently over a bounded worker pool, preserving result-slot
    /// order (spec.md §4.4's parallelism rule). Since thread-safe tools
    /// are not expected to raise an interactive prompt that aborts, a
    /// mid-flight abort here does not pre-empt calls already dispatched
    /// to other workers — only the overall `BatchOutcome` reflects it.
    fn run_parallel(&self, work: &[(usize, &ToolCall)]) -> (Vec<(usize, ToolResult)>, BatchOutcome) {
        if interrupt_flag().load(Ordering::SeqCst) {
            clear_interrupt(interrupt_flag());
            let out = work
                .iter()
                .map(|(idx, call)| (*idx, ToolResult::error(&call.id, "interrupted", "Cancelled by user")))
                .collect();
            return (out, BatchOutcome::Interrupted);
        }

        let slots: Vec<Mutex<Option<ToolResult>>> = work.iter().map(|_| Mutex::new(None)).collect();
        let aborted = AtomicBool::new(false);

        for chunk_start in (0..work.len()).step_by(MAX_PARALLEL_WORKERS) {
            let chunk_end = (chunk_start + MAX_PARALLEL_WORKERS).min(work.len());
            std::thread::scope(|scope| {
                for pos in chunk_start..chunk_end {
                    let (_, call) = &work[pos];
                    let slot = &slots[pos];
                    let aborted = &aborted;
                    scope.spawn(move || {
                        let result = match self.execute_call(call) {
                            CallOutcome::Result(result) => result,
                            CallOutcome::Abort(result) => {
                                aborted.store(true, Ordering::SeqCst);
                                result
                            }
                        };
                        *slot.lock().expect("batch result slot mutex poisoned") = Some(result);
                    });
                }
            });
        }

        let out = work
            .iter()
            .zip(slots.into_iter())
            .map(|((idx, _), slot)| {
                let result = slot
                    .into_inner()
                    .expect("batch result slot mutex poisoned")
                    .expect("every dispatched slot is filled before the scope ends");
                (*idx, result)
            })
            .collect();

        let outcome = if aborted.load(Ordering::SeqCst) { BatchOutcome::Aborted } else { BatchOutcome::Ok };
        (out, outcome)
    }

    /// Steps 4-7 of the per-call pipeline: subagent batch limit, approval,
    /// dispatch, and (implicitly, via the caller logging `on_tool_result`)
    /// post-execution bookkeeping.
    fn execute_call(&self, call: &ToolCall) -> CallOutcome {
        tracing::debug!(tool = %call.name, tool_call_id = %call.id, "executing tool call");
        if !self.context.can_spawn_subagent(&call.name) {
            tracing::warn!(tool_call_id = %call.id, "rejected second subagent spawn in one batch");
            return CallOutcome::Result(ToolResult::error(
                &call.id,
                "duplicate_subagent",
                "at most one subagent may be spawned per batch",
            ));
        }

        let engine = PolicyEngine::new(self.config);
        match engine.check_and_prompt(call) {
            Ok(()) => {}
            Err(PolicyError::Aborted) => {
                return CallOutcome::Abort(ToolResult::error(&call.id, "aborted", "aborted by user"));
            }
            Err(PolicyError::RateLimited { retry_after_secs }) => {
                let body = serde_json::json!({
                    "error": "rate_limited",
                    "tool": call.name,
                    "retry_after": retry_after_secs,
                });
                return CallOutcome::Result(ToolResult {
                    tool_call_id: call.id.clone(),
                    result: body.to_string(),
                    success: false,
                    clear_history: false,
                });
            }
            Err(err) => {
                return CallOutcome::Result(ToolResult::error(&call.id, err.kind(), err.to_string()));
            }
        }

        CallOutcome::Result(self.dispatch(call))
    }

    fn dispatch(&self, call: &ToolCall) -> ToolResult {
        match call.name.as_str() {
            "subagent" => self.dispatch_subagent(call),
            "subagent_status" => self.dispatch_subagent_status(call),
            _ => self.registry.execute(call, &self.tool_ctx),
        }
    }

    fn dispatch_subagent(&self, call: &ToolCall) -> ToolResult {
        if self.tool_ctx.is_subagent {
            return ToolResult::error(&call.id, "subagent_spawn_failed", "subagents may not spawn further subagents");
        }
        let Some(manager) = self.subagents else {
            return ToolResult::error(&call.id, "subagent_spawn_failed", "no subagent supervisor is configured");
        };

        let args = call.arguments_value();
        let task = args.get("task").and_then(|v| v.as_str()).unwrap_or_default();
        if task.is_empty() {
            return ToolResult::error(&call.id, "tool_failed", "subagent call requires a non-empty \"task\" argument");
        }
        let context = args.get("context").and_then(|v| v.as_str());
        let timeout = args.get("timeout_seconds").and_then(|v| v.as_u64()).map(Duration::from_secs);

        match manager.spawn(task, context, timeout) {
            Ok(id) => ToolResult::ok(&call.id, serde_json::json!({ "id": id, "status": "running" })),
            Err(err) => ToolResult::error(&call.id, err.kind(), err.to_string()),
        }
    }

    fn dispatch_subagent_status(&self, call: &ToolCall) -> ToolResult {
        let Some(manager) = self.subagents else {
            return ToolResult::error(&call.id, "subagent_spawn_failed", "no subagent supervisor is configured");
        };

        let args = call.arguments_value();
        let Some(id) = args.get("id").and_then(|v| v.as_str()) else {
            return ToolResult::error(&call.id, "tool_failed", "subagent_status call requires an \"id\" argument");
        };
        let wait = args.get("wait").and_then(|v| v.as_bool()).unwrap_or(false);

        match manager.get_status(id, wait, self.config) {
            Ok(snapshot) => ToolResult::ok(
                &call.id,
                serde_json::json!({
                    "id": snapshot.id,
                    "status": format!("{:?}", snapshot.status).to_lowercase(),
                    "result": snapshot.result,
                    "error": snapshot.error,
                }),
            ),
            Err(err) => ToolResult::error(&call.id, err.kind(), err.to_string()),
        }
    }
}

enum CallOutcome {
    Result(ToolResult),
    Abort(ToolResult),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_policy::ProtectedFileCache;

    struct EchoRegistry {
        thread_safe: bool,
    }

    impl ToolRegistry for EchoRegistry {
        fn execute(&self, call: &ToolCall, _ctx: &ToolExecCtx) -> ToolResult {
            ToolResult::ok(&call.id, serde_json::json!({ "echoed": call.name }))
        }
        fn is_thread_safe(&self, _name: &str) -> bool {
            self.thread_safe
        }
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall { id: id.into(), name: name.into(), arguments: "{}".into() }
    }

    #[test]
    fn direct_mode_fills_one_slot_per_call_in_order() {
        let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
        config.set_action(ralph_policy::Category::FileRead, ralph_policy::Action::Allow);
        let registry = EchoRegistry { thread_safe: false };
        let context = OrchestrationContext::new();
        let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

        let calls = vec![call("a", "read_file"), call("b", "read_file")];
        let (results, outcome) = executor.run_direct(&calls);

        assert_eq!(outcome, BatchOutcome::Ok);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_call_id, "a");
        assert_eq!(results[1].tool_call_id, "b");
    }

    #[test]
    fn compact_mode_skips_already_executed_ids() {
        let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
        let registry = EchoRegistry { thread_safe: false };
        let context = OrchestrationContext::new();
        context.mark_executed("a");
        let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

        let calls = vec![call("a", "read_file"), call("b", "read_file")];
        let (results, call_indices, outcome) = executor.run_compact(&calls);

        assert_eq!(outcome, BatchOutcome::Ok);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].tool_call_id, "b");
        assert_eq!(call_indices, vec![1]);
    }

    #[test]
    fn second_subagent_call_in_one_batch_is_rejected() {
        let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
        let registry = EchoRegistry { thread_safe: false };
        let context = OrchestrationContext::new();
        let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

        let calls = vec![call("s1", "subagent"), call("s2", "subagent")];
        let (results, _outcome) = executor.run_direct(&calls);

        assert_eq!(results.len(), 2);
        // s1 fails with "no subagent supervisor configured" (None passed above),
        // but s2 must fail specifically with duplicate_subagent regardless.
        assert!(results[1].result.contains("duplicate_subagent"));
    }

    #[test]
    fn parallel_batch_preserves_result_order() {
        let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
        config.set_action(ralph_policy::Category::Other, ralph_policy::Action::Allow);
        let registry = EchoRegistry { thread_safe: true };
        let context = OrchestrationContext::new();
        let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

        let calls: Vec<ToolCall> = (0..6).map(|i| call(&format!("c{i}"), "custom_tool")).collect();
        let (results, outcome) = executor.run_direct(&calls);

        assert_eq!(outcome, BatchOutcome::Ok);
        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2", "c3", "c4", "c5"]);
    }
}
