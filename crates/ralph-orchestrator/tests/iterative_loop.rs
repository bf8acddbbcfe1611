use std::sync::atomic::Ordering;

use ralph_core::{interrupt_flag, BudgetOutcome, BudgetStatus, LoopState, ParsedResponse, ToolCall, ToolExecCtx};
use ralph_orchestrator::{BatchExecutor, BatchOutcome, IterativeLoop, OrchestrationContext};
use ralph_policy::{ApprovalConfig, ProtectedFileCache};
use ralph_test::{FakeConversationStore, FakeOutputSink, FakeRoundTripClient, FakeToolRegistry, OutputEvent};

fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall { id: id.into(), name: name.into(), arguments: arguments.into() }
}

/// Scenario 1: "hi" -> {text:"hello", tool_calls:[]} ends the turn after
/// one iteration with no-more-tools.
#[test]
fn no_op_turn_ends_after_one_iteration() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());
    let client = FakeRoundTripClient::new();
    let output = FakeOutputSink::new();
    let loop_ = IterativeLoop::new(&client, &output, &executor, &context);

    client.enqueue(Ok(ParsedResponse { text: Some("hello".into()), ..Default::default() }));

    let mut store = FakeConversationStore::with_default_budget();
    store.append_user("hi");
    let reason = loop_.run(&mut store);

    assert_eq!(reason, ralph_orchestrator::EndReason::NoMoreTools);
    assert_eq!(store.messages().len(), 2);
    assert_eq!(store.messages()[0].content, "hi");
    assert_eq!(store.messages()[1].content, "hello");
}

/// Scenario 2: re-emitted ids across iterations do not re-execute; a
/// batch containing only previously-seen ids ends the loop.
#[test]
fn dedup_break_stops_reemission_loop() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());
    let client = FakeRoundTripClient::new();
    let output = FakeOutputSink::new();
    let loop_ = IterativeLoop::new(&client, &output, &executor, &context);

    // Iteration 1: x1, x2 (new).
    client.enqueue(Ok(ParsedResponse {
        tool_calls: vec![call("x1", "read_file", "{}"), call("x2", "read_file", "{}")],
        ..Default::default()
    }));
    // Iteration 2: x1, x2 again plus a genuinely new x3.
    client.enqueue(Ok(ParsedResponse {
        tool_calls: vec![call("x1", "read_file", "{}"), call("x2", "read_file", "{}"), call("x3", "read_file", "{}")],
        ..Default::default()
    }));
    // Iteration 3: only x1, x2 again -> no new calls -> loop ends.
    client.enqueue(Ok(ParsedResponse {
        tool_calls: vec![call("x1", "read_file", "{}"), call("x2", "read_file", "{}")],
        ..Default::default()
    }));

    let mut store = FakeConversationStore::with_default_budget();
    store.append_user("read README twice");
    let reason = loop_.run(&mut store);

    assert_eq!(reason, ralph_orchestrator::EndReason::NoMoreTools);
    // user + 3x(assistant, tool-results...) -- just check x3 ran exactly once.
    let tool_messages: Vec<_> = store.messages().iter().filter(|m| m.tool_call_id.as_deref() == Some("x3")).collect();
    assert_eq!(tool_messages.len(), 1);
    let x1_messages: Vec<_> = store.messages().iter().filter(|m| m.tool_call_id.as_deref() == Some("x1")).collect();
    assert_eq!(x1_messages.len(), 1);
}

/// Scenario 5: after >= 3 denials, the next call is rate-limited with no
/// prompt, and the wire body matches spec.md's exact shape.
#[test]
fn rate_limited_call_skips_the_prompt() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    for _ in 0..3 {
        config.rate_limiter.record_denial("shell");
    }
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

    let calls = vec![call("c1", "shell", r#"{"command":"git push"}"#)];
    let (results, outcome) = executor.run_direct(&calls);

    assert_eq!(outcome, BatchOutcome::Ok);
    let body: serde_json::Value = serde_json::from_str(&results[0].result).unwrap();
    assert_eq!(body["error"], "rate_limited");
    assert_eq!(body["tool"], "shell");
    assert!(body["retry_after"].as_u64().unwrap() > 0);
}

/// Scenario 3: of two `subagent` calls in one batch, only the first
/// executes; the rest fail with `duplicate_subagent`, and every slot
/// (including the unrelated `read_file` call) is still populated.
#[test]
fn subagent_cap_allows_only_one_per_batch() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

    let calls = vec![
        call("s1", "subagent", r#"{"task":"A"}"#),
        call("s2", "subagent", r#"{"task":"B"}"#),
        call("r", "read_file", r#"{"path":"README.md"}"#),
    ];
    let (results, outcome) = executor.run_direct(&calls);

    assert_eq!(outcome, BatchOutcome::Ok);
    assert_eq!(results.len(), 3);
    assert!(results[1].result.contains("duplicate_subagent"));
    assert!(results[2].success);
}

/// Interrupt property: setting the flag mid-batch fills every remaining
/// slot with `interrupted`, one result per originating call.
#[test]
fn interrupt_flag_fills_remaining_slots() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

    interrupt_flag().store(true, Ordering::SeqCst);
    let calls = vec![call("a", "read_file", "{}"), call("b", "read_file", "{}"), call("c", "read_file", "{}")];
    let (results, outcome) = executor.run_direct(&calls);

    assert_eq!(outcome, BatchOutcome::Interrupted);
    assert_eq!(results.len(), 3);
    for result in &results {
        assert!(result.result.contains("interrupted"));
    }
    assert!(!interrupt_flag().load(Ordering::SeqCst), "interrupt flag must be consumed, not left set");
}

/// Direct mode: every slot filled, in order, matching spec.md §8's
/// quantified invariant.
#[test]
fn direct_mode_result_count_matches_call_count() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());

    let calls: Vec<ToolCall> = (0..5).map(|i| call(&format!("id{i}"), "read_file", "{}")).collect();
    let (results, outcome) = executor.run_direct(&calls);

    assert_eq!(outcome, BatchOutcome::Ok);
    assert_eq!(results.len(), calls.len());
    for (call, result) in calls.iter().zip(results.iter()) {
        assert_eq!(call.id, result.tool_call_id);
    }
}

/// A `ContextFull` budget that compaction successfully relieves lets the
/// turn continue rather than ending it (spec.md §7: "callers typically
/// invoke compaction and retry").
#[test]
fn context_full_budget_recovers_after_successful_compaction() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());
    let client = FakeRoundTripClient::new();
    let output = FakeOutputSink::new();
    let loop_ = IterativeLoop::new(&client, &output, &executor, &context);

    client.enqueue(Ok(ParsedResponse { text: Some("hello".into()), ..Default::default() }));

    let mut store = FakeConversationStore::with_default_budget();
    store.append_user("hi");
    store.set_budget(BudgetOutcome { available_response_tokens: 0, status: BudgetStatus::ContextFull });
    store.set_budget_after_compaction(BudgetOutcome { available_response_tokens: 4096, status: BudgetStatus::Ok });

    let reason = loop_.run(&mut store);

    assert_eq!(reason, ralph_orchestrator::EndReason::NoMoreTools);
    assert!(output.events().contains(&OutputEvent::State(LoopState::Compacting)));
}

/// A `ContextFull` budget that compaction cannot relieve still ends the
/// turn with `ContextFull`, never attempting a round-trip.
#[test]
fn context_full_budget_ends_turn_when_compaction_does_not_help() {
    let config = ApprovalConfig::new(false, ProtectedFileCache::new(vec![]));
    let registry = FakeToolRegistry::new();
    let context = OrchestrationContext::new();
    let executor = BatchExecutor::new(&config, &registry, &context, None, ToolExecCtx::default());
    let client = FakeRoundTripClient::new();
    let output = FakeOutputSink::new();
    let loop_ = IterativeLoop::new(&client, &output, &executor, &context);

    let mut store = FakeConversationStore::with_default_budget();
    store.append_user("hi");
    store.set_budget(BudgetOutcome { available_response_tokens: 0, status: BudgetStatus::ContextFull });

    let reason = loop_.run(&mut store);

    assert_eq!(reason, ralph_orchestrator::EndReason::ContextFull);
    assert!(output.events().contains(&OutputEvent::State(LoopState::Compacting)));
    assert!(output.events().contains(&OutputEvent::State(LoopState::EndContextFull)));
}
