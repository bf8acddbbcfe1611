use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use ralph_core::{
    BudgetOutcome, BudgetStatus, ConversationStore, LoopState, Message, OutputSink, ParsedResponse, RoundTripClient,
    ToolCall, ToolExecCtx, ToolRegistry, ToolResult, TransportError,
};

/// A canned-response `RoundTripClient`: the test enqueues
/// `Ok(ParsedResponse)`/`Err(TransportError)` values ahead of time, and
/// each call to `round_trip` pops the next one.
#[derive(Default)]
pub struct FakeRoundTripClient {
    queue: Mutex<VecDeque<Result<ParsedResponse, TransportError>>>,
}

impl FakeRoundTripClient {
    /// Builds an empty client; call [`Self::enqueue`] before driving a loop.
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }

    /// Queues one response (or transport failure) to be returned by the
    /// next `round_trip` call, in FIFO order.
    pub fn enqueue(&self, response: Result<ParsedResponse, TransportError>) {
        self.queue.lock().expect("fake client queue mutex poisoned").push_back(response);
    }
}

impl RoundTripClient for FakeRoundTripClient {
    fn round_trip(&self, _history: &[Message], _budget: &BudgetOutcome) -> Result<ParsedResponse, TransportError> {
        self.queue
            .lock()
            .expect("fake client queue mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| panic!("FakeRoundTripClient::round_trip called with an empty queue"))
    }
}

/// One event recorded by [`FakeOutputSink`], in the order it was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// `on_thinking` was called with this text.
    Thinking(String),
    /// `on_text` was called with this text.
    Text(String),
    /// `on_tool_call_summary` was called with these call ids.
    ToolCallSummary(Vec<String>),
    /// `on_tool_result` was called for this call id.
    ToolResult(String, bool),
    /// `on_state` transitioned to this state.
    State(LoopState),
    /// `on_error` was called with this kind/message.
    Error(String, String),
}

/// An `OutputSink` that records every event instead of rendering it, so
/// a test can assert on the exact sequence emitted.
#[derive(Default)]
pub struct FakeOutputSink {
    events: Mutex<Vec<OutputEvent>>,
}

impl FakeOutputSink {
    /// Builds a sink with no recorded events.
    pub fn new() -> Self {
        Self { events: Mutex::new(Vec::new()) }
    }

    /// Returns a snapshot of every event recorded so far, in order.
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.lock().expect("fake sink mutex poisoned").clone()
    }
}

impl OutputSink for FakeOutputSink {
    fn on_thinking(&self, text: &str) {
        self.events.lock().expect("fake sink mutex poisoned").push(OutputEvent::Thinking(text.to_string()));
    }
    fn on_text(&self, text: &str) {
        self.events.lock().expect("fake sink mutex poisoned").push(OutputEvent::Text(text.to_string()));
    }
    fn on_tool_call_summary(&self, calls: &[ToolCall]) {
        let ids = calls.iter().map(|c| c.id.clone()).collect();
        self.events.lock().expect("fake sink mutex poisoned").push(OutputEvent::ToolCallSummary(ids));
    }
    fn on_tool_result(&self, call: &ToolCall, result: &ToolResult) {
        self.events
            .lock()
            .expect("fake sink mutex poisoned")
            .push(OutputEvent::ToolResult(call.id.clone(), result.success));
    }
    fn on_state(&self, state: LoopState) {
        self.events.lock().expect("fake sink mutex poisoned").push(OutputEvent::State(state));
    }
    fn on_error(&self, kind: &str, message: &str) {
        self.events
            .lock()
            .expect("fake sink mutex poisoned")
            .push(OutputEvent::Error(kind.to_string(), message.to_string()));
    }
}

/// A `ToolRegistry` whose tools just echo their arguments back as the
/// success payload, unless the test pre-registers a canned result for a
/// specific call id via [`Self::set_result`].
#[derive(Default)]
pub struct FakeToolRegistry {
    thread_safe_tools: Mutex<HashSet<String>>,
    canned: Mutex<std::collections::HashMap<String, ToolResult>>,
}

impl FakeToolRegistry {
    /// Builds a registry where every tool is sequential by default.
    pub fn new() -> Self {
        Self { thread_safe_tools: Mutex::new(HashSet::new()), canned: Mutex::new(std::collections::HashMap::new()) }
    }

    /// Marks `name` as safe to run concurrently with other thread-safe
    /// tools.
    pub fn mark_thread_safe(&self, name: &str) {
        self.thread_safe_tools.lock().expect("fake registry mutex poisoned").insert(name.to_string());
    }

    /// Pre-registers the exact `ToolResult` to return for calls with id
    /// `call_id`, overriding the default echo behavior.
    pub fn set_result(&self, call_id: &str, result: ToolResult) {
        self.canned.lock().expect("fake registry mutex poisoned").insert(call_id.to_string(), result);
    }
}

impl ToolRegistry for FakeToolRegistry {
    fn execute(&self, call: &ToolCall, _ctx: &ToolExecCtx) -> ToolResult {
        if let Some(result) = self.canned.lock().expect("fake registry mutex poisoned").get(&call.id) {
            return result.clone();
        }
        ToolResult::ok(&call.id, serde_json::json!({ "echoed": call.name, "arguments": call.arguments_value() }))
    }

    fn is_thread_safe(&self, name: &str) -> bool {
        self.thread_safe_tools.lock().expect("fake registry mutex poisoned").contains(name)
    }
}

/// An in-memory `ConversationStore`: no real token accounting,
/// `compute_budget` returns a fixed outcome the test configures up front.
pub struct FakeConversationStore {
    messages: Vec<Message>,
    budget: BudgetOutcome,
    budget_after_compaction: Option<BudgetOutcome>,
}

impl FakeConversationStore {
    /// Builds an empty store that always reports `budget` from
    /// `compute_budget`.
    pub fn new(budget: BudgetOutcome) -> Self {
        Self { messages: Vec::new(), budget, budget_after_compaction: None }
    }

    /// Builds an empty store with plenty of headroom (`Ok`, 4096 tokens).
    pub fn with_default_budget() -> Self {
        Self::new(BudgetOutcome { available_response_tokens: 4096, status: BudgetStatus::Ok })
    }

    /// Overrides the budget `compute_budget` will return from now on.
    pub fn set_budget(&mut self, budget: BudgetOutcome) {
        self.budget = budget;
    }

    /// Arranges for the *next* `compact_if_needed` call (only reached
    /// when the current budget is `ContextFull`) to switch the store's
    /// budget to `budget`, simulating compaction freeing up headroom.
    /// Leave unset to simulate compaction that doesn't help.
    pub fn set_budget_after_compaction(&mut self, budget: BudgetOutcome) {
        self.budget_after_compaction = Some(budget);
    }
}

impl ConversationStore for FakeConversationStore {
    fn append_user(&mut self, text: &str) {
        self.messages.push(Message::user(text));
    }

    fn append_assistant(&mut self, text: Option<&str>, tool_calls: &[ToolCall]) {
        self.messages.push(Message::assistant(text, tool_calls.to_vec()));
    }

    fn append_tool(&mut self, tool_call_id: &str, tool_name: &str, result: &ToolResult) {
        self.messages.push(Message::tool(tool_call_id, tool_name, result.result.clone()));
    }

    fn compact_if_needed(&mut self, budget: &BudgetOutcome) {
        if budget.status == BudgetStatus::ContextFull {
            if let Some(next) = self.budget_after_compaction.take() {
                self.budget = next;
            }
        }
    }

    fn compute_budget(&self) -> BudgetOutcome {
        self.budget
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn clear_with_stub(&mut self, tool_calls: &[ToolCall]) {
        self.messages.clear();
        self.messages.push(Message::assistant(None, tool_calls.to_vec()));
    }
}
