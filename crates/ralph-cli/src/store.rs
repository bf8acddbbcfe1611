//! A reference `ConversationStore`: in-memory history with a naive
//! token estimate, optionally mirrored to an append-only JSONL transcript.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use ralph_core::{BudgetOutcome, BudgetStatus, ConversationStore, Message, ToolCall, ToolResult};

/// Rough chars-per-token ratio used to estimate history size without a
/// real tokenizer (spec.md leaves token accounting provider-specific;
/// this is only precise enough to decide when to compact).
const CHARS_PER_TOKEN: usize = 4;
/// Below this fraction of the context window remaining, compaction runs.
const COMPACTION_HEADROOM: f64 = 0.15;
/// How many of the oldest non-system messages compaction drops at a time.
const COMPACTION_DROP_COUNT: usize = 10;

/// A `ConversationStore` backed by an in-memory `Vec<Message>`, with an
/// optional JSONL transcript file appended to as messages arrive.
pub struct JsonlConversationStore {
    messages: Vec<Message>,
    context_window_tokens: usize,
    response_reserve_tokens: usize,
    transcript_path: Option<PathBuf>,
}

impl JsonlConversationStore {
    /// Builds a store with an optional system prompt and an optional
    /// transcript file to append JSONL lines to as messages arrive.
    pub fn new(system_prompt: Option<&str>, context_window_tokens: usize, response_reserve_tokens: usize, transcript_path: Option<PathBuf>) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(Message {
                role: ralph_core::Role::System,
                content: system.to_string(),
                tool_call_id: None,
                tool_name: None,
                tool_calls: Vec::new(),
            });
        }
        let store = Self { messages, context_window_tokens, response_reserve_tokens, transcript_path };
        for message in &store.messages {
            store.persist(message);
        }
        store
    }

    fn persist(&self, message: &Message) {
        let Some(path) = &self.transcript_path else { return };
        let line = match serde_json::to_string(message) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize transcript line, skipping");
                return;
            }
        };
        let result = OpenOptions::new().create(true).append(true).open(path).and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to append transcript line");
        }
    }

    fn append(&mut self, message: Message) {
        self.persist(&message);
        self.messages.push(message);
    }

    fn estimate_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.content.len() / CHARS_PER_TOKEN + 1).sum()
    }
}

impl ConversationStore for JsonlConversationStore {
    fn append_user(&mut self, text: &str) {
        self.append(Message::user(text));
    }

    fn append_assistant(&mut self, text: Option<&str>, tool_calls: &[ToolCall]) {
        self.append(Message::assistant(text, tool_calls.to_vec()));
    }

    fn append_tool(&mut self, tool_call_id: &str, tool_name: &str, result: &ToolResult) {
        self.append(Message::tool(tool_call_id, tool_name, result.result.clone()));
    }

    fn compact_if_needed(&mut self, budget: &BudgetOutcome) {
        if budget.status != BudgetStatus::ContextFull {
            return;
        }
        // Keep the system message (if any) and drop the oldest
        // non-system messages, the same "drop a batch from the front"
        // strategy the teacher's runtime uses for its own compaction.
        let system: Vec<Message> = self.messages.iter().take_while(|m| m.role == ralph_core::Role::System).cloned().collect();
        let rest: Vec<Message> = self.messages.iter().skip(system.len()).cloned().collect();
        let drop_count = COMPACTION_DROP_COUNT.min(rest.len());
        let kept = rest.into_iter().skip(drop_count);
        self.messages = system.into_iter().chain(kept).collect();
    }

    fn compute_budget(&self) -> BudgetOutcome {
        let used = self.estimate_tokens();
        let budget = self.context_window_tokens.saturating_sub(self.response_reserve_tokens);
        if used >= budget {
            BudgetOutcome { available_response_tokens: 0, status: BudgetStatus::ContextFull }
        } else {
            let headroom = budget - used;
            let status = if (headroom as f64) < (self.context_window_tokens as f64 * COMPACTION_HEADROOM) {
                BudgetStatus::ContextFull
            } else {
                BudgetStatus::Ok
            };
            BudgetOutcome { available_response_tokens: headroom.min(self.response_reserve_tokens), status }
        }
    }

    fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn clear_with_stub(&mut self, tool_calls: &[ToolCall]) {
        let system: Vec<Message> = self.messages.iter().take_while(|m| m.role == ralph_core::Role::System).cloned().collect();
        self.messages = system;
        self.append_assistant(None, tool_calls);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_seeded_as_first_message() {
        let store = JsonlConversationStore::new(Some("be helpful"), 1000, 100, None);
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].role, ralph_core::Role::System);
    }

    #[test]
    fn context_full_triggers_on_small_window() {
        let mut store = JsonlConversationStore::new(None, 100, 50, None);
        store.append_user(&"x".repeat(1000));
        let budget = store.compute_budget();
        assert_eq!(budget.status, BudgetStatus::ContextFull);
    }

    #[test]
    fn compact_if_needed_drops_oldest_messages_but_keeps_system() {
        let mut store = JsonlConversationStore::new(Some("system"), 1000, 100, None);
        for i in 0..20 {
            store.append_user(&format!("message {i}"));
        }
        let before = store.messages().len();
        store.compact_if_needed(&BudgetOutcome { available_response_tokens: 0, status: BudgetStatus::ContextFull });
        assert!(store.messages().len() < before);
        assert_eq!(store.messages()[0].role, ralph_core::Role::System);
    }

    #[test]
    fn clear_with_stub_wipes_history_but_keeps_system_and_stub() {
        let mut store = JsonlConversationStore::new(Some("system"), 1000, 100, None);
        store.append_user("hello");
        store.clear_with_stub(&[ToolCall { id: "c1".into(), name: "t".into(), arguments: "{}".into() }]);
        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.messages()[0].role, ralph_core::Role::System);
        assert_eq!(store.messages()[1].tool_calls.len(), 1);
    }

    #[test]
    fn transcript_file_receives_one_jsonl_line_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        let mut store = JsonlConversationStore::new(None, 1000, 100, Some(path.clone()));
        store.append_user("hello");
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
