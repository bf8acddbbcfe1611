use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call emitted by the LLM inside a `ParsedResponse`.
///
/// `id` is a provider-assigned token, unique within one conversation; the
/// core never interprets it beyond equality comparison. `arguments` is a
/// JSON object serialized as text, exactly as the provider returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier, opaque to the core.
    pub id: String,
    /// Tool name, used for classification and dispatch.
    pub name: String,
    /// JSON-object arguments, serialized as text.
    pub arguments: String,
}

impl ToolCall {
    /// Parses `arguments` as a JSON object. Returns `Value::Null` on
    /// malformed JSON rather than failing the call outright; callers that
    /// need a specific field should surface their own `tool_failed` result.
    pub fn arguments_value(&self) -> Value {
        serde_json::from_str(&self.arguments).unwrap_or(Value::Null)
    }
}

/// The result of executing one `ToolCall`.
///
/// `result` is always JSON text. On failure it is `{"error": kind,
/// "message": text}` per spec.md §6. `clear_history` is a back-channel a
/// tool can set to ask the iterative loop to reset conversation history
/// (used by plan-decomposition tools); see spec.md §4.5 step 9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Echoes the originating `ToolCall::id`.
    pub tool_call_id: String,
    /// JSON text: tool-defined payload on success, `{error, message}` on failure.
    pub result: String,
    /// Whether the tool executed successfully.
    pub success: bool,
    /// Ask the orchestrator to reset conversation history after this batch.
    #[serde(default)]
    pub clear_history: bool,
}

impl ToolResult {
    /// Builds a failure result with a named error kind, the shape every
    /// policy/orchestration error uses on the wire (spec.md §6, §7).
    pub fn error(tool_call_id: impl Into<String>, kind: &str, message: impl Into<String>) -> Self {
        let body = serde_json::json!({ "error": kind, "message": message.into() });
        Self {
            tool_call_id: tool_call_id.into(),
            result: body.to_string(),
            success: false,
            clear_history: false,
        }
    }

    /// Builds a success result from an arbitrary JSON-serializable payload.
    pub fn ok(tool_call_id: impl Into<String>, payload: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            result: payload.to_string(),
            success: true,
            clear_history: false,
        }
    }
}
