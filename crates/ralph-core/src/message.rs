use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// The role of one conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The system prompt.
    System,
    /// A human-authored turn.
    User,
    /// A model-authored turn, possibly carrying `tool_calls`.
    Assistant,
    /// A tool's result, paired to an assistant `tool_calls` entry by id.
    Tool,
}

/// One entry in the conversation history.
///
/// Invariant (spec.md §3): every `Tool` message's `tool_call_id` matches
/// the `id` of a preceding `Assistant` message's `tool_calls`; for an
/// assistant message emitting N tool calls, the next N `Tool` messages in
/// insertion order correspond 1:1 to those calls, identity checked by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The message's role.
    pub role: Role,
    /// Text content; for an `Assistant` message with tool calls this may
    /// be empty if the model produced no user-visible text.
    pub content: String,
    /// Set on `Tool` messages, echoing the originating call's id.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    /// Set on `Tool` messages, the tool's name (useful for display/log).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_name: Option<String>,
    /// Set on `Assistant` messages that requested tool calls.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    /// Builds a `User` message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: Vec::new(),
        }
    }

    /// Builds an `Assistant` message, optionally carrying tool calls.
    pub fn assistant(text: Option<&str>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.unwrap_or_default().to_string(),
            tool_call_id: None,
            tool_name: None,
            tool_calls,
        }
    }

    /// Builds a `Tool` message pairing `tool_call_id` to its result text.
    pub fn tool(tool_call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            tool_calls: Vec::new(),
        }
    }
}
