//! A reference `RoundTripClient`: blocking HTTP against the Anthropic
//! Messages API. Demonstrative, not "the transport" — spec.md §1 treats
//! the LLM provider as out of scope; this exists so the binary is
//! runnable end-to-end against a real model.

use std::time::Duration;

use ralph_core::{BudgetOutcome, Message, ParsedResponse, Role, RoundTripClient, ToolCall, TransportError};
use serde::Deserialize;
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Static tool schemas for the `ralph-tools` reference registry, so a
/// real model has something to call. A production deployment with a
/// different `ToolRegistry` would supply its own schemas here instead.
fn tool_schemas() -> Value {
    json!([
        {
            "name": "read_file",
            "description": "Reads a file from the filesystem, with line numbers.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"}
                },
                "required": ["path"]
            }
        },
        {
            "name": "write_file",
            "description": "Writes content to a file, creating parent directories as needed.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }
        },
        {
            "name": "edit_file",
            "description": "Performs an exact string replacement in a file.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "old_string": {"type": "string"},
                    "new_string": {"type": "string"},
                    "replace_all": {"type": "boolean"}
                },
                "required": ["path", "old_string", "new_string"]
            }
        },
        {
            "name": "glob",
            "description": "Finds files matching a glob pattern, most recently modified first.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "pattern": {"type": "string"},
                    "path": {"type": "string"}
                },
                "required": ["pattern"]
            }
        },
        {
            "name": "bash",
            "description": "Runs a shell command with a persistent working directory.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout": {"type": "integer"}
                },
                "required": ["command"]
            }
        },
        {
            "name": "subagent",
            "description": "Spawns a subagent process to work a task independently, returning its id.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "task": {"type": "string"},
                    "context": {"type": "string"},
                    "timeout_seconds": {"type": "integer"}
                },
                "required": ["task"]
            }
        },
        {
            "name": "subagent_status",
            "description": "Checks or awaits a previously spawned subagent's status and result.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "wait": {"type": "boolean"}
                },
                "required": ["id"]
            }
        }
    ])
}

/// A blocking Anthropic Messages API client.
pub struct AnthropicClient {
    http: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: usize,
    temperature: f64,
}

impl AnthropicClient {
    /// Builds a client for `model`, authenticating with `api_key`.
    pub fn new(api_key: String, model: String, max_tokens: usize, temperature: f64, base_url: Option<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builder with static config never fails");
        Self { http, api_key, base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()), model, max_tokens, temperature }
    }

    fn to_wire_messages(history: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system = None;
        let mut messages = Vec::new();

        for message in history {
            match message.role {
                Role::System => system = Some(message.content.clone()),
                Role::User => messages.push(json!({"role": "user", "content": message.content})),
                Role::Assistant => {
                    let mut content = Vec::new();
                    if !message.content.is_empty() {
                        content.push(json!({"type": "text", "text": message.content}));
                    }
                    for call in &message.tool_calls {
                        content.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments_value(),
                        }));
                    }
                    messages.push(json!({"role": "assistant", "content": content}));
                }
                Role::Tool => {
                    let tool_call_id = message.tool_call_id.clone().unwrap_or_default();
                    messages.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": tool_call_id,
                            "content": message.content,
                        }],
                    }));
                }
            }
        }

        (system, messages)
    }
}

impl RoundTripClient for AnthropicClient {
    fn round_trip(&self, history: &[Message], budget: &BudgetOutcome) -> Result<ParsedResponse, TransportError> {
        let (system, messages) = Self::to_wire_messages(history);
        let max_tokens = self.max_tokens.min(budget.available_response_tokens.max(1));

        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": self.temperature,
            "messages": messages,
            "tools": tool_schemas(),
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }

        let response = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| TransportError::RetryableNetwork(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text));
        }

        let parsed: AnthropicResponse = response.json().map_err(|e| TransportError::Parse(e.to_string()))?;
        to_parsed_response(parsed)
    }
}

fn classify_http_error(status: u16, body: &str) -> TransportError {
    match status {
        401 | 403 => TransportError::Auth,
        429 => TransportError::RetryableRateLimit(body.to_string()),
        500..=599 => TransportError::RetryableNetwork(format!("http {status}: {body}")),
        _ => TransportError::Parse(format!("http {status}: {body}")),
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}

fn to_parsed_response(response: AnthropicResponse) -> Result<ParsedResponse, TransportError> {
    if response.content.is_empty() {
        return Err(TransportError::Empty);
    }

    let mut text = String::new();
    let mut thinking = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(&t),
            ContentBlock::Thinking { thinking: t } => thinking.push_str(&t),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall { id, name, arguments: input.to_string() });
            }
            ContentBlock::Unknown => {}
        }
    }

    Ok(ParsedResponse {
        thinking: if thinking.is_empty() { None } else { Some(thinking) },
        text: if text.is_empty() { None } else { Some(text) },
        tool_calls,
        prompt_tokens: response.usage.input_tokens,
        completion_tokens: response.usage.output_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_and_rate_limit_and_server_errors() {
        assert!(matches!(classify_http_error(401, ""), TransportError::Auth));
        assert!(matches!(classify_http_error(429, ""), TransportError::RetryableRateLimit(_)));
        assert!(matches!(classify_http_error(503, ""), TransportError::RetryableNetwork(_)));
    }

    #[test]
    fn empty_content_is_reported_as_empty_response() {
        let response = AnthropicResponse { content: Vec::new(), usage: Usage::default() };
        assert!(matches!(to_parsed_response(response), Err(TransportError::Empty)));
    }

    #[test]
    fn tool_use_block_becomes_a_tool_call() {
        let response = AnthropicResponse {
            content: vec![ContentBlock::ToolUse { id: "t1".into(), name: "read_file".into(), input: json!({"path": "/tmp/x"}) }],
            usage: Usage { input_tokens: 10, output_tokens: 5 },
        };
        let parsed = to_parsed_response(response).unwrap();
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "read_file");
        assert_eq!(parsed.prompt_tokens, 10);
    }

    #[test]
    fn text_and_thinking_blocks_are_split() {
        let response = AnthropicResponse {
            content: vec![
                ContentBlock::Thinking { thinking: "let me check".into() },
                ContentBlock::Text { text: "here you go".into() },
            ],
            usage: Usage::default(),
        };
        let parsed = to_parsed_response(response).unwrap();
        assert_eq!(parsed.thinking.as_deref(), Some("let me check"));
        assert_eq!(parsed.text.as_deref(), Some("here you go"));
    }
}
