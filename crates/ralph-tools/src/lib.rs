#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! A reference `ToolRegistry` for the ralph agent execution engine.
//!
//! Implements spec.md §1's `ToolRegistry` trait (`execute`, `is_thread_safe`)
//! with a small set of built-in file and shell tools, so the workspace is
//! runnable and testable end-to-end without a production tool plugin set.
//! This is a demonstrative registry, not "the tools" — production
//! deployments are expected to bring their own (see SPEC_FULL.md §1.1).
//!
//! File-write tools (`write_file`, `edit_file`) re-verify their target path
//! atomically at open time via `ralph_policy::verify_and_open`, closing the
//! TOCTOU window between approval and execution (spec.md §4.1). All path
//! arguments use the key `"path"`, matching `ralph-policy`'s protected-file
//! and allowlist argument extraction.

mod bash;
mod edit_file;
mod glob;
mod read_file;
mod write_file;

pub use bash::BashTool;
pub use edit_file::EditFileTool;
pub use glob::GlobTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

use std::collections::HashMap;

use ralph_core::{ToolCall, ToolExecCtx, ToolResult};

/// Maximum output size in characters before truncation, matching the
/// teacher's output-budget discipline for tool results fed back to an LLM.
const MAX_OUTPUT_CHARS: usize = 30_000;

/// One built-in tool, dispatched by name from [`DefaultToolRegistry`].
pub trait BuiltinTool: Send + Sync {
    /// Tool name, as it appears in `ToolCall::name`.
    fn name(&self) -> &'static str;
    /// Whether this tool is safe to run concurrently with other
    /// thread-safe tools in the same batch (spec.md §4.4).
    fn is_thread_safe(&self) -> bool;
    /// Executes the call, returning the JSON-or-plain-text payload that
    /// becomes the success half of a `ToolResult`, or an error message.
    fn run(&self, arguments: &serde_json::Value) -> Result<String, String>;
}

/// A `ralph_core::ToolRegistry` built from a fixed set of [`BuiltinTool`]s.
///
/// Dispatch is a name lookup; there is no plugin loading or MCP routing
/// here (those are out of scope per spec.md §1 — the batch executor
/// branches to an MCP client itself for `mcp_*` names before ever
/// reaching a `ToolRegistry`).
pub struct DefaultToolRegistry {
    tools: HashMap<&'static str, Box<dyn BuiltinTool>>,
}

impl DefaultToolRegistry {
    /// Builds a registry with the reference tool set registered.
    #[must_use]
    pub fn new() -> Self {
        let mut tools: HashMap<&'static str, Box<dyn BuiltinTool>> = HashMap::new();
        for tool in default_tools() {
            tools.insert(tool.name(), tool);
        }
        Self { tools }
    }

    /// Registers an additional tool, overwriting any existing tool of the
    /// same name. Lets an embedder extend the reference set in tests.
    pub fn register(&mut self, tool: Box<dyn BuiltinTool>) {
        self.tools.insert(tool.name(), tool);
    }
}

impl Default for DefaultToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_tools() -> Vec<Box<dyn BuiltinTool>> {
    vec![
        Box::new(ReadFileTool),
        Box::new(WriteFileTool),
        Box::new(EditFileTool),
        Box::new(GlobTool),
        Box::new(BashTool),
    ]
}

impl ralph_core::ToolRegistry for DefaultToolRegistry {
    fn execute(&self, call: &ToolCall, _ctx: &ToolExecCtx) -> ToolResult {
        let Some(tool) = self.tools.get(call.name.as_str()) else {
            return ToolResult::error(&call.id, "tool_failed", format!("unknown tool: {}", call.name));
        };

        let arguments = call.arguments_value();
        match tool.run(&arguments) {
            Ok(payload) => {
                let truncated = truncate_output(payload);
                ToolResult {
                    tool_call_id: call.id.clone(),
                    result: serde_json::json!({ "output": truncated }).to_string(),
                    success: true,
                    clear_history: false,
                }
            }
            Err(message) => {
                tracing::debug!(tool = %call.name, error = %message, "builtin tool failed");
                ToolResult::error(&call.id, "tool_failed", message)
            }
        }
    }

    fn is_thread_safe(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.is_thread_safe())
    }
}

/// Truncates `output` to [`MAX_OUTPUT_CHARS`], appending a notice if it
/// was cut off.
#[must_use]
pub fn truncate_output(output: String) -> String {
    if output.chars().count() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let mut truncated: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
    truncated.push_str("\n\n... (output truncated — exceeded 30000 character limit)");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::ToolRegistry as _;

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall { id: "c1".into(), name: name.into(), arguments: args.to_string() }
    }

    #[test]
    fn unknown_tool_fails_without_panicking() {
        let registry = DefaultToolRegistry::new();
        let result = registry.execute(&call("nonexistent", serde_json::json!({})), &ToolExecCtx::default());
        assert!(!result.success);
        assert!(result.result.contains("tool_failed"));
    }

    #[test]
    fn thread_safety_matches_tool_kind() {
        let registry = DefaultToolRegistry::new();
        assert!(registry.is_thread_safe("read_file"));
        assert!(registry.is_thread_safe("glob"));
        assert!(!registry.is_thread_safe("write_file"));
        assert!(!registry.is_thread_safe("edit_file"));
        assert!(!registry.is_thread_safe("bash"));
        assert!(!registry.is_thread_safe("nonexistent"));
    }

    #[test]
    fn truncate_output_passes_small_text_through() {
        let small = "hello".to_string();
        assert_eq!(truncate_output(small.clone()), small);
    }

    #[test]
    fn truncate_output_cuts_large_text() {
        let large = "x".repeat(40_000);
        let result = truncate_output(large);
        assert!(result.len() < 40_000);
        assert!(result.contains("output truncated"));
    }
}
