//! Reference `OutputSink` implementations: a human-readable terminal
//! renderer and a newline-delimited-JSON renderer, selected by `--format`.

use ralph_core::{LoopState, OutputSink, ToolCall, ToolResult};
use serde_json::json;

/// Renders events as plain, human-readable lines.
pub struct TerminalSink;

impl OutputSink for TerminalSink {
    fn on_thinking(&self, text: &str) {
        if !text.is_empty() {
            println!("\u{1b}[2m{text}\u{1b}[0m");
        }
    }

    fn on_text(&self, text: &str) {
        if !text.is_empty() {
            println!("{text}");
        }
    }

    fn on_tool_call_summary(&self, calls: &[ToolCall]) {
        for call in calls {
            println!("  -> {} {}", call.name, call.arguments);
        }
    }

    fn on_tool_result(&self, call: &ToolCall, result: &ToolResult) {
        let marker = if result.success { "ok" } else { "error" };
        println!("  <- {} [{marker}] {}", call.name, result.result);
    }

    fn on_state(&self, state: LoopState) {
        tracing::debug!(?state, "loop state transition");
    }

    fn on_error(&self, kind: &str, message: &str) {
        eprintln!("error ({kind}): {message}");
    }
}

/// Renders events as one JSON object per line on stdout, for scripted
/// consumption (`--format json`).
pub struct JsonSink;

impl OutputSink for JsonSink {
    fn on_thinking(&self, text: &str) {
        println!("{}", json!({"type": "thinking", "text": text}));
    }

    fn on_text(&self, text: &str) {
        println!("{}", json!({"type": "text", "text": text}));
    }

    fn on_tool_call_summary(&self, calls: &[ToolCall]) {
        let summary: Vec<_> = calls.iter().map(|c| json!({"id": c.id, "name": c.name, "arguments": c.arguments})).collect();
        println!("{}", json!({"type": "tool_call_summary", "calls": summary}));
    }

    fn on_tool_result(&self, call: &ToolCall, result: &ToolResult) {
        println!("{}", json!({
            "type": "tool_result",
            "tool_call_id": call.id,
            "tool_name": call.name,
            "success": result.success,
            "result": result.result,
        }));
    }

    fn on_state(&self, state: LoopState) {
        println!("{}", json!({"type": "state", "state": format!("{state:?}")}));
    }

    fn on_error(&self, kind: &str, message: &str) {
        println!("{}", json!({"type": "error", "kind": kind, "message": message}));
    }
}

/// Renders every event to stderr and nothing to stdout.
///
/// Used by `--subagent` processes: spec.md §6 defines a subagent's stdout
/// as its final result, captured whole by the parent's supervisor, so
/// narration has to go anywhere else. Stderr is merged into the same
/// captured stream on the parent side, so it still shows up for
/// debugging — just not mixed into the result text itself.
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn on_thinking(&self, text: &str) {
        if !text.is_empty() {
            eprintln!("\u{1b}[2m{text}\u{1b}[0m");
        }
    }

    fn on_text(&self, text: &str) {
        if !text.is_empty() {
            eprintln!("{text}");
        }
    }

    fn on_tool_call_summary(&self, calls: &[ToolCall]) {
        for call in calls {
            eprintln!("  -> {} {}", call.name, call.arguments);
        }
    }

    fn on_tool_result(&self, call: &ToolCall, result: &ToolResult) {
        let marker = if result.success { "ok" } else { "error" };
        eprintln!("  <- {} [{marker}] {}", call.name, result.result);
    }

    fn on_state(&self, state: LoopState) {
        tracing::debug!(?state, "loop state transition");
    }

    fn on_error(&self, kind: &str, message: &str) {
        eprintln!("error ({kind}): {message}");
    }
}
