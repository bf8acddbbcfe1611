use serde::{Deserialize, Serialize};

/// The coarse bucket a tool call falls into for approval purposes
/// (spec.md §3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Writes or otherwise mutates the filesystem.
    FileWrite,
    /// Reads the filesystem or lists directories.
    FileRead,
    /// Runs a shell command.
    Shell,
    /// Makes an outbound network request.
    Network,
    /// Long-term agent memory (remember/recall/forget/todo).
    Memory,
    /// Spawns or polls a subagent.
    Subagent,
    /// An MCP-server-backed tool.
    Mcp,
    /// Anything not covered above.
    Other,
}

/// Classifies a tool by name. A pure, deterministic function of
/// `call.name` (spec.md §4.1): prefix rules first, then an exact-match
/// table, then the `Other` default.
pub fn classify(tool_name: &str) -> Category {
    if let Some(stripped) = tool_name.strip_prefix("mcp_") {
        let _ = stripped;
        return Category::Mcp;
    }
    if tool_name.starts_with("vector_db_") {
        return Category::Memory;
    }
    match tool_name {
        "read_file" | "list_dir" | "file_info" | "search_files" => Category::FileRead,
        "write_file" | "append_file" | "apply_delta" => Category::FileWrite,
        "shell" => Category::Shell,
        "web_fetch" => Category::Network,
        "remember" | "recall_memories" | "forget_memory" | "todo" => Category::Memory,
        "subagent" | "subagent_status" => Category::Subagent,
        _ => Category::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_exact_match_table() {
        assert_eq!(classify("read_file"), Category::FileRead);
        assert_eq!(classify("write_file"), Category::FileWrite);
        assert_eq!(classify("append_file"), Category::FileWrite);
        assert_eq!(classify("apply_delta"), Category::FileWrite);
        assert_eq!(classify("shell"), Category::Shell);
        assert_eq!(classify("web_fetch"), Category::Network);
        assert_eq!(classify("remember"), Category::Memory);
        assert_eq!(classify("todo"), Category::Memory);
        assert_eq!(classify("subagent"), Category::Subagent);
        assert_eq!(classify("subagent_status"), Category::Subagent);
    }

    #[test]
    fn classifies_prefix_rules() {
        assert_eq!(classify("mcp_notion_search"), Category::Mcp);
        assert_eq!(classify("vector_db_query"), Category::Memory);
    }

    #[test]
    fn defaults_to_other() {
        assert_eq!(classify("some_custom_tool"), Category::Other);
    }
}
