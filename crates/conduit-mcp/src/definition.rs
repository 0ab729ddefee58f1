//! Model-facing tool definitions built from discovered MCP tools.
//!
//! Tool names are namespaced as `mcp__<server>__<tool>` so tools from
//! different servers never collide in a single function list.

use crate::types::Tool;
use serde::{Deserialize, Serialize};

const PREFIX: &str = "mcp__";
const SEPARATOR: &str = "__";

/// A function schema as handed to a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Describe `tool` as exposed by `server`.
    pub fn from_tool(server: &str, tool: &Tool) -> Self {
        Self {
            name: namespaced_name(server, &tool.name),
            description: format!(
                "[MCP: {server}] {}",
                tool.description.as_deref().unwrap_or_default()
            ),
            input_schema: tool.input_schema.clone(),
        }
    }
}

/// `mcp__<server>__<tool>`.
pub fn namespaced_name(server: &str, tool: &str) -> String {
    format!("{PREFIX}{server}{SEPARATOR}{tool}")
}

/// Split a namespaced name back into `(server, tool)`.
///
/// Server names must not contain `__`; tool names may.
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(PREFIX)?;
    let (server, tool) = rest.split_once(SEPARATOR)?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}
