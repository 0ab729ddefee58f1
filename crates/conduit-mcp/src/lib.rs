//! MCP (Model Context Protocol) client over stdio.
//!
//! Spawns an MCP server as a child process and talks newline-delimited
//! JSON-RPC 2.0 over its stdin/stdout. After the initialize handshake the
//! client lists and calls tools, lists and reads resources, and lists and
//! renders prompts. Responses are correlated by id, so any number of calls
//! may be in flight at once.

pub mod client;
pub mod config;
pub mod definition;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use config::{McpConfig, McpServerConfig};
pub use definition::ToolDefinition;
pub use error::McpError;
pub use jsonrpc::{ErrorCode, JsonRpcMessage, Method, RequestId};
pub use manager::McpManager;
pub use transport::{StdioTransport, Transport};
pub use types::{
    CallToolResult, Content, GetPromptResult, InitializeResult, Prompt, Resource,
    ResourceContents, Tool,
};
