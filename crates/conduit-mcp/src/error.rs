//! Error types for MCP operations.

use crate::jsonrpc::{ErrorCode, JsonRpcError};
use thiserror::Error;

/// Errors from MCP server communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("MCP server '{name}' is not connected")]
    NotConnected { name: String },

    #[error("MCP server '{name}' has not completed the initialize handshake")]
    NotInitialized { name: String },

    #[error("Failed to write to MCP server '{name}': {source}")]
    Write {
        name: String,
        source: std::io::Error,
    },

    #[error("MCP request '{method}' to '{name}' timed out after {timeout_ms}ms")]
    Timeout {
        name: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("MCP request '{method}' to '{name}' was cancelled")]
    Cancelled { name: String, method: String },

    #[error("MCP server '{name}' closed the connection")]
    ConnectionClosed { name: String },

    #[error("JSON-RPC error from '{server}' (code {code}): {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub(crate) fn rpc(server: &str, error: JsonRpcError) -> Self {
        McpError::Rpc {
            server: server.to_string(),
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }

    /// The peer's error code, if the peer answered with an error object.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            McpError::Rpc { code, .. } => Some(ErrorCode::from(*code)),
            _ => None,
        }
    }
}
