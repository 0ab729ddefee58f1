//! MCP manager: one client per configured server.

use crate::client::McpClient;
use crate::config::McpConfig;
use crate::definition::{ToolDefinition, split_namespaced};
use crate::error::McpError;
use crate::types::CallToolResult;
use std::sync::Arc;

/// Manages connections to multiple MCP servers.
pub struct McpManager {
    clients: Vec<Arc<McpClient>>,
}

impl McpManager {
    /// Start all configured MCP servers.
    ///
    /// Servers that fail to start are logged and skipped.
    pub async fn start(config: &McpConfig) -> Self {
        let mut names: Vec<_> = config.servers.keys().collect();
        names.sort();

        let mut clients = Vec::new();
        for name in names {
            let server_config = &config.servers[name];
            match McpClient::connect_stdio(name.clone(), server_config).await {
                Ok(client) => {
                    tracing::info!("MCP server '{}' started", name);
                    clients.push(Arc::new(client));
                }
                Err(e) => {
                    tracing::warn!("Failed to start MCP server '{}': {}", name, e);
                }
            }
        }

        Self { clients }
    }

    /// Look up a connected server by name.
    pub fn client(&self, name: &str) -> Option<&Arc<McpClient>> {
        self.clients.iter().find(|c| c.server_name() == name)
    }

    pub fn clients(&self) -> &[Arc<McpClient>] {
        &self.clients
    }

    /// Number of connected servers.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Fetch every server's tools as namespaced definitions.
    ///
    /// Each call asks the servers afresh. A server that fails to answer is
    /// logged and left out.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = Vec::new();
        for client in &self.clients {
            match client.list_tools().await {
                Ok(tools) => definitions.extend(
                    tools
                        .iter()
                        .map(|tool| ToolDefinition::from_tool(client.server_name(), tool)),
                ),
                Err(e) => {
                    tracing::warn!("Failed to list tools from '{}': {}", client.server_name(), e);
                }
            }
        }
        definitions
    }

    /// Route a call made with a namespaced tool name to its server.
    pub async fn call(
        &self,
        namespaced_name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let (server, tool) = split_namespaced(namespaced_name).ok_or_else(|| {
            McpError::Protocol(format!("'{namespaced_name}' is not an MCP tool name"))
        })?;
        let client = self.client(server).ok_or_else(|| McpError::NotConnected {
            name: server.to_string(),
        })?;
        client.call_tool(tool, arguments).await
    }

    /// Shut down all connected servers.
    pub async fn shutdown(self) {
        for client in self.clients {
            client.shutdown().await;
        }
    }
}
