//! MCP client: one server connection, from handshake to shutdown.
//!
//! Handles the MCP protocol handshake (initialize + initialized notification)
//! and exposes one typed method per capability: tools, resources, prompts.

use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, Method};
use crate::transport::{StdioTransport, Transport};
use crate::types::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, InitializeParams,
    InitializeResult, Implementation, ListPromptsResult, ListResourcesResult, ListToolsResult,
    Prompt, ReadResourceParams, ReadResourceResult, Resource, Tool,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OnceCell, broadcast};
use tokio_util::sync::CancellationToken;

/// Client for a single MCP server.
pub struct McpClient {
    name: String,
    transport: Box<dyn Transport>,
    next_id: AtomicU64,
    initialized: OnceCell<InitializeResult>,
    shutdown: CancellationToken,
}

impl McpClient {
    /// Wrap a transport. Nothing is sent until [`connect`](Self::connect) and
    /// [`initialize`](Self::initialize).
    pub fn new(name: impl Into<String>, transport: impl Transport + 'static) -> Self {
        Self {
            name: name.into(),
            transport: Box::new(transport),
            next_id: AtomicU64::new(1),
            initialized: OnceCell::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn a stdio server, connect, and complete the handshake.
    pub async fn connect_stdio(name: String, config: &McpServerConfig) -> Result<Self, McpError> {
        let transport = StdioTransport::new(name.clone(), config);
        let client = Self::new(name, transport);
        client.connect().await?;
        if let Err(e) = client.initialize().await {
            client.shutdown().await;
            return Err(e);
        }
        Ok(client)
    }

    /// Establish the underlying channel. Idempotent.
    pub async fn connect(&self) -> Result<(), McpError> {
        self.transport.connect().await
    }

    /// Perform the initialize handshake. Only the first successful call talks
    /// to the server; later calls return the stored result.
    pub async fn initialize(&self) -> Result<&InitializeResult, McpError> {
        self.initialized.get_or_try_init(|| self.handshake()).await
    }

    async fn handshake(&self) -> Result<InitializeResult, McpError> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.request(Method::Initialize, Some(params)).await?;
        let info: InitializeResult = decode(Method::Initialize, result)?;

        self.transport
            .send_notification(JsonRpcNotification::new(
                Method::Initialized.as_str(),
                None,
            ))
            .await?;

        tracing::info!(
            server = %self.name,
            server_name = info.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
            protocol = %info.protocol_version,
            "MCP server initialized"
        );
        Ok(info)
    }

    /// List the tools the server exposes.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let result = self.initialized_request(Method::ToolsList, None).await?;
        Ok(decode_list::<ListToolsResult>(Method::ToolsList, result)?.tools)
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        self.call_tool_with_cancel(name, arguments, self.shutdown.child_token())
            .await
    }

    /// Call a tool, giving up when `cancel` fires. The server is not told.
    pub async fn call_tool_with_cancel(
        &self,
        name: &str,
        arguments: Value,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        self.ensure_initialized()?;
        let params = to_params(&CallToolParams { name, arguments })?;
        let result = self.request_with_cancel(Method::ToolsCall, params, cancel).await?;
        decode(Method::ToolsCall, result)
    }

    /// List the resources the server exposes.
    pub async fn list_resources(&self) -> Result<Vec<Resource>, McpError> {
        let result = self.initialized_request(Method::ResourcesList, None).await?;
        Ok(decode_list::<ListResourcesResult>(Method::ResourcesList, result)?.resources)
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let params = to_params(&ReadResourceParams { uri })?;
        let result = self.initialized_request(Method::ResourcesRead, params).await?;
        decode(Method::ResourcesRead, result)
    }

    /// List the prompts the server exposes.
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, McpError> {
        let result = self.initialized_request(Method::PromptsList, None).await?;
        Ok(decode_list::<ListPromptsResult>(Method::PromptsList, result)?.prompts)
    }

    /// Render a prompt with the given arguments.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        let params = to_params(&GetPromptParams { name, arguments })?;
        let result = self.initialized_request(Method::PromptsGet, params).await?;
        decode(Method::PromptsGet, result)
    }

    /// Observe every message the server sends.
    pub fn subscribe(&self) -> broadcast::Receiver<JsonRpcMessage> {
        self.transport.subscribe()
    }

    /// Get the server name.
    pub fn server_name(&self) -> &str {
        &self.name
    }

    /// What the server reported during the handshake, once it has completed.
    pub fn server_info(&self) -> Option<&Implementation> {
        self.initialized.get().and_then(|info| info.server_info.as_ref())
    }

    pub fn initialize_result(&self) -> Option<&InitializeResult> {
        self.initialized.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Abandon in-flight calls and close the transport. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Err(e) = self.transport.close().await {
            tracing::warn!(server = %self.name, "Failed to close MCP transport: {e}");
        }
    }

    fn ensure_initialized(&self) -> Result<(), McpError> {
        if self.initialized.initialized() {
            Ok(())
        } else {
            Err(McpError::NotInitialized {
                name: self.name.clone(),
            })
        }
    }

    async fn initialized_request(
        &self,
        method: Method,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        self.ensure_initialized()?;
        self.request(method, params).await
    }

    async fn request(&self, method: Method, params: Option<Value>) -> Result<Value, McpError> {
        self.request_with_cancel(method, params, self.shutdown.child_token())
            .await
    }

    /// Send one request with a fresh id and unwrap the peer's answer.
    async fn request_with_cancel(
        &self,
        method: Method,
        params: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let request = JsonRpcRequest::new(id, method.as_str(), params);
        let response = self.transport.send_request(request, cancel).await?;
        response
            .into_result()
            .map_err(|error| McpError::rpc(&self.name, error))
    }
}

fn to_params<T: Serialize>(params: &T) -> Result<Option<Value>, McpError> {
    Ok(Some(serde_json::to_value(params)?))
}

/// Decode a result that must be present and well formed.
fn decode<T: DeserializeOwned>(method: Method, result: Value) -> Result<T, McpError> {
    if result.is_null() {
        return Err(McpError::Protocol(format!("{method} returned no result")));
    }
    serde_json::from_value(result)
        .map_err(|e| McpError::Protocol(format!("Failed to parse {method} result: {e}")))
}

/// Decode a list result; a `null` result counts as an empty list.
fn decode_list<T: DeserializeOwned + Default>(method: Method, result: Value) -> Result<T, McpError> {
    if result.is_null() {
        return Ok(T::default());
    }
    decode(method, result)
}
