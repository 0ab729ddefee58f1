//! Transport abstraction the MCP client is written against.

mod stdio;

pub use stdio::StdioTransport;

use crate::error::McpError;
use crate::jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// A boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, McpError>> + Send + 'a>>;

/// A bidirectional JSON-RPC channel to one MCP server.
///
/// Dyn-compatible so the client can hold a `Box<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Establish the channel. A no-op when already connected.
    fn connect(&self) -> TransportFuture<'_, ()>;

    /// Send a request and wait for the response with the same id.
    ///
    /// Resolves on the first of: matching response, timeout, `cancel` firing.
    /// The pending entry is gone by the time this returns, whatever the outcome.
    fn send_request(
        &self,
        request: JsonRpcRequest,
        cancel: CancellationToken,
    ) -> TransportFuture<'_, JsonRpcResponse>;

    /// Send a notification without waiting for anything.
    fn send_notification(&self, notification: JsonRpcNotification) -> TransportFuture<'_, ()>;

    /// Tear the channel down. Safe to call repeatedly.
    fn close(&self) -> TransportFuture<'_, ()>;

    /// Observe every inbound message, correlated or not.
    fn subscribe(&self) -> broadcast::Receiver<JsonRpcMessage>;

    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn transport_is_dyn_compatible() {
        fn _accept(_t: &dyn Transport) {}
    }

    #[test]
    fn arc_transport_is_send_sync() {
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Arc<dyn Transport>>();
        _assert_send_sync::<StdioTransport>();
    }
}
