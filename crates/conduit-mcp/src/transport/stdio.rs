//! Stdio transport for MCP server communication.
//!
//! Spawns a child process and manages async communication over stdin/stdout
//! using newline-delimited JSON-RPC messages. Stderr is drained into the log.

use super::{Transport, TransportFuture};
use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::jsonrpc::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    ResponsePayload,
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the inbound observation channel.
const EVENT_CAPACITY: usize = 256;

/// How long a child gets to exit on its own after stdin closes.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on waiting for a killed child to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Upper bound on joining a background loop at shutdown.
const TASK_JOIN: Duration = Duration::from_secs(1);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Default)]
struct PendingTable {
    open: bool,
    entries: HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>,
}

enum RegisterError {
    Closed,
    Duplicate,
}

/// Correlation table of in-flight requests.
///
/// An entry is completed by whoever removes it first; the sender is consumed
/// on removal, so no entry can be completed twice.
#[derive(Clone, Default)]
struct Pending(Arc<std::sync::Mutex<PendingTable>>);

impl Pending {
    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) {
        self.lock().open = true;
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn register(&self, id: &RequestId) -> Result<oneshot::Receiver<JsonRpcResponse>, RegisterError> {
        let mut table = self.lock();
        if !table.open {
            return Err(RegisterError::Closed);
        }
        if table.entries.contains_key(id) {
            return Err(RegisterError::Duplicate);
        }
        let (tx, rx) = oneshot::channel();
        table.entries.insert(id.clone(), tx);
        Ok(rx)
    }

    /// Hand a response to its waiter. Returns false if nobody was waiting.
    fn complete(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = &response.id else {
            return false;
        };
        let sender = self.lock().entries.remove(id);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    fn remove(&self, id: &RequestId) {
        self.lock().entries.remove(id);
    }

    /// Refuse new entries and drop every waiter. Returns how many were waiting.
    fn close(&self) -> usize {
        let mut table = self.lock();
        table.open = false;
        let abandoned = table.entries.len();
        table.entries.clear();
        abandoned
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

/// Removes a pending entry when the waiting future finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// A running connection: the child (if we spawned one) and its loops.
struct Session {
    child: Option<Child>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Async stdio transport for communicating with an MCP server process.
pub struct StdioTransport {
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    request_timeout: Duration,
    writer: Mutex<Option<BoxedWriter>>,
    pending: Pending,
    events: broadcast::Sender<JsonRpcMessage>,
    session: Mutex<Option<Session>>,
}

impl StdioTransport {
    /// Describe a server process. Nothing is spawned until [`Transport::connect`].
    pub fn new(name: impl Into<String>, config: &McpServerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.into(),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            cwd: config.cwd.clone(),
            request_timeout: Duration::from_millis(config.timeout_ms),
            writer: Mutex::new(None),
            pending: Pending::default(),
            events,
            session: Mutex::new(None),
        }
    }

    /// Run the transport over already-open streams instead of a child process.
    ///
    /// The inbound loop is spawned immediately, so this must be called from
    /// within a Tokio runtime.
    pub fn from_streams<R, W>(
        name: impl Into<String>,
        reader: R,
        writer: W,
        request_timeout: Duration,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let config = McpServerConfig {
            timeout_ms: request_timeout.as_millis() as u64,
            ..McpServerConfig::default()
        };
        let mut transport = Self::new(name, &config);
        transport.request_timeout = request_timeout;

        let shutdown = CancellationToken::new();
        let reader_task = transport.attach(reader, shutdown.clone());
        transport.writer = Mutex::new(Some(Box::new(writer)));
        transport.session = Mutex::new(Some(Session {
            child: None,
            shutdown,
            tasks: vec![reader_task],
        }));
        transport
    }

    /// Server name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Open the pending table and start the protocol read loop.
    fn attach<R>(&self, reader: R, shutdown: CancellationToken) -> JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.pending.open();
        tokio::spawn(read_loop(
            self.name.clone(),
            reader,
            self.pending.clone(),
            self.events.clone(),
            shutdown,
        ))
    }

    async fn spawn_session(&self) -> Result<Session, McpError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: self.name.clone(),
            source: e,
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(McpError::Protocol(format!(
                "MCP server '{}' started without piped stdio",
                self.name
            )));
        };

        let shutdown = CancellationToken::new();
        let reader_task = self.attach(stdout, shutdown.clone());
        let stderr_task = tokio::spawn(stderr_loop(self.name.clone(), stderr, shutdown.clone()));
        *self.writer.lock().await = Some(Box::new(stdin));

        tracing::info!(
            server = %self.name,
            command = %self.command,
            pid = ?child.id(),
            "MCP server process started"
        );

        Ok(Session {
            child: Some(child),
            shutdown,
            tasks: vec![reader_task, stderr_task],
        })
    }

    /// Stop the loops, then the child, then join the loops.
    async fn teardown(&self, mut session: Session) {
        session.shutdown.cancel();
        if let Some(mut child) = session.child.take() {
            stop_child(&self.name, &mut child).await;
        }
        for task in session.tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(TASK_JOIN, task).await.is_err() {
                tracing::warn!(server = %self.name, "MCP background task did not stop; aborting");
                abort.abort();
            }
        }
    }

    /// Write one message as a single line, holding the writer lock throughout.
    async fn write_message<T: Serialize>(&self, message: &T) -> Result<(), McpError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or_else(|| McpError::NotConnected {
            name: self.name.clone(),
        })?;
        writer
            .write_all(&line)
            .await
            .map_err(|source| McpError::Write {
                name: self.name.clone(),
                source,
            })?;
        writer.flush().await.map_err(|source| McpError::Write {
            name: self.name.clone(),
            source,
        })
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Transport for StdioTransport {
    fn connect(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let mut session = self.session.lock().await;
            if session.is_some() && self.pending.is_open() {
                return Ok(());
            }
            // A previous child exited on its own; clean it up before respawning.
            if let Some(dead) = session.take() {
                self.writer.lock().await.take();
                self.teardown(dead).await;
            }
            *session = Some(self.spawn_session().await?);
            Ok(())
        })
    }

    fn send_request(
        &self,
        request: JsonRpcRequest,
        cancel: CancellationToken,
    ) -> TransportFuture<'_, JsonRpcResponse> {
        Box::pin(async move {
            let id = request.id.clone();
            let rx = self.pending.register(&id).map_err(|e| match e {
                RegisterError::Closed => McpError::NotConnected {
                    name: self.name.clone(),
                },
                RegisterError::Duplicate => {
                    McpError::Protocol(format!("request id {id} is already pending"))
                }
            })?;
            let _guard = PendingGuard {
                pending: &self.pending,
                id: id.clone(),
            };

            self.write_message(&request).await?;

            tokio::select! {
                biased;
                response = rx => response.map_err(|_| McpError::ConnectionClosed {
                    name: self.name.clone(),
                }),
                _ = cancel.cancelled() => Err(McpError::Cancelled {
                    name: self.name.clone(),
                    method: request.method.clone(),
                }),
                _ = tokio::time::sleep(self.request_timeout) => Err(McpError::Timeout {
                    name: self.name.clone(),
                    method: request.method.clone(),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                }),
            }
        })
    }

    fn send_notification(&self, notification: JsonRpcNotification) -> TransportFuture<'_, ()> {
        Box::pin(async move { self.write_message(&notification).await })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let session = self.session.lock().await.take();
            // Dropping stdin gives the child EOF, its cue to exit.
            self.writer.lock().await.take();
            if let Some(session) = session {
                self.teardown(session).await;
                tracing::info!(server = %self.name, "MCP transport closed");
            }
            self.pending.close();
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<JsonRpcMessage> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.pending.is_open()
    }
}

/// Consume protocol traffic until EOF, a read error, or shutdown.
async fn read_loop<R>(
    name: String,
    reader: R,
    pending: Pending,
    events: broadcast::Sender<JsonRpcMessage>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_until(b'\n', &mut line) => read,
        };
        match read {
            Ok(0) => {
                tracing::debug!(server = %name, "MCP server closed stdout");
                break;
            }
            Ok(_) => dispatch(&name, &line, &pending, &events),
            Err(e) => {
                tracing::warn!(server = %name, "Failed to read from MCP server: {e}");
                break;
            }
        }
    }

    let abandoned = pending.close();
    if abandoned > 0 {
        tracing::warn!(
            server = %name,
            abandoned,
            "MCP connection ended with requests in flight"
        );
    }
}

fn dispatch(
    name: &str,
    line: &[u8],
    pending: &Pending,
    events: &broadcast::Sender<JsonRpcMessage>,
) {
    let line = line.trim_ascii();
    if line.is_empty() {
        return;
    }
    let message = match JsonRpcMessage::parse(line) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(
                server = %name,
                "Skipping malformed MCP message: {e}: {}",
                String::from_utf8_lossy(line)
            );
            return;
        }
    };

    if events.receiver_count() > 0 {
        let _ = events.send(message.clone());
    }

    match message {
        JsonRpcMessage::Response(response) => match response.id.clone() {
            Some(id) => {
                if !pending.complete(response) {
                    tracing::debug!(server = %name, %id, "Dropping response with no waiting request");
                }
            }
            None => match &response.payload {
                ResponsePayload::Error(error) => tracing::warn!(
                    server = %name,
                    code = error.code,
                    "MCP server reported an error without a request id: {}",
                    error.message
                ),
                ResponsePayload::Result(_) => {
                    tracing::debug!(server = %name, "Dropping result with a null id");
                }
            },
        },
        JsonRpcMessage::Notification(notification) => {
            tracing::debug!(server = %name, method = %notification.method, "MCP notification");
        }
        JsonRpcMessage::Request(request) => {
            tracing::debug!(
                server = %name,
                id = %request.id,
                method = %request.method,
                "Ignoring server-initiated request"
            );
        }
    }
}

/// Forward the child's stderr to the log, line by line.
async fn stderr_loop<R>(name: String, stderr: R, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_until(b'\n', &mut line) => read,
        };
        match read {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                if !text.is_empty() {
                    tracing::debug!(target: "conduit_mcp::stderr", server = %name, "{text}");
                }
            }
        }
    }
}

/// Give the child a moment to exit after EOF, then kill it and reap it.
async fn stop_child(name: &str, child: &mut Child) {
    match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(server = %name, %status, "MCP server exited");
            return;
        }
        Ok(Err(e)) => tracing::warn!(server = %name, "Failed to wait for MCP server: {e}"),
        Err(_) => {}
    }

    if let Err(e) = child.start_kill() {
        tracing::warn!(server = %name, "Failed to kill MCP server: {e}");
    }
    match tokio::time::timeout(KILL_WAIT, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(server = %name, %status, "MCP server killed"),
        Ok(Err(e)) => tracing::warn!(server = %name, "Failed to reap MCP server: {e}"),
        Err(_) => tracing::warn!(server = %name, "MCP server did not exit after kill"),
    }
}
