//! Session transports.
//!
//! A `Connector` opens a `Connection`; a `Connection` carries JSON-RPC
//! requests and notifications and can be closed. Two implementations:
//! - stdio: a spawned child process, one JSON object per line
//! - SSE: an HTTP event stream plus a POST endpoint (see `sse.rs`)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::sse::SseConnector;
use super::types::{
    extract_result, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, TransportConfig,
};

/// Time allowed for a child to exit after its stdin is closed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// An open JSON-RPC channel to one server.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send a request and wait for its result (JSON-RPC errors become
    /// `McpError::ServerError`).
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a notification; no response is expected.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// Release the underlying resources.
    async fn close(&self) -> Result<(), McpError>;
}

/// Opens connections to one configured server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, server_name: &str) -> Result<Arc<dyn Connection>, McpError>;
}

/// Pick the connector for a transport config.
pub fn connector_for(config: &TransportConfig) -> Box<dyn Connector> {
    match config {
        TransportConfig::Stdio {
            command,
            args,
            env,
            cwd,
        } => Box::new(StdioConnector {
            command: command.clone(),
            args: args.clone(),
            env: env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            cwd: cwd.clone(),
        }),
        TransportConfig::Sse { url } => Box::new(SseConnector::new(url)),
    }
}

// ─── Stdio ───────────────────────────────────────────────────────────────────

/// Spawns the server as a child process.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<String>,
}

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(&self, server_name: &str) -> Result<Arc<dyn Connection>, McpError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: server_name.to_string(),
            reason: format!("{}: {e}", self.command),
        })?;

        let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
            name: server_name.to_string(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
            name: server_name.to_string(),
            reason: "failed to capture stdout".into(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(server_name.to_string(), stderr));
        }

        tracing::info!(
            server = server_name,
            command = %self.command,
            pid = child.id(),
            "spawned server process"
        );

        Ok(Arc::new(StdioTransport::new(server_name, child, stdin, stdout)))
    }
}

/// Relay a child's stderr into the log, one line per event.
async fn forward_stderr(server: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(server = %server, line = %line, "server stderr");
    }
}

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    child: Mutex<Option<Child>>,
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    pub fn new(server_name: &str, child: Child, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server_name: server_name.to_string(),
            child: Mutex::new(Some(child)),
            writer: Mutex::new(Some(stdin)),
            reader: Mutex::new(BufReader::new(stdout)),
        }
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }

    /// Write one line of JSON to the child's stdin.
    async fn write_line(&self, message: &impl serde::Serialize) -> Result<(), McpError> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| self.transport_error(format!("failed to serialize message: {e}")))?;
        json.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| self.transport_error("stdin already closed".into()))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))
    }

    /// Read lines until the response with `id` arrives.
    async fn read_response(&self, id: u64) -> Result<JsonRpcResponse, McpError> {
        let mut line_buf = String::new();
        let mut reader = self.reader.lock().await;

        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_error(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            match decode_response_line(&line_buf) {
                Some(resp) if resp.id == id => return Ok(resp),
                // Notifications, log output and stale responses.
                _ => continue,
            }
        }
    }
}

/// Decode one stdout line as a JSON-RPC response, or `None` if it is not one.
pub fn decode_response_line(line: &str) -> Option<JsonRpcResponse> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[async_trait]
impl Connection for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = next_request_id();
        self.write_line(&JsonRpcRequest::new(id, method, params))
            .await?;
        let response = self.read_response(id).await?;
        extract_result(response)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.write_line(&JsonRpcNotification::new(method, params))
            .await
    }

    async fn close(&self) -> Result<(), McpError> {
        // Dropping stdin signals EOF; well-behaved servers exit on it.
        drop(self.writer.lock().await.take());

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.server_name, %status, "server exited");
                Ok(())
            }
            _ => {
                tracing::warn!(
                    server = %self.server_name,
                    timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                    "server did not exit, killing"
                );
                child
                    .kill()
                    .await
                    .map_err(|e| self.transport_error(format!("failed to kill process: {e}")))
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
