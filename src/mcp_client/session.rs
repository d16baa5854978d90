//! Tool session: the lifecycle of one connection to a remote tool server.
//!
//! ```text
//! Uninitialized ──initialize()──▶ Ready ──cleanup()──▶ Closed
//!        │                                               ▲
//!        └──────────── failed initialize / cleanup() ────┘
//! ```
//!
//! All state lives behind one `tokio::sync::Mutex`, so a transition and the
//! release of the connection happen together and `cleanup()` is idempotent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::Instrument;

use super::errors::McpError;
use super::transport::{connector_for, Connection, Connector};
use super::types::{
    parse_capability_page, Capability, CapabilityKind, InitializeResult, ServerConfig,
    ToolDescriptor, ToolResponse, PROTOCOL_VERSION,
};

/// Time allowed for connect + handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on pages followed for a single list call.
const MAX_LIST_PAGES: usize = 64;

// ─── Retry policy ────────────────────────────────────────────────────────────

/// Fixed-delay retry settings for tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts; values below 1 are treated as 1.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.retries.max(1)
    }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Ready,
    Closed,
}

enum SessionState {
    Uninitialized,
    /// Transport open, handshake not yet complete.
    Connected(Arc<dyn Connection>),
    Ready {
        connection: Arc<dyn Connection>,
        tools: Vec<ToolDescriptor>,
    },
    Closed,
}

// ─── ToolSession ─────────────────────────────────────────────────────────────

pub struct ToolSession {
    name: String,
    id: String,
    connector: Box<dyn Connector>,
    state: Mutex<SessionState>,
    init_timeout: Duration,
    span: tracing::Span,
}

impl std::fmt::Debug for ToolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSession")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ToolSession {
    /// Create an uninitialized session. The session's span is a child of
    /// `parent` carrying the server name and session id.
    pub fn new(name: &str, connector: Box<dyn Connector>, parent: &tracing::Span) -> Self {
        let id = session_id(name);
        let span = tracing::info_span!(parent: parent, "session", server = %name, session = %id);
        Self {
            name: name.to_string(),
            id,
            connector,
            state: Mutex::new(SessionState::Uninitialized),
            init_timeout: INIT_TIMEOUT,
            span,
        }
    }

    /// Override the bound on connect + handshake.
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Create a session for a configured server.
    pub fn from_config(config: &ServerConfig, parent: &tracing::Span) -> Self {
        Self::new(&config.name, connector_for(&config.transport), parent)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique identifier, `{name}-{8 hex chars}`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn state(&self) -> ConnectionState {
        match *self.state.lock().await {
            SessionState::Uninitialized | SessionState::Connected(_) => {
                ConnectionState::Uninitialized
            }
            SessionState::Ready { .. } => ConnectionState::Ready,
            SessionState::Closed => ConnectionState::Closed,
        }
    }

    // ─── Initialize ──────────────────────────────────────────────────────

    /// Open the transport and perform the handshake.
    ///
    /// A no-op when already Ready. On failure the session cleans itself up
    /// (ending Closed) and the error is returned.
    pub async fn initialize(&self) -> Result<(), McpError> {
        let result = async {
            let mut state = self.state.lock().await;
            match *state {
                SessionState::Ready { .. } => return Ok(()),
                SessionState::Closed => {
                    return Err(McpError::SessionClosed {
                        server: self.name.clone(),
                    })
                }
                SessionState::Uninitialized | SessionState::Connected(_) => {}
            }

            let connecting = async {
                let connection = self.connector.connect(&self.name).await?;
                *state = SessionState::Connected(connection.clone());
                self.handshake(connection.as_ref()).await?;
                Ok::<_, McpError>(connection)
            };
            let connection = match tokio::time::timeout(self.init_timeout, connecting).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(McpError::InitFailed {
                        name: self.name.clone(),
                        reason: format!(
                            "initialization timed out after {}ms",
                            self.init_timeout.as_millis()
                        ),
                    })
                }
            };

            *state = SessionState::Ready {
                connection,
                tools: Vec::new(),
            };
            tracing::info!("session ready");
            Ok::<(), McpError>(())
        }
        .instrument(self.span.clone())
        .await;

        if let Err(e) = &result {
            if !matches!(e, McpError::SessionClosed { .. }) {
                tracing::error!(parent: &self.span, error = %e, "initialization failed");
                self.cleanup().await;
            }
        }
        result
    }

    async fn handshake(&self, connection: &dyn Connection) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let result = connection.request("initialize", Some(params)).await?;
        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::InitFailed {
                name: self.name.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        let (server_name, server_version) = init
            .server_info
            .map(|info| (info.name, info.version))
            .unwrap_or((None, None));
        tracing::info!(
            protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
            server_name = server_name.as_deref().unwrap_or("unknown"),
            server_version = server_version.as_deref().unwrap_or("unknown"),
            capabilities = %init.capabilities,
            "handshake complete"
        );

        connection
            .notify("notifications/initialized", None)
            .await
    }

    // ─── Discovery ───────────────────────────────────────────────────────

    async fn ready_connection(&self) -> Result<Arc<dyn Connection>, McpError> {
        match &*self.state.lock().await {
            SessionState::Ready { connection, .. } => Ok(connection.clone()),
            SessionState::Closed => Err(McpError::SessionClosed {
                server: self.name.clone(),
            }),
            _ => Err(McpError::NotInitialized {
                server: self.name.clone(),
            }),
        }
    }

    /// List every entity of `kind`, following pagination cursors.
    ///
    /// Listing tools also refreshes the cache used by `provides_tool`.
    pub async fn list_capabilities(&self, kind: CapabilityKind) -> Result<Vec<Capability>, McpError> {
        let connection = self.ready_connection().await?;

        let capabilities = async {
            let mut all = Vec::new();
            let mut cursor: Option<String> = None;
            for _ in 0..MAX_LIST_PAGES {
                let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
                let result = connection.request(kind.method(), params).await?;
                let (page, next) = parse_capability_page(kind, result)?;
                all.extend(page);
                match next {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            tracing::debug!(kind = %kind, count = all.len(), "listed capabilities");
            Ok::<_, McpError>(all)
        }
        .instrument(self.span.clone())
        .await?;

        if kind == CapabilityKind::Tools {
            let tools: Vec<ToolDescriptor> = capabilities
                .iter()
                .filter_map(|c| match c {
                    Capability::Tool(t) => Some(t.clone()),
                    _ => None,
                })
                .collect();
            if let SessionState::Ready { tools: cache, .. } = &mut *self.state.lock().await {
                *cache = tools;
            }
        }

        Ok(capabilities)
    }

    /// List tools and refresh the cache.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let capabilities = self.list_capabilities(CapabilityKind::Tools).await?;
        Ok(capabilities
            .into_iter()
            .filter_map(|c| match c {
                Capability::Tool(t) => Some(t),
                _ => None,
            })
            .collect())
    }

    /// Tools seen by the last `list_tools` call.
    #[cfg(test)]
    pub async fn cached_tools(&self) -> Vec<ToolDescriptor> {
        match &*self.state.lock().await {
            SessionState::Ready { tools, .. } => tools.clone(),
            _ => Vec::new(),
        }
    }

    /// Whether the last tool listing contained `tool`.
    pub async fn provides_tool(&self, tool: &str) -> bool {
        match &*self.state.lock().await {
            SessionState::Ready { tools, .. } => tools.iter().any(|t| t.name == tool),
            _ => false,
        }
    }

    // ─── Invocation ──────────────────────────────────────────────────────

    /// Call a tool, retrying with a fixed delay.
    ///
    /// Each failed attempt is logged with its number; after the last attempt
    /// the last error is returned unchanged.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: Map<String, Value>,
        policy: RetryPolicy,
    ) -> Result<ToolResponse, McpError> {
        let connection = self.ready_connection().await?;
        let attempts = policy.attempts();

        async {
            let mut attempt = 0;
            loop {
                attempt += 1;
                tracing::info!(tool, attempt, attempts, "executing tool");

                match call_tool(connection.as_ref(), tool, &arguments).await {
                    Ok(raw) => {
                        let response = ToolResponse::from_raw(raw);
                        tracing::info!(tool, attempt, progress = response.is_progress, "tool succeeded");
                        return Ok(response);
                    }
                    Err(e) if attempt < attempts => {
                        tracing::warn!(tool, attempt, attempts, error = %e, "tool attempt failed, retrying");
                        tokio::time::sleep(policy.delay).await;
                    }
                    Err(e) => {
                        tracing::error!(tool, attempt, attempts, error = %e, "max retries reached");
                        return Err(e);
                    }
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    // ─── Cleanup ─────────────────────────────────────────────────────────

    /// Release the connection and move to Closed.
    ///
    /// Safe to call any number of times, concurrently or not; the connection
    /// is released once. Failures are logged, never returned.
    pub async fn cleanup(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, SessionState::Closed);

        let connection = match previous {
            SessionState::Ready { connection, .. } | SessionState::Connected(connection) => {
                connection
            }
            SessionState::Uninitialized => {
                tracing::debug!(parent: &self.span, "cleanup of never-initialized session");
                return;
            }
            SessionState::Closed => {
                tracing::debug!(parent: &self.span, "session already closed");
                return;
            }
        };

        match connection.close().instrument(self.span.clone()).await {
            Ok(()) => tracing::info!(parent: &self.span, "session closed"),
            Err(e) => tracing::error!(parent: &self.span, error = %e, "error during cleanup"),
        }
    }
}

/// One `tools/call` round trip. `isError: true` results become `ToolFailed`.
async fn call_tool(
    connection: &dyn Connection,
    tool: &str,
    arguments: &Map<String, Value>,
) -> Result<Value, McpError> {
    let params = json!({ "name": tool, "arguments": arguments });
    let result = connection.request("tools/call", Some(params)).await?;

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        let message = ToolResponse::from_raw(result).render_payload();
        return Err(McpError::ToolFailed {
            tool: tool.to_string(),
            message,
        });
    }
    Ok(result)
}

fn session_id(name: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{name}-{}", &uuid[..8])
}

// ─── Tests ───────────────────────────────────────────────────────────────────
