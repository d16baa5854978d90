//! In-memory server for session and orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::errors::McpError;
use super::transport::{Connection, Connector};
use super::types::error_codes;

#[derive(Default)]
struct Inner {
    tools: Vec<String>,
    scripted_calls: VecDeque<Result<Value, String>>,
    calls: HashMap<String, usize>,
    call_log: Vec<Value>,
    notifications: Vec<String>,
    closes: usize,
    fail_close: bool,
    fail_initialize: bool,
    refuse_connections: bool,
    hang_connections: bool,
    fail_list_tools: bool,
}

/// A scripted MCP server shared by every connection made to it.
#[derive(Clone, Default)]
pub struct FakeServer {
    inner: Arc<Mutex<Inner>>,
}

impl FakeServer {
    pub fn with_tools(tools: &[&str]) -> Self {
        let server = Self::default();
        server.lock().tools = tools.iter().map(|t| t.to_string()).collect();
        server
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Queue the outcome of the next `tools/call`. `Err` becomes a
    /// transport error with that reason.
    pub fn script_call(&self, outcome: Result<Value, String>) {
        self.lock().scripted_calls.push_back(outcome);
    }

    pub fn fail_close(&self) {
        self.lock().fail_close = true;
    }

    pub fn fail_initialize(&self) {
        self.lock().fail_initialize = true;
    }

    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    /// `connect` never completes.
    pub fn hang_connections(&self) {
        self.lock().hang_connections = true;
    }

    pub fn fail_list_tools(&self) {
        self.lock().fail_list_tools = true;
    }

    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// `params` of every `tools/call` received.
    pub fn call_log(&self) -> Vec<Value> {
        self.lock().call_log.clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.lock().notifications.clone()
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }
}

pub struct FakeConnector {
    server: FakeServer,
}

impl FakeConnector {
    pub fn new(server: FakeServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, server_name: &str) -> Result<Arc<dyn Connection>, McpError> {
        let hang = self.server.lock().hang_connections;
        if hang {
            std::future::pending::<()>().await;
        }
        if self.server.lock().refuse_connections {
            return Err(McpError::TransportError {
                server: server_name.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(Arc::new(FakeConnection {
            name: server_name.to_string(),
            server: self.server.clone(),
        }))
    }
}

struct FakeConnection {
    name: String,
    server: FakeServer,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let mut inner = self.server.lock();
        *inner.calls.entry(method.to_string()).or_default() += 1;

        match method {
            "initialize" if inner.fail_initialize => Err(McpError::ServerError {
                code: error_codes::INTERNAL_ERROR,
                message: "initialize exploded".into(),
                data: None,
            }),
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake", "version": "0.0.1"}
            })),
            "tools/list" if inner.fail_list_tools => Err(McpError::ServerError {
                code: error_codes::INTERNAL_ERROR,
                message: "tools/list exploded".into(),
                data: None,
            }),
            "tools/list" => {
                let tools: Vec<Value> = inner
                    .tools
                    .iter()
                    .map(|name| {
                        json!({
                            "name": name,
                            "description": format!("The {name} tool"),
                            "inputSchema": {
                                "type": "object",
                                "properties": {
                                    "a": {"type": "integer"},
                                    "b": {"type": "integer"}
                                },
                                "required": ["a", "b"]
                            }
                        })
                    })
                    .collect();
                Ok(json!({ "tools": tools }))
            }
            "resources/list" => Ok(json!({
                "resources": [{"uri": "config://app", "name": "get_config", "mimeType": "text/plain"}]
            })),
            "resources/templates/list" => Ok(json!({
                "resourceTemplates": [{"uriTemplate": "greeting://{name}", "name": "get_greeting"}]
            })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "tools/call" => {
                inner.call_log.push(params.unwrap_or(Value::Null));
                match inner.scripted_calls.pop_front() {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(reason)) => Err(McpError::TransportError {
                        server: self.name.clone(),
                        reason,
                    }),
                    None => Ok(json!({"content": [{"type": "text", "text": "ok"}], "isError": false})),
                }
            }
            other => Err(McpError::ServerError {
                code: error_codes::METHOD_NOT_FOUND,
                message: format!("Method not found: {other}"),
                data: None,
            }),
        }
    }

    async fn notify(&self, method: &str, _params: Option<Value>) -> Result<(), McpError> {
        self.server.lock().notifications.push(method.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        let mut inner = self.server.lock();
        inner.closes += 1;
        if inner.fail_close {
            return Err(McpError::TransportError {
                server: self.name.clone(),
                reason: "close failed".into(),
            });
        }
        Ok(())
    }
}
