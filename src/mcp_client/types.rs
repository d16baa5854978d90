//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, MCP capability descriptors, server
//! configuration and the classified result of a tool invocation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::McpError;

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// Protocol revision announced in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ─── Capabilities ────────────────────────────────────────────────────────────

/// The four kinds of entity an MCP server can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Tools,
    Resources,
    ResourceTemplates,
    Prompts,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::Tools,
        CapabilityKind::Resources,
        CapabilityKind::ResourceTemplates,
        CapabilityKind::Prompts,
    ];

    /// JSON-RPC method that lists this kind.
    pub fn method(self) -> &'static str {
        match self {
            CapabilityKind::Tools => "tools/list",
            CapabilityKind::Resources => "resources/list",
            CapabilityKind::ResourceTemplates => "resources/templates/list",
            CapabilityKind::Prompts => "prompts/list",
        }
    }

    /// Key of the entity array in the list response.
    pub fn response_key(self) -> &'static str {
        match self {
            CapabilityKind::Tools => "tools",
            CapabilityKind::Resources => "resources",
            CapabilityKind::ResourceTemplates => "resourceTemplates",
            CapabilityKind::Prompts => "prompts",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CapabilityKind::Tools => "tool",
            CapabilityKind::Resources => "resource",
            CapabilityKind::ResourceTemplates => "resource template",
            CapabilityKind::Prompts => "prompt",
        };
        f.write_str(label)
    }
}

/// A tool advertised by a server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub input_schema: Value,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub annotations: Option<Value>,
    #[serde(default)]
    pub icons: Option<Value>,
    #[serde(default, rename = "_meta")]
    pub meta: Option<Value>,
}

/// One entry of a tool's parameter schema, as shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ToolDescriptor {
    /// Flatten `inputSchema.properties` + `inputSchema.required` into a
    /// parameter list.
    pub fn parameters(&self) -> Vec<ParameterDescriptor> {
        let required: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let Some(properties) = self.input_schema.get("properties").and_then(Value::as_object)
        else {
            return Vec::new();
        };

        properties
            .iter()
            .map(|(name, info)| ParameterDescriptor {
                name: name.clone(),
                description: info
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("No description")
                    .to_string(),
                required: required.contains(&name.as_str()),
            })
            .collect()
    }
}

/// A concrete resource advertised by a server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub annotations: Option<Value>,
    #[serde(default)]
    pub icons: Option<Value>,
    #[serde(default, rename = "_meta")]
    pub meta: Option<Value>,
}

/// A parameterized resource (`users://{user_id}/profile`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ResourceTemplateDescriptor {
    pub uri_template: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub annotations: Option<Value>,
    #[serde(default)]
    pub icons: Option<Value>,
    #[serde(default, rename = "_meta")]
    pub meta: Option<Value>,
}

/// A prompt template advertised by a server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PromptDescriptor {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
    #[serde(default)]
    pub icons: Option<Value>,
    #[serde(default, rename = "_meta")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
}

/// Any capability entity, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    Tool(ToolDescriptor),
    Resource(ResourceDescriptor),
    ResourceTemplate(ResourceTemplateDescriptor),
    Prompt(PromptDescriptor),
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::Tool(_) => CapabilityKind::Tools,
            Capability::Resource(_) => CapabilityKind::Resources,
            Capability::ResourceTemplate(_) => CapabilityKind::ResourceTemplates,
            Capability::Prompt(_) => CapabilityKind::Prompts,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Capability::Tool(t) => &t.name,
            Capability::Resource(r) => &r.name,
            Capability::ResourceTemplate(r) => &r.name,
            Capability::Prompt(p) => &p.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Capability::Tool(t) => t.description.as_deref(),
            Capability::Resource(r) => r.description.as_deref(),
            Capability::ResourceTemplate(r) => r.description.as_deref(),
            Capability::Prompt(p) => p.description.as_deref(),
        }
    }
}

/// Build typed capabilities from one entry of a list response.
pub fn parse_capability(kind: CapabilityKind, entry: Value) -> Result<Capability, McpError> {
    let invalid = |e: serde_json::Error| McpError::InvalidDescriptor {
        kind,
        reason: e.to_string(),
    };

    Ok(match kind {
        CapabilityKind::Tools => Capability::Tool(serde_json::from_value(entry).map_err(invalid)?),
        CapabilityKind::Resources => {
            Capability::Resource(serde_json::from_value(entry).map_err(invalid)?)
        }
        CapabilityKind::ResourceTemplates => {
            Capability::ResourceTemplate(serde_json::from_value(entry).map_err(invalid)?)
        }
        CapabilityKind::Prompts => {
            Capability::Prompt(serde_json::from_value(entry).map_err(invalid)?)
        }
    })
}

/// Parse one page of a list response.
///
/// Returns the capabilities and the `nextCursor`, if the server paginates.
pub fn parse_capability_page(
    kind: CapabilityKind,
    mut result: Value,
) -> Result<(Vec<Capability>, Option<String>), McpError> {
    let next_cursor = result
        .get("nextCursor")
        .and_then(Value::as_str)
        .map(String::from);

    let entries = match result.get_mut(kind.response_key()).map(Value::take) {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(McpError::InvalidDescriptor {
                kind,
                reason: format!("'{}' is not an array: {other}", kind.response_key()),
            })
        }
        None => {
            return Err(McpError::InvalidDescriptor {
                kind,
                reason: format!("response has no '{}' field", kind.response_key()),
            })
        }
    };

    let capabilities = entries
        .into_iter()
        .map(|entry| parse_capability(kind, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((capabilities, next_cursor))
}

// ─── Tool results ────────────────────────────────────────────────────────────

/// A tool result, classified for the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    /// The raw result as returned by the server.
    pub content: Value,
    pub is_progress: bool,
    pub progress: Option<f64>,
    pub total: Option<f64>,
}

impl ToolResponse {
    /// Classify a raw result. A mapping with a `progress` key is a progress
    /// report; its `total` defaults to 1.
    pub fn from_raw(raw: Value) -> Self {
        match raw.as_object() {
            Some(map) if map.contains_key("progress") => {
                let progress = map.get("progress").and_then(Value::as_f64);
                let total = map.get("total").and_then(Value::as_f64).unwrap_or(1.0);
                Self {
                    content: raw,
                    is_progress: true,
                    progress,
                    total: Some(total),
                }
            }
            _ => Self {
                content: raw,
                is_progress: false,
                progress: None,
                total: None,
            },
        }
    }

    /// `Progress: 3/10 (30.0%)`, for progress-style results.
    pub fn progress_message(&self) -> Option<String> {
        if !self.is_progress {
            return None;
        }
        let progress = self.progress?;
        let total = self.total.unwrap_or(1.0);
        if total == 0.0 {
            return Some(format!("Progress: {progress}/{total}"));
        }
        Some(format!(
            "Progress: {progress}/{total} ({:.1}%)",
            progress / total * 100.0
        ))
    }

    /// Stringify the payload for the model.
    ///
    /// MCP `content` arrays made of text blocks are joined; plain strings are
    /// used as-is; anything else is rendered as compact JSON.
    pub fn render_payload(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("content").and_then(Value::as_array) {
                Some(blocks) => {
                    let texts: Vec<&str> = blocks
                        .iter()
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .collect();
                    if texts.len() == blocks.len() && !texts.is_empty() {
                        texts.join("\n")
                    } else {
                        self.content.to_string()
                    }
                }
                None => self.content.to_string(),
            },
            other => other.to_string(),
        }
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// One configured remote tool server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

/// How to reach a server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Spawn a child process and speak line-delimited JSON-RPC over stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        /// Working directory for the child process.
        #[serde(default)]
        cwd: Option<String>,
    },
    /// Connect to an HTTP server-sent-events endpoint.
    Sse { url: String },
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let v = serde_json::to_value(&note).unwrap();
        assert!(v.get("id").is_none());
        assert_eq!(v["method"], "notifications/initialized");
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "result": null,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = extract_result(resp).unwrap_err();
        match err {
            McpError::ServerError { code, message, .. } => {
                assert_eq!(code, error_codes::METHOD_NOT_FOUND);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_result_missing_both() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
        assert!(matches!(
            extract_result(resp),
            Err(McpError::ServerError { code: error_codes::INTERNAL_ERROR, .. })
        ));
    }

    #[test]
    fn test_tool_descriptor_parameters() {
        let tool: ToolDescriptor = serde_json::from_value(json!({
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "a": {"type": "integer", "description": "first"},
                    "b": {"type": "integer"}
                },
                "required": ["a"]
            }
        }))
        .unwrap();

        let params = tool.parameters();
        assert_eq!(params.len(), 2);
        let a = params.iter().find(|p| p.name == "a").unwrap();
        let b = params.iter().find(|p| p.name == "b").unwrap();
        assert!(a.required);
        assert_eq!(a.description, "first");
        assert!(!b.required);
        assert_eq!(b.description, "No description");
    }

    #[test]
    fn test_tool_descriptor_rejects_unknown_field() {
        let err = parse_capability(
            CapabilityKind::Tools,
            json!({"name": "add", "inputSchema": {}, "colour": "blue"}),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            McpError::InvalidDescriptor { kind: CapabilityKind::Tools, .. }
        ));
    }

    #[test]
    fn test_tool_descriptor_rejects_missing_name() {
        let err = parse_capability(CapabilityKind::Tools, json!({"inputSchema": {}})).unwrap_err();
        assert!(matches!(err, McpError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_parse_capability_page_resource_templates() {
        let result = json!({
            "resourceTemplates": [
                {"uriTemplate": "greeting://{name}", "name": "get_greeting",
                 "description": "Get a personalized greeting", "mimeType": "text/plain"}
            ],
            "nextCursor": "page-2"
        });
        let (caps, cursor) = parse_capability_page(CapabilityKind::ResourceTemplates, result).unwrap();
        assert_eq!(cursor.as_deref(), Some("page-2"));
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].kind(), CapabilityKind::ResourceTemplates);
        assert_eq!(caps[0].name(), "get_greeting");
    }

    #[test]
    fn test_parse_capability_page_missing_key() {
        let err = parse_capability_page(CapabilityKind::Prompts, json!({"tools": []})).unwrap_err();
        assert!(matches!(err, McpError::InvalidDescriptor { kind: CapabilityKind::Prompts, .. }));
    }

    #[test]
    fn test_progress_classification_with_total() {
        let resp = ToolResponse::from_raw(json!({"progress": 3, "total": 10}));
        assert!(resp.is_progress);
        assert_eq!(resp.progress, Some(3.0));
        assert_eq!(resp.total, Some(10.0));
        assert_eq!(resp.progress_message().as_deref(), Some("Progress: 3/10 (30.0%)"));
    }

    #[test]
    fn test_progress_classification_default_total() {
        let resp = ToolResponse::from_raw(json!({"progress": 3}));
        assert!(resp.is_progress);
        assert_eq!(resp.progress, Some(3.0));
        assert_eq!(resp.total, Some(1.0));
    }

    #[test]
    fn test_plain_result_is_not_progress() {
        let resp = ToolResponse::from_raw(json!(5));
        assert!(!resp.is_progress);
        assert!(resp.progress_message().is_none());
        assert_eq!(resp.render_payload(), "5");
    }

    #[test]
    fn test_render_payload_text_blocks() {
        let resp = ToolResponse::from_raw(json!({
            "content": [{"type": "text", "text": "5"}],
            "isError": false
        }));
        assert_eq!(resp.render_payload(), "5");
    }

    #[test]
    fn test_render_payload_mixed_blocks_falls_back_to_json() {
        let resp = ToolResponse::from_raw(json!({
            "content": [{"type": "image", "data": "..."}]
        }));
        assert!(resp.render_payload().starts_with('{'));
    }

    #[test]
    fn test_server_config_transports() {
        let yaml = r#"
- name: Demo
  transport: sse
  url: http://localhost:8000/sse
- name: files
  transport: stdio
  command: npx
  args: ["-y", "server-filesystem"]
"#;
        let servers: Vec<ServerConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(servers[0].name, "Demo");
        assert_eq!(
            servers[0].transport,
            TransportConfig::Sse {
                url: "http://localhost:8000/sse".into()
            }
        );
        match &servers[1].transport {
            TransportConfig::Stdio { command, args, env, cwd } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 2);
                assert!(env.is_empty());
                assert!(cwd.is_none());
            }
            other => panic!("expected stdio, got {other:?}"),
        }
    }
}
