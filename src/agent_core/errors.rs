//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Errors that can occur while driving a conversation.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A session failed to initialize; all sessions have been cleaned up.
    #[error("failed to start session '{server}': {source}")]
    StartupError {
        server: String,
        source: McpError,
    },

    /// No Ready session advertises the requested tool.
    #[error("no available session provides tool '{tool}'")]
    RoutingError { tool: String },

    /// The model's reply named a tool but its fields were malformed.
    #[error("malformed tool call: {source}")]
    ParseError { source: InferenceError },

    /// The tool call failed after all retry attempts.
    #[error("tool '{tool}' failed: {source}")]
    ToolExecutionError {
        tool: String,
        source: McpError,
    },

    /// The completion endpoint could not produce a reply.
    #[error("model request failed: {source}")]
    ModelError { source: InferenceError },
}

impl From<InferenceError> for AgentError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::ToolCallParseError { .. } => AgentError::ParseError { source: e },
            other => AgentError::ModelError { source: other },
        }
    }
}
