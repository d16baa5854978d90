//! MCP Client error types.

use thiserror::Error;

use super::types::CapabilityKind;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed {
        name: String,
        reason: String,
    },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed {
        name: String,
        reason: String,
    },

    /// The connection could not be opened, or broke (I/O error, HTTP failure,
    /// closed stream).
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// A message from the server did not have the expected shape.
    #[error("protocol error for server '{server}': {reason}")]
    ProtocolError {
        server: String,
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Operation requires a Ready session.
    #[error("server '{server}' not initialized")]
    NotInitialized {
        server: String,
    },

    /// The session was closed and cannot be reused.
    #[error("server '{server}' session is closed")]
    SessionClosed {
        server: String,
    },

    /// A capability entry was missing a required field or carried an unknown one.
    #[error("invalid {kind} descriptor: {reason}")]
    InvalidDescriptor {
        kind: CapabilityKind,
        reason: String,
    },

    /// The tool ran but reported failure (`isError: true`).
    #[error("tool '{tool}' failed: {message}")]
    ToolFailed {
        tool: String,
        message: String,
    },
}
