//! MCP Client — sessions with remote tool servers over JSON-RPC.
//!
//! This module handles:
//! - Opening connections over stdio (child process) or HTTP + SSE
//! - The initialize handshake and capability discovery
//! - Tool invocation with fixed-delay retries
//! - Idempotent session cleanup

pub mod errors;
pub mod session;
pub mod sse;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use errors::McpError;
pub use session::{ConnectionState, RetryPolicy, ToolSession};
pub use transport::{Connection, Connector};
pub use types::{
    Capability, CapabilityKind, ServerConfig, ToolDescriptor, ToolResponse, TransportConfig,
};
