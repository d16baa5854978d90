//! Agent Core — orchestration layer for toolchat.
//!
//! Submodules:
//! - `conversation`: Ordered, append-only conversation history
//! - `prompt`: System prompt built from discovered tools
//! - `tool_router`: Dispatches parsed tool calls to the owning session
//! - `orchestrator`: Startup, turn cycle and shutdown
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod orchestrator;
pub mod prompt;
pub mod tool_router;

// Re-exports for convenience
pub use conversation::Conversation;
pub use errors::AgentError;
pub use orchestrator::{ChatIo, ChatSession, ChatSettings, TurnOutcome};
pub use tool_router::ToolRouter;
