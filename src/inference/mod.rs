//! Inference Client — OpenAI-compatible API client for LLM completions.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming chat completions (full reply text)
//! - Streaming chat completions (lazy sequence of text fragments)
//! - Tool call detection in free-form reply text
//!
//! The client speaks the OpenAI Chat Completions API, so any local runtime
//! (LM Studio, llama.cpp, Ollama) is interchangeable via config.

pub mod client;
pub mod errors;
pub mod streaming;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use client::{ChatModel, InferenceClient};
pub use errors::InferenceError;
pub use tool_call_parser::parse_tool_call;
pub use types::{ChatMessage, CompletionOptions, Invocation, Role};
