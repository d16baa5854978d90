//! ToolRouter — dispatches parsed tool calls to the session that owns them.
//!
//! Routing is first-match in configured order against each session's cached
//! tool list. A tool no session advertises is a `RoutingError`; calls are
//! never broadcast.

use crate::inference::types::Invocation;
use crate::mcp_client::{RetryPolicy, ToolResponse, ToolSession};

use super::errors::AgentError;

pub struct ToolRouter {
    policy: RetryPolicy,
}

impl ToolRouter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Pick the first session whose cache names `tool`.
    pub async fn route<'a>(
        &self,
        sessions: &'a [ToolSession],
        tool: &str,
    ) -> Result<&'a ToolSession, AgentError> {
        for session in sessions {
            if session.provides_tool(tool).await {
                return Ok(session);
            }
        }
        Err(AgentError::RoutingError {
            tool: tool.to_string(),
        })
    }

    /// Route and execute one invocation.
    pub async fn dispatch(
        &self,
        sessions: &[ToolSession],
        invocation: &Invocation,
    ) -> Result<ToolResponse, AgentError> {
        let session = self.route(sessions, &invocation.tool).await?;

        tracing::info!(
            tool = %invocation.tool,
            server = session.name(),
            "executing tool"
        );
        tracing::debug!(
            tool = %invocation.tool,
            arguments = %serde_json::Value::Object(invocation.arguments.clone()),
            "tool arguments"
        );

        session
            .invoke(&invocation.tool, invocation.arguments.clone(), self.policy)
            .await
            .map_err(|source| {
                tracing::error!(tool = %invocation.tool, error = %source, "tool execution error");
                AgentError::ToolExecutionError {
                    tool: invocation.tool.clone(),
                    source,
                }
            })
    }
}
