//! ChatSession — the read / think / act / respond loop.
//!
//! ```text
//! user ─▶ model ─▶ tool call parser ─┬─ no call ─▶ assistant turn
//!                                    └─ call ─▶ router ─▶ session ─▶ model ─▶ assistant turn
//! ```
//!
//! Per-cycle failures are recorded in the conversation as a system turn and
//! the loop continues. Startup failures are fatal. Sessions are always
//! cleaned up on the way out.

use async_trait::async_trait;

use crate::inference::types::{ChatMessage, CompletionOptions};
use crate::inference::{parse_tool_call, ChatModel};
use crate::mcp_client::{CapabilityKind, RetryPolicy, ToolDescriptor, ToolSession};

use super::conversation::Conversation;
use super::errors::AgentError;
use super::prompt::{build_system_prompt, DEFAULT_SYSTEM_PROMPT};
use super::tool_router::ToolRouter;

/// Inputs that end the loop (case-insensitive).
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "stop"];

// ─── Settings ────────────────────────────────────────────────────────────────

/// Knobs for one chat session.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Options for the answer request (and every request without a tool turn).
    pub options: CompletionOptions,
    /// Temperature of the first request in each cycle, where the model
    /// decides whether to call a tool.
    pub tool_temperature: f32,
    pub retry: RetryPolicy,
    /// Template with a `{tools_description}` placeholder.
    pub system_prompt: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            options: CompletionOptions::default(),
            tool_temperature: 0.1,
            retry: RetryPolicy::default(),
            system_prompt: None,
        }
    }
}

// ─── Outcomes & IO ───────────────────────────────────────────────────────────

/// What one user input produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Blank input.
    Ignored,
    Quit,
    /// The model answered without a tool.
    Reply(String),
    /// The model called `tool` and then answered with `reply`.
    ToolReply {
        tool: String,
        progress: Option<String>,
        reply: String,
    },
    /// The cycle failed; the error is also in the conversation.
    Failed(String),
}

/// Where user input comes from and outcomes go to.
#[async_trait]
pub trait ChatIo: Send {
    /// Next line of input, or `None` on end of input / interrupt.
    async fn read_line(&mut self) -> Option<String>;

    fn show(&mut self, outcome: &TurnOutcome);
}

// ─── ChatSession ─────────────────────────────────────────────────────────────

pub struct ChatSession<M> {
    model: M,
    sessions: Vec<ToolSession>,
    router: ToolRouter,
    settings: ChatSettings,
    conversation: Conversation,
    span: tracing::Span,
}

impl<M: ChatModel> ChatSession<M> {
    /// `sessions` are in configured order, which is also routing precedence.
    pub fn new(
        model: M,
        sessions: Vec<ToolSession>,
        settings: ChatSettings,
        span: tracing::Span,
    ) -> Self {
        Self {
            model,
            sessions,
            router: ToolRouter::new(settings.retry),
            settings,
            conversation: Conversation::new(),
            span,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn sessions(&self) -> &[ToolSession] {
        &self.sessions
    }

    // ─── Startup ─────────────────────────────────────────────────────────

    /// Initialize every session in order, discover tools and seed the
    /// conversation.
    ///
    /// `initial_messages`, when given, replace the generated system message.
    /// If any session fails, all sessions are cleaned up and the error is
    /// returned.
    pub async fn startup(
        &mut self,
        initial_messages: Option<Vec<ChatMessage>>,
    ) -> Result<(), AgentError> {
        for session in &self.sessions {
            if let Err(source) = session.initialize().await {
                tracing::error!(
                    parent: &self.span,
                    server = session.name(),
                    error = %source,
                    "failed to initialize session"
                );
                self.shutdown().await;
                return Err(AgentError::StartupError {
                    server: session.name().to_string(),
                    source,
                });
            }
            tracing::info!(parent: &self.span, server = session.name(), id = session.id(), "initialized session");
        }

        let tools = self.discover_tools().await;
        self.conversation = match initial_messages {
            Some(messages) if !messages.is_empty() => Conversation::from_messages(messages),
            _ => Conversation::from_messages(vec![self.build_system_message(&tools)]),
        };
        Ok(())
    }

    /// List tools from every session in order. Sessions that fail are
    /// skipped with a warning.
    pub async fn discover_tools(&self) -> Vec<ToolDescriptor> {
        let mut all = Vec::new();
        for session in &self.sessions {
            match session.list_tools().await {
                Ok(tools) => {
                    tracing::debug!(parent: &self.span, server = session.name(), count = tools.len(), "found tools");
                    all.extend(tools);
                }
                Err(e) => {
                    tracing::warn!(parent: &self.span, server = session.name(), error = %e, "failed to list tools");
                }
            }

            for kind in [
                CapabilityKind::Resources,
                CapabilityKind::ResourceTemplates,
                CapabilityKind::Prompts,
            ] {
                if let Ok(caps) = session.list_capabilities(kind).await {
                    for cap in caps {
                        tracing::debug!(
                            parent: &self.span,
                            server = session.name(),
                            kind = %kind,
                            name = cap.name(),
                            "discovered capability"
                        );
                    }
                }
            }
        }
        tracing::info!(parent: &self.span, tool_count = all.len(), "tool discovery complete");
        all
    }

    pub fn build_system_message(&self, tools: &[ToolDescriptor]) -> ChatMessage {
        let template = self
            .settings
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        ChatMessage::system(build_system_prompt(template, tools))
    }

    // ─── Turn cycle ──────────────────────────────────────────────────────

    /// Handle one line of user input.
    pub async fn handle_input(&mut self, input: &str) -> TurnOutcome {
        let input = input.trim();
        if input.is_empty() {
            return TurnOutcome::Ignored;
        }
        if QUIT_WORDS.iter().any(|w| input.eq_ignore_ascii_case(w)) {
            tracing::info!(parent: &self.span, "ending chat session");
            return TurnOutcome::Quit;
        }

        match self.run_cycle(input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(parent: &self.span, error = %e, "error in chat cycle");
                self.conversation.push_system(format!("Error occurred: {e}"));
                TurnOutcome::Failed(e.to_string())
            }
        }
    }

    async fn run_cycle(&mut self, input: &str) -> Result<TurnOutcome, AgentError> {
        self.conversation.push_user(input);

        let decide = self
            .settings
            .options
            .with_temperature(self.settings.tool_temperature);
        let reply = self
            .model
            .complete(self.conversation.messages(), &decide)
            .await?;
        tracing::info!(parent: &self.span, reply = %reply, "assistant reply");

        let invocation = match parse_tool_call(&reply) {
            Ok(Some(invocation)) => invocation,
            Ok(None) => {
                self.conversation.push_assistant(reply.clone());
                return Ok(TurnOutcome::Reply(reply));
            }
            Err(e) => {
                self.conversation.push_assistant(reply);
                return Err(e.into());
            }
        };
        self.conversation.push_assistant(reply);

        let response = self.router.dispatch(&self.sessions, &invocation).await?;

        let progress = response.progress_message();
        if let Some(message) = &progress {
            tracing::info!(parent: &self.span, tool = %invocation.tool, "{message}");
            self.conversation.push_system(message.clone());
        }

        self.conversation.push_system(response.render_payload());

        let answer = self
            .model
            .complete(self.conversation.messages(), &self.settings.options)
            .await?;
        tracing::info!(parent: &self.span, reply = %answer, "final response");
        if !answer.is_empty() {
            self.conversation.push_assistant(answer.clone());
        }

        Ok(TurnOutcome::ToolReply {
            tool: invocation.tool,
            progress,
            reply: answer,
        })
    }

    // ─── Loop & shutdown ─────────────────────────────────────────────────

    /// Start up, loop until quit / end of input, shut down.
    pub async fn run(
        &mut self,
        io: &mut dyn ChatIo,
        initial_messages: Option<Vec<ChatMessage>>,
    ) -> Result<(), AgentError> {
        self.startup(initial_messages).await?;

        while let Some(line) = io.read_line().await {
            let outcome = self.handle_input(&line).await;
            io.show(&outcome);
            if outcome == TurnOutcome::Quit {
                break;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Clean up every session in order. Individual failures are logged by
    /// the sessions themselves.
    pub async fn shutdown(&self) {
        for session in &self.sessions {
            session.cleanup().await;
        }
        tracing::info!(parent: &self.span, "all sessions cleaned up");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
