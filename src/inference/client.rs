//! OpenAI-compatible inference client.
//!
//! Sends chat completion requests to an LLM endpoint and returns either the
//! full reply text or a stream of text fragments. No retry, caching or rate
//! limiting happens here; callers decide how to react to failures.

use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client as HttpClient;
use tracing::Instrument;

use super::errors::InferenceError;
use super::streaming::parse_sse_stream;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionOptions};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout. No total request timeout is applied: local models
/// can take arbitrarily long to process a large context.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ─── ChatModel ───────────────────────────────────────────────────────────────

/// Anything that can turn a conversation into a single reply.
///
/// The orchestrator depends on this rather than on `InferenceClient` so the
/// turn cycle can be exercised without an HTTP endpoint.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct InferenceClient {
    http: HttpClient,
    base_url: String,
    span: tracing::Span,
}

impl InferenceClient {
    /// Create a client for `base_url` (e.g. `http://localhost:1234/v1`).
    ///
    /// Does NOT check connectivity; that happens on the first request.
    pub fn new(base_url: &str, span: tracing::Span) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: base_url.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            span,
        })
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    // ─── Chat Completion (non-streaming) ─────────────────────────────────

    /// Send the conversation and return the complete reply text.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, InferenceError> {
        let url = self.completions_url();
        let response = self
            .send(&url, messages, options, false)
            .instrument(self.span.clone())
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: url.clone(),
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_body(&body)
    }

    // ─── Chat Completion (streaming) ─────────────────────────────────────

    /// Send the conversation with `stream: true` and return the reply as a
    /// lazy, finite sequence of text fragments.
    ///
    /// The returned stream is not restartable; a malformed fragment ends it
    /// with `InferenceError::ProtocolError`.
    pub async fn chat_completion_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<impl Stream<Item = Result<String, InferenceError>>, InferenceError> {
        let url = self.completions_url();
        let response = self
            .send(&url, messages, options, true)
            .instrument(self.span.clone())
            .await?;
        Ok(parse_sse_stream(response))
    }

    /// POST the request and map connection/status failures.
    async fn send(
        &self,
        url: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<reqwest::Response, InferenceError> {
        let body = ChatCompletionRequest {
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream,
            model: &options.model,
        };

        // Log the request metadata (not the full body, it can be huge)
        tracing::debug!(
            url = %url,
            model = %options.model,
            message_count = messages.len(),
            temperature = options.temperature,
            max_tokens = options.max_tokens,
            stream,
            "sending completion request"
        );

        let mut request = self.http.post(url).json(&body);
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "completion endpoint returned an error");
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for InferenceClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, InferenceError> {
        self.chat_completion(messages, options).await
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Extract `choices[0].message.content` from a non-streaming body.
///
/// `null` content is treated as an empty reply.
pub fn parse_completion_body(body: &str) -> Result<String, InferenceError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::ProtocolError {
            reason: format!("failed to parse completion response: {e}"),
            fragment: body.to_string(),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::ProtocolError {
            reason: "empty choices array".into(),
            fragment: body.to_string(),
        })?;

    Ok(choice.message.content.unwrap_or_default())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
