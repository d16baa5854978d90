//! HTTP + server-sent-events transport.
//!
//! The client opens `GET {url}` as an event stream. The server first sends an
//! `endpoint` event naming the URL to POST JSON-RPC messages to; responses
//! come back on the stream as `message` events and are matched to waiting
//! requests by id.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::errors::McpError;
use super::transport::{next_request_id, Connection, Connector};
use super::types::{extract_result, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, String>> + Send>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

// ─── Event framing ───────────────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `message` when the block has no `event:` field.
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Parse one blank-line-delimited event block.
///
/// Returns `None` for blocks carrying neither an event type nor data
/// (comments, keep-alives).
pub fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }

    Some(SseEvent {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

struct FrameState<S> {
    stream: S,
    buffer: Vec<u8>,
    done: bool,
}

/// Split a byte stream into events.
///
/// Transport errors end the stream after being yielded once.
pub fn sse_events<S, B, E>(stream: S) -> impl Stream<Item = Result<SseEvent, String>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = FrameState {
        stream,
        buffer: Vec::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = find_blank_line(&st.buffer) {
                let block: Vec<u8> = st.buffer.drain(..pos + 2).collect();
                if let Some(event) = parse_event_block(&String::from_utf8_lossy(&block)) {
                    return Some((Ok(event), st));
                }
                continue;
            }

            if st.done {
                return None;
            }

            match st.stream.next().await {
                Some(Ok(chunk)) => {
                    st.buffer
                        .extend(chunk.as_ref().iter().copied().filter(|b| *b != b'\r'));
                }
                Some(Err(e)) => {
                    st.done = true;
                    st.buffer.clear();
                    return Some((Err(e.to_string()), st));
                }
                None => {
                    st.done = true;
                    let rest = std::mem::take(&mut st.buffer);
                    return parse_event_block(&String::from_utf8_lossy(&rest))
                        .map(|event| (Ok(event), st));
                }
            }
        }
    })
}

/// Resolve the `endpoint` event's data against the stream URL.
pub fn resolve_endpoint(stream_url: &str, data: &str) -> Result<Url, String> {
    let base = Url::parse(stream_url).map_err(|e| format!("invalid stream url: {e}"))?;
    base.join(data.trim())
        .map_err(|e| format!("invalid endpoint '{data}': {e}"))
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// Connects to an MCP server's SSE endpoint.
pub struct SseConnector {
    url: String,
    http: reqwest::Client,
}

impl SseConnector {
    pub fn new(url: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            url: url.to_string(),
            http,
        }
    }
}

#[async_trait]
impl Connector for SseConnector {
    async fn connect(&self, server_name: &str) -> Result<Arc<dyn Connection>, McpError> {
        let transport_error = |reason: String| McpError::TransportError {
            server: server_name.to_string(),
            reason,
        };

        let response = self
            .http
            .get(&self.url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| transport_error(format!("GET {}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transport_error(format!("GET {} returned {status}", self.url)));
        }

        let mut events: EventStream = Box::pin(sse_events(Box::pin(response.bytes_stream())));

        let endpoint = loop {
            match events.next().await {
                Some(Ok(event)) if event.event == "endpoint" => {
                    break resolve_endpoint(&self.url, &event.data).map_err(|reason| {
                        McpError::ProtocolError {
                            server: server_name.to_string(),
                            reason,
                        }
                    })?;
                }
                Some(Ok(event)) => {
                    tracing::debug!(server = server_name, event = %event.event, "event before endpoint ignored");
                }
                Some(Err(e)) => return Err(transport_error(e)),
                None => {
                    return Err(transport_error(
                        "event stream ended before the endpoint event".into(),
                    ))
                }
            }
        };

        tracing::info!(server = server_name, url = %self.url, endpoint = %endpoint, "connected over SSE");

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(dispatch_events(
            server_name.to_string(),
            events,
            pending.clone(),
            closed.clone(),
        ));

        Ok(Arc::new(SseTransport {
            server_name: server_name.to_string(),
            http: self.http.clone(),
            endpoint,
            pending,
            closed,
            reader: Mutex::new(Some(reader)),
        }))
    }
}

/// Route `message` events to the requests waiting on them.
///
/// When the stream ends, all waiters are released with an error.
async fn dispatch_events(
    server: String,
    mut events: EventStream,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
) {
    while let Some(item) = events.next().await {
        match item {
            Ok(event) if event.event == "message" => {
                match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                    Ok(response) => {
                        let id = response.id;
                        match pending.lock().await.remove(&id) {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => tracing::debug!(server = %server, id, "unmatched response"),
                        }
                    }
                    Err(_) => tracing::debug!(server = %server, "non-response message ignored"),
                }
            }
            Ok(event) => tracing::debug!(server = %server, event = %event.event, "event ignored"),
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "event stream failed");
                break;
            }
        }
    }

    tracing::debug!(server = %server, "event stream closed");
    let mut waiting = pending.lock().await;
    closed.store(true, Ordering::SeqCst);
    waiting.clear();
}

// ─── Transport ───────────────────────────────────────────────────────────────

pub struct SseTransport {
    server_name: String,
    http: reqwest::Client,
    endpoint: Url,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }

    async fn post(&self, message: &impl serde::Serialize) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| self.transport_error(format!("POST {}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.transport_error(format!(
                "POST {} returned {status}: {body}",
                self.endpoint
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SseTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut waiting = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(self.transport_error("event stream is closed".into()));
            }
            waiting.insert(id, tx);
        }

        if let Err(e) = self.post(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = rx
            .await
            .map_err(|_| self.transport_error("event stream closed before response".into()))?;
        extract_result(response)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await
    }

    async fn close(&self) -> Result<(), McpError> {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        let mut waiting = self.pending.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        waiting.clear();
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
