//! SSE streaming response parser for OpenAI-compatible chat completions.
//!
//! Reads a `reqwest::Response` as a byte stream, splits it on line boundaries
//! (`data: {...}\n`), parses each data line as a `ChatCompletionChunk`, and
//! yields the text delta of each chunk. The stream ends at `data: [DONE]`,
//! at end of body, or right after the first error.

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::ChatCompletionChunk;

/// The explicit end-of-stream marker.
const DONE_MARKER: &str = "[DONE]";

// ─── SSE line parser ─────────────────────────────────────────────────────────

/// Parse a streaming completion response into text fragments.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, InferenceError>> {
    parse_sse_bytes(Box::pin(response.bytes_stream()))
}

/// Parse any byte stream carrying newline-delimited `data:` events.
///
/// Bytes are buffered until a full line is available so that multi-byte
/// UTF-8 sequences split across network chunks decode correctly.
pub fn parse_sse_bytes<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<String, InferenceError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                // Drain complete lines already buffered
                if let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&line);
                    match process_line(&line) {
                        LineOutcome::Fragment(text) => {
                            return Some((Ok(text), (byte_stream, buffer, false)));
                        }
                        LineOutcome::Skip => continue,
                        LineOutcome::Done => return None,
                        LineOutcome::Malformed(e) => {
                            return Some((Err(e), (byte_stream, buffer, true)));
                        }
                    }
                }

                // Need more data from the stream
                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::ConnectionFailed {
                                endpoint: "stream".into(),
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, buffer, true),
                        ));
                    }
                    None => {
                        // Body ended without [DONE]; flush a trailing partial line
                        if buffer.is_empty() {
                            return None;
                        }
                        let rest = String::from_utf8_lossy(&buffer).into_owned();
                        buffer.clear();
                        return match process_line(&rest) {
                            LineOutcome::Fragment(text) => {
                                Some((Ok(text), (byte_stream, buffer, true)))
                            }
                            LineOutcome::Malformed(e) => {
                                Some((Err(e), (byte_stream, buffer, true)))
                            }
                            LineOutcome::Skip | LineOutcome::Done => None,
                        };
                    }
                }
            }
        },
    )
}

// ─── Line handling ───────────────────────────────────────────────────────────

#[derive(Debug)]
enum LineOutcome {
    Fragment(String),
    Skip,
    Done,
    Malformed(InferenceError),
}

/// Classify one line of the event stream.
fn process_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Skip;
    }

    // Comments (`: keep-alive`), `event:` and `id:` lines carry no text
    let Some(data) = line.strip_prefix("data:") else {
        return LineOutcome::Skip;
    };
    let data = data.trim();

    if data == DONE_MARKER {
        return LineOutcome::Done;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return LineOutcome::Malformed(InferenceError::ProtocolError {
                reason: format!("failed to decode stream data: {e}"),
                fragment: data.to_string(),
            });
        }
    };

    match chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
    {
        Some(text) if !text.is_empty() => LineOutcome::Fragment(text),
        _ => LineOutcome::Skip,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_chunks(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<&'static [u8], std::io::Error>> + Unpin {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes())))
    }

    async fn collect(
        chunks: Vec<&'static str>,
    ) -> Vec<Result<String, InferenceError>> {
        parse_sse_bytes(byte_chunks(chunks)).collect().await
    }

    #[tokio::test]
    async fn test_fragments_until_done() {
        let items = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        ])
        .await;
        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_event_split_across_network_chunks() {
        let items = collect(vec![
            "data: {\"choices\":[{\"del",
            "ta\":{\"content\":\"split\"}}]}\n",
            "data: [DONE]\n",
        ])
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "split");
    }

    #[tokio::test]
    async fn test_malformed_fragment_surfaces_protocol_error() {
        let items = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "data: {not json}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n",
        ])
        .await;
        assert_eq!(items.len(), 2, "stream must stop after the error");
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        match &items[1] {
            Err(InferenceError::ProtocolError { fragment, .. }) => {
                assert_eq!(fragment, "{not json}");
            }
            other => panic!("expected ProtocolError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_keepalive_and_role_only_deltas_are_skipped() {
        let items = collect(vec![
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
            "data: [DONE]\n",
        ])
        .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "x");
    }

    #[tokio::test]
    async fn test_body_ends_without_done_marker() {
        let items = collect(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "tail");
    }

    #[test]
    fn test_process_line_done_marker_without_space() {
        assert!(matches!(process_line("data:[DONE]"), LineOutcome::Done));
    }
}
