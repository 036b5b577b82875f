//! NDJSON stream decoding for the Ollama chat API.
//!
//! With `stream: true`, Ollama answers with one JSON object per line. Body
//! chunks do not respect line boundaries, so bytes are buffered until a
//! newline arrives. Each line maps to zero or more [`StreamEvent`]s:
//! - non-empty `message.content` -> `TextDelta`
//! - `message.tool_calls` -> `ToolCalls`
//! - `done: true` -> `Done`
//! - an `error` field -> `LlmError::Provider`

use std::fmt::Display;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use rickybot_core::llm::provider::LlmStream;
use rickybot_types::llm::{LlmError, StreamEvent, ToolCall};

use super::types::OllamaChatChunk;

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append `chunk` and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    /// Whatever is left after the body ends, if anything.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Map one NDJSON line to stream events.
pub fn parse_chunk_line(line: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let chunk: OllamaChatChunk = serde_json::from_str(line)
        .map_err(|e| LlmError::Deserialization(format!("{e}: {line}")))?;

    if let Some(message) = chunk.error {
        return Err(LlmError::Provider { message });
    }

    let mut events = Vec::new();
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            events.push(StreamEvent::TextDelta {
                text: message.content,
            });
        }
        if !message.tool_calls.is_empty() {
            events.push(StreamEvent::ToolCalls {
                calls: message.tool_calls.into_iter().map(ToolCall::from).collect(),
            });
        }
    }
    if chunk.done {
        tracing::debug!(done_reason = ?chunk.done_reason, "Ollama stream finished");
        events.push(StreamEvent::Done);
    }
    Ok(events)
}

/// Turn an NDJSON response body into a provider event stream.
///
/// The stream stops after the first `Done`; a body that ends without one
/// simply ends, and the caller treats that as truncation.
pub fn ndjson_event_stream<S, E>(body: S) -> LlmStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::default();
        let mut done = false;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
            for line in lines.push(&chunk) {
                for event in parse_chunk_line(&line)? {
                    done = event == StreamEvent::Done;
                    yield event;
                    if done {
                        break;
                    }
                }
                if done {
                    break;
                }
            }
            if done {
                break;
            }
        }

        if !done {
            if let Some(line) = lines.finish() {
                for event in parse_chunk_line(&line)? {
                    yield event;
                }
            }
        }
    })
}
