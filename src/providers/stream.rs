//! Line-oriented decoding of streamed completion bodies.
//!
//! Both providers answer with one JSON document per line. The chat-style
//! servers wrap each line in a Server-Sent-Events `data:` frame and end with
//! a `[DONE]` sentinel; the generate-style server sends bare JSON lines.
//! Some servers ignore `stream=true` and send a single full completion, so
//! that shape is accepted too. Anything else is skipped: one bad line never
//! aborts the exchange, only a failed read does.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tracing::trace;

use crate::error::ProviderError;

const SSE_DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Longest line the decoder buffers while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Outcome of classifying a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    NoContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeltaEnvelope {
    Chat { choices: Vec<DeltaChoice> },
    Generate {
        response: String,
        #[serde(default)]
        done: bool,
    },
}

#[derive(Debug, Deserialize)]
struct DeltaChoice {
    delta: DeltaContent,
}

#[derive(Debug, Deserialize)]
struct DeltaContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FullEnvelope {
    choices: Vec<FullChoice>,
}

#[derive(Debug, Deserialize)]
struct FullChoice {
    message: FullMessage,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    #[serde(default)]
    content: Option<String>,
}

fn delta_content(payload: &str) -> Option<String> {
    match serde_json::from_str::<DeltaEnvelope>(payload).ok()? {
        DeltaEnvelope::Chat { choices } => Some(
            choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default(),
        ),
        DeltaEnvelope::Generate { response, done } => {
            if done {
                trace!("generate stream reported done");
            }
            Some(response)
        }
    }
}

fn full_content(payload: &str) -> Option<String> {
    let envelope = serde_json::from_str::<FullEnvelope>(payload).ok()?;
    Some(
        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default(),
    )
}

fn non_empty(content: String) -> StreamEvent {
    if content.is_empty() {
        StreamEvent::NoContent
    } else {
        StreamEvent::Delta(content)
    }
}

/// Classifies one line of a streamed body.
pub fn classify_line(raw: &str) -> StreamEvent {
    let line = raw.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return StreamEvent::NoContent;
    }

    let payload = match line.strip_prefix(SSE_DATA_PREFIX) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    };
    if payload.trim() == DONE_SENTINEL {
        return StreamEvent::NoContent;
    }

    if let Some(content) = delta_content(payload) {
        return non_empty(content);
    }
    if let Some(content) = full_content(payload) {
        return non_empty(content);
    }

    trace!(line_len = line.len(), "skipping unrecognized stream line");
    StreamEvent::NoContent
}

/// Accumulates raw chunks and yields complete lines. Lines are split on raw
/// bytes so a multi-byte character cut across chunks is reassembled before
/// it is decoded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|byte| *byte == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }

    /// Bytes held for a line whose newline has not arrived yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Returns a trailing line that had no terminating newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

fn dispatch(line: &str, on_delta: &mut dyn FnMut(&str), forwarded: &mut usize) {
    if let StreamEvent::Delta(content) = classify_line(line) {
        *forwarded += 1;
        on_delta(&content);
    }
}

/// Reads `stream` to the end, calling `on_delta` once per content-bearing
/// line in arrival order. Each callback runs before the next chunk is
/// polled. A line that grows past [`MAX_LINE_BYTES`] without a newline
/// fails the stream with `Transport`.
pub async fn decode<S, B>(
    stream: S,
    on_delta: &mut dyn FnMut(&str),
) -> Result<(), ProviderError>
where
    S: Stream<Item = Result<B, ProviderError>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut lines = LineBuffer::default();
    let mut forwarded = 0usize;

    while let Some(chunk) = stream.next().await {
        lines.extend(chunk?.as_ref());
        while let Some(line) = lines.next_line() {
            dispatch(&line, on_delta, &mut forwarded);
        }
        if lines.pending_len() > MAX_LINE_BYTES {
            return Err(ProviderError::Transport(format!(
                "stream line exceeds {MAX_LINE_BYTES} bytes without a newline"
            )));
        }
    }
    if let Some(line) = lines.finish() {
        dispatch(&line, on_delta, &mut forwarded);
    }

    trace!(deltas = forwarded, "stream finished");
    Ok(())
}
