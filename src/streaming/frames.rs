//! Event frame parsing for `data:`-prefixed completion stream lines.

use serde::Deserialize;
use tracing::debug;

use crate::error::ChatError;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Incremental text carried by one frame. Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub reasoning: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Blank, non-data, or undecodable line.
    Ignore,
    /// End-of-stream marker.
    Done,
    Delta(Delta),
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionPayload {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChunkDelta,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Classify one line of the stream.
pub fn parse_line(line: &str) -> Frame {
    let line = line.trim();
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignore;
    };
    let payload = payload.trim();
    if payload == DONE_MARKER {
        return Frame::Done;
    }

    let chunk: ChunkPayload = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            debug!(error = %err, payload, "ignoring malformed stream frame");
            return Frame::Ignore;
        }
    };

    let delta = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .map(|delta| Delta {
            reasoning: non_empty(delta.reasoning_content),
            content: non_empty(delta.content),
        })
        .unwrap_or_default();
    Frame::Delta(delta)
}

/// Decode a non-streaming completion body into a single delta.
pub fn parse_completion(body: &[u8]) -> Result<Delta, ChatError> {
    let payload: CompletionPayload =
        serde_json::from_slice(body).map_err(|e| ChatError::Decode(e.to_string()))?;
    let message = payload
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| ChatError::Decode("completion has no choices".to_string()))?;
    Ok(Delta {
        reasoning: non_empty(message.reasoning_content),
        content: non_empty(message.content),
    })
}
