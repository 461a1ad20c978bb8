//! Server-sent-events plumbing shared by the HTTP adapters.

use crate::stream::StreamEvent;
use futures_util::{Stream, StreamExt};
use relay_core::{RelayError, RelayResult};
use std::fmt::Display;
use tokio::sync::mpsc;

/// What an adapter made of one `data:` payload.
#[derive(Debug, PartialEq, Eq)]
pub enum SseData {
    /// Text to forward.
    Fragment(String),
    /// End-of-stream marker.
    Done,
    /// Nothing to forward (keep-alives, role headers, usage frames, ...).
    Skip,
}

/// Splits a byte stream into SSE `data:` payloads.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks are decoded intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk and return the `data:` payloads it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(data) = parse_line(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.pending);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    // Comments (`:`), blank separators, `event:` and `id:` fields carry no text.
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

/// Drive an SSE byte stream into `tx`, letting `parse` interpret each payload.
///
/// Returns `Ok(())` when the provider ends the stream or the receiver goes
/// away, and an error when the transport fails or `parse` rejects a payload.
pub async fn pump<S, B, E, F>(
    bytes: S,
    tx: mpsc::Sender<StreamEvent>,
    mut parse: F,
) -> RelayResult<()>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    F: FnMut(&str) -> RelayResult<SseData>,
{
    let mut bytes = std::pin::pin!(bytes);
    let mut buffer = SseBuffer::new();

    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|e| RelayError::Http(format!("Stream read error: {e}")))?;
        for data in buffer.push(chunk.as_ref()) {
            if !forward(&tx, parse(&data)?).await {
                return Ok(());
            }
        }
    }

    if let Some(data) = buffer.finish() {
        forward(&tx, parse(&data)?).await;
    }
    Ok(())
}

/// Returns `false` once nothing more should be sent.
async fn forward(tx: &mpsc::Sender<StreamEvent>, data: SseData) -> bool {
    match data {
        SseData::Fragment(text) => tx.send(StreamEvent::Fragment { text }).await.is_ok(),
        SseData::Done => {
            let _ = tx.send(StreamEvent::Done).await;
            false
        }
        SseData::Skip => !tx.is_closed(),
    }
}

/// Pull a provider error message out of an `{"error": ...}` frame, if present.
pub fn error_message(event: &serde_json::Value) -> Option<String> {
    let error = event.get("error")?;
    match error {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(
            other["message"]
                .as_str()
                .map_or_else(|| other.to_string(), ToString::to_string),
        ),
    }
}
