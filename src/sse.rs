//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! Turns the raw byte stream of a `chat/completions` response into a stream of
//! [`ChatCompletionChunk`]s.  The stream ends at `data: [DONE]` or when the connection closes.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::observability::{STREAM_BYTES, STREAM_ERRORS};
use crate::{ChatCompletionChunk, Error, Result};

const DONE: &str = "[DONE]";

/// Process a stream of bytes into a stream of chat-completion chunks.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result.map_err(|e| {
            Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
        })
    });

    stream::unfold(
        (stream, Vec::new(), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match event {
                        Event::Skip => continue,
                        Event::Done => return None,
                        Event::Chunk(chunk) => {
                            if chunk.is_err() {
                                STREAM_ERRORS.click();
                            }
                            return Some((chunk, (stream, buffer, false)));
                        }
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        STREAM_BYTES.count(bytes.len() as u64);
                        buffer.extend_from_slice(&bytes);
                        if buffer.contains(&b'\r') {
                            normalize_newlines(&mut buffer);
                        }
                    }
                    Some(Err(e)) => {
                        STREAM_ERRORS.click();
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // A final event may lack its trailing blank line.
                        if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                            buffer.extend_from_slice(b"\n\n");
                            continue;
                        }
                        return None;
                    }
                }
            }
        },
    )
}

enum Event {
    Skip,
    Done,
    Chunk(Result<ChatCompletionChunk>),
}

/// Rewrite every CRLF as LF.  A lone CR at the end waits for the next read.
fn normalize_newlines(buffer: &mut Vec<u8>) {
    let mut normalized = Vec::with_capacity(buffer.len());
    for (idx, byte) in buffer.iter().enumerate() {
        if *byte == b'\r' && buffer.get(idx + 1) == Some(&b'\n') {
            continue;
        }
        normalized.push(*byte);
    }
    *buffer = normalized;
}

/// Extract one complete SSE event from the buffer.
///
/// Events are delimited by a blank line.  The buffer holds raw bytes so that a character
/// split across reads is only decoded once its event is complete.  Only `data:` fields are
/// meaningful here; comments and other fields are ignored, and multiple `data:` lines are
/// joined with newlines.
fn extract_event(buffer: &[u8]) -> Option<(Event, Vec<u8>)> {
    let end = buffer.windows(2).position(|window| window == b"\n\n")?;
    let rest = buffer[end + 2..].to_vec();
    let event_text = match std::str::from_utf8(&buffer[..end]) {
        Ok(text) => text,
        Err(e) => {
            return Some((
                Event::Chunk(Err(Error::encoding(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ))),
                rest,
            ));
        }
    };

    let mut data = vec![];
    for line in event_text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }
    let data = data.join("\n");
    let data = data.trim();

    if data.is_empty() {
        return Some((Event::Skip, rest));
    }
    if data == DONE {
        return Some((Event::Done, rest));
    }
    Some((Event::Chunk(parse_data(data)), rest))
}

fn parse_data(data: &str) -> Result<ChatCompletionChunk> {
    #[derive(Default, Deserialize)]
    struct ErrorDetail {
        #[serde(default)]
        message: Option<String>,
        #[serde(rename = "type", default)]
        error_type: Option<String>,
        #[serde(default)]
        code: Option<serde_json::Value>,
    }

    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| {
        Error::serialization(
            format!("Malformed SSE data {data:?}: {e}"),
            Some(Box::new(e)),
        )
    })?;
    if let Some(error) = value.get("error") {
        let detail = serde_json::from_value::<ErrorDetail>(error.clone()).unwrap_or_default();
        let status_code = detail
            .code
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        let error_type = detail.error_type.or_else(|| Some("stream_error".to_string()));
        let message = detail.message.unwrap_or_else(|| error.to_string());
        return Err(Error::api(status_code, error_type, message));
    }
    serde_json::from_value(value).map_err(|e| {
        Error::serialization(
            format!("Unexpected chunk shape {data:?}: {e}"),
            Some(Box::new(e)),
        )
    })
}
