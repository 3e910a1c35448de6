//! Logging trait for chat-completion traffic.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture and log all
//! API interactions passing through the [`OpenAi`](crate::OpenAi) client.

use std::io::Write;

use serde_json::json;

use crate::{ChatCompletionChunk, ChatCompletionRequest, Message};

/// A trait for logging chat-completion traffic.
///
/// # Example
///
/// ```rust,ignore
/// use aicoder::{ChatCompletionChunk, ChatCompletionRequest, ClientLogger, Message};
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_request(&self, request: &ChatCompletionRequest) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Request: {}", serde_json::to_string(request).unwrap()).unwrap();
///     }
///
///     fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Chunk: {}", serde_json::to_string(chunk).unwrap()).unwrap();
///     }
///
///     fn log_stream_message(&self, message: &Message) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "Message: {}", serde_json::to_string(message).unwrap()).unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a request just before it is sent.
    fn log_request(&self, request: &ChatCompletionRequest);

    /// Log an individual chunk of a streamed response.
    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk);

    /// Log the assistant message reconstructed from a finished stream.
    fn log_stream_message(&self, message: &Message);
}

/////////////////////////////////////////// DebugLogger ///////////////////////////////////////////

/// A [`ClientLogger`] that writes one JSON object per line to stderr.
///
/// Installed by `--log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugLogger;

impl DebugLogger {
    fn emit(&self, kind: &str, payload: serde_json::Value) {
        let line = json!({ "kind": kind, "payload": payload });
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}

impl ClientLogger for DebugLogger {
    fn log_request(&self, request: &ChatCompletionRequest) {
        self.emit("request", serde_json::to_value(request).unwrap_or_default());
    }

    fn log_stream_chunk(&self, chunk: &ChatCompletionChunk) {
        self.emit("chunk", serde_json::to_value(chunk).unwrap_or_default());
    }

    fn log_stream_message(&self, message: &Message) {
        self.emit("message", serde_json::to_value(message).unwrap_or_default());
    }
}
