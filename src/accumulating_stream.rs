//! Accumulates streamed chunks into a complete assistant message while passing them through.

use std::collections::BTreeMap;
use std::pin::Pin;

use futures::Stream;

use crate::{ChatCompletionChunk, Error, FinishReason, Message, ToolCall};

/// A section of the assistant message that has stopped receiving fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishedSection {
    /// The answer text is complete.
    Content(String),
    /// The refusal text is complete.
    Refusal(String),
    /// The tool call at `index` is complete.
    ToolCall { index: usize, call: ToolCall },
}

/// One chunk of the stream, plus the sections it finished.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub chunk: ChatCompletionChunk,
    /// Sections finished by this chunk: content, then refusal, then tool calls by index.
    pub finished: Vec<FinishedSection>,
}

////////////////////////////////////////// AccumulatedMessage //////////////////////////////////////////

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
    finished: bool,
}

impl ToolCallBuilder {
    fn build(&self) -> ToolCall {
        ToolCall::new(self.id.clone(), self.name.clone(), self.arguments.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SectionState {
    #[default]
    Empty,
    Open,
    Finished,
}

impl SectionState {
    fn touch(&mut self) {
        if *self == SectionState::Empty {
            *self = SectionState::Open;
        }
    }
}

/// The assistant message as reconstructed from the chunks seen so far.
///
/// Only choice 0 is accumulated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatedMessage {
    content: String,
    reasoning: String,
    refusal: String,
    tool_calls: BTreeMap<usize, ToolCallBuilder>,
    finish_reason: Option<FinishReason>,
    content_state: SectionState,
    refusal_state: SectionState,
}

impl AccumulatedMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer text so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning text so far.
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Refusal text so far.
    pub fn refusal(&self) -> &str {
        &self.refusal
    }

    /// The finish reason, once the server has sent one.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// True once the content section has been reported finished.
    pub fn content_finished(&self) -> bool {
        self.content_state == SectionState::Finished
    }

    /// True once the refusal section has been reported finished.
    pub fn refusal_finished(&self) -> bool {
        self.refusal_state == SectionState::Finished
    }

    /// True once the tool call at `index` has been reported finished.
    pub fn tool_call_finished(&self, index: usize) -> bool {
        self.tool_calls
            .get(&index)
            .map(|builder| builder.finished)
            .unwrap_or(false)
    }

    /// The tool calls so far, ordered by index.
    ///
    /// Indices that never received a fragment do not appear.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls.values().map(ToolCallBuilder::build).collect()
    }

    /// Fold one chunk into the message and return the sections it finished.
    pub fn accumulate(&mut self, chunk: &ChatCompletionChunk) -> Vec<FinishedSection> {
        let Some(choice) = chunk.first_choice() else {
            return vec![];
        };
        let delta = &choice.delta;
        let mut touched_content = false;
        let mut touched_refusal = false;
        let mut touched_tools = vec![];

        if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
            self.content.push_str(content);
            self.content_state.touch();
            touched_content = true;
        }
        if let Some(reasoning) = delta.reasoning_text() {
            self.reasoning.push_str(reasoning);
        }
        if let Some(refusal) = delta.refusal.as_deref().filter(|r| !r.is_empty()) {
            self.refusal.push_str(refusal);
            self.refusal_state.touch();
            touched_refusal = true;
        }
        for fragment in delta.tool_calls.iter() {
            let builder = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id.as_deref() {
                if builder.id.is_empty() {
                    builder.id.push_str(id);
                }
            }
            if let Some(function) = fragment.function.as_ref() {
                if let Some(name) = function.name.as_deref() {
                    if builder.name.is_empty() {
                        builder.name.push_str(name);
                    }
                }
                if let Some(arguments) = function.arguments.as_deref() {
                    builder.arguments.push_str(arguments);
                }
            }
            touched_tools.push(fragment.index);
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
            return self.finish_open_sections();
        }
        let moved_on = touched_content || touched_refusal || !touched_tools.is_empty();
        if !moved_on {
            return vec![];
        }
        let mut finished = vec![];
        if !touched_content && self.content_state == SectionState::Open {
            self.content_state = SectionState::Finished;
            finished.push(FinishedSection::Content(self.content.clone()));
        }
        if !touched_refusal && self.refusal_state == SectionState::Open {
            self.refusal_state = SectionState::Finished;
            finished.push(FinishedSection::Refusal(self.refusal.clone()));
        }
        for (index, builder) in self.tool_calls.iter_mut() {
            if !builder.finished && !touched_tools.contains(index) {
                builder.finished = true;
                finished.push(FinishedSection::ToolCall {
                    index: *index,
                    call: builder.build(),
                });
            }
        }
        finished
    }

    /// Mark every section that is still open as finished and return them.
    ///
    /// Called for a finish reason, and by callers whose stream ended early.
    pub fn finish_open_sections(&mut self) -> Vec<FinishedSection> {
        let mut finished = vec![];
        if self.content_state == SectionState::Open {
            self.content_state = SectionState::Finished;
            finished.push(FinishedSection::Content(self.content.clone()));
        }
        if self.refusal_state == SectionState::Open {
            self.refusal_state = SectionState::Finished;
            finished.push(FinishedSection::Refusal(self.refusal.clone()));
        }
        for (index, builder) in self.tool_calls.iter_mut() {
            if !builder.finished {
                builder.finished = true;
                finished.push(FinishedSection::ToolCall {
                    index: *index,
                    call: builder.build(),
                });
            }
        }
        finished
    }

    /// The assistant message to append to the conversation.
    ///
    /// Servers reject an assistant message with neither content nor tool calls, so a message
    /// without tool calls always carries content, empty if nothing arrived.
    pub fn to_message(&self) -> Message {
        let tool_calls = self.tool_calls();
        let content = if !self.content.is_empty() || tool_calls.is_empty() {
            Some(self.content.clone())
        } else {
            None
        };
        Message::Assistant {
            content,
            refusal: Some(self.refusal.clone()).filter(|r| !r.is_empty()),
            tool_calls,
        }
    }
}

////////////////////////////////////////// AccumulatingStream //////////////////////////////////////////

/// A stream wrapper that accumulates chunks into an [`AccumulatedMessage`].
///
/// Chunks are passed through as they arrive so the caller can render them live.  The
/// accumulated message stays readable at any point, including after the inner stream
/// failed or the caller stopped polling.
pub struct AccumulatingStream {
    inner: Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, Error>> + Send>>,
    message: AccumulatedMessage,
}

impl AccumulatingStream {
    /// Wraps a chunk stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<ChatCompletionChunk, Error>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            message: AccumulatedMessage::new(),
        }
    }

    /// The message accumulated so far.
    pub fn message(&self) -> &AccumulatedMessage {
        &self.message
    }

    /// Finish whatever sections are still open.  See [`AccumulatedMessage::finish_open_sections`].
    pub fn finish_open_sections(&mut self) -> Vec<FinishedSection> {
        self.message.finish_open_sections()
    }

    /// Drop the inner stream and keep what was accumulated.
    pub fn into_message(self) -> AccumulatedMessage {
        self.message
    }
}

impl Stream for AccumulatingStream {
    type Item = Result<StreamEvent, Error>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            std::task::Poll::Ready(Some(Ok(chunk))) => {
                let finished = self.message.accumulate(&chunk);
                std::task::Poll::Ready(Some(Ok(StreamEvent { chunk, finished })))
            }
            std::task::Poll::Ready(Some(Err(e))) => std::task::Poll::Ready(Some(Err(e))),
            std::task::Poll::Ready(None) => std::task::Poll::Ready(None),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChunkChoice, ChunkDelta, FunctionDelta, ToolCallDelta};
    use futures::{StreamExt, stream};

    fn chunk(delta: ChunkDelta, finish_reason: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            model: "qwen3:1.7b".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    fn text(content: &str) -> ChatCompletionChunk {
        chunk(
            ChunkDelta {
                content: Some(content.to_string()),
                ..ChunkDelta::default()
            },
            None,
        )
    }

    fn tool(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ChatCompletionChunk {
        chunk(
            ChunkDelta {
                tool_calls: vec![ToolCallDelta {
                    index,
                    id: id.map(String::from),
                    kind: id.map(|_| "function".to_string()),
                    function: Some(FunctionDelta {
                        name: name.map(String::from),
                        arguments: arguments.map(String::from),
                    }),
                }],
                ..ChunkDelta::default()
            },
            None,
        )
    }

    fn stop(reason: FinishReason) -> ChatCompletionChunk {
        chunk(ChunkDelta::default(), Some(reason))
    }

    #[tokio::test]
    async fn content_concatenates_and_finishes_once() {
        let chunks = vec![
            Ok(text("Hel")),
            Ok(text("lo, ")),
            Ok(text("world")),
            Ok(stop(FinishReason::Stop)),
        ];
        let mut acc = AccumulatingStream::new(stream::iter(chunks));
        let mut finished = vec![];
        while let Some(event) = acc.next().await {
            finished.push(event.unwrap().finished);
        }
        assert_eq!(
            finished,
            vec![
                vec![],
                vec![],
                vec![],
                vec![FinishedSection::Content("Hello, world".to_string())]
            ]
        );
        let mut message = acc.into_message();
        assert_eq!(message.content(), "Hello, world");
        assert!(message.content_finished());
        assert_eq!(message.finish_reason(), Some(FinishReason::Stop));
        assert!(message.finish_open_sections().is_empty());
    }

    #[test]
    fn content_finishes_when_tool_call_starts() {
        let mut message = AccumulatedMessage::new();
        assert!(message.accumulate(&text("Let me look.")).is_empty());
        let finished = message.accumulate(&tool(0, Some("call_1"), Some("read_file"), Some("")));
        assert_eq!(
            finished,
            vec![FinishedSection::Content("Let me look.".to_string())]
        );
        let finished = message.accumulate(&stop(FinishReason::ToolCalls));
        assert_eq!(
            finished,
            vec![FinishedSection::ToolCall {
                index: 0,
                call: ToolCall::new("call_1", "read_file", ""),
            }]
        );
        assert!(message.content_finished());
        assert!(message.tool_call_finished(0));
    }

    #[test]
    fn tool_fragments_merge_by_index() {
        let mut message = AccumulatedMessage::new();
        message.accumulate(&tool(0, Some("call_a"), Some("read_file"), Some("{\"file_")));
        message.accumulate(&tool(0, None, Some("ignored"), Some("path\":\"a.txt\"}")));
        let finished = message.accumulate(&tool(1, Some("call_b"), Some("override_file"), None));
        assert_eq!(
            finished,
            vec![FinishedSection::ToolCall {
                index: 0,
                call: ToolCall::new("call_a", "read_file", "{\"file_path\":\"a.txt\"}"),
            }]
        );
        message.accumulate(&tool(1, None, None, Some("{}")));
        let finished = message.accumulate(&stop(FinishReason::ToolCalls));
        assert_eq!(
            finished,
            vec![FinishedSection::ToolCall {
                index: 1,
                call: ToolCall::new("call_b", "override_file", "{}"),
            }]
        );
        assert_eq!(
            message.tool_calls(),
            vec![
                ToolCall::new("call_a", "read_file", "{\"file_path\":\"a.txt\"}"),
                ToolCall::new("call_b", "override_file", "{}"),
            ]
        );
    }

    #[test]
    fn name_comes_from_first_non_empty_fragment() {
        let mut message = AccumulatedMessage::new();
        message.accumulate(&tool(0, Some(""), Some(""), Some("{")));
        message.accumulate(&tool(0, Some("call_1"), Some("read_file"), Some("}")));
        message.accumulate(&tool(0, None, Some("override_file"), None));
        assert_eq!(
            message.tool_calls(),
            vec![ToolCall::new("call_1", "read_file", "{}")]
        );
    }

    #[test]
    fn sparse_tool_indices_are_dropped() {
        let mut message = AccumulatedMessage::new();
        message.accumulate(&tool(2, Some("call_2"), Some("read_file"), Some("{}")));
        message.accumulate(&stop(FinishReason::ToolCalls));
        assert_eq!(
            message.to_message().tool_calls(),
            &[ToolCall::new("call_2", "read_file", "{}")]
        );
    }

    #[test]
    fn refusal_only_finishes_once() {
        let mut message = AccumulatedMessage::new();
        let refusal = chunk(
            ChunkDelta {
                refusal: Some("I can't help with that.".to_string()),
                ..ChunkDelta::default()
            },
            None,
        );
        assert!(message.accumulate(&refusal).is_empty());
        let finished = message.accumulate(&stop(FinishReason::Stop));
        assert_eq!(
            finished,
            vec![FinishedSection::Refusal("I can't help with that.".to_string())]
        );
        assert!(message.accumulate(&stop(FinishReason::Stop)).is_empty());
        assert!(message.finish_open_sections().is_empty());
        assert_eq!(
            message.to_message(),
            Message::Assistant {
                content: Some(String::new()),
                refusal: Some("I can't help with that.".to_string()),
                tool_calls: vec![],
            }
        );
    }

    #[test]
    fn empty_message_still_has_content() {
        let message = AccumulatedMessage::new().to_message();
        assert_eq!(message, Message::assistant(""));
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({"role": "assistant", "content": ""})
        );
    }

    #[test]
    fn tool_calls_without_content_omit_it() {
        let mut message = AccumulatedMessage::new();
        message.accumulate(&tool(0, Some("call_1"), Some("read_file"), Some("{}")));
        assert_eq!(
            message.to_message(),
            Message::assistant_with_tool_calls(
                None,
                vec![ToolCall::new("call_1", "read_file", "{}")]
            )
        );
    }

    #[test]
    fn zero_choices_do_nothing() {
        let mut message = AccumulatedMessage::new();
        let empty = ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            model: "m".to_string(),
            choices: vec![],
        };
        assert!(message.accumulate(&empty).is_empty());
        assert_eq!(message, AccumulatedMessage::new());
    }

    #[test]
    fn reasoning_concatenates_and_ignores_non_text() {
        let mut message = AccumulatedMessage::new();
        for value in [
            serde_json::json!("think"),
            serde_json::json!({"tokens": 4}),
            serde_json::json!("ing"),
        ] {
            message.accumulate(&chunk(
                ChunkDelta {
                    reasoning: Some(value),
                    ..ChunkDelta::default()
                },
                None,
            ));
        }
        assert_eq!(message.reasoning(), "thinking");
        assert_eq!(message.content(), "");
    }

    #[test]
    fn reasoning_does_not_finish_content() {
        let mut message = AccumulatedMessage::new();
        message.accumulate(&text("a"));
        let finished = message.accumulate(&chunk(
            ChunkDelta {
                reasoning: Some(serde_json::json!("hmm")),
                ..ChunkDelta::default()
            },
            None,
        ));
        assert!(finished.is_empty());
        assert!(!message.content_finished());
    }

    #[tokio::test]
    async fn partial_message_survives_stream_error() {
        let chunks = vec![
            Ok(text("partial")),
            Err(Error::streaming("connection reset", None)),
        ];
        let mut acc = AccumulatingStream::new(stream::iter(chunks));
        assert!(acc.next().await.unwrap().is_ok());
        assert!(acc.next().await.unwrap().unwrap_err().is_streaming());
        assert_eq!(
            acc.finish_open_sections(),
            vec![FinishedSection::Content("partial".to_string())]
        );
        assert_eq!(acc.message().to_message(), Message::assistant("partial"));
    }
}
