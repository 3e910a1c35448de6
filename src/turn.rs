use std::time::Instant;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::accumulating_stream::{AccumulatingStream, FinishedSection};
use crate::client::{ChatCompletions, ChunkStream};
use crate::observability::{STREAM_DURATION, STREAM_INTERRUPTS, TURN_DURATION, TURN_ROUNDS};
use crate::render::Renderer;
use crate::tools::ToolRegistry;
use crate::{ChatCompletionRequest, Conversation, Message, ReasoningEffort, Result};

/// Model and reasoning effort for each request of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSettings {
    pub model: String,
    pub reasoning_effort: Option<ReasoningEffort>,
}

impl CompletionSettings {
    pub fn new(model: impl Into<String>, reasoning_effort: Option<ReasoningEffort>) -> Self {
        Self {
            model: model.into(),
            reasoning_effort,
        }
    }
}

/// What happened during one user turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Completion requests issued.
    pub requests: usize,
    /// Tool calls that found a handler and ran.
    pub tool_calls: usize,
    /// True if the user interrupted a stream.
    pub interrupted: bool,
}

/// Drives one user turn: stream, run tools, repeat until the model stops calling tools.
pub struct TurnRunner<'a> {
    client: &'a dyn ChatCompletions,
    settings: &'a CompletionSettings,
    tools: &'a ToolRegistry,
}

impl<'a> TurnRunner<'a> {
    pub fn new(
        client: &'a dyn ChatCompletions,
        settings: &'a CompletionSettings,
        tools: &'a ToolRegistry,
    ) -> Self {
        Self {
            client,
            settings,
            tools,
        }
    }

    fn request(&self, conversation: &Conversation) -> ChatCompletionRequest {
        ChatCompletionRequest::new(&self.settings.model, conversation.messages().to_vec())
            .with_reasoning_effort(self.settings.reasoning_effort)
            .with_tools(self.tools.definitions())
    }

    /// Run the turn.  The user's message must already be in `conversation`.
    ///
    /// Each assistant message and each tool message is appended as soon as it exists, so
    /// the conversation is consistent even when this returns an error.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let start = Instant::now();
        let mut outcome = TurnOutcome::default();
        loop {
            TURN_ROUNDS.click();
            outcome.requests += 1;
            let (message, interrupted) = self.stream_once(conversation, renderer, cancel).await?;
            let tool_calls = message.tool_calls().to_vec();
            conversation.push(message);

            for call in tool_calls.iter() {
                match self.tools.dispatch(call) {
                    Some(response) => {
                        outcome.tool_calls += 1;
                        renderer.start_tool_result(call, response.is_error);
                        renderer.print_tool_result_text(response.content());
                        renderer.finish_tool_result();
                        conversation.push(response.message);
                    }
                    None => renderer.print_missing_tool(call),
                }
            }

            if interrupted || cancel.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            if tool_calls.is_empty() {
                break;
            }
        }
        renderer.finish_response();
        TURN_DURATION.add(start.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// Stream one response and return the assistant message and whether it was interrupted.
    async fn stream_once(
        &self,
        conversation: &Conversation,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<(Message, bool)> {
        let start = Instant::now();
        let request = self.request(conversation);
        // Waiting for response headers can take a while, e.g. while a model loads.
        let chunks = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            chunks = self.client.stream(&request) => Some(chunks),
        };
        let mut interrupted = chunks.is_none();
        let chunks: ChunkStream = match chunks.transpose()? {
            Some(chunks) => chunks,
            None => Box::pin(stream::empty()),
        };
        let mut stream = AccumulatingStream::new(chunks);
        while !interrupted {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                event = stream.next() => event,
            };
            let Some(event) = event else {
                break;
            };
            let event = event?;
            if let Some(choice) = event.chunk.first_choice() {
                if let Some(reasoning) = choice.delta.reasoning_text() {
                    renderer.print_reasoning(reasoning);
                }
                if let Some(content) = choice.delta.content.as_deref() {
                    renderer.print_text(content);
                }
            }
            render_finished(renderer, &event.finished);
        }
        if interrupted {
            STREAM_INTERRUPTS.click();
            renderer.print_interrupted();
        }
        let finished = stream.finish_open_sections();
        render_finished(renderer, &finished);
        STREAM_DURATION.add(start.elapsed().as_secs_f64());

        let message = stream.into_message().to_message();
        if let Some(logger) = self.client.logger() {
            logger.log_stream_message(&message);
        }
        Ok((message, interrupted))
    }
}

fn render_finished(renderer: &mut dyn Renderer, finished: &[FinishedSection]) {
    for section in finished {
        match section {
            FinishedSection::Content(content) => renderer.finish_content(content),
            FinishedSection::Refusal(refusal) => renderer.finish_refusal(refusal),
            FinishedSection::ToolCall { index, call } => renderer.finish_tool_call(*index, call),
        }
    }
}
