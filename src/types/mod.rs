// Public modules
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod finish_reason;
pub mod message;
pub mod reasoning_effort;

// Re-exports
pub use chat_completion_chunk::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, FunctionDelta, ToolCallDelta,
};
pub use chat_completion_request::{
    ChatCompletionRequest, FunctionDefinition, ToolDefinition, ToolKind,
};
pub use finish_reason::FinishReason;
pub use message::{Conversation, Message, ToolCall};
pub use reasoning_effort::ReasoningEffort;
