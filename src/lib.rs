// Lets `#[derive(JsonSchema)]` refer to `::aicoder` from inside this crate.
extern crate self as aicoder;

// Public modules
pub mod accumulating_stream;
pub mod chat;
pub mod client;
pub mod client_logger;
pub mod error;
pub mod interrupt;
pub mod json_schema;
pub mod observability;
pub mod render;
pub mod sse;
pub mod tools;
pub mod turn;
pub mod types;

// Re-exports
pub use accumulating_stream::{
    AccumulatedMessage, AccumulatingStream, FinishedSection, StreamEvent,
};
pub use aicoder_derive::JsonSchema;
pub use client::{ChatCompletions, ChunkStream, DEFAULT_API_URL, OpenAi};
pub use client_logger::{ClientLogger, DebugLogger};
pub use error::{Error, Result};
pub use interrupt::Interrupt;
pub use json_schema::JsonSchema;
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use tools::{
    OverrideFile, ReadFile, ReplaceInFile, Tool, ToolRegistry, ToolResponse,
};
pub use turn::{CompletionSettings, TurnOutcome, TurnRunner};
pub use types::*;
