use serde::{Deserialize, Serialize};

use crate::FinishReason;

/// One server-sent chunk of a streamed chat completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Identifier shared by every chunk of one completion.
    #[serde(default)]
    pub id: String,
    /// The model that produced the chunk.
    #[serde(default)]
    pub model: String,
    /// Choice deltas.  May be empty, e.g. for usage-only chunks.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// The delta of the choice at index 0, if this chunk carries one.
    pub fn first_choice(&self) -> Option<&ChunkChoice> {
        self.choices.iter().find(|choice| choice.index == 0)
    }
}

/// The delta of a single choice within a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Index of the choice this delta belongs to.
    #[serde(default)]
    pub index: u32,
    /// The incremental content.
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Set on the final chunk of the choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Incremental fields of an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
    /// Reasoning text as sent by Ollama and vLLM.  Kept as a raw value because servers
    /// disagree on its shape; only strings are treated as text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<serde_json::Value>,
    /// Reasoning text as sent by DeepSeek-style servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<serde_json::Value>,
}

impl ChunkDelta {
    /// The reasoning fragment carried by this delta, if it is text.
    pub fn reasoning_text(&self) -> Option<&str> {
        self.reasoning
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .or_else(|| {
                self.reasoning_content
                    .as_ref()
                    .and_then(serde_json::Value::as_str)
            })
    }
}

/// A fragment of one tool call, identified by its index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the tool call within the message.
    #[serde(default)]
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

/// A fragment of a function name and its arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
