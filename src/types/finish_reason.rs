use serde::{Deserialize, Serialize};

/// Why the model stopped producing a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model reached a natural stopping point or a stop sequence.
    Stop,
    /// The token limit was reached.
    Length,
    /// The model asked for tools to be run.
    ToolCalls,
    /// Content was withheld by a content filter.
    ContentFilter,
    /// Deprecated single-function calling.
    FunctionCall,
    /// A reason this client does not know about.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown() {
        let reason: FinishReason = serde_json::from_str("\"tool_calls\"").unwrap();
        assert_eq!(reason, FinishReason::ToolCalls);
        let reason: FinishReason = serde_json::from_str("\"eos\"").unwrap();
        assert_eq!(reason, FinishReason::Unknown);
    }
}
