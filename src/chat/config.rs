//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved configuration
//! the session runs with.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::client::DEFAULT_API_URL;
use crate::{Error, ReasoningEffort};

/// Model used when neither `--model` nor the session file names one.
pub const DEFAULT_MODEL: &str = "qwen3:1.7b";

/// Command-line arguments for aicoder.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the OpenAI-compatible API.
    #[arrrg(
        optional,
        "Base URL of the API (default: $OPENAI_URL or http://127.0.0.1:11434/v1)",
        "URL"
    )]
    pub api: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: qwen3:1.7b)", "MODEL")]
    pub model: Option<String>,

    /// Send one message, print the answer and exit.
    #[arrrg(optional, "Send a single message and exit", "TEXT")]
    pub message: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Reasoning effort for reasoning models.
    #[arrrg(optional, "Reasoning effort: none, low, medium or high", "EFFORT")]
    pub reasoning: Option<String>,

    /// Where to load and save the conversation.
    #[arrrg(optional, "Load the session from and save it to this YAML file", "PATH")]
    pub session_file: Option<String>,

    /// Let the model read and edit local files.
    #[arrrg(flag, "Enable the read_file, override_file and replace_in_file tools")]
    pub tools: bool,

    /// Log API traffic to stderr.
    #[arrrg(flag, "Log requests and streamed chunks to stderr as JSON lines")]
    pub log: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing command-line
/// arguments and the environment.  The model stays optional because a session file may
/// supply it; see [`ChatConfig::resolve_model`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the API.
    pub api_url: String,

    /// Bearer token, from `OPENAI_API_KEY`.
    pub api_key: Option<String>,

    /// The model given on the command line.
    pub model: Option<String>,

    /// One-shot message.
    pub message: Option<String>,

    /// Optional system prompt to set conversation context.
    pub system_prompt: Option<String>,

    /// The reasoning effort given on the command line.
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Session file to load at start and save after each turn.
    pub session_file: Option<PathBuf>,

    /// Whether the file tools are offered to the model.
    pub tools_enabled: bool,

    /// Whether API traffic is logged.
    pub log: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    pub fn new() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            model: None,
            message: None,
            system_prompt: None,
            reasoning_effort: None,
            session_file: None,
            tools_enabled: false,
            log: false,
            use_color: true,
        }
    }

    /// Resolve arguments against explicit environment values.
    ///
    /// `openai_url` and `openai_api_key` are the values of `OPENAI_URL` and `OPENAI_API_KEY`.
    pub fn from_args(
        args: ChatArgs,
        openai_url: Option<String>,
        openai_api_key: Option<String>,
    ) -> Result<Self, Error> {
        let reasoning_effort = args
            .reasoning
            .as_deref()
            .filter(|effort| !effort.is_empty())
            .map(str::parse::<ReasoningEffort>)
            .transpose()?;
        let api_url = args
            .api
            .or(openai_url.filter(|url| !url.is_empty()))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Ok(Self {
            api_url,
            api_key: openai_api_key.filter(|key| !key.is_empty()),
            model: args.model.filter(|model| !model.is_empty()),
            message: args.message.filter(|message| !message.is_empty()),
            system_prompt: args.system.filter(|system| !system.is_empty()),
            reasoning_effort,
            session_file: args
                .session_file
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            tools_enabled: args.tools,
            log: args.log,
            use_color: !args.no_color,
        })
    }

    /// The model to run: the flag, else the session's model, else [`DEFAULT_MODEL`].
    pub fn resolve_model(&self, from_session: &str) -> String {
        match (&self.model, from_session) {
            (Some(model), _) => model.clone(),
            (None, "") => DEFAULT_MODEL.to_string(),
            (None, session) => session.to_string(),
        }
    }

    /// The reasoning effort: the flag when given, else the session's.
    pub fn resolve_reasoning_effort(
        &self,
        from_session: Option<ReasoningEffort>,
    ) -> Option<ReasoningEffort> {
        self.reasoning_effort.or(from_session)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self, Self::Error> {
        Self::from_args(
            args,
            std::env::var("OPENAI_URL").ok(),
            std::env::var("OPENAI_API_KEY").ok(),
        )
    }
}
