//! Chat session management.
//!
//! A [`ChatSession`] owns the conversation and everything needed to run turns against it,
//! and persists the conversation after every turn when a session file is configured.

use std::path::{Path, PathBuf};

use crate::chat::config::ChatConfig;
use crate::chat::transcript::{self, SessionRecord};
use crate::client::ChatCompletions;
use crate::interrupt::Interrupt;
use crate::render::Renderer;
use crate::tools::ToolRegistry;
use crate::turn::{CompletionSettings, TurnOutcome, TurnRunner};
use crate::{Conversation, Message, ReasoningEffort, Result};

/// An interactive chat session.
pub struct ChatSession<C: ChatCompletions> {
    client: C,
    settings: CompletionSettings,
    conversation: Conversation,
    tools: ToolRegistry,
    session_file: Option<PathBuf>,
}

impl<C: ChatCompletions> ChatSession<C> {
    /// Creates a new chat session with an empty conversation and no tools.
    pub fn new(client: C, settings: CompletionSettings) -> Self {
        Self {
            client,
            settings,
            conversation: Conversation::new(),
            tools: ToolRegistry::new(),
            session_file: None,
        }
    }

    /// Open a session as configured.
    ///
    /// The conversation is resumed from the session file if it exists.  The model and
    /// reasoning effort given on the command line win over the stored ones.  A configured
    /// system prompt is appended to the conversation, resumed or not.
    pub fn open(client: C, config: &ChatConfig) -> Result<Self> {
        let record = match config.session_file.as_ref() {
            Some(path) => transcript::load(path)?,
            None => SessionRecord::default(),
        };
        let settings = CompletionSettings::new(
            config.resolve_model(&record.model),
            config.resolve_reasoning_effort(record.reasoning_effort),
        );
        let mut conversation = record.conversation;
        if let Some(system) = config.system_prompt.as_ref() {
            conversation.push(Message::system(system.clone()));
        }
        let mut session = Self::new(client, settings);
        session.conversation = conversation;
        session.session_file = config.session_file.clone();
        if config.tools_enabled {
            session.tools = ToolRegistry::with_file_tools();
        }
        Ok(session)
    }

    /// Sends a user message and runs the turn it starts.
    ///
    /// This method:
    /// 1. Arms the interrupt
    /// 2. Adds the user message to the conversation
    /// 3. Runs the turn, rendering as it streams
    /// 4. Disarms the interrupt
    /// 5. Saves the session, even if the turn failed
    ///
    /// # Errors
    ///
    /// Returns the turn's error if it failed, otherwise any error saving the session.
    pub async fn send(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
        interrupt: &Interrupt,
    ) -> Result<TurnOutcome> {
        let cancel = interrupt.arm();
        self.conversation.push(Message::user(user_input));
        let outcome = TurnRunner::new(&self.client, &self.settings, &self.tools)
            .run(&mut self.conversation, renderer, &cancel)
            .await;
        interrupt.disarm();
        let saved = self.save();
        let outcome = outcome?;
        saved?;
        Ok(outcome)
    }

    /// Save the session if a session file is configured.
    pub fn save(&self) -> Result<()> {
        match self.session_file.as_ref() {
            Some(path) => transcript::save(path, &self.record()),
            None => Ok(()),
        }
    }

    /// Snapshot of what would be persisted.
    pub fn record(&self) -> SessionRecord {
        SessionRecord::new(
            self.settings.model.clone(),
            self.settings.reasoning_effort,
            self.conversation.clone(),
        )
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub fn reasoning_effort(&self) -> Option<ReasoningEffort> {
        self.settings.reasoning_effort
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// The configured session file, if any.
    pub fn session_file(&self) -> Option<&Path> {
        self.session_file.as_deref()
    }
}
