//! YAML session files.
//!
//! A session file holds the model, the reasoning effort and the whole conversation, so a
//! later run with the same `--session-file` picks up where the last one stopped.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Conversation, Error, Message, ReasoningEffort, Result, ToolCall};

/// Everything persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SessionFile", try_from = "SessionFile")]
pub struct SessionRecord {
    /// Model identifier; empty when the record never named one.
    pub model: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub conversation: Conversation,
}

impl SessionRecord {
    pub fn new(
        model: impl Into<String>,
        reasoning_effort: Option<ReasoningEffort>,
        conversation: Conversation,
    ) -> Self {
        Self {
            model: model.into(),
            reasoning_effort,
            conversation,
        }
    }
}

/// Load a session.  A missing file yields the default record.
pub fn load<P: AsRef<Path>>(path: P) -> Result<SessionRecord> {
    let path = path.as_ref();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SessionRecord::default());
        }
        Err(err) => {
            return Err(Error::io(
                format!("failed to read session file {}", path.display()),
                err,
            ));
        }
    };
    if text.trim().is_empty() {
        return Ok(SessionRecord::default());
    }
    serde_yaml::from_str(&text).map_err(|err| {
        Error::serialization(
            format!("failed to parse session file {}: {err}", path.display()),
            Some(Box::new(err)),
        )
    })
}

/// Save a session, replacing the file.  New files get mode 0640.
pub fn save<P: AsRef<Path>>(path: P, record: &SessionRecord) -> Result<()> {
    let path = path.as_ref();
    let yaml = serde_yaml::to_string(record).map_err(|err| {
        Error::serialization("failed to serialize session", Some(Box::new(err)))
    })?;
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o640);
    }
    let mut file = options.open(path).map_err(|err| {
        Error::io(
            format!("failed to create session file {}", path.display()),
            err,
        )
    })?;
    file.write_all(yaml.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|err| {
            Error::io(
                format!("failed to write session file {}", path.display()),
                err,
            )
        })
}

/////////////////////////////////////////// file format ///////////////////////////////////////////

#[derive(Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    model: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    messages: Vec<SessionMessage>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
}

#[derive(Serialize, Deserialize)]
struct SessionMessage {
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<SessionToolCall>,
}

#[derive(Serialize, Deserialize)]
struct SessionToolCall {
    id: String,
    name: String,
    #[serde(default)]
    arguments: String,
}

impl SessionMessage {
    fn with_content(role: Role, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            refusal: None,
            tool_call_id: None,
            tool_calls: vec![],
        }
    }
}

impl From<Message> for SessionMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::System { content } => Self::with_content(Role::System, content),
            Message::Developer { content } => Self::with_content(Role::Developer, content),
            Message::User { content } => Self::with_content(Role::User, content),
            Message::Assistant {
                content,
                refusal,
                tool_calls,
            } => Self {
                role: Role::Assistant,
                content,
                refusal,
                tool_call_id: None,
                tool_calls: tool_calls
                    .into_iter()
                    .map(|call| SessionToolCall {
                        id: call.id,
                        name: call.name,
                        arguments: call.arguments,
                    })
                    .collect(),
            },
            Message::Tool {
                content,
                tool_call_id,
            } => Self {
                tool_call_id: Some(tool_call_id),
                ..Self::with_content(Role::Tool, content)
            },
        }
    }
}

impl From<SessionMessage> for Message {
    fn from(message: SessionMessage) -> Self {
        let SessionMessage {
            role,
            content,
            refusal,
            tool_call_id,
            tool_calls,
        } = message;
        match role {
            Role::System => Message::system(content.unwrap_or_default()),
            Role::Developer => Message::developer(content.unwrap_or_default()),
            Role::User => Message::user(content.unwrap_or_default()),
            Role::Assistant => Message::Assistant {
                content,
                refusal,
                tool_calls: tool_calls
                    .into_iter()
                    .map(|call| ToolCall::new(call.id, call.name, call.arguments))
                    .collect(),
            },
            Role::Tool => Message::tool(
                content.unwrap_or_default(),
                tool_call_id.unwrap_or_default(),
            ),
        }
    }
}

impl From<SessionRecord> for SessionFile {
    fn from(record: SessionRecord) -> Self {
        Self {
            model: record.model,
            reasoning: record
                .reasoning_effort
                .map(|effort| effort.to_string())
                .unwrap_or_default(),
            messages: record
                .conversation
                .into_messages()
                .into_iter()
                .map(SessionMessage::from)
                .collect(),
        }
    }
}

impl TryFrom<SessionFile> for SessionRecord {
    type Error = Error;

    fn try_from(file: SessionFile) -> Result<Self> {
        let reasoning_effort = match file.reasoning.as_str() {
            "" => None,
            effort => Some(effort.parse()?),
        };
        let conversation = file
            .messages
            .into_iter()
            .map(Message::from)
            .collect::<Vec<_>>()
            .into();
        Ok(Self {
            model: file.model,
            reasoning_effort,
            conversation,
        })
    }
}
