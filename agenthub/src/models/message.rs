//! Message model representing one entry in a session's conversation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::timestamp;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the assistant.
    Assistant,
    /// System message.
    System,
}

impl MessageRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse a role name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" | "agent" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured sub-type carried by agent output.
///
/// Plain text is `Text`; the task variants report progress on a sub-task
/// identified by the message's `task_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    ToolCall,
    TaskExec,
    TaskStatusToLoading,
    TaskStatusToFinish,
    TaskSplit,
    TaskSplitFinish,
}

impl MessageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::ToolCall => "TOOL_CALL",
            Self::TaskExec => "TASK_EXEC",
            Self::TaskStatusToLoading => "TASK_STATUS_TO_LOADING",
            Self::TaskStatusToFinish => "TASK_STATUS_TO_FINISH",
            Self::TaskSplit => "TASK_SPLIT",
            Self::TaskSplitFinish => "TASK_SPLIT_FINISH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(Self::Text),
            "TOOL_CALL" => Some(Self::ToolCall),
            "TASK_EXEC" => Some(Self::TaskExec),
            "TASK_STATUS_TO_LOADING" => Some(Self::TaskStatusToLoading),
            "TASK_STATUS_TO_FINISH" => Some(Self::TaskStatusToFinish),
            "TASK_SPLIT" => Some(Self::TaskSplit),
            "TASK_SPLIT_FINISH" => Some(Self::TaskSplitFinish),
            _ => None,
        }
    }

    /// Whether this type reports on a sub-task.
    pub const fn is_task(self) -> bool {
        !matches!(self, Self::Text | Self::ToolCall)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in a session's conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier for the message.
    #[serde(default = "generate_id")]
    pub id: String,
    /// Session this message belongs to.
    #[serde(default, alias = "session_id")]
    pub session_id: String,
    /// Role of the message sender.
    #[serde(deserialize_with = "deserialize_role")]
    pub role: MessageRole,
    /// Content of the message. Partial while an assistant reply is streaming.
    #[serde(default)]
    pub content: String,
    /// When the message was created.
    #[serde(
        alias = "created_at",
        default = "Utc::now",
        deserialize_with = "timestamp::deserialize"
    )]
    pub created_at: DateTime<Utc>,
    /// Structured sub-type, if any.
    #[serde(default, alias = "message_type", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,
    /// Sub-task this message reports on.
    #[serde(default, alias = "task_id", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Display name of that sub-task.
    #[serde(default, alias = "task_name", skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
}

fn deserialize_role<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MessageRole, D::Error> {
    let raw = String::deserialize(deserializer)?;
    MessageRole::parse(&raw)
        .ok_or_else(|| serde::de::Error::unknown_variant(&raw, &["user", "assistant", "system"]))
}

fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

impl Message {
    /// Create a new message with a fresh id.
    pub fn new(session_id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            message_type: None,
            task_id: None,
            task_name: None,
        }
    }

    pub fn user(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::User, content)
    }

    pub fn assistant(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::Assistant, content)
    }

    pub fn system(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(session_id, MessageRole::System, content)
    }

    /// Tag the message with a structured sub-type.
    #[must_use]
    pub const fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Attach the sub-task this message reports on.
    #[must_use]
    pub fn with_task(mut self, task_id: Option<String>, task_name: Option<String>) -> Self {
        self.task_id = task_id;
        self.task_name = task_name;
        self
    }

    /// Plain assistant text (no sub-type or explicit `TEXT`).
    pub fn is_plain_text(&self) -> bool {
        matches!(self.message_type, None | Some(MessageType::Text))
    }
}
