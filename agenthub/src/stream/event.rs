//! Interpretation of chat stream events.
//!
//! The relay passes SSE frames through untouched; this module reads the
//! backend's payload conventions out of them. Payloads are usually JSON
//! objects (`content`, `messageType`, `taskId`, `taskName`, `done`), but
//! plain-text data is accepted as content and `[DONE]` marks the end.

use serde_json::Value;

use super::sse::SseEvent;
use crate::models::MessageType;

const DONE_SENTINEL: &str = "[DONE]";
const DONE_EVENTS: &[&str] = &["done", "end", "complete", "finish"];
const ERROR_EVENT: &str = "error";

/// A parsed chat stream event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEvent {
    /// Text carried by this event, if any.
    pub content: Option<String>,
    /// Structured sub-type.
    pub message_type: Option<MessageType>,
    /// Sub-task id for task events.
    pub task_id: Option<String>,
    /// Sub-task display name.
    pub task_name: Option<String>,
    /// Session the backend attributes this event to.
    pub session_id: Option<String>,
    /// The backend signalled the end of the reply.
    pub done: bool,
    /// Error reported inside the stream.
    pub error: Option<String>,
    /// The frame as received.
    pub raw: SseEvent,
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(String::from)
}

impl ChatEvent {
    /// Interpret an SSE frame.
    pub fn parse(raw: SseEvent) -> Self {
        let mut event = Self {
            content: None,
            message_type: None,
            task_id: None,
            task_name: None,
            session_id: None,
            done: DONE_EVENTS.contains(&raw.name()),
            error: None,
            raw,
        };

        let data = event.raw.data.trim();
        if data == DONE_SENTINEL {
            event.done = true;
            return event;
        }

        if event.raw.name() == ERROR_EVENT {
            event.error = Some(error_text(data));
            return event;
        }

        match serde_json::from_str::<Value>(data) {
            Ok(value @ Value::Object(_)) => event.fill_from_object(&value),
            Ok(Value::String(s)) => event.content = Some(s),
            _ => {
                // Plain text; keep the untrimmed data so spacing between
                // fragments survives.
                if !event.raw.data.is_empty() && !event.done {
                    event.content = Some(event.raw.data.clone());
                }
            }
        }

        event
    }

    fn fill_from_object(&mut self, value: &Value) {
        self.content = str_field(value, &["content", "text", "delta"]).or_else(|| {
            // OpenAI-style `choices[0].delta.content`
            value
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .map(String::from)
        });
        self.message_type = str_field(value, &["messageType", "message_type"])
            .as_deref()
            .and_then(MessageType::parse);
        self.task_id = str_field(value, &["taskId", "task_id"]);
        self.task_name = str_field(value, &["taskName", "task_name"]);
        self.session_id = str_field(value, &["sessionId", "session_id"]);

        let flagged_done = ["done", "isDone", "finished"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_bool))
            .unwrap_or(false);
        self.done = self.done || flagged_done;

        if let Some(err) = str_field(value, &["error", "errorMessage"]) {
            self.error = Some(err);
        }
    }

    /// Plain text to be merged into the streaming assistant message.
    pub fn is_text(&self) -> bool {
        matches!(self.message_type, None | Some(MessageType::Text))
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Content, or empty when the event carries none.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

fn error_text(data: &str) -> String {
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| str_field(&v, &["message", "error", "errorMessage"]))
        .unwrap_or_else(|| {
            if data.is_empty() {
                "stream error".to_string()
            } else {
                data.to_string()
            }
        })
}
