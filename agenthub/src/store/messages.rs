//! Per-session message logs, including the in-progress assistant reply.

use std::collections::HashMap;

use crate::models::{Message, MessageRole};

/// Ordered message logs keyed by session id.
///
/// At most one assistant message per session is "streaming"; fragments are
/// merged into it until [`MessageStore::finish_stream`] is called.
#[derive(Debug, Default)]
pub struct MessageStore {
    logs: HashMap<String, Vec<Message>>,
    /// session id -> id of the message currently receiving fragments
    streaming: HashMap<String, String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `message` at the end of the session's log.
    pub fn append(&mut self, session_id: &str, mut message: Message) {
        if message.session_id.is_empty() {
            message.session_id = session_id.to_string();
        }
        self.logs
            .entry(session_id.to_string())
            .or_default()
            .push(message);
    }

    /// Merge a streamed fragment into the in-progress assistant message,
    /// starting one if there is none. Returns the id of the message that
    /// received the fragment.
    pub fn append_fragment(&mut self, session_id: &str, fragment: &str) -> String {
        let log = self.logs.entry(session_id.to_string()).or_default();
        let marker = self.streaming.get(session_id);

        if let Some(last) = log.last_mut() {
            if marker == Some(&last.id) && last.role == MessageRole::Assistant {
                last.content.push_str(fragment);
                return last.id.clone();
            }
        }

        let message = Message::assistant(session_id, fragment);
        let id = message.id.clone();
        log.push(message);
        self.streaming.insert(session_id.to_string(), id.clone());
        id
    }

    /// End the in-progress state; the next fragment starts a new message.
    pub fn finish_stream(&mut self, session_id: &str) {
        self.streaming.remove(session_id);
    }

    pub fn is_streaming(&self, session_id: &str) -> bool {
        self.streaming.contains_key(session_id)
    }

    /// The whole log, oldest first.
    pub fn messages(&self, session_id: &str) -> &[Message] {
        self.logs.get(session_id).map_or(&[], Vec::as_slice)
    }

    /// Forget a session entirely.
    pub fn remove_session(&mut self, session_id: &str) {
        self.logs.remove(session_id);
        self.streaming.remove(session_id);
    }

    /// Replace the log with history loaded from the backend.
    ///
    /// Ignored while a reply is streaming so the partial answer is not lost.
    /// Returns whether the log was replaced.
    pub fn replace_history(&mut self, session_id: &str, history: Vec<Message>) -> bool {
        if self.is_streaming(session_id) {
            return false;
        }
        self.logs.insert(session_id.to_string(), history);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_merge_into_one_message() {
        let mut store = MessageStore::new();
        store.append("s", Message::user("s", "hi"));
        store.append_fragment("s", "Hel");
        store.append_fragment("s", "lo");

        let log = store.messages("s");
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].role, MessageRole::Assistant);
        assert_eq!(log[1].content, "Hello");
    }

    #[test]
    fn finished_stream_starts_new_message() {
        let mut store = MessageStore::new();
        store.append_fragment("s", "one");
        store.finish_stream("s");
        store.append_fragment("s", "two");

        let contents: Vec<&str> = store.messages("s").iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[test]
    fn fragment_after_other_message_starts_new_one() {
        let mut store = MessageStore::new();
        store.append_fragment("s", "partial");
        store.append("s", Message::system("s", "task started"));
        store.append_fragment("s", "more");

        let log = store.messages("s");
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].content, "more");
    }

    #[test]
    fn existing_assistant_message_is_not_reused() {
        let mut store = MessageStore::new();
        store.append("s", Message::assistant("s", "old answer"));
        store.append_fragment("s", "new");
        assert_eq!(store.messages("s").len(), 2);
        assert_eq!(store.messages("s")[0].content, "old answer");
    }

    #[test]
    fn sessions_are_independent() {
        let mut store = MessageStore::new();
        store.append_fragment("a", "x");
        store.append_fragment("b", "y");
        store.append_fragment("a", "z");
        assert_eq!(store.messages("a").last().unwrap().content, "xz");
        assert_eq!(store.messages("b").last().unwrap().content, "y");
        assert!(store.messages("c").is_empty());
    }

    #[test]
    fn history_does_not_clobber_stream() {
        let mut store = MessageStore::new();
        store.append_fragment("s", "live");
        assert!(!store.replace_history("s", vec![Message::user("s", "old")]));
        assert_eq!(store.messages("s").last().unwrap().content, "live");

        store.finish_stream("s");
        assert!(store.replace_history("s", vec![Message::user("s", "old")]));
        assert_eq!(store.messages("s").len(), 1);

        store.remove_session("s");
        assert!(store.messages("s").is_empty());
    }
}
