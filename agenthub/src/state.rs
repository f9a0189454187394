//! Shared application state.
//!
//! Everything a front end reads lives here behind async locks. Mutations go
//! through the methods below so each logical update takes one lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::{Agent, KnowledgeBase, Message, Task};
use crate::session::SessionManager;
use crate::store::{MessageStore, TaskBoard};
use crate::stream::ChatEvent;

/// Source of the published-agent list.
#[async_trait]
pub trait AgentCatalog: Send + Sync {
    async fn published_agents(&self, name: Option<&str>) -> Result<Vec<Agent>>;
}

#[async_trait]
impl AgentCatalog for ApiClient {
    async fn published_agents(&self, name: Option<&str>) -> Result<Vec<Agent>> {
        Self::published_agents(self, name).await
    }
}

/// Message logs and task boards, locked together so a stream event updates
/// both atomically.
#[derive(Debug, Default)]
pub struct Conversations {
    pub messages: MessageStore,
    pub tasks: TaskBoard,
}

impl Conversations {
    /// Apply one stream event. Text is merged into the streaming reply;
    /// typed events become their own messages and drive the task board.
    pub fn apply_event(&mut self, session_id: &str, event: &ChatEvent) {
        if event.is_text() {
            if let Some(text) = event.content.as_deref().filter(|t| !t.is_empty()) {
                self.messages.append_fragment(session_id, text);
            }
            return;
        }

        let Some(kind) = event.message_type else {
            return;
        };
        let message = Message::assistant(session_id, event.text())
            .with_type(kind)
            .with_task(event.task_id.clone(), event.task_name.clone());
        if kind.is_task() {
            self.tasks.apply(session_id, &message);
        }
        self.messages.append(session_id, message);
    }
}

pub struct AppState {
    pub sessions: SessionManager,
    catalog: Arc<dyn AgentCatalog>,
    conversations: Mutex<Conversations>,
    agents: RwLock<Vec<Agent>>,
    knowledge: RwLock<HashMap<String, KnowledgeBase>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(sessions: SessionManager, catalog: Arc<dyn AgentCatalog>) -> Self {
        Self {
            sessions,
            catalog,
            conversations: Mutex::new(Conversations::default()),
            agents: RwLock::new(Vec::new()),
            knowledge: RwLock::new(HashMap::new()),
        }
    }

    // --- conversations ---

    pub async fn append_message(&self, session_id: &str, message: Message) {
        self.conversations.lock().await.messages.append(session_id, message);
    }

    pub async fn apply_event(&self, session_id: &str, event: &ChatEvent) {
        self.conversations.lock().await.apply_event(session_id, event);
    }

    pub async fn finish_stream(&self, session_id: &str) {
        self.conversations.lock().await.messages.finish_stream(session_id);
    }

    /// Snapshot of a session's log.
    pub async fn messages(&self, session_id: &str) -> Vec<Message> {
        self.conversations.lock().await.messages.messages(session_id).to_vec()
    }

    pub async fn tasks(&self, session_id: &str) -> Vec<Task> {
        self.conversations.lock().await.tasks.tasks(session_id).to_vec()
    }

    /// Fetch stored history and install it unless a reply is streaming.
    pub async fn load_history(&self, session_id: &str) -> Vec<Message> {
        let history = self.sessions.load_history(session_id).await;
        let mut conversations = self.conversations.lock().await;
        if !conversations
            .messages
            .replace_history(session_id, history)
        {
            debug!(session_id, "history load skipped while streaming");
        }
        conversations.messages.messages(session_id).to_vec()
    }

    /// Delete a session remotely and drop everything held for it.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.delete_session(session_id).await?;
        let mut conversations = self.conversations.lock().await;
        conversations.messages.remove_session(session_id);
        conversations.tasks.remove_session(session_id);
        Ok(())
    }

    // --- agent catalog ---

    /// Refresh the published-agent list. A failure is logged, the cached
    /// list is kept and an empty list returned.
    ///
    /// The name filter is applied here as well, since not every backend
    /// honours it.
    pub async fn refresh_agents(&self, name: Option<&str>) -> Vec<Agent> {
        match self.catalog.published_agents(name).await {
            Ok(mut agents) => {
                if let Some(filter) = name {
                    agents.retain(|a| a.matches_name(filter));
                }
                debug!(count = agents.len(), "published agents loaded");
                self.agents.write().await.clone_from(&agents);
                agents
            }
            Err(err) => {
                warn!(error = %err, "failed to load published agents");
                Vec::new()
            }
        }
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.agents.read().await.clone()
    }

    pub async fn find_agent(&self, id_or_name: &str) -> Option<Agent> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.id == id_or_name || a.name.eq_ignore_ascii_case(id_or_name))
            .cloned()
    }

    // --- knowledge bases ---

    /// Chunk `text` into knowledge base `kb`, creating it if needed.
    /// Returns the chunk count of the new document.
    pub async fn add_document(&self, kb: &str, name: &str, text: &str, max_chars: usize) -> usize {
        let mut knowledge = self.knowledge.write().await;
        let base = knowledge
            .entry(kb.to_string())
            .or_insert_with(|| KnowledgeBase::new(kb));
        let doc = base.add_document(name, text, max_chars);
        debug!(kb, document = name, tokens = doc.token_count(), "document added");
        doc.chunks.len()
    }

    pub async fn knowledge_base(&self, kb: &str) -> Option<KnowledgeBase> {
        self.knowledge.read().await.get(kb).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageRole, MessageType, TaskStatus};
    use crate::error::Error;
    use crate::stream::SseEvent;

    fn state() -> AppState {
        let api = Arc::new(ApiClient::with_client(reqwest::Client::new(), "http://127.0.0.1:9/api"));
        AppState::new(SessionManager::new(api.clone()), api)
    }

    /// Catalog that ignores the name filter, or fails when empty.
    struct FixedCatalog(Vec<Agent>);

    #[async_trait]
    impl AgentCatalog for FixedCatalog {
        async fn published_agents(&self, _name: Option<&str>) -> Result<Vec<Agent>> {
            if self.0.is_empty() {
                return Err(Error::Application {
                    code: 500,
                    message: "catalog offline".to_string(),
                });
            }
            Ok(self.0.clone())
        }
    }

    fn with_catalog(agents: Vec<Agent>) -> AppState {
        let api = Arc::new(ApiClient::with_client(reqwest::Client::new(), "http://127.0.0.1:9/api"));
        AppState::new(SessionManager::new(api), Arc::new(FixedCatalog(agents)))
    }

    fn agent(id: &str, name: &str) -> Agent {
        Agent::from_value(&serde_json::json!({"id": id, "name": name})).unwrap()
    }

    fn event(data: &str) -> ChatEvent {
        ChatEvent::parse(SseEvent::data(data))
    }

    #[tokio::test]
    async fn text_and_task_events_interleave() {
        let state = state();
        state.apply_event("s", &event(r#"{"content":"Looking"}"#)).await;
        state
            .apply_event(
                "s",
                &event(r#"{"content":"","messageType":"TASK_SPLIT","taskId":"t1","taskName":"search"}"#),
            )
            .await;
        state
            .apply_event("s", &event(r#"{"messageType":"TASK_STATUS_TO_LOADING","taskId":"t1"}"#))
            .await;
        state.apply_event("s", &event(r#"{"content":" done"}"#)).await;
        state.finish_stream("s").await;

        let log = state.messages("s").await;
        assert_eq!(log.len(), 4);
        assert_eq!(log[0].content, "Looking");
        assert_eq!(log[1].message_type, Some(MessageType::TaskSplit));
        assert_eq!(log[3].content, " done");
        assert_eq!(log[3].role, MessageRole::Assistant);

        let tasks = state.tasks("s").await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Loading);
    }

    #[tokio::test]
    async fn knowledge_bases_are_created_on_demand() {
        let state = state();
        let chunks = state
            .add_document("docs", "a.md", "first paragraph\n\nsecond paragraph", 16)
            .await;
        assert_eq!(chunks, 2);
        assert_eq!(state.knowledge_base("docs").await.unwrap().chunk_count(), 2);
        assert!(state.knowledge_base("missing").await.is_none());
    }

    #[tokio::test]
    async fn agent_refresh_failure_keeps_cache() {
        let state = state();
        assert!(state.refresh_agents(None).await.is_empty());
        assert!(state.agents().await.is_empty());
    }

    #[tokio::test]
    async fn agents_come_from_the_injected_catalog() {
        let state = with_catalog(vec![agent("a1", "Security Auditor"), agent("a2", "Finance Bot")]);

        assert_eq!(state.refresh_agents(None).await.len(), 2);
        let filtered = state.refresh_agents(Some("security")).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a1");
        assert_eq!(state.agents().await, filtered);
        assert_eq!(state.find_agent("finance bot").await, None);
    }

    #[tokio::test]
    async fn catalog_failure_keeps_previous_agents() {
        let state = with_catalog(Vec::new());
        assert!(state.refresh_agents(None).await.is_empty());
        assert!(state.agents().await.is_empty());
    }
}
