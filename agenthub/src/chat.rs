//! Chat orchestration: send a message, pump the reply into the store.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{KnowledgeBase, Message};
use crate::retrieval::answer_with_latency;
use crate::state::AppState;
use crate::stream::{ChatEvent, ChatStream, StreamRelay};

/// How a streamed reply ended. Partial content is kept in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The backend finished the reply.
    Completed,
    /// The caller aborted.
    Aborted,
    /// The stream broke or the backend reported an error.
    Failed(String),
}

/// Sends messages and feeds replies into [`AppState`].
#[derive(Debug, Clone)]
pub struct ChatService {
    state: Arc<AppState>,
    relay: StreamRelay,
    retrieval_latency: Duration,
}

impl ChatService {
    pub const fn new(state: Arc<AppState>, relay: StreamRelay, retrieval_latency: Duration) -> Self {
        Self {
            state,
            relay,
            retrieval_latency,
        }
    }

    /// Send `text` to the active session of `agent_id` (creating one if
    /// needed) and stream the reply until it ends or `cancel` fires.
    ///
    /// A connection failure is recorded as a system message and returned
    /// as an error; the stream is never retried.
    pub async fn send(&self, agent_id: &str, text: &str, cancel: &CancellationToken) -> Result<ChatOutcome> {
        let session = self.state.sessions.ensure_active(agent_id).await?;
        let session_id = session.id.as_str();

        self.state
            .append_message(session_id, Message::user(session_id, text))
            .await;

        let stream = match self.relay.open(session_id, text).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(session_id, error = %err, "could not open chat stream");
                self.state
                    .append_message(
                        session_id,
                        Message::system(session_id, format!("Failed to reach the agent: {err}")),
                    )
                    .await;
                return Err(err);
            }
        };

        let outcome = pump(stream, &self.state, session_id, cancel).await;
        info!(session_id, ?outcome, "chat reply finished");
        Ok(outcome)
    }

    /// Answer `query` from `kb` without the backend and record the
    /// exchange in `session_id`'s log.
    pub async fn ask_knowledge_base(&self, session_id: &str, kb: &KnowledgeBase, query: &str) -> String {
        self.state
            .append_message(session_id, Message::user(session_id, query))
            .await;
        let answer = answer_with_latency(kb, query, self.retrieval_latency).await;
        self.state
            .append_message(session_id, Message::assistant(session_id, answer.clone()))
            .await;
        answer
    }
}

/// Drain `stream` into `state` for `session_id`.
///
/// Each event is applied under one lock acquisition. The streaming marker
/// is cleared however the loop ends.
pub async fn pump(
    mut stream: ChatStream,
    state: &AppState,
    session_id: &str,
    cancel: &CancellationToken,
) -> ChatOutcome {
    let mut events = 0usize;

    let outcome = loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stream.abort();
                break ChatOutcome::Aborted;
            }
            item = stream.next() => item,
        };

        let Some(item) = item else {
            // closed without an explicit end marker
            break if stream.is_aborted() {
                ChatOutcome::Aborted
            } else {
                ChatOutcome::Completed
            };
        };

        let event = match item {
            Ok(raw) => ChatEvent::parse(raw),
            Err(err) => break ChatOutcome::Failed(err.to_string()),
        };
        events += 1;

        // text carried alongside an error is still kept
        state.apply_event(session_id, &event).await;
        if let Some(error) = &event.error {
            break ChatOutcome::Failed(error.clone());
        }
        if event.is_done() {
            break ChatOutcome::Completed;
        }
    };

    state.finish_stream(session_id).await;
    debug!(session_id, events, ?outcome, "stream pump stopped");
    outcome
}
