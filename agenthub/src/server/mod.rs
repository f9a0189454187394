//! In-memory agent backend.
//!
//! Serves the same REST and SSE surface the client talks to, so the CLI
//! and the tests can run without a real deployment.
//!
//! Endpoints (under `/api`):
//! - GET /agent/session/{agentId}?archived= - List sessions
//! - POST /agent/session/{agentId} - Create a session
//! - PUT /agent/session/{sessionId}?title=&archived= - Update a session
//! - DELETE /agent/session/{sessionId} - Delete a session
//! - GET /agent/session/{sessionId}/messages - Session history
//! - POST /agent/session/chat - Stream a reply as SSE
//! - GET /agents/published?name= - Published agents

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::Envelope;
use crate::models::{Message, MessageType, Session};

/// Default port for `agenthub serve`.
pub const DEFAULT_PORT: u16 = 58240;

/// Envelope `code` for a missing session.
const NOT_FOUND_CODE: i64 = 404;

/// Shared server state.
pub struct ServerState {
    sessions: RwLock<Vec<Session>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
    /// Agents in the raw shape the backend publishes them in.
    agents: Vec<Value>,
    /// Pause between streamed fragments.
    reply_delay: Duration,
}

impl ServerState {
    pub fn new(reply_delay: Duration) -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
            messages: RwLock::new(HashMap::new()),
            agents: demo_agents(),
            reply_delay,
        }
    }

    async fn record(&self, session_id: &str, message: Message) {
        self.messages
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message);

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) {
            session.updated_at = Utc::now();
        }
    }
}

fn demo_agents() -> Vec<Value> {
    // Deliberately mixed field names; clients normalize them.
    vec![
        json!({
            "id": "general",
            "name": "General Assistant",
            "description": "Answers everyday questions.",
            "model": "gpt-4o-mini",
            "avatar": "💬"
        }),
        json!({
            "agentId": "web-security",
            "name": "Web Security",
            "desc": "Reviews web applications for common vulnerabilities.",
            "modelName": "qwen-max",
            "icon": "🛡"
        }),
        json!({
            "id": "ops",
            "name": "Ops Runbook",
            "description": "Walks through deployment and incident runbooks.",
            "modelConfig": {"modelName": "deepseek-chat"}
        }),
    ]
}

// === Request Types ===

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    pub title: Option<String>,
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AgentParams {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

// === Server Lifecycle ===

/// Build the router with fresh state.
pub fn router(reply_delay: Duration) -> Router {
    router_with_state(Arc::new(ServerState::new(reply_delay)))
}

pub fn router_with_state(state: Arc<ServerState>) -> Router {
    let api = Router::new()
        .route(
            "/agent/session/{id}",
            get(list_sessions)
                .post(create_session)
                .put(update_session)
                .delete(delete_session),
        )
        .route("/agent/session/{id}/messages", get(session_messages))
        .route("/agent/session/chat", post(chat))
        .route("/agents/published", get(published_agents))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
}

/// Serve on `127.0.0.1:port` until the process exits.
pub async fn start_server(port: u16, reply_delay: Duration) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "mock backend listening");
    println!("Agent backend listening on http://{addr}/api");

    axum::serve(listener, router(reply_delay))
        .await
        .context("Server error")?;
    Ok(())
}

/// Serve on an ephemeral port in the background. Returns the API root URL.
pub async fn spawn_local(reply_delay: Duration) -> Result<(String, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let app = router(reply_delay);

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "mock backend stopped");
        }
    });
    Ok((format!("http://{addr}/api"), handle))
}

// === Handlers ===

async fn list_sessions(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Json<Envelope<Vec<Session>>> {
    let archived = params.archived.unwrap_or(false);
    let mut sessions: Vec<Session> = state
        .sessions
        .read()
        .await
        .iter()
        .filter(|s| s.agent_id == agent_id && s.archived == archived)
        .cloned()
        .collect();
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Json(Envelope::ok(sessions))
}

async fn create_session(
    State(state): State<Arc<ServerState>>,
    Path(agent_id): Path<String>,
) -> Json<Envelope<Session>> {
    let session = Session::new(Uuid::now_v7().to_string(), agent_id, "New chat".to_string());
    debug!(session_id = %session.id, agent_id = %session.agent_id, "session created");
    state.sessions.write().await.push(session.clone());
    Json(Envelope::ok(session))
}

async fn update_session(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
    Query(params): Query<UpdateParams>,
) -> Json<Envelope<Session>> {
    let mut sessions = state.sessions.write().await;
    let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
        return Json(Envelope::error(NOT_FOUND_CODE, "session not found"));
    };
    if let Some(title) = params.title {
        session.title = title;
    }
    if let Some(archived) = params.archived {
        session.archived = archived;
    }
    session.updated_at = Utc::now();
    Json(Envelope::ok(session.clone()))
}

async fn delete_session(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Json<Envelope<Value>> {
    let mut sessions = state.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|s| s.id != session_id);
    if sessions.len() == before {
        return Json(Envelope::error(NOT_FOUND_CODE, "session not found"));
    }
    drop(sessions);
    state.messages.write().await.remove(&session_id);
    Json(Envelope::ok(Value::Null))
}

async fn session_messages(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Json<Envelope<Vec<Message>>> {
    let messages = state
        .messages
        .read()
        .await
        .get(&session_id)
        .cloned()
        .unwrap_or_default();
    Json(Envelope::ok(messages))
}

async fn published_agents(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<AgentParams>,
) -> Json<Value> {
    let filter = params.name.unwrap_or_default().to_lowercase();
    let agents: Vec<Value> = state
        .agents
        .iter()
        .filter(|agent| {
            agent
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.to_lowercase().contains(&filter))
        })
        .cloned()
        .collect();
    Json(json!({ "data": agents }))
}

type EventResult = std::result::Result<Event, Infallible>;

async fn chat(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Sse<KeepAliveStream<ReceiverStream<EventResult>>>, StatusCode> {
    let known = state
        .sessions
        .read()
        .await
        .iter()
        .any(|s| s.id == req.session_id);
    if !known {
        return Err(StatusCode::NOT_FOUND);
    }

    state
        .record(&req.session_id, Message::user(&req.session_id, &req.message))
        .await;

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(stream_reply(state, req, tx));
    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// Emit the reply fragment by fragment, then `done`. Whatever was sent is
/// recorded as the assistant message, even if the client went away.
async fn stream_reply(state: Arc<ServerState>, req: ChatRequest, tx: mpsc::Sender<EventResult>) {
    let session_id = req.session_id.as_str();

    let (task, text) = match req.message.strip_prefix("/task ") {
        Some(rest) => (Some(rest.trim()), format!("Finished task: {}", rest.trim())),
        None => (None, format!("You said: {}", req.message)),
    };

    if let Some(name) = task {
        let task_id = Uuid::now_v7().to_string();
        let steps = [
            (MessageType::TaskSplit, format!("Planning {name}")),
            (MessageType::TaskStatusToLoading, String::new()),
            (MessageType::TaskStatusToFinish, format!("{name} complete")),
        ];
        for (kind, content) in steps {
            let payload = json!({
                "content": content,
                "messageType": kind.as_str(),
                "taskId": task_id,
                "taskName": name,
                "sessionId": session_id,
            });
            if !send_event(&tx, state.reply_delay, Event::default().data(payload.to_string())).await {
                return;
            }
            state
                .record(
                    session_id,
                    Message::assistant(session_id, content)
                        .with_type(kind)
                        .with_task(Some(task_id.clone()), Some(name.to_string())),
                )
                .await;
        }
    }

    let mut sent = String::new();
    for fragment in text.split_inclusive(' ') {
        let payload = json!({
            "content": fragment,
            "messageType": MessageType::Text.as_str(),
            "sessionId": session_id,
        });
        if !send_event(&tx, state.reply_delay, Event::default().data(payload.to_string())).await {
            break;
        }
        sent.push_str(fragment);
    }

    if sent.len() == text.len() {
        send_event(&tx, Duration::ZERO, Event::default().event("done").data("[DONE]")).await;
    } else {
        debug!(session_id, "client left mid-reply");
    }
    state
        .record(session_id, Message::assistant(session_id, sent))
        .await;
}

async fn send_event(tx: &mpsc::Sender<EventResult>, delay: Duration, event: Event) -> bool {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    tx.send(Ok(event)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiClient, SessionUpdate};
    use crate::stream::{ChatEvent, StreamRelay};

    async fn backend() -> (ApiClient, StreamRelay) {
        let (base, _handle) = spawn_local(Duration::ZERO).await.unwrap();
        (
            ApiClient::with_client(reqwest::Client::new(), &base),
            StreamRelay::with_client(reqwest::Client::new(), &base, 16),
        )
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let (api, _) = backend().await;
        let created = api.create_session("general").await.unwrap();

        let listed = api.list_sessions("general", None).await.unwrap();
        assert!(listed.iter().any(|s| s.id == created.id));

        let renamed = api
            .update_session(&created.id, &SessionUpdate::title("Trip plans"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.title, "Trip plans");

        api.update_session(&created.id, &SessionUpdate::archived(true))
            .await
            .unwrap();
        assert!(api.list_sessions("general", None).await.unwrap().is_empty());
        assert_eq!(api.list_sessions("general", Some(true)).await.unwrap().len(), 1);

        api.delete_session(&created.id).await.unwrap();
        assert!(api.list_sessions("general", Some(true)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_is_application_error() {
        let (api, _) = backend().await;
        let err = api.delete_session("missing").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Application { code: 404, .. }));
    }

    #[tokio::test]
    async fn published_agents_are_normalized_and_filtered() {
        let (api, _) = backend().await;
        let all = api.published_agents(None).await.unwrap();
        assert_eq!(all.len(), 3);
        let security = all.iter().find(|a| a.id == "web-security").unwrap();
        assert_eq!(security.model.as_deref(), Some("qwen-max"));

        let filtered = api.published_agents(Some("ops")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].model.as_deref(), Some("deepseek-chat"));
    }

    #[tokio::test]
    async fn chat_streams_fragments_then_done() {
        let (api, relay) = backend().await;
        let session = api.create_session("general").await.unwrap();

        let mut stream = relay.open(&session.id, "hello there").await.unwrap();
        let mut text = String::new();
        let mut done = false;
        while let Some(item) = stream.next().await {
            let event = ChatEvent::parse(item.unwrap());
            if event.is_done() {
                done = true;
                break;
            }
            text.push_str(event.text());
        }
        assert!(done);
        assert_eq!(text, "You said: hello there");

        // the server records the exchange once the reply is finished
        let mut history = Vec::new();
        for _ in 0..50 {
            history = api.session_messages(&session.id).await.unwrap();
            if history.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "You said: hello there");
    }

    #[tokio::test]
    async fn chat_to_unknown_session_is_http_error() {
        let (_, relay) = backend().await;
        let err = relay.open("missing", "hi").await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Http { status: 404, .. }));
    }
}
