//! Session lifecycle: listing, creation, rename, archive, delete and the
//! per-agent active-session pointer.
//!
//! The backend owns sessions; this keeps a per-agent cache so the UI can
//! show a list and an active session without a round trip. No lock is held
//! across a network call, so results are applied against whatever the cache
//! looks like when they arrive.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, SessionUpdate};
use crate::error::{Error, Result};
use crate::models::{Message, Session};

/// Remote session operations.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn list_sessions(&self, agent_id: &str, archived: Option<bool>) -> Result<Vec<Session>>;
    async fn create_session(&self, agent_id: &str) -> Result<Session>;
    async fn update_session(&self, session_id: &str, update: &SessionUpdate) -> Result<Option<Session>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
    async fn session_messages(&self, session_id: &str) -> Result<Vec<Message>>;
}

#[async_trait]
impl SessionApi for ApiClient {
    async fn list_sessions(&self, agent_id: &str, archived: Option<bool>) -> Result<Vec<Session>> {
        Self::list_sessions(self, agent_id, archived).await
    }

    async fn create_session(&self, agent_id: &str) -> Result<Session> {
        Self::create_session(self, agent_id).await
    }

    async fn update_session(&self, session_id: &str, update: &SessionUpdate) -> Result<Option<Session>> {
        Self::update_session(self, session_id, update).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        Self::delete_session(self, session_id).await
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Self::session_messages(self, session_id).await
    }
}

/// Cached view of one agent's unarchived sessions.
#[derive(Debug, Default)]
struct AgentSessions {
    sessions: Vec<Session>,
    active: Option<String>,
    /// Bumped on every local mutation; a listing that started before a
    /// mutation must not overwrite it.
    epoch: u64,
}

impl AgentSessions {
    fn position(&self, session_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == session_id)
    }

    fn most_recent(&self) -> Option<&Session> {
        self.sessions.iter().max_by_key(|s| s.updated_at)
    }

    /// Drop `session_id`; if it was active, fall back to the most recently
    /// updated remaining session.
    fn remove(&mut self, session_id: &str) -> Option<Session> {
        let removed = self.position(session_id).map(|i| self.sessions.remove(i));
        if self.active.as_deref() == Some(session_id) {
            self.active = self.most_recent().map(|s| s.id.clone());
        }
        self.epoch += 1;
        removed
    }
}

/// Session lifecycle manager.
pub struct SessionManager {
    api: Arc<dyn SessionApi>,
    agents: RwLock<HashMap<String, AgentSessions>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(api: Arc<dyn SessionApi>) -> Self {
        Self {
            api,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Unarchived sessions of `agent_id`, in backend order.
    ///
    /// A backend failure is logged and yields an empty list; the cache is
    /// left as it was.
    pub async fn list_sessions(&self, agent_id: &str) -> Vec<Session> {
        let epoch = self.epoch(agent_id).await;

        let sessions = match self.api.list_sessions(agent_id, None).await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(agent_id, error = %err, "failed to list sessions");
                return Vec::new();
            }
        };

        let mut agents = self.agents.write().await;
        let cache = agents.entry(agent_id.to_string()).or_default();
        if cache.epoch == epoch {
            cache.sessions.clone_from(&sessions);
            if let Some(active) = cache.active.clone() {
                if cache.position(&active).is_none() {
                    debug!(agent_id, session_id = %active, "active session no longer listed");
                    cache.active = None;
                }
            }
        } else {
            debug!(agent_id, "session cache changed during listing; keeping local state");
        }
        sessions
    }

    /// Archived sessions of `agent_id`. Not cached.
    pub async fn list_archived(&self, agent_id: &str) -> Vec<Session> {
        match self.api.list_sessions(agent_id, Some(true)).await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(agent_id, error = %err, "failed to list archived sessions");
                Vec::new()
            }
        }
    }

    /// Create a session and make it active.
    pub async fn create_session(&self, agent_id: &str) -> Result<Session> {
        let session = self.api.create_session(agent_id).await?;
        info!(agent_id, session_id = %session.id, "session created");

        let mut agents = self.agents.write().await;
        let cache = agents.entry(agent_id.to_string()).or_default();
        if cache.position(&session.id).is_none() {
            cache.sessions.insert(0, session.clone());
        }
        cache.active = Some(session.id.clone());
        cache.epoch += 1;
        Ok(session)
    }

    /// Rename a session. Renaming to the cached title does nothing.
    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<()> {
        if self
            .cached(session_id)
            .await
            .is_some_and(|s| s.title == title)
        {
            debug!(session_id, "title unchanged");
            return Ok(());
        }

        let echoed = self
            .api
            .update_session(session_id, &SessionUpdate::title(title))
            .await?;

        let mut agents = self.agents.write().await;
        let Some(cache) = agents.values_mut().find(|c| c.position(session_id).is_some()) else {
            debug!(session_id, "rename applied to an uncached session");
            return Ok(());
        };
        if let Some(i) = cache.position(session_id) {
            let cached = &mut cache.sessions[i];
            cached.title = title.to_string();
            if let Some(echoed) = echoed {
                cached.updated_at = echoed.updated_at;
            }
            cache.epoch += 1;
        }
        Ok(())
    }

    /// Archive or unarchive a session.
    ///
    /// Archiving drops the session from the cached list (reselecting if it
    /// was active); unarchiving puts it back when the backend echoes it.
    pub async fn set_archived(&self, session_id: &str, archived: bool) -> Result<()> {
        if !archived && self.cached(session_id).await.is_some() {
            // cached sessions are unarchived already
            return Ok(());
        }

        let echoed = self
            .api
            .update_session(session_id, &SessionUpdate::archived(archived))
            .await?;
        info!(session_id, archived, "session archive flag changed");

        let mut agents = self.agents.write().await;
        if archived {
            for cache in agents.values_mut() {
                if cache.position(session_id).is_some() {
                    cache.remove(session_id);
                }
            }
        } else if let Some(mut session) = echoed {
            session.archived = false;
            let cache = agents.entry(session.agent_id.clone()).or_default();
            if cache.position(&session.id).is_none() {
                cache.sessions.insert(0, session);
                cache.epoch += 1;
            }
        }
        Ok(())
    }

    /// Delete a session remotely, then forget it locally.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.api.delete_session(session_id).await?;
        info!(session_id, "session deleted");

        let mut agents = self.agents.write().await;
        for cache in agents.values_mut() {
            if cache.position(session_id).is_some() {
                cache.remove(session_id);
            }
        }
        Ok(())
    }

    /// Make `session_id` the active session of `agent_id`.
    pub async fn select(&self, agent_id: &str, session_id: &str) -> Result<()> {
        let mut agents = self.agents.write().await;
        let cache = agents
            .get_mut(agent_id)
            .filter(|c| c.position(session_id).is_some())
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;
        cache.active = Some(session_id.to_string());
        Ok(())
    }

    /// The active session of `agent_id`, if any.
    pub async fn active(&self, agent_id: &str) -> Option<Session> {
        let agents = self.agents.read().await;
        let cache = agents.get(agent_id)?;
        let active = cache.active.as_deref()?;
        cache.position(active).map(|i| cache.sessions[i].clone())
    }

    /// The active session, else the most recently updated listed session,
    /// else a freshly created one.
    pub async fn ensure_active(&self, agent_id: &str) -> Result<Session> {
        if let Some(session) = self.active(agent_id).await {
            return Ok(session);
        }

        self.list_sessions(agent_id).await;
        {
            let mut agents = self.agents.write().await;
            if let Some(cache) = agents.get_mut(agent_id) {
                if let Some(recent) = cache.most_recent().cloned() {
                    cache.active = Some(recent.id.clone());
                    return Ok(recent);
                }
            }
        }

        self.create_session(agent_id).await
    }

    /// Stored history of a session. Failure yields an empty history.
    pub async fn load_history(&self, session_id: &str) -> Vec<Message> {
        match self.api.session_messages(session_id).await {
            Ok(messages) => messages,
            Err(err) => {
                warn!(session_id, error = %err, "failed to load session history");
                Vec::new()
            }
        }
    }

    /// Cached copy of one session.
    pub async fn cached(&self, session_id: &str) -> Option<Session> {
        let agents = self.agents.read().await;
        agents.values().find_map(|cache| {
            cache
                .position(session_id)
                .map(|i| cache.sessions[i].clone())
        })
    }

    async fn epoch(&self, agent_id: &str) -> u64 {
        self.agents
            .read()
            .await
            .get(agent_id)
            .map_or(0, |c| c.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory backend with a failure switch and call counters.
    #[derive(Default)]
    struct FakeApi {
        sessions: Mutex<Vec<Session>>,
        next_id: AtomicUsize,
        updates: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl FakeApi {
        fn with_sessions(sessions: Vec<Session>) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(sessions),
                ..Self::default()
            })
        }

        fn check(&self) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(Error::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionApi for FakeApi {
        async fn list_sessions(&self, agent_id: &str, archived: Option<bool>) -> Result<Vec<Session>> {
            self.check()?;
            let archived = archived.unwrap_or(false);
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| s.agent_id == agent_id && s.archived == archived)
                .cloned()
                .collect())
        }

        async fn create_session(&self, agent_id: &str) -> Result<Session> {
            self.check()?;
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let session = Session::new(format!("new-{n}"), agent_id.to_string(), "New chat".to_string());
            self.sessions.lock().unwrap().insert(0, session.clone());
            Ok(session)
        }

        async fn update_session(&self, session_id: &str, update: &SessionUpdate) -> Result<Option<Session>> {
            self.check()?;
            self.updates.fetch_add(1, Ordering::SeqCst);
            let mut sessions = self.sessions.lock().unwrap();
            let Some(session) = sessions.iter_mut().find(|s| s.id == session_id) else {
                return Err(Error::Application {
                    code: 404,
                    message: "no such session".to_string(),
                });
            };
            if let Some(title) = &update.title {
                session.title.clone_from(title);
            }
            if let Some(archived) = update.archived {
                session.archived = archived;
            }
            session.updated_at = Utc::now();
            Ok(Some(session.clone()))
        }

        async fn delete_session(&self, session_id: &str) -> Result<()> {
            self.check()?;
            self.sessions.lock().unwrap().retain(|s| s.id != session_id);
            Ok(())
        }

        async fn session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
            self.check()?;
            Ok(vec![Message::user(session_id, "hi")])
        }
    }

    fn session(id: &str, minutes_ago: i64) -> Session {
        let mut s = Session::new(id.to_string(), "agent".to_string(), id.to_uppercase());
        s.updated_at = Utc::now() - Duration::minutes(minutes_ago);
        s
    }

    fn manager(api: Arc<FakeApi>) -> SessionManager {
        SessionManager::new(api)
    }

    #[tokio::test]
    async fn list_preserves_backend_order() {
        let api = FakeApi::with_sessions(vec![session("b", 5), session("a", 1), session("c", 9)]);
        let mgr = manager(api);
        let ids: Vec<String> = mgr.list_sessions("agent").await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn list_failure_is_empty_and_keeps_cache() {
        let api = FakeApi::with_sessions(vec![session("a", 1)]);
        let mgr = manager(api.clone());
        mgr.list_sessions("agent").await;
        mgr.select("agent", "a").await.unwrap();

        api.fail.store(true, Ordering::SeqCst);
        assert!(mgr.list_sessions("agent").await.is_empty());
        assert_eq!(mgr.active("agent").await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn create_then_list_includes_and_is_active() {
        let api = FakeApi::with_sessions(vec![session("a", 1)]);
        let mgr = manager(api);
        let created = mgr.create_session("agent").await.unwrap();

        assert_eq!(mgr.active("agent").await.unwrap().id, created.id);
        let listed = mgr.list_sessions("agent").await;
        assert!(listed.iter().any(|s| s.id == created.id));
    }

    #[tokio::test]
    async fn rename_same_title_makes_no_remote_call() {
        let api = FakeApi::with_sessions(vec![session("a", 1)]);
        let mgr = manager(api.clone());
        mgr.list_sessions("agent").await;

        mgr.rename_session("a", "Plans").await.unwrap();
        mgr.rename_session("a", "Plans").await.unwrap();
        assert_eq!(api.updates.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.cached("a").await.unwrap().title, "Plans");
    }

    #[tokio::test]
    async fn archive_and_unarchive_round_trip() {
        let api = FakeApi::with_sessions(vec![session("a", 1), session("b", 2)]);
        let mgr = manager(api);
        mgr.list_sessions("agent").await;
        mgr.select("agent", "a").await.unwrap();

        mgr.set_archived("a", true).await.unwrap();
        assert!(mgr.cached("a").await.is_none());
        assert_eq!(mgr.active("agent").await.unwrap().id, "b");
        assert_eq!(mgr.list_archived("agent").await.len(), 1);

        mgr.set_archived("a", false).await.unwrap();
        assert!(mgr.cached("a").await.is_some());
        assert!(mgr.list_archived("agent").await.is_empty());
        assert_eq!(mgr.list_sessions("agent").await.len(), 2);
    }

    #[tokio::test]
    async fn delete_active_selects_most_recent() {
        let api = FakeApi::with_sessions(vec![session("a", 1), session("old", 30), session("mid", 10)]);
        let mgr = manager(api);
        mgr.list_sessions("agent").await;
        mgr.select("agent", "a").await.unwrap();

        mgr.delete_session("a").await.unwrap();
        assert_eq!(mgr.active("agent").await.unwrap().id, "mid");
        assert!(mgr.list_sessions("agent").await.iter().all(|s| s.id != "a"));
    }

    #[tokio::test]
    async fn delete_last_clears_active() {
        let api = FakeApi::with_sessions(vec![session("a", 1)]);
        let mgr = manager(api);
        mgr.list_sessions("agent").await;
        mgr.select("agent", "a").await.unwrap();

        mgr.delete_session("a").await.unwrap();
        assert!(mgr.active("agent").await.is_none());
    }

    #[tokio::test]
    async fn delete_failure_propagates_and_keeps_cache() {
        let api = FakeApi::with_sessions(vec![session("a", 1)]);
        let mgr = manager(api.clone());
        mgr.list_sessions("agent").await;

        api.fail.store(true, Ordering::SeqCst);
        assert!(mgr.delete_session("a").await.is_err());
        assert!(mgr.cached("a").await.is_some());
    }

    #[tokio::test]
    async fn ensure_active_prefers_most_recent_then_creates() {
        let api = FakeApi::with_sessions(vec![session("old", 30), session("new", 1)]);
        let mgr = manager(api);
        assert_eq!(mgr.ensure_active("agent").await.unwrap().id, "new");

        let empty = manager(FakeApi::with_sessions(Vec::new()));
        let created = empty.ensure_active("agent").await.unwrap();
        assert_eq!(created.id, "new-0");
        assert_eq!(empty.ensure_active("agent").await.unwrap().id, "new-0");
    }

    #[tokio::test]
    async fn select_unknown_session_fails() {
        let mgr = manager(FakeApi::with_sessions(vec![session("a", 1)]));
        mgr.list_sessions("agent").await;
        assert!(matches!(
            mgr.select("agent", "zzz").await,
            Err(Error::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn history_failure_is_empty() {
        let api = FakeApi::with_sessions(Vec::new());
        let mgr = manager(api.clone());
        assert_eq!(mgr.load_history("s").await.len(), 1);
        api.fail.store(true, Ordering::SeqCst);
        assert!(mgr.load_history("s").await.is_empty());
    }
}
