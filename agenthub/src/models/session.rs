//! Session model representing a conversation thread with one agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp;

/// A persisted conversation thread between a user and one agent.
///
/// Sessions are owned by the backend; the client only caches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier assigned by the backend.
    pub id: String,
    /// Agent this session talks to.
    #[serde(alias = "agent_id")]
    pub agent_id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// When the session was created.
    #[serde(alias = "created_at", default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    /// When the session was last touched.
    #[serde(alias = "updated_at", default = "Utc::now", deserialize_with = "timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
    /// Archived sessions are hidden from the default listing.
    #[serde(default, alias = "isArchived")]
    pub archived: bool,
}

impl Session {
    /// Create a new session.
    pub fn new(id: String, agent_id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent_id,
            title,
            created_at: now,
            updated_at: now,
            archived: false,
        }
    }
}
