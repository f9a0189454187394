//! HTTP client for the backend's session and agent endpoints.

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::envelope::{self, SUCCESS_CODE};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Agent, Message, Session};

/// Fields to change on a session. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub archived: Option<bool>,
}

impl SessionUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            archived: None,
        }
    }

    pub const fn archived(archived: bool) -> Self {
        Self {
            title: None,
            archived: Some(archived),
        }
    }

    fn query(&self) -> String {
        let mut params = Vec::new();
        if let Some(title) = &self.title {
            params.push(format!("title={}", urlencoding::encode(title)));
        }
        if let Some(archived) = self.archived {
            params.push(format!("archived={archived}"));
        }
        if params.is_empty() {
            String::new()
        } else {
            format!("?{}", params.join("&"))
        }
    }
}

/// Backend REST client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::with_client(client, config.api_root()))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        debug!(%method, %url, "backend request");
        self.client.request(method, url)
    }

    /// Send, check the HTTP status and return the body text.
    async fn send_text(&self, builder: RequestBuilder) -> Result<String> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Send and unwrap an enveloped payload.
    async fn send_enveloped<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Option<T>> {
        let body = self.send_text(builder).await?;
        envelope::decode::<T>(&body)?.into_result()
    }

    /// Sessions of `agent_id`. `archived` filters on the archive flag;
    /// `None` lets the backend apply its default (unarchived only).
    pub async fn list_sessions(&self, agent_id: &str, archived: Option<bool>) -> Result<Vec<Session>> {
        let mut path = format!("/agent/session/{}", urlencoding::encode(agent_id));
        if let Some(archived) = archived {
            path.push_str(&format!("?archived={archived}"));
        }
        let sessions = self
            .send_enveloped::<Vec<Session>>(self.request(Method::GET, &path))
            .await?;
        Ok(sessions.unwrap_or_default())
    }

    pub async fn create_session(&self, agent_id: &str) -> Result<Session> {
        let path = format!("/agent/session/{}", urlencoding::encode(agent_id));
        self.send_enveloped::<Session>(self.request(Method::POST, &path))
            .await?
            .ok_or_else(|| Error::InvalidFormat {
                reason: "create session returned no data".to_string(),
                raw: String::new(),
            })
    }

    /// Apply `update`. The backend may or may not echo the session back.
    pub async fn update_session(&self, session_id: &str, update: &SessionUpdate) -> Result<Option<Session>> {
        let path = format!(
            "/agent/session/{}{}",
            urlencoding::encode(session_id),
            update.query()
        );
        self.send_enveloped::<Session>(self.request(Method::PUT, &path))
            .await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let path = format!("/agent/session/{}", urlencoding::encode(session_id));
        self.send_enveloped::<Value>(self.request(Method::DELETE, &path))
            .await?;
        Ok(())
    }

    /// Stored history of a session, oldest first.
    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let path = format!("/agent/session/{}/messages", urlencoding::encode(session_id));
        let mut messages = self
            .send_enveloped::<Vec<Message>>(self.request(Method::GET, &path))
            .await?
            .unwrap_or_default();
        for message in &mut messages {
            if message.session_id.is_empty() {
                message.session_id = session_id.to_string();
            }
        }
        Ok(messages)
    }

    /// Published agents, optionally filtered by name.
    ///
    /// Accepts a bare array, `{data: [...]}`, or the standard envelope.
    pub async fn published_agents(&self, name: Option<&str>) -> Result<Vec<Agent>> {
        let mut path = "/agents/published".to_string();
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            path.push_str(&format!("?name={}", urlencoding::encode(name)));
        }
        let body = self.send_text(self.request(Method::GET, &path)).await?;
        parse_agents(&body)
    }
}

fn parse_agents(body: &str) -> Result<Vec<Agent>> {
    let value: Value = serde_json::from_str(body).map_err(|e| Error::invalid_format(&e, body))?;

    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        if code != SUCCESS_CODE {
            return Err(Error::Application {
                code,
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    Ok(Agent::list_from_value(&value))
}
