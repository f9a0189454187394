//! Agent summaries and the normalization boundary for backend DTOs.
//!
//! Published-agent payloads come in several shapes: `model` vs `modelName`,
//! `avatar` vs `icon`, `id` vs `agentId`, and the list itself either bare,
//! wrapped in `{data: [...]}`, or inside the standard envelope. All of that
//! is absorbed here so the rest of the crate sees one [`Agent`] type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical agent summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub model: Option<String>,
    pub published: bool,
}

/// Return the first string field among `keys`.
fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key))
        .and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

impl Agent {
    /// Normalize one backend agent object. Entries without an id are dropped.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = first_str(value, &["id", "agentId", "agent_id"])?;
        let name = first_str(value, &["name", "agentName", "title"]).unwrap_or_else(|| id.clone());

        // Model may be nested under a model config object.
        let model = first_str(value, &["model", "modelName", "model_name"]).or_else(|| {
            value
                .get("modelConfig")
                .and_then(|cfg| first_str(cfg, &["modelName", "model", "name"]))
        });

        let published = value
            .get("published")
            .or_else(|| value.get("isPublished"))
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Some(Self {
            id,
            name,
            description: first_str(value, &["description", "desc", "summary"]),
            avatar: first_str(value, &["avatar", "icon", "avatarUrl"]),
            model,
            published,
        })
    }

    /// Normalize a whole listing payload.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        let items: &[Value] = match value {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => match value.get("data") {
                Some(Value::Array(items)) => items.as_slice(),
                // `{data: {records: [...]}}` paged form
                Some(data) => match data.get("records").or_else(|| data.get("list")) {
                    Some(Value::Array(items)) => items.as_slice(),
                    _ => &[],
                },
                None => &[],
            },
            _ => &[],
        };
        items.iter().filter_map(Self::from_value).collect()
    }

    /// Case-insensitive name filter.
    pub fn matches_name(&self, filter: &str) -> bool {
        filter.is_empty() || self.name.to_lowercase().contains(&filter.to_lowercase())
    }
}
