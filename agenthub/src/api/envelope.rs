//! The backend's standard JSON envelope: `{code, message, data, timestamp}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// `code` value meaning success.
pub const SUCCESS_CODE: i64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: "success".to_string(),
            data: Some(data),
            timestamp: Some(Value::from(chrono::Utc::now().timestamp_millis())),
        }
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            timestamp: Some(Value::from(chrono::Utc::now().timestamp_millis())),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Unwrap the payload, turning a non-success code into
    /// [`Error::Application`]. A success with no data yields `None`.
    pub fn into_result(self) -> Result<Option<T>> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(Error::Application {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// Decode an envelope from raw text, keeping the text on failure.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<Envelope<T>> {
    serde_json::from_str(raw).map_err(|e| Error::invalid_format(&e, raw))
}
