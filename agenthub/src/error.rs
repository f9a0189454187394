//! Error types shared by the backend client, the stream relay and config loading.

use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong talking to the backend.
///
/// Transport failures, application-level failures (a non-success `code` in
/// the JSON envelope) and malformed payloads are kept apart so callers can
/// tell "the network is down" from "the backend said no" from "the backend
/// sent garbage".
#[derive(Debug, Error)]
pub enum Error {
    /// Network unreachable, timeout, connection reset.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success HTTP status.
    #[error("server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The envelope carried a non-success `code`.
    #[error("{message} (code {code})")]
    Application { code: i64, message: String },

    /// The body could not be decoded. `raw` keeps the payload for diagnostics.
    #[error("invalid response format: {reason}")]
    InvalidFormat { reason: String, raw: String },

    /// The chat endpoint did not answer with `text/event-stream`.
    #[error("expected an event stream, got content type {content_type:?}")]
    NotEventStream { content_type: Option<String> },

    /// A session id the client does not know about.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::InvalidFormat`] from a serde error and the raw body.
    pub fn invalid_format(err: &serde_json::Error, raw: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: err.to_string(),
            raw: raw.into(),
        }
    }

    /// True for failures where the backend was never reached or the
    /// connection dropped.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_keeps_raw_payload() {
        let raw = "<html>gateway timeout</html>";
        let serde_err = serde_json::from_str::<serde_json::Value>(raw).unwrap_err();
        let err = Error::invalid_format(&serde_err, raw);
        match err {
            Error::InvalidFormat { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn application_error_message() {
        let err = Error::Application {
            code: 500,
            message: "agent not found".to_string(),
        };
        assert_eq!(err.to_string(), "agent not found (code 500)");
        assert!(!err.is_transport());
    }
}
