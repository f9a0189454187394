//! Client library for chatting with published agents.
//!
//! - [`api`]: REST client for sessions, history and the agent catalog
//! - [`stream`]: SSE parsing and the abortable chat stream relay
//! - [`session`]: session lifecycle and the active-session pointer
//! - [`store`]: message logs and sub-task tracking
//! - [`chat`]: send a message and pump the reply into [`state::AppState`]
//! - [`retrieval`]: local lexical answers over uploaded documents
//! - [`server`]: in-memory backend serving the same endpoints

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod state;
pub mod store;
pub mod stream;

pub use error::{Error, Result};
