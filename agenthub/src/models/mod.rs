//! Data models for agenthub entities.

mod agent;
mod knowledge;
mod message;
mod session;
mod task;
pub mod timestamp;

pub use agent::Agent;
pub use knowledge::{Chunk, Document, KnowledgeBase};
pub use message::{Message, MessageRole, MessageType};
pub use session::Session;
pub use task::{Task, TaskStatus};
