//! In-memory conversation state.

mod messages;
mod tasks;

pub use messages::MessageStore;
pub use tasks::TaskBoard;
