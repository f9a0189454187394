//! Session lifecycle management.

mod manager;

pub use manager::{SessionApi, SessionManager};
