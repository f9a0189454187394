//! Backend REST API.

mod client;
pub mod envelope;

pub use client::{ApiClient, SessionUpdate};
pub use envelope::{Envelope, SUCCESS_CODE};
