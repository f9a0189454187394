//! Backend chat streaming.

mod event;
mod relay;
mod sse;

pub use event::ChatEvent;
pub use relay::{AbortHandle, ChatStream, StreamRelay};
pub use sse::{SseEvent, SseParser, DEFAULT_EVENT};
