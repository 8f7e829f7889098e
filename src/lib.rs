//! `chatstream-core`: transport-agnostic streaming chat protocol —
//! event schema, partial JSON parser, pure message mutators, chunk
//! emission strategies, connection/session transports, the
//! `StreamProcessor` state machine, and the `ChatClient` session
//! orchestrator.

pub mod client;
pub mod emission;
pub mod error;
pub mod events;
pub mod json_partial;
pub mod legacy;
pub mod logger;
pub mod message;
pub mod model;
pub mod mutators;
pub mod processor;
pub mod session;
pub mod transport;

pub use client::{ChatClient, ChatClientOptions, ClientStatus};
pub use error::TransportError;
pub use events::Event;
pub use logger::log;
pub use message::{MessagePart, Role, UIMessage};
pub use processor::{ApprovalRequest, StreamProcessor, ToolCallDispatch};
pub use session::{DefaultSessionAdapter, SessionAdapter};
pub use transport::{CancelToken, ConnectionAdapter};

use std::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds since epoch. The one place `chrono::Utc::now()` is
/// called outside `emission::SystemClock` and `logger.rs` — every other
/// module takes a timestamp as a parameter instead of reading the clock
/// itself.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generates an opaque, process-unique id for client-originated
/// records (`addUserMessage`, `prepareAssistantMessage`) — a bare
/// counter rather than a UUID crate, since none is in the dependency
/// stack and ids here only need to be unique within the conversation,
/// not globally.
pub(crate) fn next_id(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{n}", now_ms())
}
