//! Deterministic recording/replay. A `Recording`
//! is a plain log of every event handed to `process_chunk`, paired with
//! the result of the run it captured; `StreamProcessor::replay` feeds
//! the events back through a fresh processor and compares outputs.

use crate::events::{Event, FinishReason};
use crate::message::UIMessage;

#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub(crate) events: Vec<(i64, Event)>,
}

impl Recording {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub(crate) fn push(&mut self, timestamp: i64, event: Event) {
        self.events.push((timestamp, event));
    }

    pub fn events(&self) -> &[(i64, Event)] {
        &self.events
    }
}

/// The terminal snapshot a processor run produces: final messages plus
/// the reason it ended, compared for equality by replay idempotence
/// tests (property 6).
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorResult {
    pub messages: Vec<UIMessage>,
    pub finish_reason: Option<FinishReason>,
    pub has_error: bool,
}
