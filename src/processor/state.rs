//! Private per-message/per-tool-call bookkeeping the processor keeps
//! alongside the public `UIMessage` list.

use std::collections::HashMap;

use crate::message::{Role, ToolCallState};

/// Mirrors the shape of a `ToolCallPart` but lives in the processor's
/// scratch state rather than on the message itself — `arguments`/`name`
/// here are the accumulating source of truth; the `ToolCallPart` is
/// rebuilt from this on every update via `mutators::update_tool_call_part`.
#[derive(Debug, Clone, Default)]
pub(crate) struct InternalToolCallState {
    pub(crate) name: String,
    pub(crate) arguments: String,
    pub(crate) state: ToolCallState,
    pub(crate) parent_message_id: Option<String>,
}

/// Per-message scratch state threaded through `process_chunk`. One
/// entry per message id currently or previously streamed into.
#[derive(Debug, Clone)]
pub(crate) struct MessageStreamState {
    pub(crate) role: Role,
    pub(crate) total_text_content: String,
    pub(crate) current_segment_text: String,
    pub(crate) last_emitted_text: String,
    pub(crate) thinking_content: String,
    pub(crate) tool_calls: HashMap<String, InternalToolCallState>,
    pub(crate) tool_call_order: Vec<String>,
    pub(crate) has_tool_calls_since_text_start: bool,
    pub(crate) is_complete: bool,
}

impl MessageStreamState {
    pub(crate) fn new(role: Role) -> Self {
        Self {
            role,
            total_text_content: String::new(),
            current_segment_text: String::new(),
            last_emitted_text: String::new(),
            thinking_content: String::new(),
            tool_calls: HashMap::new(),
            tool_call_order: Vec::new(),
            has_tool_calls_since_text_start: false,
            is_complete: false,
        }
    }
}
