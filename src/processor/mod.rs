//! The central state machine: turns an ordered `Event` stream
//! into an ordered `Vec<UIMessage>`, driving lifecycle callbacks along
//! the way. Modeled on `chat_loop_with_tools`'s event-dispatch-plus-
//! callbacks shape, generalized from "one LLM round" to "the full
//! AG-UI event vocabulary" and from `Fn` callbacks to `FnMut` ones
//! (lifecycle callbacks here commonly close over mutable UI state,
//! e.g. an accumulating transcript view).

mod state;

pub mod recording;

use std::collections::HashMap;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::emission::{ChunkEmissionStrategy, Immediate};
use crate::error::TransportError;
use crate::events::{Event, FinishReason, RunErrorPayload, CUSTOM_APPROVAL_REQUESTED, CUSTOM_TOOL_INPUT_AVAILABLE};
use crate::message::{Role, ToolCallState, ToolResultState, UIMessage};
use crate::model::{self, ModelMessage};
use crate::mutators::{
    update_text_part, update_thinking_part, update_tool_call_approval, update_tool_call_approval_response,
    update_tool_call_part, update_tool_call_with_output, update_tool_result_part, ToolCallUpdate,
};
use crate::{next_id, now_ms};

use recording::{ProcessorResult, Recording};
use state::{InternalToolCallState, MessageStreamState};

/// Payload handed to `on_tool_call` for a `tool-input-available` CUSTOM
/// event : the host should execute `tool_name` with `input` and
/// eventually call `add_tool_result`.
#[derive(Debug, Clone)]
pub struct ToolCallDispatch {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
}

/// Payload handed to `on_approval_request` for an `approval-requested`
/// CUSTOM event: the host should eventually call
/// `add_tool_approval_response`.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub approval_id: String,
}

type MessagesChangeCallback = Box<dyn FnMut(&[UIMessage]) + Send>;
type StreamStartCallback = Box<dyn FnMut() + Send>;
type StreamEndCallback = Box<dyn FnMut(Option<&UIMessage>) + Send>;
type ErrorCallback = Box<dyn FnMut(&str) + Send>;
type TextUpdateCallback = Box<dyn FnMut(&str, &str) + Send>;
type ThinkingUpdateCallback = Box<dyn FnMut(&str, &str) + Send>;
type ToolCallStateChangeCallback = Box<dyn FnMut(&str, &str, ToolCallState, &str) + Send>;
type ToolCallCallback = Box<dyn FnMut(ToolCallDispatch) + Send>;
type ApprovalRequestCallback = Box<dyn FnMut(ApprovalRequest) + Send>;

/// The deterministic client-side state machine . Owns the only
/// mutable conversation state; everything else in the crate operates
/// on snapshots of it.
pub struct StreamProcessor {
    messages: Vec<UIMessage>,
    message_states: HashMap<String, MessageStreamState>,
    active_message_ids: Vec<String>,
    tool_call_to_message: HashMap<String, String>,
    pending_manual_message_id: Option<String>,
    finish_reason: Option<FinishReason>,
    has_error: bool,
    is_done: bool,
    emission_strategy: Box<dyn ChunkEmissionStrategy>,
    recording: Option<Recording>,

    on_messages_change: Option<MessagesChangeCallback>,
    on_stream_start: Option<StreamStartCallback>,
    on_stream_end: Option<StreamEndCallback>,
    on_error: Option<ErrorCallback>,
    on_text_update: Option<TextUpdateCallback>,
    on_thinking_update: Option<ThinkingUpdateCallback>,
    on_tool_call_state_change: Option<ToolCallStateChangeCallback>,
    on_tool_call: Option<ToolCallCallback>,
    on_approval_request: Option<ApprovalRequestCallback>,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            message_states: HashMap::new(),
            active_message_ids: Vec::new(),
            tool_call_to_message: HashMap::new(),
            pending_manual_message_id: None,
            finish_reason: None,
            has_error: false,
            is_done: false,
            emission_strategy: Box::new(Immediate),
            recording: None,
            on_messages_change: None,
            on_stream_start: None,
            on_stream_end: None,
            on_error: None,
            on_text_update: None,
            on_thinking_update: None,
            on_tool_call_state_change: None,
            on_tool_call: None,
            on_approval_request: None,
        }
    }
}

impl StreamProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emission_strategy(mut self, strategy: Box<dyn ChunkEmissionStrategy>) -> Self {
        self.emission_strategy = strategy;
        self
    }

    pub fn on_messages_change<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&[UIMessage]) + Send + 'static,
    {
        self.on_messages_change = Some(Box::new(callback));
        self
    }

    pub fn on_stream_start<F>(mut self, callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.on_stream_start = Some(Box::new(callback));
        self
    }

    pub fn on_stream_end<F>(mut self, callback: F) -> Self
    where
        F: FnMut(Option<&UIMessage>) + Send + 'static,
    {
        self.on_stream_end = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn on_text_update<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, &str) + Send + 'static,
    {
        self.on_text_update = Some(Box::new(callback));
        self
    }

    pub fn on_thinking_update<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, &str) + Send + 'static,
    {
        self.on_thinking_update = Some(Box::new(callback));
        self
    }

    pub fn on_tool_call_state_change<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, &str, ToolCallState, &str) + Send + 'static,
    {
        self.on_tool_call_state_change = Some(Box::new(callback));
        self
    }

    pub fn on_tool_call<F>(mut self, callback: F) -> Self
    where
        F: FnMut(ToolCallDispatch) + Send + 'static,
    {
        self.on_tool_call = Some(Box::new(callback));
        self
    }

    pub fn on_approval_request<F>(mut self, callback: F) -> Self
    where
        F: FnMut(ApprovalRequest) + Send + 'static,
    {
        self.on_approval_request = Some(Box::new(callback));
        self
    }

    // ---- public operations  ----------------------------------

    pub fn get_messages(&self) -> &[UIMessage] {
        &self.messages
    }

    pub fn to_model_messages(&self) -> Vec<ModelMessage> {
        model::to_model_messages(&self.messages)
    }

    /// Authoritative replacement of the conversation (`MESSAGES_SNAPSHOT`,
    /// and durable-session resume). Rebuilds every internal index from
    /// the given messages; any in-flight segment state is discarded.
    pub fn set_messages(&mut self, messages: Vec<UIMessage>) {
        self.message_states.clear();
        self.active_message_ids.clear();
        self.tool_call_to_message.clear();
        self.pending_manual_message_id = None;

        for message in &messages {
            let mut stream_state = MessageStreamState::new(message.role);
            for part in &message.parts {
                if let crate::message::MessagePart::ToolCall { id, name, arguments, state, .. } = part {
                    self.tool_call_to_message.insert(id.clone(), message.id.clone());
                    stream_state.tool_call_order.push(id.clone());
                    stream_state.tool_calls.insert(
                        id.clone(),
                        InternalToolCallState {
                            name: name.clone(),
                            arguments: arguments.clone(),
                            state: *state,
                            parent_message_id: Some(message.id.clone()),
                        },
                    );
                }
            }
            stream_state.is_complete = true;
            self.message_states.insert(message.id.clone(), stream_state);
        }

        self.messages = messages;
        self.notify_messages_change();
    }

    /// Creates a new user message and appends it. This is the only way
    /// a user message ever enters the conversation (invariant 6).
    pub fn add_user_message(&mut self, content: impl Into<String>) -> String {
        let id = next_id("msg");
        self.messages.push(UIMessage::user(&id, content));
        self.notify_messages_change();
        id
    }

    /// Reserves an id for the next assistant turn without creating a
    /// `UIMessage` yet (lazy assistant creation).
    pub fn prepare_assistant_message(&mut self) -> String {
        let id = next_id("msg");
        self.pending_manual_message_id = Some(id.clone());
        self.finish_reason = None;
        self.has_error = false;
        self.is_done = false;
        if let Some(cb) = &mut self.on_stream_start {
            cb();
        }
        id
    }

    /// Records the result of a client-executed tool (dispatched via
    /// `on_tool_call`).
    pub fn add_tool_result(&mut self, tool_call_id: &str, output: Value, is_error: bool) {
        let Some(owner_id) = self.tool_call_to_message.get(tool_call_id).cloned() else {
            log::debug!("add_tool_result for unknown tool call id {tool_call_id}");
            return;
        };

        self.messages = update_tool_call_with_output(&self.messages, tool_call_id, output.clone(), Some(ToolCallState::InputComplete));

        let content = match &output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let result_state = if is_error { ToolResultState::Error } else { ToolResultState::Complete };
        let error = if is_error { Some(content.clone()) } else { None };
        self.messages = update_tool_result_part(&self.messages, &owner_id, tool_call_id, &content, result_state, error);
        self.notify_messages_change();
    }

    pub fn add_tool_approval_response(&mut self, approval_id: &str, approved: bool) {
        self.messages = update_tool_call_approval_response(&self.messages, approval_id, approved);
        self.notify_messages_change();
    }

    /// True once no tool call is left in a state that blocks
    /// auto-continuation (`awaiting-input`, `input-streaming`, or
    /// `approval-requested`).
    pub fn are_all_tools_complete(&self) -> bool {
        self.message_states.values().all(|state| {
            state
                .tool_calls
                .values()
                .all(|tc| !matches!(tc.state, ToolCallState::AwaitingInput | ToolCallState::InputStreaming | ToolCallState::ApprovalRequested))
        })
    }

    /// Truncates the conversation to everything up to and including
    /// `message_id`, rebuilding indices. Used by `ChatClient::reload`.
    pub fn remove_messages_after(&mut self, message_id: &str) {
        let cut = self.messages.iter().position(|m| m.id == message_id);
        let kept = match cut {
            Some(index) => self.messages[..=index].to_vec(),
            None => Vec::new(),
        };
        self.set_messages(kept);
    }

    pub fn clear_messages(&mut self) {
        self.set_messages(Vec::new());
    }

    pub fn start_recording(&mut self) {
        self.recording = Some(Recording::new());
    }

    pub fn get_recording(&self) -> Option<&Recording> {
        self.recording.as_ref()
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.message_states.clear();
        self.active_message_ids.clear();
        self.tool_call_to_message.clear();
        self.pending_manual_message_id = None;
        self.finish_reason = None;
        self.has_error = false;
        self.is_done = false;
        self.recording = None;
        self.emission_strategy.reset();
    }

    /// Feeds every item of `stream` through `process_chunk`, translating
    /// a transport-level `Err` into a synthesized `RUN_ERROR` so the
    /// conversation always reaches a terminal state (mirrors the
    /// default session adapter's own `send` contract).
    pub async fn process<S>(&mut self, mut stream: Pin<Box<S>>)
    where
        S: Stream<Item = Result<Event, TransportError>> + ?Sized,
    {
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => self.process_chunk(event),
                Err(err) => {
                    self.process_chunk(Event::RunError {
                        error: RunErrorPayload { message: err.to_string(), code: None },
                        timestamp: now_ms(),
                    });
                    break;
                }
            }
        }
    }

    /// Applies one event. Never fails : protocol violations are
    /// matched and recovered locally.
    pub fn process_chunk(&mut self, event: Event) {
        if let Some(recording) = &mut self.recording {
            recording.push(now_ms(), event.clone());
        }

        let mutated = match event {
            Event::TextMessageStart { message_id, role, timestamp } => self.handle_text_message_start(message_id, role, timestamp),
            Event::TextMessageContent { message_id, delta, content, timestamp } => {
                self.handle_text_message_content(message_id, delta, content, timestamp)
            }
            Event::TextMessageEnd { message_id, timestamp } => self.handle_text_message_end(message_id, timestamp),
            Event::ToolCallStart { tool_call_id, tool_name, parent_message_id, index, timestamp } => {
                self.handle_tool_call_start(tool_call_id, tool_name, parent_message_id, index, timestamp)
            }
            Event::ToolCallArgs { tool_call_id, delta, timestamp } => self.handle_tool_call_args(tool_call_id, delta, timestamp),
            Event::ToolCallEnd { tool_call_id, input, result, timestamp } => self.handle_tool_call_end(tool_call_id, input, result, timestamp),
            Event::StepFinished { message_id, delta, content, timestamp } => {
                self.handle_step_finished(message_id, delta, content, timestamp)
            }
            Event::RunFinished { finish_reason, timestamp } => {
                self.handle_run_finished(finish_reason, timestamp);
                false
            }
            Event::RunError { error, timestamp } => {
                self.handle_run_error(error, timestamp);
                false
            }
            Event::MessagesSnapshot { messages, .. } => {
                self.set_messages(messages);
                false
            }
            Event::Custom { name, data, timestamp } => self.handle_custom(name, data, timestamp),
            Event::Unknown => {
                log::debug!("ignoring event of unrecognized type");
                false
            }
        };

        if mutated {
            self.notify_messages_change();
        }
    }

    pub fn finalize_stream(&mut self) {
        if !self.has_error {
            if let Some(last) = self.messages.last() {
                if last.role == Role::Assistant && last.is_whitespace_only() {
                    let pruned_id = last.id.clone();
                    self.messages.pop();
                    self.message_states.remove(&pruned_id);
                    self.active_message_ids.retain(|id| id != &pruned_id);
                }
            }
        }

        self.is_done = true;
        self.active_message_ids.clear();

        let last = self.messages.last().cloned();
        if let Some(cb) = &mut self.on_stream_end {
            cb(last.as_ref());
        }
        self.notify_messages_change();
    }

    pub fn replay(recording: &Recording) -> ProcessorResult {
        let mut processor = StreamProcessor::new();
        for (_, event) in recording.events() {
            processor.process_chunk(event.clone());
        }
        ProcessorResult { messages: processor.messages, finish_reason: processor.finish_reason, has_error: processor.has_error }
    }

    // ---- internals ---------------------------------------------------

    fn notify_messages_change(&mut self) {
        if let Some(cb) = &mut self.on_messages_change {
            cb(&self.messages);
        }
    }

    fn ensure_message_exists(&mut self, message_id: &str, role: Role) {
        if !self.message_states.contains_key(message_id) {
            self.message_states.insert(message_id.to_string(), MessageStreamState::new(role));
            self.messages.push(UIMessage::new(message_id, role));
            self.active_message_ids.push(message_id.to_string());
        }
    }

    /// Resolves `incoming_id` against `pending_manual_message_id`,
    /// rebinding any state already accumulated under the pending id
    /// (id rebinding).
    fn resolve_message_id(&mut self, incoming_id: &str) -> String {
        let Some(pending) = self.pending_manual_message_id.clone() else {
            return incoming_id.to_string();
        };
        if pending != incoming_id && self.message_states.contains_key(&pending) {
            self.rebind_message_id(&pending, incoming_id);
        }
        self.pending_manual_message_id = None;
        incoming_id.to_string()
    }

    fn rebind_message_id(&mut self, old_id: &str, new_id: &str) {
        if old_id == new_id {
            return;
        }
        if let Some(state) = self.message_states.remove(old_id) {
            self.message_states.insert(new_id.to_string(), state);
        }
        for message in self.messages.iter_mut() {
            if message.id == old_id {
                message.id = new_id.to_string();
            }
        }
        for id in self.active_message_ids.iter_mut() {
            if id == old_id {
                *id = new_id.to_string();
            }
        }
        for owner in self.tool_call_to_message.values_mut() {
            if owner == old_id {
                *owner = new_id.to_string();
            }
        }
    }

    fn resolve_tool_call_owner(&mut self, parent_message_id: Option<String>) -> String {
        if let Some(parent) = parent_message_id {
            return self.resolve_message_id(&parent);
        }
        if let Some(pending) = self.pending_manual_message_id.take() {
            return pending;
        }
        if let Some(last) = self.active_message_ids.last() {
            return last.clone();
        }
        next_id("msg")
    }

    fn handle_text_message_start(&mut self, message_id: String, role: Role, _timestamp: i64) -> bool {
        let resolved_id = self.resolve_message_id(&message_id);
        let already_open = self.message_states.contains_key(&resolved_id);
        self.ensure_message_exists(&resolved_id, role);
        !already_open
    }

    fn handle_text_message_content(&mut self, message_id: String, delta: Option<String>, content: Option<String>, _timestamp: i64) -> bool {
        let resolved_id = self.resolve_message_id(&message_id);
        self.ensure_message_exists(&resolved_id, Role::Assistant);

        {
            let state = self.message_states.get_mut(&resolved_id).expect("just ensured");
            if state.has_tool_calls_since_text_start {
                state.current_segment_text.clear();
                state.has_tool_calls_since_text_start = false;
                self.emission_strategy.reset();
            }
        }

        let current_segment = self.message_states.get(&resolved_id).expect("just ensured").current_segment_text.clone();

        let (new_segment, applied_delta) = if let Some(delta) = delta.filter(|d| !d.is_empty()) {
            let mut segment = current_segment.clone();
            segment.push_str(&delta);
            (segment, delta)
        } else if let Some(content) = content {
            if current_segment.starts_with(&content) {
                (current_segment.clone(), String::new())
            } else if content.starts_with(&current_segment) {
                let suffix = content[current_segment.len()..].to_string();
                (content, suffix)
            } else {
                let mut segment = current_segment.clone();
                segment.push_str(&content);
                (segment, content)
            }
        } else {
            return false;
        };

        if new_segment == current_segment {
            return false;
        }

        self.messages = update_text_part(&self.messages, &resolved_id, &new_segment);
        let should_emit = self.emission_strategy.should_emit(&applied_delta, &new_segment);

        {
            let state = self.message_states.get_mut(&resolved_id).expect("just ensured");
            state.current_segment_text = new_segment.clone();
            state.total_text_content.push_str(&applied_delta);
        }

        if should_emit {
            if let Some(cb) = &mut self.on_text_update {
                cb(&resolved_id, &new_segment);
            }
            if let Some(state) = self.message_states.get_mut(&resolved_id) {
                state.last_emitted_text = new_segment;
            }
        }

        true
    }

    fn handle_text_message_end(&mut self, message_id: String, _timestamp: i64) -> bool {
        let resolved_id = self.resolve_message_id(&message_id);
        self.force_complete_tool_calls_for_message(&resolved_id)
    }

    fn handle_tool_call_start(
        &mut self,
        tool_call_id: String,
        tool_name: String,
        parent_message_id: Option<String>,
        _index: Option<usize>,
        _timestamp: i64,
    ) -> bool {
        if self.tool_call_to_message.contains_key(&tool_call_id) {
            log::debug!("duplicate TOOL_CALL_START for {tool_call_id}");
            return false;
        }

        let owner_id = self.resolve_tool_call_owner(parent_message_id);
        self.ensure_message_exists(&owner_id, Role::Assistant);
        self.tool_call_to_message.insert(tool_call_id.clone(), owner_id.clone());

        {
            let state = self.message_states.get_mut(&owner_id).expect("just ensured");
            state.has_tool_calls_since_text_start = true;
            state.tool_call_order.push(tool_call_id.clone());
            state.tool_calls.insert(
                tool_call_id.clone(),
                InternalToolCallState {
                    name: tool_name.clone(),
                    arguments: String::new(),
                    state: ToolCallState::AwaitingInput,
                    parent_message_id: Some(owner_id.clone()),
                },
            );
        }

        self.messages = update_tool_call_part(
            &self.messages,
            &owner_id,
            ToolCallUpdate { id: &tool_call_id, name: &tool_name, arguments: "", state: ToolCallState::AwaitingInput },
        );
        if let Some(cb) = &mut self.on_tool_call_state_change {
            cb(&owner_id, &tool_call_id, ToolCallState::AwaitingInput, "");
        }
        true
    }

    fn handle_tool_call_args(&mut self, tool_call_id: String, delta: String, _timestamp: i64) -> bool {
        let Some(owner_id) = self.tool_call_to_message.get(&tool_call_id).cloned() else {
            log::debug!("orphan TOOL_CALL_ARGS for unknown id {tool_call_id}");
            return false;
        };

        let (name, arguments, new_state) = {
            let state = self.message_states.get_mut(&owner_id).expect("routed by tool_call_to_message");
            let tc = state.tool_calls.get_mut(&tool_call_id).expect("routed by tool_call_to_message");
            tc.arguments.push_str(&delta);
            if tc.state == ToolCallState::AwaitingInput && !delta.is_empty() {
                tc.state = ToolCallState::InputStreaming;
            }
            (tc.name.clone(), tc.arguments.clone(), tc.state)
        };

        self.messages = update_tool_call_part(
            &self.messages,
            &owner_id,
            ToolCallUpdate { id: &tool_call_id, name: &name, arguments: &arguments, state: new_state },
        );
        if let Some(cb) = &mut self.on_tool_call_state_change {
            cb(&owner_id, &tool_call_id, new_state, &arguments);
        }
        true
    }

    fn handle_tool_call_end(&mut self, tool_call_id: String, input: Option<Value>, result: Option<String>, _timestamp: i64) -> bool {
        let Some(owner_id) = self.tool_call_to_message.get(&tool_call_id).cloned() else {
            log::debug!("orphan TOOL_CALL_END for unknown id {tool_call_id}");
            return false;
        };

        let (name, final_arguments) = {
            let state = self.message_states.get_mut(&owner_id).expect("routed by tool_call_to_message");
            let tc = state.tool_calls.get_mut(&tool_call_id).expect("routed by tool_call_to_message");
            tc.state = ToolCallState::InputComplete;
            if let Some(input_value) = &input {
                tc.arguments = serde_json::to_string(input_value).unwrap_or_else(|_| tc.arguments.clone());
            }
            (tc.name.clone(), tc.arguments.clone())
        };

        self.messages = update_tool_call_part(
            &self.messages,
            &owner_id,
            ToolCallUpdate { id: &tool_call_id, name: &name, arguments: &final_arguments, state: ToolCallState::InputComplete },
        );
        if let Some(cb) = &mut self.on_tool_call_state_change {
            cb(&owner_id, &tool_call_id, ToolCallState::InputComplete, &final_arguments);
        }

        if let Some(result_text) = result {
            self.messages =
                update_tool_call_with_output(&self.messages, &tool_call_id, Value::String(result_text.clone()), Some(ToolCallState::InputComplete));
            self.messages = update_tool_result_part(&self.messages, &owner_id, &tool_call_id, &result_text, ToolResultState::Complete, None);
        }
        true
    }

    fn handle_step_finished(&mut self, message_id: Option<String>, delta: Option<String>, content: Option<String>, _timestamp: i64) -> bool {
        let resolved_id = match message_id {
            Some(id) => self.resolve_message_id(&id),
            None => self
                .pending_manual_message_id
                .clone()
                .or_else(|| self.active_message_ids.last().cloned())
                .unwrap_or_else(|| next_id("msg")),
        };
        self.ensure_message_exists(&resolved_id, Role::Assistant);

        let new_thinking = {
            let state = self.message_states.get_mut(&resolved_id).expect("just ensured");
            if let Some(delta) = delta.filter(|d| !d.is_empty()) {
                state.thinking_content.push_str(&delta);
                Some(state.thinking_content.clone())
            } else if let Some(content) = content {
                state.thinking_content = content;
                Some(state.thinking_content.clone())
            } else {
                None
            }
        };

        let Some(thinking) = new_thinking else {
            return false;
        };
        self.messages = update_thinking_part(&self.messages, &resolved_id, &thinking);
        if let Some(cb) = &mut self.on_thinking_update {
            cb(&resolved_id, &thinking);
        }
        true
    }

    fn handle_run_finished(&mut self, finish_reason: FinishReason, _timestamp: i64) {
        self.finish_reason = Some(finish_reason);
        self.complete_all_tool_calls();
        self.finalize_stream();
    }

    fn handle_run_error(&mut self, error: RunErrorPayload, _timestamp: i64) {
        self.has_error = true;
        log::warn!("run error: {}", error.message);
        if let Some(cb) = &mut self.on_error {
            cb(&error.message);
        }
        self.complete_all_tool_calls();
        self.finalize_stream();
    }

    fn handle_custom(&mut self, name: String, data: Value, _timestamp: i64) -> bool {
        match name.as_str() {
            CUSTOM_TOOL_INPUT_AVAILABLE => {
                let Some(tool_call_id) = data.get("toolCallId").and_then(Value::as_str) else {
                    log::debug!("tool-input-available CUSTOM event missing toolCallId");
                    return false;
                };
                let tool_name = data.get("toolName").and_then(Value::as_str).unwrap_or_default().to_string();
                let input = data.get("input").cloned().unwrap_or(Value::Null);
                if let Some(cb) = &mut self.on_tool_call {
                    cb(ToolCallDispatch { tool_call_id: tool_call_id.to_string(), tool_name, input });
                }
                false
            }
            CUSTOM_APPROVAL_REQUESTED => {
                let Some(tool_call_id) = data.get("toolCallId").and_then(Value::as_str) else {
                    log::debug!("approval-requested CUSTOM event missing toolCallId");
                    return false;
                };
                let tool_name = data.get("toolName").and_then(Value::as_str).unwrap_or_default().to_string();
                let input = data.get("input").cloned().unwrap_or(Value::Null);
                let Some(approval_id) = data.get("approval").and_then(|a| a.get("id")).and_then(Value::as_str) else {
                    log::debug!("approval-requested CUSTOM event missing approval.id");
                    return false;
                };

                let mutated = if let Some(owner_id) = self.tool_call_to_message.get(tool_call_id).cloned() {
                    self.messages = update_tool_call_approval(&self.messages, &owner_id, tool_call_id, approval_id);
                    true
                } else {
                    log::debug!("approval-requested for unknown tool call id {tool_call_id}");
                    false
                };

                if let Some(cb) = &mut self.on_approval_request {
                    cb(ApprovalRequest {
                        tool_call_id: tool_call_id.to_string(),
                        tool_name,
                        input,
                        approval_id: approval_id.to_string(),
                    });
                }
                mutated
            }
            other => {
                log::debug!("ignoring unrecognized CUSTOM event name {other}");
                false
            }
        }
    }

    /// Force-advances any tool call still below `input-complete` on
    /// `message_id` — called by `TEXT_MESSAGE_END` . Approval
    /// states are never force-advanced: they remain pending an
    /// out-of-band `add_tool_approval_response`.
    fn force_complete_tool_calls_for_message(&mut self, message_id: &str) -> bool {
        let tool_call_ids: Vec<String> = match self.message_states.get(message_id) {
            Some(state) => state.tool_call_order.clone(),
            None => return false,
        };

        let mut mutated = false;
        for tool_call_id in tool_call_ids {
            let should_force = self
                .message_states
                .get(message_id)
                .and_then(|s| s.tool_calls.get(&tool_call_id))
                .map(|tc| tc.state < ToolCallState::InputComplete)
                .unwrap_or(false);
            if !should_force {
                continue;
            }

            let (name, arguments) = {
                let state = self.message_states.get_mut(message_id).expect("checked above");
                let tc = state.tool_calls.get_mut(&tool_call_id).expect("checked above");
                tc.state = ToolCallState::InputComplete;
                (tc.name.clone(), tc.arguments.clone())
            };
            self.messages = update_tool_call_part(
                &self.messages,
                message_id,
                ToolCallUpdate { id: &tool_call_id, name: &name, arguments: &arguments, state: ToolCallState::InputComplete },
            );
            if let Some(cb) = &mut self.on_tool_call_state_change {
                cb(message_id, &tool_call_id, ToolCallState::InputComplete, &arguments);
            }
            mutated = true;
        }
        mutated
    }

    /// The stream-end safety net : force-completes every tool
    /// call across every active message, not just one.
    fn complete_all_tool_calls(&mut self) {
        let message_ids = self.active_message_ids.clone();
        for message_id in message_ids {
            self.force_complete_tool_calls_for_message(&message_id);
        }
    }
}
