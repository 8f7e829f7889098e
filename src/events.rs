//! The discriminated event union an adapter stream yields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Role;

/// Token usage reported on a `RUN_FINISHED`/custom data event. Adapters
/// are not required to report usage; hosts that want it read it out of
/// `Event::Custom` data or a provider-specific side channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<usize>,
}

/// An error payload carried by `RUN_ERROR`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// The terminal reason a run completed with, carried by `RUN_FINISHED`.
///
/// Serializes/deserializes as a bare string (`"stop"`, `"tool_calls"`,
/// ...) rather than serde's default externally-tagged representation,
/// so an adapter-supplied reason outside the known set round-trips
/// through `Other` instead of failing the whole event's parse — the
/// same "never throw, tolerate the unexpected" posture as the rest of
/// unknown-event recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other(String),
}

impl FinishReason {
    fn as_wire_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Error => "error",
            FinishReason::Other(s) => s,
        }
    }

    pub(crate) fn from_wire_str(s: &str) -> Self {
        match s {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

impl Serialize for FinishReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> Deserialize<'de> for FinishReason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(FinishReason::from_wire_str(&s))
    }
}

/// One record on the adapter stream, tagged by `type`.
///
/// Every variant carries `timestamp` (ms since epoch). Adapters MUST
/// emit `ToolCallStart` before any `ToolCallArgs`/`ToolCallEnd` for the
/// same id, and MUST emit exactly one of `RunFinished`/`RunError` per
/// run. Unknown `type` values round-trip through `Unknown` rather than
/// failing to deserialize, so the host always has something concrete
/// to ignore instead of a hard parse error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart {
        #[serde(rename = "messageId")]
        message_id: String,
        role: Role,
        timestamp: i64,
    },
    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        timestamp: i64,
    },
    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd {
        #[serde(rename = "messageId")]
        message_id: String,
        timestamp: i64,
    },
    #[serde(rename = "TOOL_CALL_START")]
    ToolCallStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default, rename = "parentMessageId", skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        timestamp: i64,
    },
    #[serde(rename = "TOOL_CALL_ARGS")]
    ToolCallArgs {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        delta: String,
        timestamp: i64,
    },
    #[serde(rename = "TOOL_CALL_END")]
    ToolCallEnd {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        timestamp: i64,
    },
    #[serde(rename = "STEP_FINISHED")]
    StepFinished {
        #[serde(default, rename = "messageId", skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        timestamp: i64,
    },
    #[serde(rename = "RUN_FINISHED")]
    RunFinished {
        #[serde(rename = "finishReason")]
        finish_reason: FinishReason,
        timestamp: i64,
    },
    #[serde(rename = "RUN_ERROR")]
    RunError { error: RunErrorPayload, timestamp: i64 },
    #[serde(rename = "MESSAGES_SNAPSHOT")]
    MessagesSnapshot {
        messages: Vec<crate::message::UIMessage>,
        timestamp: i64,
    },
    #[serde(rename = "CUSTOM")]
    Custom {
        name: String,
        data: Value,
        timestamp: i64,
    },
    /// Fallback for any `type` this crate does not recognize. Carries
    /// no payload — `#[serde(other)]` only supports unit variants, so a
    /// host that needs the original value back must keep its own copy
    /// of the raw frame before decoding; the processor silently ignores
    /// this variant.
    #[serde(other)]
    Unknown,
}

/// The two reserved `CUSTOM` event names.
pub const CUSTOM_TOOL_INPUT_AVAILABLE: &str = "tool-input-available";
pub const CUSTOM_APPROVAL_REQUESTED: &str = "approval-requested";
