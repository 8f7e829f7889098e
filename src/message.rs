//! Conversation data model: `UIMessage` and its parts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Where a `ContentPart`'s bytes live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentSource {
    Url {
        value: String,
        #[serde(rename = "mimeType")]
        mime_type: Option<String>,
    },
    Data {
        value: String,
        #[serde(rename = "mimeType")]
        mime_type: Option<String>,
    },
}

/// Multimodal content kinds passed through opaquely.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Audio,
    Video,
    Document,
}

/// The state a `ToolCallPart` advances through. Ordering is monotonic:
/// `awaiting-input < input-streaming < input-complete`, and
/// independently `approval-requested < approval-responded`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ToolCallState {
    AwaitingInput,
    InputStreaming,
    InputComplete,
    ApprovalRequested,
    ApprovalResponded,
}

impl Default for ToolCallState {
    fn default() -> Self {
        ToolCallState::AwaitingInput
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultState {
    Streaming,
    Complete,
    Error,
}

/// Approval metadata attached to a `ToolCallPart` during an
/// approval-gated tool-call flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: String,
    pub needs_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
}

/// A single ordered fragment of a `UIMessage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        content: String,
    },
    /// Model reasoning. UI-only: never sent back to the model
    /// (dropped by `to_model_messages`).
    Thinking {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        /// Raw accumulated argument JSON text. Parse via
        /// `json_partial::parse_partial_json` for a live preview, or
        /// `serde_json::from_str` once `state == InputComplete`.
        arguments: String,
        state: ToolCallState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approval: Option<Approval>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        content: String,
        state: ToolResultState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Content {
        kind: ContentKind,
        source: ContentSource,
    },
}

impl MessagePart {
    pub fn is_text(&self) -> bool {
        matches!(self, MessagePart::Text { .. })
    }

    pub fn is_thinking(&self) -> bool {
        matches!(self, MessagePart::Thinking { .. })
    }

    pub fn as_tool_call_id(&self) -> Option<&str> {
        match self {
            MessagePart::ToolCall { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// An ordered conversation record . Lists of `UIMessage` are
/// treated as immutable snapshots throughout this crate — mutators
/// (`mutators.rs`) return new `Vec<UIMessage>` rather than mutating in
/// place; the processor owns the only mutable reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UIMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl UIMessage {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
            created_at: None,
        }
    }

    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            parts: vec![MessagePart::Text { content: text.into() }],
            created_at: None,
        }
    }

    /// Concatenates all `Text` parts, in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// True if every `Text` part trims to empty and there are no other
    /// parts. Used by finalization's whitespace-pruning rule.
    pub fn is_whitespace_only(&self) -> bool {
        !self.parts.is_empty()
            && self
                .parts
                .iter()
                .all(|p| matches!(p, MessagePart::Text { content } if content.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenates_only_text_parts() {
        let msg = UIMessage {
            id: "m1".into(),
            role: Role::Assistant,
            parts: vec![
                MessagePart::Text { content: "Hello".into() },
                MessagePart::ToolCall {
                    id: "t1".into(),
                    name: "get".into(),
                    arguments: "{}".into(),
                    state: ToolCallState::InputComplete,
                    approval: None,
                    output: None,
                },
                MessagePart::Text { content: " world".into() },
            ],
            created_at: None,
        };
        assert_eq!(msg.text(), "Hello world");
    }

    #[test]
    fn whitespace_only_detects_blank_text() {
        let msg = UIMessage {
            id: "m1".into(),
            role: Role::Assistant,
            parts: vec![MessagePart::Text { content: "\n  ".into() }],
            created_at: None,
        };
        assert!(msg.is_whitespace_only());
    }

    #[test]
    fn whitespace_only_false_with_tool_call() {
        let msg = UIMessage {
            id: "m1".into(),
            role: Role::Assistant,
            parts: vec![
                MessagePart::Text { content: "".into() },
                MessagePart::ToolCall {
                    id: "t1".into(),
                    name: "get".into(),
                    arguments: "{}".into(),
                    state: ToolCallState::AwaitingInput,
                    approval: None,
                    output: None,
                },
            ],
            created_at: None,
        };
        assert!(!msg.is_whitespace_only());
    }

    #[test]
    fn tool_call_state_ordering_matches_monotonicity() {
        assert!(ToolCallState::AwaitingInput < ToolCallState::InputStreaming);
        assert!(ToolCallState::InputStreaming < ToolCallState::InputComplete);
        assert!(ToolCallState::ApprovalRequested < ToolCallState::ApprovalResponded);
    }
}
