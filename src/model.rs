//! The wire-facing representation a server reconstructs from
//! `UIMessage`s (`toModelMessages`). Modeled on the `ChatMessage`
//! tagged-enum wire type (`src/llm/openai.rs`) and its `Role` enum
//! (`src/llm/provider.rs`, which already has exactly the four
//! `System`/`User`/`Assistant`/`Tool` variants this needs), generalized
//! to be provider-neutral rather than tied to one wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ContentKind, ContentSource, MessagePart, Role, UIMessage};

/// Distinct from `message::Role`: `UIMessage.role` is only ever
/// user/assistant/system, but a tool result becomes its own
/// `role = tool` entry once flattened onto the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelContentPart {
    pub kind: ContentKind,
    pub source: ContentSource,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ModelContent {
    Text(String),
    Parts(Vec<ModelContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallWire {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelMessage {
    pub role: ModelRole,
    pub content: ModelContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallWire>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// User messages become `role=user` with either a plain string or an
/// array of multimodal content parts; assistant messages may carry a
/// `toolCalls` array and spawn one `role=tool` message per
/// `ToolResultPart`, keyed by `toolCallId` with stringified content.
/// `ThinkingPart`s are dropped — they never round-trip back to the
/// model.
pub fn to_model_messages(messages: &[UIMessage]) -> Vec<ModelMessage> {
    let mut out = Vec::new();

    for message in messages {
        let role = match message.role {
            Role::User => ModelRole::User,
            Role::Assistant => ModelRole::Assistant,
            Role::System => ModelRole::System,
        };

        let text = message.text();
        let multimodal_parts: Vec<ModelContentPart> = message
            .parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Content { kind, source } => {
                    Some(ModelContentPart { kind: *kind, source: source.clone() })
                }
                _ => None,
            })
            .collect();

        let content = if multimodal_parts.is_empty() {
            ModelContent::Text(text)
        } else {
            let mut parts = Vec::new();
            if !text.is_empty() {
                parts.push(ModelContentPart {
                    kind: ContentKind::Text,
                    source: ContentSource::Data { value: text, mime_type: Some("text/plain".into()) },
                });
            }
            parts.extend(multimodal_parts);
            ModelContent::Parts(parts)
        };

        let tool_calls: Vec<ToolCallWire> = message
            .parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::ToolCall { id, name, arguments, .. } => Some(ToolCallWire {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: serde_json::from_str(arguments).unwrap_or(Value::Null),
                }),
                _ => None,
            })
            .collect();

        out.push(ModelMessage {
            role,
            content,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: None,
        });

        for part in &message.parts {
            if let MessagePart::ToolResult { tool_call_id, content, .. } = part {
                out.push(ModelMessage {
                    role: ModelRole::Tool,
                    content: ModelContent::Text(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCallState;

    #[test]
    fn user_text_round_trips() {
        let messages = vec![UIMessage::user("m1", "hello")];
        let out = to_model_messages(&messages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role, ModelRole::User);
        assert_eq!(out[0].content, ModelContent::Text("hello".into()));
    }

    #[test]
    fn thinking_parts_are_dropped() {
        let messages = vec![UIMessage {
            id: "m1".into(),
            role: Role::Assistant,
            parts: vec![
                MessagePart::Thinking { content: "hmm".into() },
                MessagePart::Text { content: "answer".into() },
            ],
            created_at: None,
        }];
        let out = to_model_messages(&messages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, ModelContent::Text("answer".into()));
    }

    #[test]
    fn tool_result_parts_spawn_separate_tool_role_messages() {
        let messages = vec![UIMessage {
            id: "m1".into(),
            role: Role::Assistant,
            parts: vec![
                MessagePart::ToolCall {
                    id: "t1".into(),
                    name: "get".into(),
                    arguments: r#"{"x":1}"#.into(),
                    state: ToolCallState::InputComplete,
                    approval: None,
                    output: None,
                },
                MessagePart::ToolResult {
                    tool_call_id: "t1".into(),
                    content: "42".into(),
                    state: crate::message::ToolResultState::Complete,
                    error: None,
                },
            ],
            created_at: None,
        }];
        let out = to_model_messages(&messages);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, ModelRole::Assistant);
        assert_eq!(out[0].tool_calls.as_ref().unwrap()[0].name, "get");
        assert_eq!(out[1].role, ModelRole::Tool);
        assert_eq!(out[1].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(out[1].content, ModelContent::Text("42".into()));
    }
}
