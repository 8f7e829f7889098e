//! Pure message mutators.
//!
//! Each function is total and idempotent on equal inputs. None mutate
//! their input: every function returns a new `Vec<UIMessage>`; messages
//! untouched by the call are cloned as-is (no persistent-vector crate
//! is in the stack at this scale, so sharing is approximated with
//! `Clone` rather than structural sharing).

use crate::message::{Approval, ContentSource, MessagePart, Role, ToolCallState, ToolResultState, UIMessage};

fn clone_with_target<F>(messages: &[UIMessage], target_id: &str, mut f: F) -> Vec<UIMessage>
where
    F: FnMut(&mut UIMessage),
{
    messages
        .iter()
        .map(|m| {
            let mut m = m.clone();
            if m.id == target_id {
                f(&mut m);
            }
            m
        })
        .collect()
}

/// If the target message's last part is a `Text` part, replace its
/// content; otherwise push a new `Text` part. Pushing also covers the
/// "message id not found" case implicitly only when the caller has
/// already ensured the message exists — this function never creates a
/// message, it only edits parts within one that already exists.
pub fn update_text_part(messages: &[UIMessage], message_id: &str, content: &str) -> Vec<UIMessage> {
    clone_with_target(messages, message_id, |m| match m.parts.last_mut() {
        Some(MessagePart::Text { content: existing }) => *existing = content.to_string(),
        _ => m.parts.push(MessagePart::Text { content: content.to_string() }),
    })
}

/// Replaces the latest `Thinking` part in place (scanning from the
/// end); pushes a new one if none exists yet. There is at most one open
/// `Thinking` part per segment (invariant 4), so "latest" and
/// "only" coincide in practice.
pub fn update_thinking_part(messages: &[UIMessage], message_id: &str, content: &str) -> Vec<UIMessage> {
    clone_with_target(messages, message_id, |m| {
        if let Some(part) = m.parts.iter_mut().rev().find(|p| p.is_thinking()) {
            if let MessagePart::Thinking { content: existing } = part {
                *existing = content.to_string();
            }
        } else {
            m.parts.push(MessagePart::Thinking { content: content.to_string() });
        }
    })
}

pub struct ToolCallUpdate<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub arguments: &'a str,
    pub state: ToolCallState,
}

/// Upserts a `ToolCall` part by `id`: updates in place if a part with
/// that id already exists on the message, otherwise appends a new one.
pub fn update_tool_call_part(messages: &[UIMessage], message_id: &str, update: ToolCallUpdate<'_>) -> Vec<UIMessage> {
    clone_with_target(messages, message_id, |m| {
        let existing = m.parts.iter_mut().find(|p| p.as_tool_call_id() == Some(update.id));
        match existing {
            Some(MessagePart::ToolCall { name, arguments, state, .. }) => {
                *name = update.name.to_string();
                *arguments = update.arguments.to_string();
                *state = update.state;
            }
            Some(_) | None => m.parts.push(MessagePart::ToolCall {
                id: update.id.to_string(),
                name: update.name.to_string(),
                arguments: update.arguments.to_string(),
                state: update.state,
                approval: None,
                output: None,
            }),
        }
    })
}

/// Sets `output` (and optionally `state`) on the `ToolCall` part with
/// the given id, searching every message (the caller does not
/// necessarily know which message owns the call).
pub fn update_tool_call_with_output(
    messages: &[UIMessage],
    tool_call_id: &str,
    output: serde_json::Value,
    state: Option<ToolCallState>,
) -> Vec<UIMessage> {
    messages
        .iter()
        .map(|m| {
            let mut m = m.clone();
            for part in m.parts.iter_mut() {
                if let MessagePart::ToolCall { id, output: out, state: st, .. } = part {
                    if id == tool_call_id {
                        *out = Some(output.clone());
                        if let Some(new_state) = state {
                            *st = new_state;
                        }
                    }
                }
            }
            m
        })
        .collect()
}

/// Attaches approval metadata to the `ToolCall` part with `tool_call_id`
/// on `message_id` and moves its state to `approval-requested`.
pub fn update_tool_call_approval(
    messages: &[UIMessage],
    message_id: &str,
    tool_call_id: &str,
    approval_id: &str,
) -> Vec<UIMessage> {
    clone_with_target(messages, message_id, |m| {
        for part in m.parts.iter_mut() {
            if let MessagePart::ToolCall { id, state, approval, .. } = part {
                if id == tool_call_id {
                    *approval = Some(Approval {
                        id: approval_id.to_string(),
                        needs_approval: true,
                        approved: None,
                    });
                    *state = ToolCallState::ApprovalRequested;
                }
            }
        }
    })
}

/// Records the approval decision for `approval_id` wherever it appears
/// and moves the owning `ToolCall` part's state to
/// `approval-responded`. A response for an unknown `approval_id` is a
/// no-op (ApprovalMismatch).
pub fn update_tool_call_approval_response(messages: &[UIMessage], approval_id: &str, approved: bool) -> Vec<UIMessage> {
    messages
        .iter()
        .map(|m| {
            let mut m = m.clone();
            for part in m.parts.iter_mut() {
                if let MessagePart::ToolCall { state, approval, .. } = part {
                    if approval.as_ref().map(|a| a.id.as_str()) == Some(approval_id) {
                        if let Some(a) = approval {
                            a.approved = Some(approved);
                        }
                        *state = ToolCallState::ApprovalResponded;
                    }
                }
            }
            m
        })
        .collect()
}

/// Upserts a `ToolResult` part (keyed by `tool_call_id`) on `message_id`.
pub fn update_tool_result_part(
    messages: &[UIMessage],
    message_id: &str,
    tool_call_id: &str,
    content: &str,
    state: ToolResultState,
    error: Option<String>,
) -> Vec<UIMessage> {
    clone_with_target(messages, message_id, |m| {
        let existing = m.parts.iter_mut().find(|p| {
            matches!(p, MessagePart::ToolResult { tool_call_id: id, .. } if id == tool_call_id)
        });
        match existing {
            Some(MessagePart::ToolResult { content: c, state: s, error: e, .. }) => {
                *c = content.to_string();
                *s = state;
                *e = error.clone();
            }
            _ => m.parts.push(MessagePart::ToolResult {
                tool_call_id: tool_call_id.to_string(),
                content: content.to_string(),
                state,
                error,
            }),
        }
    })
}

/// Appends a `Content` (multimodal) part — required by `addUserMessage`
/// for user messages carrying non-text content.
pub fn append_content_part(
    messages: &[UIMessage],
    message_id: &str,
    kind: crate::message::ContentKind,
    source: ContentSource,
) -> Vec<UIMessage> {
    clone_with_target(messages, message_id, |m| {
        m.parts.push(MessagePart::Content { kind, source });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ContentKind;

    fn assistant(id: &str) -> UIMessage {
        UIMessage::new(id, Role::Assistant)
    }

    #[test]
    fn update_text_part_pushes_new_part_when_none_present() {
        let messages = vec![assistant("m1")];
        let out = update_text_part(&messages, "m1", "Hello");
        assert_eq!(out[0].parts, vec![MessagePart::Text { content: "Hello".into() }]);
    }

    #[test]
    fn update_text_part_replaces_last_text_in_place() {
        let messages = vec![assistant("m1")];
        let out = update_text_part(&messages, "m1", "Hel");
        let out = update_text_part(&out, "m1", "Hello");
        assert_eq!(out[0].parts.len(), 1);
        assert_eq!(out[0].parts[0], MessagePart::Text { content: "Hello".into() });
    }

    #[test]
    fn update_text_part_after_tool_call_pushes_new_segment() {
        let messages = vec![assistant("m1")];
        let out = update_text_part(&messages, "m1", "A");
        let out = update_tool_call_part(&out, "m1", ToolCallUpdate {
            id: "t1",
            name: "get",
            arguments: "{}",
            state: ToolCallState::InputComplete,
        });
        let out = update_text_part(&out, "m1", "B");
        assert_eq!(out[0].parts.len(), 3);
        assert!(out[0].parts[0].is_text());
        assert!(matches!(out[0].parts[1], MessagePart::ToolCall { .. }));
        assert!(out[0].parts[2].is_text());
    }

    #[test]
    fn update_tool_call_part_upserts_by_id() {
        let messages = vec![assistant("m1")];
        let out = update_tool_call_part(&messages, "m1", ToolCallUpdate {
            id: "t1",
            name: "get",
            arguments: "{\"x\":",
            state: ToolCallState::InputStreaming,
        });
        let out = update_tool_call_part(&out, "m1", ToolCallUpdate {
            id: "t1",
            name: "get",
            arguments: "{\"x\":1}",
            state: ToolCallState::InputComplete,
        });
        assert_eq!(out[0].parts.len(), 1);
        match &out[0].parts[0] {
            MessagePart::ToolCall { arguments, state, .. } => {
                assert_eq!(arguments, "{\"x\":1}");
                assert_eq!(*state, ToolCallState::InputComplete);
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn approval_response_is_noop_for_unknown_id() {
        let messages = vec![assistant("m1")];
        let out = update_tool_call_approval_response(&messages, "does-not-exist", true);
        assert_eq!(out, messages);
    }

    #[test]
    fn untouched_messages_are_unchanged() {
        let messages = vec![assistant("m1"), assistant("m2")];
        let out = update_text_part(&messages, "m1", "Hi");
        assert_eq!(out[1], messages[1]);
    }

    #[test]
    fn append_content_part_adds_multimodal_part() {
        let messages = vec![UIMessage::user("m1", "")];
        let out = append_content_part(
            &messages,
            "m1",
            ContentKind::Image,
            ContentSource::Url { value: "https://example.com/x.png".into(), mime_type: Some("image/png".into()) },
        );
        assert_eq!(out[0].parts.len(), 2);
    }
}
