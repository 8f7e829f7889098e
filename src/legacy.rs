//! Compatibility parser for an older event vocabulary: a prior processor
//! generation used `"text"`, `"tool-call-delta"`, and `"done"` instead of
//! the AG-UI vocabulary this crate treats as canonical everywhere else.
//!
//! `decode_event` tries the canonical schema first; it only falls back
//! to `translate_legacy` when the canonical parse lands on
//! `Event::Unknown` *and* the caller has opted into legacy fallback —
//! never the reverse. AG-UI stays canonical.
//! Both SSE and NDJSON transports take a `legacy_fallback: bool` and
//! route every decoded payload through this function.

use serde_json::Value;

use crate::events::{Event, FinishReason};

pub fn translate_legacy(value: &Value) -> Option<Event> {
    let tag = value.get("type")?.as_str()?;
    let timestamp = value.get("timestamp").and_then(Value::as_i64).unwrap_or(0);

    match tag {
        "text" => {
            let message_id = value.get("messageId")?.as_str()?.to_string();
            let delta = value.get("delta").and_then(Value::as_str).map(str::to_string);
            let content = value.get("content").and_then(Value::as_str).map(str::to_string);
            Some(Event::TextMessageContent { message_id, delta, content, timestamp })
        }
        "tool-call-delta" => {
            let tool_call_id = value.get("toolCallId")?.as_str()?.to_string();
            let delta = value.get("delta").and_then(Value::as_str).unwrap_or_default().to_string();
            Some(Event::ToolCallArgs { tool_call_id, delta, timestamp })
        }
        "done" => {
            let reason = value.get("reason").and_then(Value::as_str).unwrap_or("stop");
            Some(Event::RunFinished { finish_reason: FinishReason::from_wire_str(reason), timestamp })
        }
        _ => None,
    }
}

/// Decodes one raw JSON payload into an `Event`, falling back to the
/// legacy vocabulary only when `legacy_fallback` is set and the
/// canonical schema didn't recognize the `type` tag.
pub fn decode_event(raw: &Value, legacy_fallback: bool) -> Event {
    let canonical: Event = serde_json::from_value(raw.clone()).unwrap_or(Event::Unknown);
    if legacy_fallback && matches!(canonical, Event::Unknown) {
        translate_legacy(raw).unwrap_or(Event::Unknown)
    } else {
        canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn translates_legacy_text_delta() {
        let raw = json!({"type": "text", "messageId": "m1", "delta": "Hi", "timestamp": 1});
        let event = translate_legacy(&raw).unwrap();
        assert_eq!(
            event,
            Event::TextMessageContent { message_id: "m1".into(), delta: Some("Hi".into()), content: None, timestamp: 1 }
        );
    }

    #[test]
    fn translates_legacy_tool_call_delta() {
        let raw = json!({"type": "tool-call-delta", "toolCallId": "t1", "delta": "{\"x\":1}", "timestamp": 2});
        let event = translate_legacy(&raw).unwrap();
        assert_eq!(event, Event::ToolCallArgs { tool_call_id: "t1".into(), delta: "{\"x\":1}".into(), timestamp: 2 });
    }

    #[test]
    fn translates_legacy_done() {
        let raw = json!({"type": "done", "reason": "stop", "timestamp": 3});
        let event = translate_legacy(&raw).unwrap();
        assert_eq!(event, Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: 3 });
    }

    #[test]
    fn decode_event_prefers_canonical_schema() {
        let raw = json!({"type": "TEXT_MESSAGE_END", "messageId": "m1", "timestamp": 4});
        let event = decode_event(&raw, true);
        assert_eq!(event, Event::TextMessageEnd { message_id: "m1".into(), timestamp: 4 });
    }

    #[test]
    fn decode_event_ignores_legacy_fallback_when_disabled() {
        let raw = json!({"type": "text", "messageId": "m1", "delta": "Hi", "timestamp": 1});
        assert_eq!(decode_event(&raw, false), Event::Unknown);
    }

    #[test]
    fn decode_event_falls_back_to_legacy_when_enabled() {
        let raw = json!({"type": "text", "messageId": "m1", "delta": "Hi", "timestamp": 1});
        let event = decode_event(&raw, true);
        assert_eq!(
            event,
            Event::TextMessageContent { message_id: "m1".into(), delta: Some("Hi".into()), content: None, timestamp: 1 }
        );
    }
}
