//! SSE `ConnectionAdapter`. Modeled on `OpenAIProvider::chat`
//! (`src/llm/openai.rs`): a `reqwest` POST whose
//! body is read with `.bytes_stream().eventsource()` inside an
//! `async_stream::stream! {}` block, with a `"[DONE]"` sentinel ending
//! the stream. Generalized from OpenAI's `ChatCompletionChunk` wire
//! shape to this crate's `Event` schema, and from a bare `Stream::next`
//! loop to one that also races `signal.cancelled()` at every await
//! point.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::TransportError;
use crate::events::Event;
use crate::legacy::decode_event;
use crate::message::UIMessage;

use super::{CancelToken, ConnectionAdapter};

const DONE_SENTINEL: &str = "[DONE]";

/// Posts `{ messages, data }` to `endpoint` and decodes the response
/// body as a sequence of SSE `data:` frames, one `Event` per frame.
pub struct SseConnectionAdapter {
    client: reqwest::Client,
    endpoint: String,
    legacy_fallback: bool,
}

impl SseConnectionAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), legacy_fallback: false }
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into(), legacy_fallback: false }
    }

    /// Opts into falling back to the legacy event vocabulary  for
    /// any payload the canonical schema doesn't recognize.
    pub fn with_legacy_fallback(mut self, enabled: bool) -> Self {
        self.legacy_fallback = enabled;
        self
    }
}

impl ConnectionAdapter for SseConnectionAdapter {
    fn connect(
        &self,
        messages: &[UIMessage],
        data: Option<Value>,
        signal: CancelToken,
    ) -> Pin<Box<dyn Stream<Item = Result<Event, TransportError>> + Send>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let legacy_fallback = self.legacy_fallback;
        let body = serde_json::json!({ "messages": messages, "data": data });

        let stream = async_stream::stream! {
            if signal.is_cancelled() {
                yield Err(TransportError::Aborted);
                return;
            }

            let response = tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    yield Err(TransportError::Aborted);
                    return;
                }
                result = client.post(&endpoint).json(&body).send() => result,
            };

            let response = match response {
                Ok(response) => response,
                Err(err) => {
                    yield Err(TransportError::Http(err));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                yield Err(TransportError::Protocol(format!("HTTP {status}: {text}")));
                return;
            }

            let mut event_stream = response.bytes_stream().eventsource();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = signal.cancelled() => {
                        yield Err(TransportError::Aborted);
                        break;
                    }
                    next = event_stream.next() => next,
                };

                let Some(frame) = next else { break };

                match frame {
                    Ok(frame) => {
                        if frame.data == DONE_SENTINEL {
                            break;
                        }
                        match serde_json::from_str::<Value>(&frame.data) {
                            Ok(raw) => yield Ok(decode_event(&raw, legacy_fallback)),
                            Err(err) => {
                                yield Err(TransportError::Protocol(format!("malformed SSE payload: {err}")));
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        yield Err(TransportError::Protocol(format!("SSE stream error: {err}")));
                        break;
                    }
                }
            }
        };

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_sentinel_is_recognized() {
        assert_eq!(DONE_SENTINEL, "[DONE]");
    }

    #[tokio::test]
    async fn connect_with_pre_cancelled_signal_yields_aborted() {
        let adapter = SseConnectionAdapter::new("http://127.0.0.1:0/chat");
        let signal = CancelToken::new();
        signal.cancel();
        let mut stream = adapter.connect(&[], None, signal);
        match stream.next().await {
            Some(Err(TransportError::Aborted)) => {}
            other => panic!("expected Aborted, got {other:?}"),
        }
    }
}
