//! NDJSON `ConnectionAdapter`: one JSON object per line, framed
//! by manually buffering across byte chunks. Modeled on the
//! newline-buffering technique in an Ollama NDJSON streaming reference
//! (`neuron-provider-ollama-src-streaming.rs`) — there's no NDJSON
//! crate in this dependency stack, so this follows the same
//! hand-rolled `line_buf.find('\n')` drain loop, wired into the same
//! `async_stream::stream! {}` + `reqwest` POST shape as `sse.rs`.

use std::pin::Pin;

use bytes::BytesMut;
use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::error::TransportError;
use crate::events::Event;
use crate::legacy::decode_event;
use crate::message::UIMessage;

use super::{CancelToken, ConnectionAdapter};

pub struct NdjsonConnectionAdapter {
    client: reqwest::Client,
    endpoint: String,
    legacy_fallback: bool,
}

impl NdjsonConnectionAdapter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), legacy_fallback: false }
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into(), legacy_fallback: false }
    }

    pub fn with_legacy_fallback(mut self, enabled: bool) -> Self {
        self.legacy_fallback = enabled;
        self
    }
}

impl ConnectionAdapter for NdjsonConnectionAdapter {
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

            let mut byte_stream = response.bytes_stream();
            let mut line_buf = BytesMut::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = signal.cancelled() => {
                        yield Err(TransportError::Aborted);
                        break;
                    }
                    next = byte_stream.next() => next,
                };

                let Some(chunk_result) = next else { break };

                let chunk = match chunk_result {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(TransportError::Http(err));
                        break;
                    }
                };

                line_buf.extend_from_slice(&chunk);

                while let Some(newline_pos) = line_buf.iter().position(|&b| b == b'\n') {
                    let line_bytes = line_buf.split_to(newline_pos + 1);
                    let line = match std::str::from_utf8(&line_bytes[..line_bytes.len() - 1]) {
                        Ok(line) => line.trim_end_matches('\r').trim(),
                        Err(err) => {
                            yield Err(TransportError::Protocol(format!("invalid UTF-8 line: {err}")));
                            return;
                        }
                    };

                    if line.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<Value>(line) {
                        Ok(raw) => yield Ok(decode_event(&raw, legacy_fallback)),
                        Err(err) => {
                            yield Err(TransportError::Protocol(format!("malformed NDJSON line: {err}")));
                            return;
                        }
                    }
                }
            }

            let remainder = line_buf.iter().position(|&b| !b.is_ascii_whitespace());
            if remainder.is_some() {
                if let Ok(line) = std::str::from_utf8(&line_buf) {
                    if let Ok(raw) = serde_json::from_str::<Value>(line.trim()) {
                        yield Ok(decode_event(&raw, legacy_fallback));
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

    #[tokio::test]
    async fn connect_with_pre_cancelled_signal_yields_aborted() {
        let adapter = NdjsonConnectionAdapter::new("http://127.0.0.1:0/chat");
        let signal = CancelToken::new();
        signal.cancel();
        let mut stream = adapter.connect(&[], None, signal);
        match stream.next().await {
            Some(Err(TransportError::Aborted)) => {}
            other => panic!("expected Aborted, got {other:?}"),
        }
    }
}
