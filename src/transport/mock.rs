//! In-memory `ConnectionAdapter` for tests: replays a fixed script of
//! events (or errors) regardless of the request it's given. Mirrors the
//! teacher's preference for hand-written fakes over a mocking crate
//! (no `mockall`/`wiremock` anywhere in its dependency stack).

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::events::Event;
use crate::message::UIMessage;

use super::{CancelToken, ConnectionAdapter};

/// Replays `script` verbatim on every `connect()` call, checking
/// `signal.is_cancelled()` before each item so a cancellation observed
/// mid-replay truncates the remaining script with a single trailing
/// `Aborted` rather than delivering it in full.
pub struct MockConnectionAdapter {
    script: Vec<Result<Event, TransportError>>,
    /// Requests seen so far, recorded for assertions (`messages`,
    /// `data` passed to each `connect()` call).
    requests: Arc<Mutex<Vec<(Vec<UIMessage>, Option<Value>)>>>,
}

impl MockConnectionAdapter {
    pub fn new(script: Vec<Result<Event, TransportError>>) -> Self {
        Self { script, requests: Arc::new(Mutex::new(Vec::new())) }
    }

    pub async fn requests(&self) -> Vec<(Vec<UIMessage>, Option<Value>)> {
        self.requests.lock().await.clone()
    }
}

impl ConnectionAdapter for MockConnectionAdapter {
    fn connect(
        &self,
        messages: &[UIMessage],
        data: Option<Value>,
        signal: CancelToken,
    ) -> Pin<Box<dyn Stream<Item = Result<Event, TransportError>> + Send>> {
        let script = self.script.clone();
        let requests = self.requests.clone();
        let messages = messages.to_vec();

        Box::pin(stream! {
            requests.lock().await.push((messages, data));

            for item in script {
                if signal.is_cancelled() {
                    yield Err(TransportError::Aborted);
                    return;
                }
                yield item;
            }
        })
    }
}
