//! Session transport: wraps a `ConnectionAdapter` so multiple
//! callers — typically a tab reconnecting after a refresh — can
//! observe the same in-flight run. Modeled on `ChatLoopHandle`'s
//! (`src/llm/provider.rs`) background task that owns the real stream
//! and talks to callers over an `mpsc::unbounded_channel`, generalized
//! into a replaceable buffer + waiter so a new `subscribe()` call can
//! take over mid-run without losing whatever is already in flight.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::TransportError;
use crate::events::{Event, FinishReason, RunErrorPayload};
use crate::message::UIMessage;
use crate::now_ms;
use crate::transport::{CancelToken, ConnectionAdapter};

type EventResult = Result<Event, TransportError>;

/// A session-level transport: `send()` drives a run to completion,
/// pushing every event it produces into the session's internal queue;
/// `subscribe()` attaches a fresh listener to that queue. Only the most
/// recently created subscriber receives events — exactly one active
/// subscriber at a time.
pub trait SessionAdapter: Send + Sync {
    fn subscribe(&self) -> Pin<Box<dyn Stream<Item = EventResult> + Send>>;

    fn send(
        &self,
        messages: &[UIMessage],
        data: Option<Value>,
        signal: CancelToken,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), TransportError>> + Send + '_>>;
}

/// The buffered events a subscriber hasn't drained yet, plus the
/// `oneshot` slot a subscriber is parked on once the buffer runs dry.
/// `subscribe()` detaches whatever waiter is currently registered and
/// hands the accumulated buffer to the new subscriber instead of
/// dropping it, so a reconnecting caller never misses events that
/// arrived between runs.
#[derive(Default)]
struct QueueState {
    buffer: VecDeque<EventResult>,
    waiter: Option<oneshot::Sender<EventResult>>,
}

impl QueueState {
    fn push(&mut self, item: EventResult) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(item);
        } else {
            self.buffer.push_back(item);
        }
    }
}

/// The stock `SessionAdapter`: `send()` runs `A` to completion and
/// pushes its output into a shared queue; `subscribe()` drains that
/// queue. The queue itself never suspends while locked, so a plain
/// `std::sync::Mutex` is enough — no `.await` is ever held across it.
pub struct DefaultSessionAdapter<A: ConnectionAdapter + 'static> {
    inner: Arc<A>,
    queue: Arc<Mutex<QueueState>>,
}

impl<A: ConnectionAdapter + 'static> DefaultSessionAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self { inner: Arc::new(inner), queue: Arc::new(Mutex::new(QueueState::default())) }
    }

    fn push(&self, item: EventResult) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push(item);
    }
}

impl<A: ConnectionAdapter + 'static> SessionAdapter for DefaultSessionAdapter<A> {
    /// Replaces the active buffer and waiter synchronously: the
    /// buffered events accumulated since the last `subscribe()` are
    /// drained into this call's returned stream before the queue's lock
    /// is released, and any previous waiter is detached so a `send()`
    /// in flight during the swap can never push into a stream nobody
    /// is reading anymore. This is what makes "no event is lost"
    /// true regardless of how `subscribe()` and `send()` interleave.
    fn subscribe(&self) -> Pin<Box<dyn Stream<Item = EventResult> + Send>> {
        let queue = self.queue.clone();
        let buffered: Vec<EventResult> = {
            let mut state = queue.lock().unwrap_or_else(|e| e.into_inner());
            state.waiter = None;
            state.buffer.drain(..).collect()
        };

        Box::pin(stream! {
            for item in buffered {
                yield item;
            }
            loop {
                let rx = {
                    let mut state = queue.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(item) = state.buffer.pop_front() {
                        yield item;
                        continue;
                    }
                    let (tx, rx) = oneshot::channel();
                    state.waiter = Some(tx);
                    rx
                };
                match rx.await {
                    Ok(item) => yield item,
                    // the sender side only drops without sending if this
                    // adapter itself is torn down mid-wait.
                    Err(_) => break,
                }
            }
        })
    }

    /// Drives one `ConnectionAdapter::connect` run to completion,
    /// pushing each event into the queue as it arrives. On a transport
    /// error, pushes a synthesized `RunError` so queue consumers observe
    /// termination through the protocol, then re-throws so the caller
    /// (`ChatClient`) observes it too. If the connection ends without a
    /// terminal event, synthesizes `RunFinished{finishReason: stop}`.
    fn send(
        &self,
        messages: &[UIMessage],
        data: Option<Value>,
        signal: CancelToken,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), TransportError>> + Send + '_>> {
        let mut upstream = self.inner.connect(messages, data, signal);

        Box::pin(async move {
            let mut terminal = false;

            loop {
                match upstream.next().await {
                    Some(Ok(event)) => {
                        terminal = matches!(event, Event::RunFinished { .. } | Event::RunError { .. });
                        self.push(Ok(event));
                        if terminal {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        self.push(Ok(Event::RunError {
                            error: RunErrorPayload { message: err.to_string(), code: None },
                            timestamp: now_ms(),
                        }));
                        return Err(err);
                    }
                    None => break,
                }
            }

            if !terminal {
                self.push(Ok(Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: now_ms() }));
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockConnectionAdapter;

    #[tokio::test]
    async fn send_forwards_events_to_subscriber() {
        let mock = MockConnectionAdapter::new(vec![
            Ok(Event::TextMessageStart { message_id: "m1".into(), role: crate::message::Role::Assistant, timestamp: 1 }),
            Ok(Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: 2 }),
        ]);
        let session = DefaultSessionAdapter::new(mock);
        let mut stream = session.subscribe();

        session.send(&[], None, CancelToken::new()).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Event::TextMessageStart { message_id: "m1".into(), role: crate::message::Role::Assistant, timestamp: 1 });
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second, Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: 2 });
    }

    #[tokio::test]
    async fn send_without_subscriber_buffers_until_subscribed() {
        let mock = MockConnectionAdapter::new(vec![Ok(Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: 1 })]);
        let session = DefaultSessionAdapter::new(mock);

        session.send(&[], None, CancelToken::new()).await.unwrap();

        let mut stream = session.subscribe();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: 1 });
    }

    #[tokio::test]
    async fn connection_end_without_terminal_event_is_synthesized() {
        let mock = MockConnectionAdapter::new(vec![]);
        let session = DefaultSessionAdapter::new(mock);
        let mut stream = session.subscribe();

        session.send(&[], None, CancelToken::new()).await.unwrap();

        match stream.next().await.unwrap().unwrap() {
            Event::RunFinished { finish_reason, .. } => assert_eq!(finish_reason, FinishReason::Stop),
            other => panic!("expected a synthesized RunFinished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resubscribing_replaces_waiter_without_losing_buffered_events() {
        let mock = MockConnectionAdapter::new(vec![
            Ok(Event::TextMessageStart { message_id: "m1".into(), role: crate::message::Role::Assistant, timestamp: 1 }),
            Ok(Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: 2 }),
        ]);
        let session = DefaultSessionAdapter::new(mock);

        // A first subscriber is dropped before anything is sent; it
        // never parked a waiter that could receive a stray push.
        drop(session.subscribe());

        session.send(&[], None, CancelToken::new()).await.unwrap();

        // The buffer that accumulated while nobody was listening is
        // still handed to whichever subscriber shows up next.
        let mut stream = session.subscribe();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Event::TextMessageStart { message_id: "m1".into(), role: crate::message::Role::Assistant, timestamp: 1 });
    }
}
