//! `ChatClient`: wraps a `StreamProcessor` and a `SessionAdapter`,
//! owning the subscription lifecycle, client-tool dispatch, and the
//! auto-continue loop. Modeled on `ChatLoopHandle`'s (`src/llm/provider.rs`)
//! "background task feeds a shared state machine, async tool execution
//! races the stream" shape, generalized from one `next()`-polling handle
//! exposed to the caller to a self-driving client that owns its own
//! background task.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::events::{Event, RunErrorPayload};
use crate::message::{MessagePart, Role, UIMessage};
use crate::next_id;
use crate::now_ms;
use crate::processor::{StreamProcessor, ToolCallDispatch};
use crate::session::SessionAdapter;
use crate::transport::CancelToken;

/// `ready → submitted → streaming → ready`, or `→ error` on a reported
/// transport failure . Cancellation returns straight to `ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Ready,
    Submitted,
    Streaming,
    Error,
}

type ExecuteTool = Arc<dyn Fn(ToolCallDispatch) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Explicit configuration record ("no dynamic keyword arguments").
#[derive(Clone, Default)]
pub struct ChatClientOptions {
    pub client_id: String,
    /// Merged into every request body alongside per-call data and
    /// `conversationId` (streamResponse).
    pub base_body: Option<Value>,
    execute_tool: Option<ExecuteTool>,
}

impl ChatClientOptions {
    pub fn new() -> Self {
        Self { client_id: next_id("chat"), base_body: None, execute_tool: None }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_base_body(mut self, body: Value) -> Self {
        self.base_body = Some(body);
        self
    }

    /// Registers the function that executes client/host tools dispatched
    /// via a `tool-input-available` CUSTOM event (ToolCallDispatch).
    pub fn with_execute_tool<F, Fut>(mut self, execute: F) -> Self
    where
        F: Fn(ToolCallDispatch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.execute_tool = Some(Arc::new(move |dispatch| Box::pin(execute(dispatch))));
        self
    }
}

enum PostStreamAction {
    AddToolResult { tool_call_id: String, output: Value, is_error: bool },
    AddToolApprovalResponse { approval_id: String, approved: bool },
}

/// Owns one conversation's session and processor. Safe to share across
/// tasks via `Arc<ChatClient<A>>` — every field that needs cross-task
/// access is already `Arc`/async-mutex internally.
pub struct ChatClient<A: SessionAdapter + 'static> {
    session: Arc<A>,
    processor: Arc<AsyncMutex<StreamProcessor>>,
    options: ChatClientOptions,

    stream_generation: Arc<AtomicU64>,
    loading: Arc<AtomicBool>,
    status: Arc<std::sync::Mutex<ClientStatus>>,
    on_status_change: std::sync::Mutex<Option<Box<dyn FnMut(ClientStatus) + Send>>>,

    send_signal: Arc<AsyncMutex<Option<CancelToken>>>,
    pending_tool_executions: Arc<AsyncMutex<Vec<JoinHandle<()>>>>,
    /// Holds at most one genuinely pending waiter at a time: the most
    /// recent `stream_response` call's. An older call's waiter is only
    /// ever left behind here across a `reload()`'s transient overlap
    /// between the old (cancelled) run and the new one, and the new
    /// call fires it immediately on start rather than wait for a
    /// terminal event that belongs to a run it just superseded.
    complete_waiters: Arc<AsyncMutex<VecDeque<oneshot::Sender<()>>>>,
    continuation_pending: Arc<AtomicBool>,
    post_stream_queue: Arc<AsyncMutex<VecDeque<PostStreamAction>>>,
}

impl<A: SessionAdapter + 'static> ChatClient<A> {
    /// Takes ownership of an already-configured `StreamProcessor` (a
    /// host may have wired `on_messages_change`/`on_text_update`/etc.
    /// via its builder methods). `ChatClient` claims `on_tool_call` for
    /// itself to drive client-tool dispatch — set `execute_tool` via
    /// `ChatClientOptions` instead of registering a competing callback.
    ///
    /// Spawns the session's single background subscription task here,
    /// not lazily on first `stream_response` — `session.subscribe()` is
    /// called exactly once for the client's lifetime; every subsequent
    /// turn reuses it via `session.send()`.
    pub fn new(session: A, processor: StreamProcessor, options: ChatClientOptions) -> Self {
        let (tool_call_tx, tool_call_rx) = mpsc::unbounded_channel();
        let processor = processor.on_tool_call(move |dispatch| {
            let _ = tool_call_tx.send(dispatch);
        });

        let session = Arc::new(session);
        let processor = Arc::new(AsyncMutex::new(processor));
        let pending_tool_executions = Arc::new(AsyncMutex::new(Vec::new()));
        let complete_waiters = Arc::new(AsyncMutex::new(VecDeque::new()));

        spawn_subscription_loop(
            session.clone(),
            processor.clone(),
            options.execute_tool.clone(),
            pending_tool_executions.clone(),
            complete_waiters.clone(),
            tool_call_rx,
        );

        Self {
            session,
            processor,
            options,
            stream_generation: Arc::new(AtomicU64::new(0)),
            loading: Arc::new(AtomicBool::new(false)),
            status: Arc::new(std::sync::Mutex::new(ClientStatus::Ready)),
            on_status_change: std::sync::Mutex::new(None),
            send_signal: Arc::new(AsyncMutex::new(None)),
            pending_tool_executions,
            complete_waiters,
            continuation_pending: Arc::new(AtomicBool::new(false)),
            post_stream_queue: Arc::new(AsyncMutex::new(VecDeque::new())),
        }
    }

    pub fn on_status_change<F>(&self, callback: F)
    where
        F: FnMut(ClientStatus) + Send + 'static,
    {
        *self.on_status_change.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(callback));
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn get_messages(&self) -> Vec<UIMessage> {
        self.processor.lock().await.get_messages().to_vec()
    }

    fn set_status(&self, status: ClientStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
        if let Some(cb) = self.on_status_change.lock().unwrap_or_else(|e| e.into_inner()).as_mut() {
            cb(status);
        }
    }

    pub async fn add_user_message(&self, content: impl Into<String>) -> String {
        self.processor.lock().await.add_user_message(content)
    }

    /// Queued and applied after finalization if a stream is currently
    /// in flight (post-stream action queue); applied immediately
    /// otherwise.
    pub async fn add_tool_result(&self, tool_call_id: impl Into<String>, output: Value, is_error: bool) {
        let tool_call_id = tool_call_id.into();
        if self.is_loading() {
            self.post_stream_queue.lock().await.push_back(PostStreamAction::AddToolResult { tool_call_id, output, is_error });
        } else {
            self.processor.lock().await.add_tool_result(&tool_call_id, output, is_error);
        }
    }

    pub async fn add_tool_approval_response(&self, approval_id: impl Into<String>, approved: bool) {
        let approval_id = approval_id.into();
        if self.is_loading() {
            self.post_stream_queue.lock().await.push_back(PostStreamAction::AddToolApprovalResponse { approval_id, approved });
        } else {
            self.processor.lock().await.add_tool_approval_response(&approval_id, approved);
        }
    }

    /// Starts (or restarts) an assistant turn: bumps `streamGeneration`,
    /// posts the request via `session.send()`, awaits the subscription
    /// task resolving this turn's `processingComplete`, then runs
    /// client-tool executions, finalization, the post-stream queue, and
    /// auto-continue, in that order.
    pub async fn stream_response(&self, extra_body: Option<Value>) {
        let my_generation = self.stream_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_status(ClientStatus::Submitted);
        self.loading.store(true, Ordering::SeqCst);

        let body = merge_body(self.options.base_body.clone(), extra_body, &self.options.client_id);

        let messages = {
            let mut processor = self.processor.lock().await;
            processor.prepare_assistant_message();
            processor.get_messages().to_vec()
        };

        let signal = CancelToken::new();
        *self.send_signal.lock().await = Some(signal.clone());

        let (complete_tx, complete_rx) = oneshot::channel();
        {
            let mut waiters = self.complete_waiters.lock().await;
            // A leftover waiter here belongs to a run this generation bump
            // already superseded (`reload` racing a still-in-flight
            // stream_response) — fire it now rather than leave it for a
            // terminal event that may never arrive for it, so that run's
            // `stream_response` wakes up, observes the generation
            // mismatch, and returns instead of hanging forever.
            while let Some(stale) = waiters.pop_front() {
                let _ = stale.send(());
            }
            waiters.push_back(complete_tx);
        }

        self.set_status(ClientStatus::Streaming);

        if let Err(err) = self.session.send(&messages, body, signal).await {
            // The session already pushed a synthesized RUN_ERROR for the
            // subscription task to observe; this is just the send-path
            // half of "both subscribe-path and send-path consumers
            // observe the failure".
            log::warn!("session send failed: {err}");
        }

        let _ = complete_rx.await;

        if self.stream_generation.load(Ordering::SeqCst) != my_generation {
            return; // superseded: the newer stream owns cleanup
        }

        self.await_pending_tool_executions().await;
        self.processor.lock().await.finalize_stream();

        if self.stream_generation.load(Ordering::SeqCst) != my_generation {
            return;
        }

        self.loading.store(false, Ordering::SeqCst);
        self.set_status(ClientStatus::Ready);
        *self.send_signal.lock().await = None;

        self.drain_post_stream_queue().await;
        self.maybe_auto_continue().await;
    }

    async fn await_pending_tool_executions(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.pending_tool_executions.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn drain_post_stream_queue(&self) {
        let actions: Vec<_> = std::mem::take(&mut *self.post_stream_queue.lock().await);
        let mut processor = self.processor.lock().await;
        for action in actions {
            match action {
                PostStreamAction::AddToolResult { tool_call_id, output, is_error } => {
                    processor.add_tool_result(&tool_call_id, output, is_error);
                }
                PostStreamAction::AddToolApprovalResponse { approval_id, approved } => {
                    processor.add_tool_approval_response(&approval_id, approved);
                }
            }
        }
    }

    /// After a successful finalization, resumes automatically if the
    /// conversation ended on a completed tool result with nothing left
    /// pending (Auto-continue), guarded against re-entrant firing.
    fn maybe_auto_continue(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.continuation_pending.load(Ordering::SeqCst) {
                return;
            }

            let should_continue = {
                let processor = self.processor.lock().await;
                let ends_on_tool_result = processor
                    .get_messages()
                    .last()
                    .and_then(|m| m.parts.last())
                    .map(|p| matches!(p, MessagePart::ToolResult { .. }))
                    .unwrap_or(false);
                ends_on_tool_result && processor.are_all_tools_complete()
            };

            if !should_continue {
                return;
            }

            self.continuation_pending.store(true, Ordering::SeqCst);
            self.stream_response(None).await;
            self.continuation_pending.store(false, Ordering::SeqCst);
        })
    }

    /// Aborts the in-flight request. The subscription task observes the
    /// cancelled stream end naturally and resolves `processingComplete`;
    /// status returns to `ready` without ever reporting an error.
    pub async fn stop(&self) {
        if let Some(signal) = self.send_signal.lock().await.take() {
            signal.cancel();
        }
        self.loading.store(false, Ordering::SeqCst);
        self.set_status(ClientStatus::Ready);
    }

    /// Aborts the current stream, truncates the conversation back to
    /// (and including) the last user message, then starts a fresh
    /// `streamResponse`.
    pub async fn reload(&self) {
        if let Some(signal) = self.send_signal.lock().await.take() {
            signal.cancel();
        }

        let last_user_id = {
            let processor = self.processor.lock().await;
            processor.get_messages().iter().rev().find(|m| m.role == Role::User).map(|m| m.id.clone())
        };
        if let Some(id) = last_user_id {
            self.processor.lock().await.remove_messages_after(&id);
        }

        self.stream_response(None).await;
    }
}

/// One persistent background task per `ChatClient`, spawned once in
/// `new()`: iterates `session.subscribe()` forever, racing each event
/// against the tool-call dispatch channel so a client tool can start
/// executing the moment its CUSTOM event arrives rather than waiting
/// for the run to end. Every terminal event (RUN_FINISHED/RUN_ERROR)
/// resolves whichever `stream_response` waiter is currently queued.
fn spawn_subscription_loop<A: SessionAdapter + 'static>(
    session: Arc<A>,
    processor: Arc<AsyncMutex<StreamProcessor>>,
    execute_tool: Option<ExecuteTool>,
    pending: Arc<AsyncMutex<Vec<JoinHandle<()>>>>,
    complete_waiters: Arc<AsyncMutex<VecDeque<oneshot::Sender<()>>>>,
    mut tool_call_rx: mpsc::UnboundedReceiver<ToolCallDispatch>,
) {
    tokio::spawn(async move {
        let mut stream = session.subscribe();

        loop {
            tokio::select! {
                biased;
                dispatch = tool_call_rx.recv() => {
                    match dispatch {
                        Some(dispatch) => spawn_tool_execution(dispatch, execute_tool.clone(), processor.clone(), pending.clone()).await,
                        None => break, // every ChatClient handle (and its processor) was dropped
                    }
                }
                item = stream.next() => {
                    let Some(event) = item else { break };
                    let mut p = processor.lock().await;
                    let terminal = match event {
                        Ok(event) => {
                            let terminal = matches!(event, Event::RunFinished { .. } | Event::RunError { .. });
                            p.process_chunk(event);
                            terminal
                        }
                        Err(err) => {
                            p.process_chunk(Event::RunError {
                                error: RunErrorPayload { message: err.to_string(), code: None },
                                timestamp: now_ms(),
                            });
                            true
                        }
                    };
                    drop(p);

                    if terminal {
                        if let Some(tx) = complete_waiters.lock().await.pop_front() {
                            let _ = tx.send(());
                        }
                    }
                }
            }
        }
    });
}

async fn spawn_tool_execution(
    dispatch: ToolCallDispatch,
    execute_tool: Option<ExecuteTool>,
    processor: Arc<AsyncMutex<StreamProcessor>>,
    pending: Arc<AsyncMutex<Vec<JoinHandle<()>>>>,
) {
    let Some(execute) = execute_tool else {
        log::warn!("tool call {} dispatched with no execute_tool configured", dispatch.tool_call_id);
        return;
    };

    let handle = tokio::spawn(async move {
        let tool_call_id = dispatch.tool_call_id.clone();
        match execute(dispatch).await {
            Ok(output) => processor.lock().await.add_tool_result(&tool_call_id, output, false),
            Err(message) => processor.lock().await.add_tool_result(&tool_call_id, Value::String(message), true),
        }
    });

    pending.lock().await.push(handle);
}

fn merge_body(base: Option<Value>, extra: Option<Value>, client_id: &str) -> Option<Value> {
    let mut merged = base.unwrap_or_else(|| serde_json::json!({}));
    if let Some(extra) = extra {
        if let (Some(merged_obj), Some(extra_obj)) = (merged.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                merged_obj.insert(k.clone(), v.clone());
            }
        }
    }
    if let Some(obj) = merged.as_object_mut() {
        obj.insert("conversationId".to_string(), Value::String(client_id.to_string()));
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FinishReason;
    use crate::session::DefaultSessionAdapter;
    use crate::transport::mock::MockConnectionAdapter;

    fn script() -> Vec<Result<Event, crate::error::TransportError>> {
        vec![
            Ok(Event::TextMessageStart { message_id: "m1".into(), role: Role::Assistant, timestamp: 1 }),
            Ok(Event::TextMessageContent { message_id: "m1".into(), delta: Some("Hi".into()), content: None, timestamp: 2 }),
            Ok(Event::RunFinished { finish_reason: FinishReason::Stop, timestamp: 3 }),
        ]
    }

    #[tokio::test]
    async fn stream_response_reaches_ready_with_final_text() {
        let adapter = MockConnectionAdapter::new(script());
        let session = DefaultSessionAdapter::new(adapter);
        let client = ChatClient::new(session, StreamProcessor::new(), ChatClientOptions::new());

        client.add_user_message("hello").await;
        client.stream_response(None).await;

        assert_eq!(client.status(), ClientStatus::Ready);
        assert!(!client.is_loading());
        let messages = client.get_messages().await;
        assert_eq!(messages.last().unwrap().text(), "Hi");
    }

    #[tokio::test]
    async fn stop_returns_to_ready_without_error() {
        let adapter = MockConnectionAdapter::new(vec![Ok(Event::TextMessageStart {
            message_id: "m1".into(),
            role: Role::Assistant,
            timestamp: 1,
        })]);
        let session = DefaultSessionAdapter::new(adapter);
        let client = ChatClient::new(session, StreamProcessor::new(), ChatClientOptions::new());

        client.stop().await;
        assert_eq!(client.status(), ClientStatus::Ready);
        assert!(!client.is_loading());
    }

    #[tokio::test]
    async fn merge_body_injects_conversation_id() {
        let body = merge_body(Some(serde_json::json!({"model": "x"})), Some(serde_json::json!({"temperature": 0.5})), "c1").unwrap();
        assert_eq!(body["model"], "x");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["conversationId"], "c1");
    }
}
