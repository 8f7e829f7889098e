//! Transport abstraction: one `ConnectionAdapter` implementation
//! per wire format, each satisfying the same adapter contract.

pub mod ndjson;
pub mod sse;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use serde_json::Value;
use tokio::sync::Notify;

use crate::error::TransportError;
use crate::events::Event;
use crate::message::UIMessage;

/// Cooperative cancellation signal threaded through `connect`/`send`.
/// Built on a bare `Arc<Notify>` rather than `tokio_util`'s
/// `CancellationToken`, which isn't in the dependency stack.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` is called; resolves immediately if
    /// already cancelled by the time this is polled.
    ///
    /// The `Notified` future is created *before* the flag check so it
    /// captures `notify_waiters()`'s generation at that point — if
    /// `cancel()` races in between, the await below still observes it.
    /// Creating it after the check (and only when not yet cancelled)
    /// would leave a window where a concurrent `cancel()` fires
    /// `notify_waiters()` before anyone is registered to receive it.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// `connect(messages, data?, signal?) -> async iterable of events`.
/// One stream per request. Implementors must honor `signal`,
/// surface transport/protocol failures as `Err`, and yield
/// well-formed `Event`s.
pub trait ConnectionAdapter: Send + Sync {
    fn connect(
        &self,
        messages: &[UIMessage],
        data: Option<Value>,
        signal: CancelToken,
    ) -> Pin<Box<dyn Stream<Item = Result<Event, TransportError>> + Send>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_token_resolves_cancelled_future() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let waiter = token.clone();
        token.cancel();
        assert!(token.is_cancelled());
        waiter.cancelled().await; // must not hang
    }
}
