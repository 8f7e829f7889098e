//! Chunk emission strategies : policy objects deciding when
//! accumulated text is flushed to subscribers on each
//! `TEXT_MESSAGE_CONTENT` event.

/// Returns the current time in milliseconds since epoch. Injectable so
/// `Debounced` can be tested without real sleeps — the same seam the
/// teacher exposes via `ProviderState::last_request_time` being a
/// plain field rather than a direct `Instant::now()` call scattered
/// through the code.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// `Clock` backed by the wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub trait ChunkEmissionStrategy: Send {
    /// Called on every `TEXT_MESSAGE_CONTENT`. `delta` is the increment
    /// just received; `accumulated` is the full current segment text
    /// (after applying it). Returns true if the segment should be
    /// flushed to subscribers now.
    fn should_emit(&mut self, delta: &str, accumulated: &str) -> bool;

    /// Resets any internal counters, called when a new text segment
    /// opens.
    fn reset(&mut self) {}
}

/// Always emits. The correct default when a host wants to observe
/// every delta as it arrives.
#[derive(Debug, Default)]
pub struct Immediate;

impl ChunkEmissionStrategy for Immediate {
    fn should_emit(&mut self, _delta: &str, _accumulated: &str) -> bool {
        true
    }
}

/// Emits when `accumulated` ends at terminal punctuation followed by
/// whitespace, or when `delta` has crossed `max_chars_between_emits`
/// characters since the last emit.
pub struct SentenceBoundary {
    max_chars_between_emits: usize,
    chars_since_last_emit: usize,
}

impl SentenceBoundary {
    pub fn new(max_chars_between_emits: usize) -> Self {
        Self { max_chars_between_emits, chars_since_last_emit: 0 }
    }

    fn ends_at_sentence_boundary(accumulated: &str) -> bool {
        let trimmed_end = accumulated.trim_end_matches(|c: char| c.is_whitespace());
        if trimmed_end.len() == accumulated.len() {
            // No trailing whitespace at all: can't be "punctuation followed by whitespace".
            return false;
        }
        matches!(trimmed_end.chars().last(), Some('.') | Some('!') | Some('?'))
    }
}

impl ChunkEmissionStrategy for SentenceBoundary {
    fn should_emit(&mut self, delta: &str, accumulated: &str) -> bool {
        self.chars_since_last_emit += delta.chars().count();

        if Self::ends_at_sentence_boundary(accumulated) {
            self.chars_since_last_emit = 0;
            return true;
        }
        if self.chars_since_last_emit >= self.max_chars_between_emits {
            self.chars_since_last_emit = 0;
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.chars_since_last_emit = 0;
    }
}

/// Emits when at least `min_interval_ms` has elapsed since the last
/// emission.
pub struct Debounced {
    clock: Box<dyn Clock>,
    min_interval_ms: i64,
    last_emit_ms: Option<i64>,
}

impl Debounced {
    pub fn new(min_interval_ms: i64) -> Self {
        Self { clock: Box::new(SystemClock), min_interval_ms, last_emit_ms: None }
    }

    pub fn with_clock(min_interval_ms: i64, clock: Box<dyn Clock>) -> Self {
        Self { clock, min_interval_ms, last_emit_ms: None }
    }
}

impl ChunkEmissionStrategy for Debounced {
    fn should_emit(&mut self, _delta: &str, _accumulated: &str) -> bool {
        let now = self.clock.now_ms();
        let should = match self.last_emit_ms {
            None => true,
            Some(last) => now - last >= self.min_interval_ms,
        };
        if should {
            self.last_emit_ms = Some(now);
        }
        should
    }

    fn reset(&mut self) {
        self.last_emit_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct FakeClock(AtomicI64);

    impl Clock for FakeClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn immediate_always_emits() {
        let mut strategy = Immediate;
        assert!(strategy.should_emit("a", "a"));
        assert!(strategy.should_emit("b", "ab"));
    }

    #[test]
    fn sentence_boundary_emits_on_terminal_punctuation() {
        let mut strategy = SentenceBoundary::new(1000);
        assert!(!strategy.should_emit("Hello", "Hello"));
        assert!(strategy.should_emit(". ", "Hello. "));
    }

    #[test]
    fn sentence_boundary_emits_after_char_threshold_without_punctuation() {
        let mut strategy = SentenceBoundary::new(5);
        assert!(!strategy.should_emit("ab", "ab"));
        assert!(strategy.should_emit("cdef", "abcdef"));
    }

    #[test]
    fn debounced_emits_first_call_then_waits_for_interval() {
        let clock = std::sync::Arc::new(FakeClock(AtomicI64::new(0)));
        struct ArcClock(std::sync::Arc<FakeClock>);
        impl Clock for ArcClock {
            fn now_ms(&self) -> i64 {
                self.0.now_ms()
            }
        }
        let mut strategy = Debounced::with_clock(100, Box::new(ArcClock(clock.clone())));
        assert!(strategy.should_emit("a", "a"));
        clock.0.store(50, Ordering::SeqCst);
        assert!(!strategy.should_emit("b", "ab"));
        clock.0.store(150, Ordering::SeqCst);
        assert!(strategy.should_emit("c", "abc"));
    }
}
