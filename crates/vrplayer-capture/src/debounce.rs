use std::time::{Duration, Instant};

/// Quiet period after the last resize event before the surface is rebuilt.
pub const RESIZE_SETTLE: Duration = Duration::from_secs(1);

/// Coalesces bursts of resize/visibility events into one rebuild.
///
/// Each [`notify`](Self::notify) restarts the quiet period; [`poll`](Self::poll)
/// fires once when it has elapsed.
#[derive(Debug, Clone)]
pub struct ResizeDebouncer {
    settle: Duration,
    last_event: Option<Instant>,
}

impl Default for ResizeDebouncer {
    fn default() -> Self {
        Self::new(RESIZE_SETTLE)
    }
}

impl ResizeDebouncer {
    pub fn new(settle: Duration) -> Self {
        Self { settle, last_event: None }
    }

    pub fn notify(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// True exactly once per burst, when the quiet period has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.last_event {
            Some(at) if now.saturating_duration_since(at) >= self.settle => {
                self.last_event = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.last_event = None;
    }
}
