use std::sync::{Mutex, PoisonError};

/// "A new decoded frame is ready" signal between the decode collaborator
/// and the bridge loop.
///
/// Holds at most one pending update: setting it twice before it is taken
/// yields a single `true`.
#[derive(Debug, Default)]
pub struct RenderUpdateFlag {
    pending: Mutex<bool>,
}

impl RenderUpdateFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Return whether an update was pending and clear it.
    pub fn take_and_clear(&self) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *pending, false)
    }
}
