//! Single-slot handoff between one producer thread and one consumer.
//!
//! Every cross-thread seam in the pipeline uses this instead of a queue:
//! the control loop wants the freshest value, never a backlog. A slow
//! reader observes only the most recent publish; a fast reader observes
//! emptiness. Staleness is preferred over queueing delay.

use std::sync::{Arc, Mutex};

/// Lossy single-capacity cell. Cloning shares the same slot.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace any unread value. The old value is silently discarded.
    pub fn publish(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(value);
    }

    /// Non-blocking read; clears the slot when a value is present.
    pub fn take_if_present(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }

    /// Whether an unread value is pending, without consuming it.
    pub fn is_pending(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.is_some()
    }
}
