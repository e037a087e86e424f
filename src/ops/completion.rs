//! Completion slot filled by background work and polled by operations.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::OpResult;

/// Single-assignment result shared between a worker and the operation polling it.
pub struct Completion<T> {
    slot: Arc<Mutex<Option<OpResult<T>>>>,
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Store the result. Only the first result is kept.
    pub fn complete(&self, result: OpResult<T>) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
    }

    /// Take the result if the work has finished.
    pub fn take(&self) -> Option<OpResult<T>> {
        self.slot.lock().take()
    }

    pub fn is_complete(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.is_complete())
            .finish()
    }
}
