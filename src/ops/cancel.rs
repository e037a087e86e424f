//! Cooperative cancellation shared by every operation in a chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ErrorCode;

/// Flag checked by operations at the top of every resumption.
///
/// Clones share the flag: cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(ErrorCode::Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), ErrorCode> {
        if self.is_cancelled() {
            Err(ErrorCode::Cancelled)
        } else {
            Ok(())
        }
    }
}
