//! Bounded polling timer.

use std::time::Duration;

use crate::error::{ErrorCode, OpResult};
use crate::ops::Await;

/// Polling cadence used while waiting on work without a completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Wake-ups allowed before the wait is abandoned with `TimedOut`.
    pub max_polls: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            max_polls: 30_000,
        }
    }
}

/// One-shot wake-ups at a fixed interval, up to a fixed budget.
#[derive(Debug, Clone)]
pub struct PollTimer {
    settings: PollSettings,
    polls: u32,
}

impl PollTimer {
    pub fn new(settings: PollSettings) -> Self {
        Self { settings, polls: 0 }
    }

    /// Arm the timer for the next wake-up.
    pub fn expires_after(&mut self) -> OpResult<Await> {
        if self.polls >= self.settings.max_polls {
            return Err(ErrorCode::TimedOut);
        }
        self.polls += 1;
        Ok(Await::Sleep(self.settings.interval))
    }

    /// Restart the budget after the awaited work made progress.
    pub fn reset(&mut self) {
        self.polls = 0;
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }
}
