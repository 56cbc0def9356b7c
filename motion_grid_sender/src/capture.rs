//! Handoff between a blocking capture thread and the tick loop.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Holds at most one value. The writer overwrites, the reader takes, so the
/// reader only ever sees the newest value and nothing queues up.
#[derive(Debug, Default)]
pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    /// Stores `value`. Returns true if it replaced one nobody had taken.
    pub fn put(&self, value: T) -> bool {
        let mut slot = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        slot.replace(value).is_some()
    }

    pub fn take(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// What the capture thread does after a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFailure {
    /// Wait this long before reading again.
    Retry(Duration),
    /// Too many failures in a row; stop capturing.
    GiveUp,
}

/// Counts consecutive read failures so a dead device neither spins a core nor
/// retries forever.
#[derive(Debug, Clone)]
pub struct ReadFailures {
    consecutive: u32,
    limit: u32,
    backoff: Duration,
}

impl ReadFailures {
    pub fn new(limit: u32, backoff: Duration) -> Self {
        Self {
            consecutive: 0,
            limit: limit.max(1),
            backoff,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn record_failure(&mut self) -> AfterFailure {
        self.consecutive += 1;
        if self.consecutive >= self.limit {
            AfterFailure::GiveUp
        } else {
            AfterFailure::Retry(self.backoff)
        }
    }
}
