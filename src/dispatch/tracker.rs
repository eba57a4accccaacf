use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

use super::errors::TrackerError;

/// How a tracked task was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
    /// Never assigned: the submission timed out or the pool stopped first
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub pending: usize,
    pub completed: u64,
    pub cancelled: u64,
    pub rejected: u64,
}

impl TrackerSnapshot {
    pub fn settled(&self) -> u64 {
        self.completed + self.cancelled + self.rejected
    }
}

/// Counting synchronization primitive for bulk-wait semantics
#[derive(Debug, Default)]
pub struct CompletionTracker {
    state: Mutex<TrackerSnapshot>,
    drained: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending += n;
    }

    /// Settle one outstanding task
    pub fn done(&self, outcome: TaskOutcome) -> Result<(), TrackerError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending = state
            .pending
            .checked_sub(1)
            .ok_or(TrackerError::Unbalanced)?;
        match outcome {
            TaskOutcome::Completed => state.completed += 1,
            TaskOutcome::Cancelled => state.cancelled += 1,
            TaskOutcome::Rejected => state.rejected += 1,
        }
        if state.pending == 0 {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.snapshot().pending
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no task is outstanding
    pub async fn wait(&self) -> TrackerSnapshot {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            // Register before checking so a concurrent `done` cannot slip between
            drained.as_mut().enable();

            let snapshot = self.snapshot();
            if snapshot.pending == 0 {
                return snapshot;
            }
            drained.await;
        }
    }
}
