use thiserror::Error;

use crate::location::Location;

/// Failures surfaced to callers of `AgentPool::submit` and `wait_all_timeout`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("agent pool has not been started")]
    NotStarted,
    #[error("agent pool is stopped")]
    Stopped,
    #[error("no agent became available for destination {destination} within {waited_ms}ms")]
    Timeout { destination: Location, waited_ms: u64 },
    #[error("{pending} tasks still outstanding after {waited_ms}ms")]
    WaitTimeout { pending: usize, waited_ms: u64 },
}

impl DispatchError {
    /// Timeouts are transient: the caller may resubmit
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("an agent pool needs at least one agent")]
    NoAgents,
    #[error("expected {expected} priorities (one per agent), got {actual}")]
    PriorityCountMismatch { expected: usize, actual: usize },
    #[error("expected {expected} start positions (one per agent), got {actual}")]
    PositionCountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("completion signalled with no task outstanding")]
    Unbalanced,
}
