use serde::{Deserialize, Serialize};
use std::fmt;

/// Tie-break rank of an agent in the dispatch policy.
/// Lower values win: `Priority(0)` is preferred over `Priority(1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(i64);

impl Priority {
    pub const fn new(rank: i64) -> Self {
        Self(rank)
    }

    /// Default rank for the agent at `index` in pool order
    pub fn from_index(index: usize) -> Self {
        Self(index as i64)
    }

    /// Get the numeric priority value
    pub fn value(self) -> i64 {
        self.0
    }

    /// True when `self` should be chosen over `other` on an equal-cost tie
    pub fn outranks(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl From<i64> for Priority {
    fn from(rank: i64) -> Self {
        Self(rank)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}
