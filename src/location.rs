use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of an agent, assigned `1..=n` in pool order
pub type AgentId = u64;
/// Identifier of an accepted task, allocated by the pool
pub type TaskId = u64;

/// A point on the integer grid agents move across
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationParseError {
    #[error("expected a coordinate pair like `3,-7`, got `{0}`")]
    Malformed(String),
    #[error("invalid coordinate `{value}`: {reason}")]
    InvalidCoordinate { value: String, reason: String },
}

impl Location {
    pub const ORIGIN: Location = Location { x: 0, y: 0 };

    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Minimum number of unit moves to reach `other` when diagonal moves are allowed
    pub fn chebyshev_distance(self, other: Location) -> u64 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Next unit step toward `dest`: diagonal while both axes differ, then along
    /// the remaining axis. Returns `self` once the destination is reached.
    pub fn step_toward(self, dest: Location) -> Location {
        Location {
            x: self.x + dest.x.cmp(&self.x) as i64,
            y: self.y + dest.y.cmp(&self.y) as i64,
        }
    }
}

impl From<(i64, i64)> for Location {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Location {
    type Err = LocationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('(').trim_end_matches(')');
        let (x, y) = trimmed
            .split_once(',')
            .ok_or_else(|| LocationParseError::Malformed(s.to_string()))?;

        let parse = |raw: &str| {
            raw.trim()
                .parse::<i64>()
                .map_err(|e| LocationParseError::InvalidCoordinate {
                    value: raw.trim().to_string(),
                    reason: e.to_string(),
                })
        };

        Ok(Location::new(parse(x)?, parse(y)?))
    }
}
