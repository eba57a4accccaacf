// Dispatcher: agent selection, completion tracking and pool lifecycle

pub mod errors;
pub mod pool;
pub mod selection;
pub mod tracker;

pub use errors::{DispatchError, PoolError, TrackerError};
pub use pool::AgentPool;
pub use selection::{select_candidate, Candidate};
pub use tracker::{CompletionTracker, TaskOutcome, TrackerSnapshot};
