// Fleet Dispatch Library - nearest-agent task dispatch for a simulated fleet
// This exposes the core components for testing and integration

pub mod agents;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod location;
pub mod observability;
pub mod priority;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for easy access
pub use agents::{Agent, AgentStatus, Path, Reservation};
pub use config::FleetConfig;
pub use dispatch::{
    AgentPool, CompletionTracker, DispatchError, PoolError, TaskOutcome, TrackerError,
    TrackerSnapshot,
};
pub use events::{EventBus, FleetEvent};
pub use location::{AgentId, Location, TaskId};
pub use observability::{DispatchMetrics, DispatchStats};
pub use priority::Priority;
pub use shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownReport};
pub use telemetry::{create_dispatch_span, generate_correlation_id, init_telemetry};
